//! Device-lock rule management on top of a [`PacketFilter`].
//!
//! A locked credential owns exactly two rules on its port: ACCEPT from the
//! bound address and DROP from everyone else. Every method here lists the
//! live table first and acts on the difference, so repeated calls converge
//! instead of piling up duplicates.

use crate::domain::{in_pool, Credential, PacketFilterPtr, PortRule, Registry, ToolError};
use std::collections::BTreeSet;
use std::net::Ipv4Addr;

/// Upper bound on list/delete rounds in [`DeviceLockController::release`].
const MAX_RELEASE_PASSES: usize = 32;

/// Result of [`DeviceLockController::apply`].
#[derive(Debug, Default)]
pub struct ApplyOutcome {
    // ---
    /// Rules removed by the final sweep.
    pub swept: usize,
    pub warnings: Vec<String>,
}

#[derive(Clone)]
pub struct DeviceLockController {
    // ---
    filter: PacketFilterPtr,
}

impl DeviceLockController {
    // ---
    pub fn new(filter: PacketFilterPtr) -> Self {
        Self { filter }
    }

    /// Number of managed rules currently installed.
    pub async fn rule_count(&self) -> Result<usize, ToolError> {
        Ok(self.filter.list().await?.iter().filter(|r| in_pool(r.port)).count())
    }

    /// Installs the ACCEPT/DROP pair for `port`, removing stale or duplicate
    /// rules on the same port. Returns the number of rules changed.
    ///
    /// The new pair goes in before any stale rule comes out, so the port is
    /// never open while the lock moves to another address. When the ACCEPT
    /// insert succeeds and the DROP insert fails, the ACCEPT is deleted again
    /// and the old rules stay in place.
    pub async fn ensure(&self, port: u16, ip: Ipv4Addr) -> Result<usize, ToolError> {
        // ---
        let desired = PortRule::device_lock(port, ip);
        let mut present = [false; 2];
        let mut strays = Vec::new();

        for rule in self.filter.list().await?.into_iter().filter(|r| r.port == port) {
            match desired.iter().position(|d| *d == rule) {
                Some(idx) if !present[idx] => present[idx] = true,
                _ => strays.push(rule),
            }
        }

        let mut changed = 0;
        let mut inserted: Option<&PortRule> = None;
        for (rule, _) in desired.iter().zip(present).filter(|(_, p)| !p) {
            if let Err(err) = self.filter.insert(rule).await {
                if let Some(first) = inserted {
                    tracing::warn!("rolling back {} after failed insert of {}", first, rule);
                    if let Err(undo) = self.filter.delete(first).await {
                        tracing::warn!("rollback of {} failed: {}", first, undo);
                    }
                }
                return Err(err);
            }
            tracing::debug!("inserted {}", rule);
            inserted = Some(rule);
            changed += 1;
        }

        for rule in &strays {
            tracing::debug!("removing stray rule {}", rule);
            self.filter.delete(rule).await?;
            changed += 1;
        }

        if changed > 0 {
            tracing::info!("device lock on port {} set to {}", port, ip);
        }
        Ok(changed)
    }

    /// Removes every rule on `port`, re-listing until none is left.
    pub async fn release(&self, port: u16) -> Result<usize, ToolError> {
        // ---
        let mut removed = 0;
        for _ in 0..MAX_RELEASE_PASSES {
            let rules: Vec<PortRule> = self
                .filter
                .list()
                .await?
                .into_iter()
                .filter(|r| r.port == port)
                .collect();
            if rules.is_empty() {
                if removed > 0 {
                    tracing::info!("device lock on port {} released ({} rules)", port, removed);
                }
                return Ok(removed);
            }
            for rule in &rules {
                self.filter.delete(rule).await?;
                removed += 1;
            }
        }

        Err(ToolError::Failed {
            program: "packet-filter".to_string(),
            status: format!("rules on port {port} survived {MAX_RELEASE_PASSES} passes"),
            stderr: String::new(),
        })
    }

    /// Deletes every pool-port rule whose port is not in `active_ports`.
    pub async fn reconcile(&self, active_ports: &BTreeSet<u16>) -> Result<usize, ToolError> {
        // ---
        let stray: Vec<PortRule> = self
            .filter
            .list()
            .await?
            .into_iter()
            .filter(|r| in_pool(r.port) && !active_ports.contains(&r.port))
            .collect();

        for rule in &stray {
            tracing::debug!("sweeping {}", rule);
            self.filter.delete(rule).await?;
        }
        if !stray.is_empty() {
            tracing::info!("swept {} stray firewall rules", stray.len());
        }
        Ok(stray.len())
    }

    /// Brings the whole rule table in line with `registry`.
    ///
    /// Failures on one credential do not stop the others; each becomes a
    /// warning.
    pub async fn apply(&self, registry: &Registry) -> ApplyOutcome {
        // ---
        let mut outcome = ApplyOutcome::default();
        let mut active = BTreeSet::new();

        for cred in registry.iter() {
            let result = match managed_lock(cred) {
                Some((port, ip)) => {
                    active.insert(port);
                    self.ensure(port, ip).await
                }
                None => continue,
            };
            if let Err(err) = result {
                outcome
                    .warnings
                    .push(format!("firewall for {}: {}", cred.username, err));
            }
        }

        match self.reconcile(&active).await {
            Ok(swept) => outcome.swept = swept,
            Err(err) => outcome.warnings.push(format!("firewall sweep: {err}")),
        }
        outcome
    }
}

/// Port and address of a lock this controller is allowed to manage.
pub(crate) fn managed_lock(cred: &Credential) -> Option<(u16, Ipv4Addr)> {
    cred.device_lock().filter(|(port, _)| in_pool(*port))
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;
    use crate::domain::{PacketFilter, RuleAction};
    use crate::infrastructure::MemoryPacketFilter;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    const IP: Ipv4Addr = Ipv4Addr::new(203, 0, 113, 5);
    const OTHER: Ipv4Addr = Ipv4Addr::new(198, 51, 100, 1);

    fn controller(rules: Vec<PortRule>) -> (Arc<MemoryPacketFilter>, DeviceLockController) {
        let filter = Arc::new(MemoryPacketFilter::with_rules(rules));
        (filter.clone(), DeviceLockController::new(filter))
    }

    fn on_port(filter: &MemoryPacketFilter, port: u16) -> Vec<PortRule> {
        let mut rules: Vec<_> = filter.rules().into_iter().filter(|r| r.port == port).collect();
        rules.sort();
        rules
    }

    #[tokio::test]
    async fn ensure_twice_leaves_one_pair() {
        // ---
        let (filter, ctl) = controller(vec![]);

        assert_eq!(ctl.ensure(6000, IP).await.unwrap(), 2);
        assert_eq!(ctl.ensure(6000, IP).await.unwrap(), 0);

        let mut expected = PortRule::device_lock(6000, IP).to_vec();
        expected.sort();
        assert_eq!(on_port(&filter, 6000), expected);
    }

    #[tokio::test]
    async fn ensure_replaces_stale_address_and_duplicates() {
        // ---
        let [accept, drop] = PortRule::device_lock(6000, IP);
        let (filter, ctl) = controller(vec![
            PortRule::accept_from(6000, OTHER),
            PortRule::drop_others(6000, OTHER),
            accept,
            accept,
            drop,
            PortRule::accept_from(7000, OTHER),
        ]);

        ctl.ensure(6000, IP).await.unwrap();

        let rules = on_port(&filter, 6000);
        assert_eq!(rules.len(), 2);
        assert_eq!(rules.iter().filter(|r| r.action == RuleAction::Accept).count(), 1);
        assert!(rules.contains(&accept) && rules.contains(&drop));
        assert_eq!(on_port(&filter, 7000).len(), 1);
    }

    /// Filter that records the order of inserts and deletes.
    struct Journal {
        inner: MemoryPacketFilter,
        ops: std::sync::Mutex<Vec<&'static str>>,
    }

    #[async_trait::async_trait]
    impl PacketFilter for Journal {
        async fn list(&self) -> Result<Vec<PortRule>, ToolError> {
            self.inner.list().await
        }

        async fn insert(&self, rule: &PortRule) -> Result<(), ToolError> {
            self.ops.lock().unwrap().push("insert");
            self.inner.insert(rule).await
        }

        async fn delete(&self, rule: &PortRule) -> Result<(), ToolError> {
            self.ops.lock().unwrap().push("delete");
            self.inner.delete(rule).await
        }
    }

    #[tokio::test]
    async fn moving_a_lock_inserts_before_deleting() {
        // ---
        let journal = Arc::new(Journal {
            inner: MemoryPacketFilter::with_rules(PortRule::device_lock(6000, OTHER).to_vec()),
            ops: std::sync::Mutex::new(Vec::new()),
        });
        let ctl = DeviceLockController::new(journal.clone());

        assert_eq!(ctl.ensure(6000, IP).await.unwrap(), 4);

        assert_eq!(
            journal.ops.lock().unwrap().clone(),
            vec!["insert", "insert", "delete", "delete"]
        );
        let mut expected = PortRule::device_lock(6000, IP).to_vec();
        expected.sort();
        assert_eq!(on_port(&journal.inner, 6000), expected);
    }

    #[tokio::test]
    async fn release_removes_accumulated_duplicates() {
        // ---
        let [accept, drop] = PortRule::device_lock(6001, IP);
        let (filter, ctl) = controller(vec![accept, drop, accept, drop, drop]);

        assert_eq!(ctl.release(6001).await.unwrap(), 5);
        assert!(on_port(&filter, 6001).is_empty());
        assert_eq!(ctl.release(6001).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn reconcile_keeps_only_active_pool_ports() {
        // ---
        let mut start = Vec::new();
        start.extend(PortRule::device_lock(6000, IP));
        start.extend(PortRule::device_lock(6001, IP));
        start.push(PortRule::accept_from(6002, OTHER));
        start.push(PortRule::accept_from(5667, OTHER));
        let (filter, ctl) = controller(start);

        let swept = ctl.reconcile(&[6000].into()).await.unwrap();

        assert_eq!(swept, 3);
        let ports: BTreeSet<u16> = filter.rules().iter().map(|r| r.port).collect();
        assert_eq!(ports, [5667, 6000].into());
    }

    #[tokio::test]
    async fn apply_converges_from_drift() {
        // ---
        let mut locked = Credential::new("alice", "pw");
        locked.port = Some(6000);
        locked.bound_ip = Some(IP);
        let mut open = Credential::new("bob", "pw2");
        open.port = Some(6001);
        let registry = Registry::new(vec![locked, open]);

        let (filter, ctl) = controller(vec![
            PortRule::drop_others(6000, IP),
            PortRule::accept_from(6001, OTHER),
            PortRule::drop_others(6001, OTHER),
            PortRule::drop_others(9000, OTHER),
        ]);

        let outcome = ctl.apply(&registry).await;

        assert!(outcome.warnings.is_empty());
        assert_eq!(outcome.swept, 3);
        let mut expected = PortRule::device_lock(6000, IP).to_vec();
        expected.sort();
        let mut actual = filter.rules();
        actual.sort();
        assert_eq!(actual, expected);
    }

    /// Filter whose inserts start failing after a fixed number of successes.
    struct FlakyFilter {
        inner: MemoryPacketFilter,
        inserts_left: AtomicUsize,
    }

    #[async_trait::async_trait]
    impl PacketFilter for FlakyFilter {
        async fn list(&self) -> Result<Vec<PortRule>, ToolError> {
            self.inner.list().await
        }

        async fn insert(&self, rule: &PortRule) -> Result<(), ToolError> {
            let left = self.inserts_left.load(Ordering::SeqCst);
            if left == 0 {
                return Err(ToolError::Failed {
                    program: "iptables".to_string(),
                    status: "exit status: 4".to_string(),
                    stderr: "resource problem".to_string(),
                });
            }
            self.inserts_left.store(left - 1, Ordering::SeqCst);
            self.inner.insert(rule).await
        }

        async fn delete(&self, rule: &PortRule) -> Result<(), ToolError> {
            self.inner.delete(rule).await
        }
    }

    #[tokio::test]
    async fn failed_second_insert_rolls_back_the_first() {
        // ---
        let filter = Arc::new(FlakyFilter {
            inner: MemoryPacketFilter::new(),
            inserts_left: AtomicUsize::new(1),
        });
        let ctl = DeviceLockController::new(filter.clone());

        assert!(ctl.ensure(6000, IP).await.is_err());
        assert!(filter.inner.rules().is_empty());
    }

    #[tokio::test]
    async fn failed_move_keeps_the_old_lock() {
        // ---
        let filter = Arc::new(FlakyFilter {
            inner: MemoryPacketFilter::with_rules(PortRule::device_lock(6000, OTHER).to_vec()),
            inserts_left: AtomicUsize::new(1),
        });
        let ctl = DeviceLockController::new(filter.clone());

        assert!(ctl.ensure(6000, IP).await.is_err());

        let mut expected = PortRule::device_lock(6000, OTHER).to_vec();
        expected.sort();
        assert_eq!(on_port(&filter.inner, 6000), expected);
    }
}
