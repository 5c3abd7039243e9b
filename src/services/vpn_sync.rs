use crate::domain::{Registry, ToolError, VpnServerPtr};
use std::collections::BTreeSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard};

/// Pushes the registry's password set to the VPN server.
///
/// A failed push marks the sync dirty so the next mutation or reconcile
/// pass retries it even when the password set did not change. Secrets of
/// removed credentials stay queued as revocations until a push succeeds.
pub struct VpnSync {
    // ---
    server: VpnServerPtr,
    dirty: AtomicBool,
    revoked: Mutex<BTreeSet<String>>,
}

impl VpnSync {
    // ---
    pub fn new(server: VpnServerPtr) -> Self {
        Self {
            server,
            dirty: AtomicBool::new(false),
            revoked: Mutex::new(BTreeSet::new()),
        }
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty.load(Ordering::SeqCst)
    }

    /// Applies `registry`'s secrets when they differ from `before` or an
    /// earlier push failed. Returns whether a push happened.
    pub async fn sync_if_changed(
        &self,
        before: &[String],
        registry: &Registry,
    ) -> Result<bool, ToolError> {
        // ---
        let secrets = registry.secrets();
        if secrets == before && !self.is_dirty() {
            return Ok(false);
        }
        self.push(before, &secrets).await.map(|_| true)
    }

    /// Like [`sync_if_changed`](Self::sync_if_changed), but also pushes when
    /// the live server config no longer accepts the registry's secrets
    /// (edited by hand, replaced, or never written after a crash).
    pub async fn converge(&self, before: &[String], registry: &Registry) -> Result<bool, ToolError> {
        // ---
        let secrets = registry.secrets();
        if secrets == before && !self.is_dirty() {
            if self.server.is_current(&secrets).await {
                return Ok(false);
            }
            tracing::info!("VPN auth config out of step with the registry; resyncing");
        }
        self.push(before, &secrets).await.map(|_| true)
    }

    async fn push(&self, before: &[String], secrets: &[String]) -> Result<(), ToolError> {
        // ---
        let revoked: Vec<String> = {
            let mut pending = self.pending();
            pending.extend(
                before
                    .iter()
                    .filter(|s| secrets.binary_search(*s).is_err())
                    .cloned(),
            );
            pending.retain(|s| secrets.binary_search(s).is_err());
            pending.iter().cloned().collect()
        };

        match self.server.apply_passwords(secrets, &revoked).await {
            Ok(()) => {
                self.dirty.store(false, Ordering::SeqCst);
                self.pending().retain(|s| !revoked.contains(s));
                Ok(())
            }
            Err(err) => {
                tracing::warn!("VPN password sync failed: {}", err);
                self.dirty.store(true, Ordering::SeqCst);
                Err(err)
            }
        }
    }

    fn pending(&self) -> MutexGuard<'_, BTreeSet<String>> {
        self.revoked.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub async fn listen_port(&self) -> u16 {
        self.server.listen_port().await
    }
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;
    use crate::domain::{Credential, VpnServer};
    use crate::infrastructure::RecordingVpnServer;
    use std::sync::Arc;

    fn pw(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    /// Server that fails a fixed number of pushes, then records what it gets.
    #[derive(Default)]
    struct FlakyServer {
        failures_left: Mutex<usize>,
        pushes: Mutex<Vec<(Vec<String>, Vec<String>)>>,
    }

    #[async_trait::async_trait]
    impl VpnServer for FlakyServer {
        async fn apply_passwords(&self, passwords: &[String], revoked: &[String]) -> Result<(), ToolError> {
            let mut left = self.failures_left.lock().unwrap();
            if *left > 0 {
                *left -= 1;
                return Err(ToolError::Failed {
                    program: "systemctl".to_string(),
                    status: "exit status: 5".to_string(),
                    stderr: "Unit zivpn.service not found.".to_string(),
                });
            }
            self.pushes
                .lock()
                .unwrap()
                .push((passwords.to_vec(), revoked.to_vec()));
            Ok(())
        }

        async fn is_current(&self, _: &[String]) -> bool {
            true
        }

        async fn listen_port(&self) -> u16 {
            5667
        }
    }

    #[tokio::test]
    async fn unchanged_secrets_do_not_restart_the_server() {
        // ---
        let server = Arc::new(RecordingVpnServer::default());
        let sync = VpnSync::new(server.clone());
        let registry = Registry::new(vec![Credential::new("a", "pw")]);

        assert!(sync.sync_if_changed(&[], &registry).await.unwrap());
        assert!(!sync.sync_if_changed(&registry.secrets(), &registry).await.unwrap());
        assert!(!sync.converge(&registry.secrets(), &registry).await.unwrap());
        assert_eq!(server.applied(), vec![pw(&["pw"])]);
    }

    #[tokio::test]
    async fn converge_pushes_to_a_server_that_never_saw_the_registry() {
        // ---
        let server = Arc::new(RecordingVpnServer::default());
        let sync = VpnSync::new(server.clone());
        let registry = Registry::new(vec![Credential::new("a", "pw")]);

        // Same secrets before and after, as on the first pass after a restart.
        assert!(sync.converge(&registry.secrets(), &registry).await.unwrap());
        assert_eq!(server.current(), Some(pw(&["pw"])));

        server.overwrite(pw(&["pw", "intruder"]));
        assert!(sync.converge(&registry.secrets(), &registry).await.unwrap());
        assert_eq!(server.current(), Some(pw(&["pw"])));
    }

    #[tokio::test]
    async fn removed_secrets_are_revoked_even_after_a_failed_push() {
        // ---
        let server = Arc::new(FlakyServer {
            failures_left: Mutex::new(1),
            ..FlakyServer::default()
        });
        let sync = VpnSync::new(server.clone());
        let registry = Registry::new(vec![Credential::new("a", "a-pw")]);
        let before = pw(&["a-pw", "b-pw"]);

        assert!(sync.sync_if_changed(&before, &registry).await.is_err());
        assert!(sync.is_dirty());

        // The retry sees no change in the registry but still revokes b-pw.
        assert!(sync.sync_if_changed(&registry.secrets(), &registry).await.unwrap());
        assert!(!sync.is_dirty());
        assert_eq!(
            server.pushes.lock().unwrap().clone(),
            vec![(pw(&["a-pw"]), pw(&["b-pw"]))]
        );
    }

    #[tokio::test]
    async fn secret_shared_with_a_remaining_user_is_not_revoked() {
        // ---
        let server = Arc::new(FlakyServer::default());
        let sync = VpnSync::new(server.clone());
        let registry = Registry::new(vec![Credential::new("a", "shared")]);

        sync.sync_if_changed(&pw(&["other", "shared"]), &registry)
            .await
            .unwrap();

        assert_eq!(
            server.pushes.lock().unwrap().clone(),
            vec![(pw(&["shared"]), pw(&["other"]))]
        );
    }
}
