//! The access-control orchestrator.
//!
//! `AccessService` owns every collaborator and runs each operation as one
//! Load -> mutate -> firewall -> Save -> VPN sync sequence behind a single
//! async mutex. Host-side failures after validation are collected as
//! warnings on the result; only persistence failures abort an operation
//! once it has started mutating.

use crate::domain::{
    allocate, in_pool, prune, validate_manual_port, AccessError, Change, ClockPtr, ConnTrackPtr,
    Credential, CredentialInput, CredentialStorePtr, ListeningSocketsPtr, Liveness, LockOp,
    MetricsPtr, PacketFilterPtr, ReconcileReport, Registry, StatusCounts, StatusEntry,
    StatusFilter, StatusView, ToolError, VpnServerPtr,
};
use crate::services::device_lock::{managed_lock, DeviceLockController};
use crate::services::liveness::{LivenessProber, ProbeSnapshot};
use crate::services::vpn_sync::VpnSync;
use chrono::Days;
use serde::Serialize;
use std::collections::BTreeSet;
use std::net::Ipv4Addr;
use std::sync::Arc;
use tokio::sync::Mutex;


/// Tunables of the core operations.
#[derive(Debug, Clone)]
pub struct AccessSettings {
    // ---
    /// Validity of a new credential created without an explicit expiry.
    pub default_validity_days: u64,

    /// Lock unbound credentials to the first source address seen on their
    /// port during status builds and reconcile passes.
    pub auto_bind: bool,
}

impl Default for AccessSettings {
    fn default() -> Self {
        Self {
            default_validity_days: 30,
            auto_bind: true,
        }
    }
}

/// Everything the service talks to.
pub struct Collaborators {
    // ---
    pub store: CredentialStorePtr,
    pub packet_filter: PacketFilterPtr,
    pub conntrack: ConnTrackPtr,
    pub sockets: ListeningSocketsPtr,
    pub vpn: VpnServerPtr,
    pub clock: ClockPtr,
    pub metrics: MetricsPtr,
}

/// Component state reported by the full health check.
#[derive(Debug, Serialize)]
pub struct HealthReport {
    // ---
    pub credentials: usize,
    pub firewall_rules: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub firewall_error: Option<String>,
    pub vpn_sync_pending: bool,
}

pub struct AccessService {
    // ---
    gate: Mutex<()>,
    store: CredentialStorePtr,
    firewall: DeviceLockController,
    prober: LivenessProber,
    vpn: VpnSync,
    clock: ClockPtr,
    metrics: MetricsPtr,
    settings: AccessSettings,
}

pub type AccessServicePtr = Arc<AccessService>;

/// Registry state after a reconcile pass, plus what the pass saw.
struct Reconciled {
    registry: Registry,
    report: ReconcileReport,
    snapshot: ProbeSnapshot,
}

impl AccessService {
    // ---
    pub fn new(deps: Collaborators, settings: AccessSettings) -> Self {
        // ---
        Self {
            gate: Mutex::new(()),
            store: deps.store,
            firewall: DeviceLockController::new(deps.packet_filter),
            prober: LivenessProber::new(deps.conntrack, deps.sockets),
            vpn: VpnSync::new(deps.vpn),
            clock: deps.clock,
            metrics: deps.metrics,
            settings,
        }
    }

    /// Creates a credential or updates the one with the same (case-folded)
    /// username. With `original_username` set, updates that credential and
    /// renames it to `username`, keeping its port and device lock.
    ///
    /// Omitted fields keep their current value on update. On create, the
    /// port is allocated and the expiry defaults to today plus the default
    /// validity.
    #[tracing::instrument(skip_all, fields(username = %input.username.trim()))]
    pub async fn add_or_update_credential(
        &self,
        input: CredentialInput,
    ) -> Result<Change<Credential>, AccessError> {
        // ---
        let today = self.clock.today();
        let username = input.validated_username()?;
        let secret = input.validated_secret()?;
        let bound_ip = input.validated_bound_ip()?;
        let expires_at = input.validated_expiry(today)?;
        let manual_port = input.validated_port()?;
        let original = input.validated_original_username();
        let key = original.clone().unwrap_or_else(|| username.clone());

        let _guard = self.gate.lock().await;
        let mut registry = self.store.load().await;
        let before = registry.secrets();
        let previous = registry.find(&key).cloned();
        let mut warnings = Vec::new();

        if let (Some(original), None) = (&original, &previous) {
            return Err(AccessError::NotFound(original.clone()));
        }
        let renamed = input.is_rename();
        if renamed && registry.find(&username).is_some() {
            return Err(AccessError::validation(format!("user {username} already exists")));
        }

        let claimed_by_others = registry.ports_claimed_by_others(&key);
        let port = match (manual_port, previous.as_ref().and_then(|c| c.port)) {
            (Some(port), _) => validate_manual_port(port, &claimed_by_others)?,
            (None, Some(port)) => port,
            (None, None) => {
                let listening = match self.prober.listening_ports().await {
                    Ok(ports) => ports,
                    Err(err) => {
                        warnings.push(self.tool_warning("ss", "listing UDP sockets", &err));
                        BTreeSet::new()
                    }
                };
                allocate(&claimed_by_others, &listening)?
            }
        };

        let credential = match previous.clone() {
            Some(old) => Credential {
                username: if renamed { username } else { old.username.clone() },
                secret,
                port: Some(port),
                expires_at: expires_at.or(old.expires_at),
                bound_ip: bound_ip.unwrap_or(old.bound_ip),
                ..old
            },
            None => Credential {
                port: Some(port),
                expires_at: expires_at
                    .or_else(|| today.checked_add_days(Days::new(self.settings.default_validity_days))),
                bound_ip: bound_ip.flatten(),
                created_at: Some(today),
                ..Credential::new(username, secret)
            },
        };

        if let Some(old_port) = previous.as_ref().and_then(|c| c.port) {
            if old_port != port && in_pool(old_port) {
                self.release_port(old_port, &mut warnings).await;
            }
        }
        match managed_lock(&credential) {
            Some((port, ip)) => self.lock_port(port, ip, &mut warnings).await,
            None if in_pool(port) => self.release_port(port, &mut warnings).await,
            None => {}
        }

        registry.replace_named(&key, credential.clone());
        self.store.save(&registry).await?;
        self.sync_vpn(&before, &registry, &mut warnings).await;

        self.metrics.record_credential_saved();
        match &previous {
            Some(old) if renamed => tracing::info!(
                "renamed {} to {} on port {}",
                old.username,
                credential.username,
                port
            ),
            Some(_) => tracing::info!("updated {} on port {}", credential.username, port),
            None => tracing::info!("created {} on port {}", credential.username, port),
        }
        Ok(Change::new(credential, warnings))
    }

    /// Removes a credential and every rule on its port.
    #[tracing::instrument(skip(self))]
    pub async fn delete_credential(&self, username: &str) -> Result<Change<()>, AccessError> {
        // ---
        let username = username.trim();
        let _guard = self.gate.lock().await;
        let mut registry = self.store.load().await;
        let before = registry.secrets();
        let mut warnings = Vec::new();

        let removed = registry
            .remove(username)
            .ok_or_else(|| AccessError::NotFound(username.to_string()))?;

        if let Some(port) = removed.port.filter(|p| in_pool(*p)) {
            self.release_port(port, &mut warnings).await;
        }

        self.store.save(&registry).await?;
        self.sync_vpn(&before, &registry, &mut warnings).await;

        self.metrics.record_credential_deleted();
        tracing::info!("deleted {}", removed.username);
        Ok(Change::new((), warnings))
    }

    /// Locks a credential to the source address currently talking to its
    /// port, or clears the lock.
    #[tracing::instrument(skip(self))]
    pub async fn set_device_lock(
        &self,
        username: &str,
        op: LockOp,
    ) -> Result<Change<Credential>, AccessError> {
        // ---
        let username = username.trim();
        let _guard = self.gate.lock().await;
        let mut registry = self.store.load().await;
        let before = registry.secrets();
        let mut warnings = Vec::new();

        let current = registry
            .find(username)
            .cloned()
            .ok_or_else(|| AccessError::NotFound(username.to_string()))?;

        let updated = match op {
            LockOp::Lock => {
                let port = current.port.filter(|p| in_pool(*p)).ok_or_else(|| {
                    AccessError::validation(format!("{} has no dedicated port", current.username))
                })?;
                let traffic = self.prober.traffic().await.inspect_err(|_| {
                    self.metrics.record_tool_failure("conntrack");
                })?;
                let ip = traffic
                    .first_recent_source_ip(port)
                    .ok_or(AccessError::NoRecentTraffic(port))?;

                self.lock_port(port, ip, &mut warnings).await;
                Credential {
                    bound_ip: Some(ip),
                    ..current
                }
            }
            LockOp::Clear => {
                if let Some(port) = current.port.filter(|p| in_pool(*p)) {
                    self.release_port(port, &mut warnings).await;
                }
                Credential {
                    bound_ip: None,
                    ..current
                }
            }
        };

        registry.upsert(updated.clone());
        self.store.save(&registry).await?;
        self.sync_vpn(&before, &registry, &mut warnings).await;

        tracing::info!(
            "device lock for {}: {}",
            updated.username,
            updated
                .bound_ip
                .map_or_else(|| "cleared".to_string(), |ip| ip.to_string())
        );
        Ok(Change::new(updated, warnings))
    }

    /// Reconciles, then reports every credential with its live status.
    ///
    /// Credentials pruned by this build are listed with `expired = true`
    /// under the `all` and `expired` filters.
    #[tracing::instrument(skip(self))]
    pub async fn build_status_view(&self, filter: StatusFilter) -> Result<StatusView, AccessError> {
        // ---
        let _guard = self.gate.lock().await;
        let Reconciled {
            registry,
            report,
            snapshot,
        } = self.reconcile_locked().await?;
        let listen_port = self.vpn.listen_port().await;

        let mut counts = StatusCounts {
            expired: report.pruned.len(),
            ..StatusCounts::default()
        };
        let mut entries = Vec::new();

        for credential in registry.into_vec() {
            let port = credential.port.unwrap_or(listen_port);
            let status = snapshot.status(port);
            counts.total += 1;
            match status {
                Liveness::Online => counts.online += 1,
                Liveness::Offline => counts.offline += 1,
                Liveness::Unknown => {}
            }

            let wanted = match filter {
                StatusFilter::All => true,
                StatusFilter::Online => status == Liveness::Online,
                StatusFilter::Expired => false,
            };
            if wanted {
                entries.push(StatusEntry {
                    bytes: snapshot.bytes(port),
                    credential,
                    status,
                    expired: false,
                });
            }
        }

        if matches!(filter, StatusFilter::All | StatusFilter::Expired) {
            entries.extend(report.pruned.into_iter().map(|credential| StatusEntry {
                credential,
                status: Liveness::Unknown,
                expired: true,
                bytes: None,
            }));
        }

        Ok(StatusView {
            entries,
            counts,
            warnings: report.warnings,
        })
    }

    /// One self-healing pass: prune, auto-bind, converge the firewall and
    /// resync the VPN server when needed.
    #[tracing::instrument(skip(self))]
    pub async fn reconcile(&self) -> Result<ReconcileReport, AccessError> {
        // ---
        let _guard = self.gate.lock().await;
        Ok(self.reconcile_locked().await?.report)
    }

    /// Read-only component check for the health endpoint.
    pub async fn health(&self) -> HealthReport {
        // ---
        let _guard = self.gate.lock().await;
        let credentials = self.store.load().await.len();
        let (firewall_rules, firewall_error) = match self.firewall.rule_count().await {
            Ok(n) => (Some(n), None),
            Err(err) => (None, Some(err.to_string())),
        };
        HealthReport {
            credentials,
            firewall_rules,
            firewall_error,
            vpn_sync_pending: self.vpn.is_dirty(),
        }
    }

    async fn reconcile_locked(&self) -> Result<Reconciled, AccessError> {
        // ---
        let today = self.clock.today();
        let loaded = self.store.load().await;
        let before = loaded.secrets();
        let (mut registry, pruned) = prune(loaded, today);
        let mut report = ReconcileReport::default();

        let snapshot = self.prober.snapshot().await;
        for tool in &snapshot.failed_tools {
            self.metrics.record_tool_failure(tool);
        }
        report.warnings.extend(snapshot.warnings.iter().cloned());

        if self.settings.auto_bind {
            for credential in registry.iter_mut() {
                let Some(port) = credential.port.filter(|p| in_pool(*p)) else {
                    continue;
                };
                if credential.bound_ip.is_some() {
                    continue;
                }
                if let Some(ip) = snapshot.first_recent_source_ip(port) {
                    tracing::info!("auto-binding {} to {}", credential.username, ip);
                    credential.bound_ip = Some(ip);
                    report.auto_bound.push(credential.username.clone());
                }
            }
        }

        let outcome = self.firewall.apply(&registry).await;
        if !outcome.warnings.is_empty() {
            self.metrics.record_tool_failure("packet-filter");
        }
        if outcome.swept > 0 {
            self.metrics.record_rules_swept(outcome.swept);
        }
        report.rules_removed = outcome.swept;
        report.warnings.extend(outcome.warnings);

        if !pruned.is_empty() || !report.auto_bound.is_empty() {
            self.store.save(&registry).await?;
        }
        if !pruned.is_empty() {
            self.metrics.record_credentials_pruned(pruned.len());
            tracing::info!("pruned {} expired credentials", pruned.len());
        }
        // A full pass also repairs a server config that drifted from the
        // registry, not just changes made by this pass.
        if let Err(err) = self.vpn.converge(&before, &registry).await {
            let warning = self.tool_warning("vpn", "syncing VPN passwords", &err);
            report.warnings.push(warning);
        }

        report.pruned = pruned;
        Ok(Reconciled {
            registry,
            report,
            snapshot,
        })
    }

    async fn lock_port(&self, port: u16, ip: Ipv4Addr, warnings: &mut Vec<String>) {
        // ---
        match self.firewall.ensure(port, ip).await {
            Ok(0) => {}
            Ok(_) => self.metrics.record_device_lock(true),
            Err(err) => {
                let action = format!("locking port {port} to {ip}");
                warnings.push(self.tool_warning("packet-filter", &action, &err));
            }
        }
    }

    async fn release_port(&self, port: u16, warnings: &mut Vec<String>) {
        // ---
        match self.firewall.release(port).await {
            Ok(0) => {}
            Ok(_) => self.metrics.record_device_lock(false),
            Err(err) => {
                let action = format!("releasing port {port}");
                warnings.push(self.tool_warning("packet-filter", &action, &err));
            }
        }
    }

    async fn sync_vpn(&self, before: &[String], registry: &Registry, warnings: &mut Vec<String>) {
        // ---
        if let Err(err) = self.vpn.sync_if_changed(before, registry).await {
            warnings.push(self.tool_warning("vpn", "syncing VPN passwords", &err));
        }
    }

    fn tool_warning(&self, tool: &str, action: &str, err: &ToolError) -> String {
        // ---
        tracing::warn!("{} failed: {:?}", action, err);
        self.metrics.record_tool_failure(tool);
        format!("{action} failed: {err}")
    }
}
