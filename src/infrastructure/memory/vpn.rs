use crate::domain::{ToolError, VpnServer, DEFAULT_LISTEN_PORT};
use std::sync::{Mutex, MutexGuard};

/// VPN server stand-in that remembers every password set it was given.
pub struct RecordingVpnServer {
    // ---
    listen_port: u16,
    applied: Mutex<Vec<Vec<String>>>,
}

impl Default for RecordingVpnServer {
    fn default() -> Self {
        Self::new(DEFAULT_LISTEN_PORT)
    }
}

impl RecordingVpnServer {
    // ---
    pub fn new(listen_port: u16) -> Self {
        Self {
            listen_port,
            applied: Mutex::new(Vec::new()),
        }
    }

    /// Every password list applied so far, oldest first.
    pub fn applied(&self) -> Vec<Vec<String>> {
        self.history().clone()
    }

    /// The most recent password list.
    pub fn current(&self) -> Option<Vec<String>> {
        self.applied().pop()
    }

    /// Replaces the accepted list behind the service's back, the way an
    /// operator editing the server config by hand would.
    pub fn overwrite(&self, passwords: Vec<String>) {
        self.history().push(passwords);
    }

    fn history(&self) -> MutexGuard<'_, Vec<Vec<String>>> {
        self.applied.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait::async_trait]
impl VpnServer for RecordingVpnServer {
    // ---
    async fn apply_passwords(&self, passwords: &[String], _revoked: &[String]) -> Result<(), ToolError> {
        // ---
        tracing::info!("VPN passwords applied in memory ({} entries)", passwords.len());
        self.history().push(passwords.to_vec());
        Ok(())
    }

    async fn is_current(&self, passwords: &[String]) -> bool {
        self.history().last().is_some_and(|last| last == passwords)
    }

    async fn listen_port(&self) -> u16 {
        self.listen_port
    }
}
