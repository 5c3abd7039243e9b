use super::error::ToolError;
use std::sync::Arc;

/// Listen port the ZIVPN server uses when its config does not say.
pub const DEFAULT_LISTEN_PORT: u16 = 5667;

/// External VPN server whose auth config mirrors the registry secrets.
#[async_trait::async_trait]
pub trait VpnServer: Send + Sync {
    // ---
    /// Installs `passwords` as the accepted list and restarts the server.
    ///
    /// `revoked` holds secrets that belonged to removed credentials. They
    /// must not survive the push even when the backend keeps passwords it
    /// did not write itself.
    async fn apply_passwords(&self, passwords: &[String], revoked: &[String])
        -> Result<(), ToolError>;

    /// True when the server config already accepts `passwords` and a push
    /// would change nothing.
    async fn is_current(&self, passwords: &[String]) -> bool;

    /// UDP port the server itself listens on.
    async fn listen_port(&self) -> u16;
}

pub type VpnServerPtr = Arc<dyn VpnServer>;
