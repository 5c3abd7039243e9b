//! Error taxonomy for the access-control core.
//!
//! Validation and lookup failures are returned to the caller as-is so the
//! panel can show a short message. External-tool and persistence failures
//! carry their cause for logging, but their `Display` stays short and free of
//! raw OS output.

use std::time::Duration;

use super::credential::{PORT_MAX, PORT_MIN};

/// Failure of an external OS utility (iptables, conntrack, ss, systemctl).
#[derive(Debug, thiserror::Error)]
pub enum ToolError {
    // ---
    #[error("failed to start `{program}`")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("`{program}` timed out after {}ms", timeout.as_millis())]
    Timeout { program: String, timeout: Duration },

    #[error("`{program}` exited with {status}")]
    Failed {
        program: String,
        status: String,
        stderr: String,
    },

    #[error("I/O error while {context}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },
}

/// Failure while writing the credential registry.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    // ---
    #[error("could not serialize registry")]
    Serialize(#[from] serde_json::Error),

    #[error("could not write {path}")]
    Write {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("registry writer task failed")]
    Join(#[from] tokio::task::JoinError),
}

/// Errors surfaced by the core operations.
#[derive(Debug, thiserror::Error)]
pub enum AccessError {
    // ---
    /// Bad username, secret, port, date or IP. Rejected before any mutation.
    #[error("{0}")]
    Validation(String),

    /// Every port in the pool is taken.
    #[error("no free UDP port left in {PORT_MIN}-{PORT_MAX}")]
    NoFreePort,

    #[error("user not found: {0}")]
    NotFound(String),

    /// Lock requested but conntrack shows no flow for the credential's port.
    #[error("no UDP traffic seen on port {0}; connect the client and retry")]
    NoRecentTraffic(u16),

    #[error("external tool failure: {0}")]
    ExternalTool(#[from] ToolError),

    #[error("could not save credentials: {0}")]
    Persistence(#[from] StoreError),
}

impl AccessError {
    // ---
    pub fn validation(msg: impl Into<String>) -> Self {
        AccessError::Validation(msg.into())
    }
}
