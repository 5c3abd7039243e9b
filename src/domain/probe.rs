use super::error::ToolError;
use serde::Serialize;
use std::collections::BTreeSet;
use std::net::IpAddr;
use std::sync::Arc;

/// One tracked connection, original direction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Flow {
    // ---
    pub protocol: String,
    pub src_ip: IpAddr,
    pub src_port: u16,
    pub dst_port: u16,
    /// Byte counter when conntrack accounting is enabled.
    pub bytes: Option<u64>,
}

impl Flow {
    // ---
    pub fn is_udp(&self) -> bool {
        self.protocol.eq_ignore_ascii_case("udp")
    }

    /// True if either end of the original tuple uses `port`.
    pub fn touches(&self, port: u16) -> bool {
        self.dst_port == port || self.src_port == port
    }
}

/// Observed state of a credential's port.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Liveness {
    /// A UDP flow on the port is currently tracked.
    Online,
    /// The port is listening but carries no flow.
    Offline,
    /// Neither signal is available.
    Unknown,
}

/// Connection-tracking table query.
#[async_trait::async_trait]
pub trait ConnTrack: Send + Sync {
    /// Currently tracked UDP flows.
    async fn udp_flows(&self) -> Result<Vec<Flow>, ToolError>;
}

/// Listening-socket enumeration.
#[async_trait::async_trait]
pub trait ListeningSockets: Send + Sync {
    /// Local ports with a bound UDP socket.
    async fn udp_ports(&self) -> Result<BTreeSet<u16>, ToolError>;
}

pub type ConnTrackPtr = Arc<dyn ConnTrack>;
pub type ListeningSocketsPtr = Arc<dyn ListeningSockets>;
