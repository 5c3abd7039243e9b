use crate::domain::{ConnTrackPtr, Flow, ListeningSocketsPtr, Liveness, ToolError};
use std::collections::BTreeSet;
use std::net::{IpAddr, Ipv4Addr};

/// Queries conntrack and the listening-socket table once per view.
#[derive(Clone)]
pub struct LivenessProber {
    // ---
    conntrack: ConnTrackPtr,
    sockets: ListeningSocketsPtr,
}

/// One observation of the host. `None` means the source gave no signal.
#[derive(Debug, Default)]
pub struct ProbeSnapshot {
    // ---
    pub flows: Option<Vec<Flow>>,
    pub listening: Option<BTreeSet<u16>>,
    pub warnings: Vec<String>,
    /// Names of the tools that failed, for metrics.
    pub failed_tools: Vec<&'static str>,
}

impl LivenessProber {
    // ---
    pub fn new(conntrack: ConnTrackPtr, sockets: ListeningSocketsPtr) -> Self {
        Self { conntrack, sockets }
    }

    /// Runs both queries concurrently. Either may fail without affecting
    /// the other.
    pub async fn snapshot(&self) -> ProbeSnapshot {
        // ---
        let (flows, listening) = tokio::join!(self.conntrack.udp_flows(), self.sockets.udp_ports());
        let mut snap = ProbeSnapshot::default();

        match flows {
            Ok(flows) => snap.flows = Some(flows),
            Err(err) => {
                tracing::warn!("conntrack unavailable: {}", err);
                snap.warnings.push(format!("connection tracking unavailable: {err}"));
                snap.failed_tools.push("conntrack");
            }
        }
        match listening {
            Ok(ports) => snap.listening = Some(ports),
            Err(err) => {
                tracing::warn!("listening sockets unavailable: {}", err);
                snap.warnings.push(format!("listening sockets unavailable: {err}"));
                snap.failed_tools.push("ss");
            }
        }
        snap
    }

    /// Conntrack only. Unlike [`snapshot`](Self::snapshot), a failure is
    /// returned to the caller.
    pub async fn traffic(&self) -> Result<ProbeSnapshot, ToolError> {
        // ---
        Ok(ProbeSnapshot {
            flows: Some(self.conntrack.udp_flows().await?),
            ..ProbeSnapshot::default()
        })
    }

    /// Listening UDP ports only, for port allocation.
    pub async fn listening_ports(&self) -> Result<BTreeSet<u16>, ToolError> {
        self.sockets.udp_ports().await
    }
}

impl ProbeSnapshot {
    // ---
    fn udp_flows(&self) -> impl Iterator<Item = &Flow> {
        self.flows.iter().flatten().filter(|f| f.is_udp())
    }

    /// A tracked flow beats a listening socket.
    pub fn status(&self, port: u16) -> Liveness {
        // ---
        if self.udp_flows().any(|f| f.touches(port)) {
            Liveness::Online
        } else if self.listening.as_ref().is_some_and(|l| l.contains(&port)) {
            Liveness::Offline
        } else {
            Liveness::Unknown
        }
    }

    /// Source address of the first IPv4 flow towards `port`.
    pub fn first_recent_source_ip(&self, port: u16) -> Option<Ipv4Addr> {
        // ---
        self.udp_flows()
            .filter(|f| f.dst_port == port)
            .find_map(|f| match f.src_ip {
                IpAddr::V4(ip) => Some(ip),
                IpAddr::V6(_) => None,
            })
    }

    /// Sum of the byte counters on flows using `port`, when the kernel
    /// keeps any.
    pub fn bytes(&self, port: u16) -> Option<u64> {
        // ---
        self.udp_flows()
            .filter(|f| f.touches(port))
            .filter_map(|f| f.bytes)
            .fold(None, |acc, b| Some(acc.unwrap_or(0) + b))
    }
}
