use crate::domain::{ConnTrack, Flow, ListeningSockets, ToolError};
use std::collections::BTreeSet;
use std::sync::Mutex;
use std::time::Duration;

/// Network observations held in memory instead of read from the kernel.
///
/// Serves both the conntrack and the listening-socket queries. Either query
/// can be switched to fail, which is how a missing or hung tool looks to the
/// core. An optional delay makes each query yield to the scheduler.
#[derive(Default)]
pub struct StaticNetwork {
    // ---
    flows: Mutex<Vec<Flow>>,
    listening: Mutex<BTreeSet<u16>>,
    conntrack_down: Mutex<bool>,
    sockets_down: Mutex<bool>,
    delay: Option<Duration>,
}

impl StaticNetwork {
    // ---
    pub fn new() -> Self {
        Self::default()
    }

    /// Every query sleeps for `delay` before answering.
    pub fn with_delay(delay: Duration) -> Self {
        Self {
            delay: Some(delay),
            ..Self::default()
        }
    }

    pub fn set_flows(&self, flows: Vec<Flow>) {
        *guard(&self.flows) = flows;
    }

    pub fn set_listening(&self, ports: impl IntoIterator<Item = u16>) {
        *guard(&self.listening) = ports.into_iter().collect();
    }

    pub fn set_conntrack_down(&self, down: bool) {
        *guard(&self.conntrack_down) = down;
    }

    pub fn set_sockets_down(&self, down: bool) {
        *guard(&self.sockets_down) = down;
    }

    async fn pause(&self) {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
    }
}

fn guard<T>(m: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|e| e.into_inner())
}

fn unavailable(program: &str) -> ToolError {
    ToolError::Spawn {
        program: program.to_string(),
        source: std::io::Error::new(std::io::ErrorKind::NotFound, "unavailable"),
    }
}

#[async_trait::async_trait]
impl ConnTrack for StaticNetwork {
    // ---
    async fn udp_flows(&self) -> Result<Vec<Flow>, ToolError> {
        self.pause().await;
        if *guard(&self.conntrack_down) {
            return Err(unavailable("conntrack"));
        }
        Ok(guard(&self.flows).clone())
    }
}

#[async_trait::async_trait]
impl ListeningSockets for StaticNetwork {
    // ---
    async fn udp_ports(&self) -> Result<BTreeSet<u16>, ToolError> {
        self.pause().await;
        if *guard(&self.sockets_down) {
            return Err(unavailable("ss"));
        }
        Ok(guard(&self.listening).clone())
    }
}
