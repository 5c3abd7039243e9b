use super::command::CommandRunner;
use crate::domain::{ListeningSockets, ToolError};
use std::collections::BTreeSet;

/// Bound UDP sockets as reported by `ss -uHln`.
pub struct HostSockets {
    // ---
    runner: CommandRunner,
}

impl HostSockets {
    pub fn new(runner: CommandRunner) -> Self {
        Self { runner }
    }
}

#[async_trait::async_trait]
impl ListeningSockets for HostSockets {
    // ---
    async fn udp_ports(&self) -> Result<BTreeSet<u16>, ToolError> {
        let text = self.runner.run("ss", &["-uHln"]).await?;
        Ok(parse_ss(&text))
    }
}

/// Extracts local ports from headerless `ss -uln` output
/// (`State Recv-Q Send-Q Local:Port Peer:Port`).
pub(crate) fn parse_ss(text: &str) -> BTreeSet<u16> {
    // ---
    text.lines()
        .filter_map(|line| line.split_whitespace().nth(3))
        .filter_map(|local| local.rsplit_once(':'))
        .filter_map(|(_, port)| port.parse::<u16>().ok())
        .collect()
}
