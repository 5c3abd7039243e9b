use super::command::CommandRunner;
use crate::domain::{ConnTrack, Flow, ToolError};
use std::net::IpAddr;
use std::path::PathBuf;

/// Kernel conntrack table, read from procfs with the `conntrack` CLI as a
/// fallback.
pub struct HostConnTrack {
    // ---
    runner: CommandRunner,
    proc_path: PathBuf,
}

impl HostConnTrack {
    // ---
    pub fn new(runner: CommandRunner) -> Self {
        Self::with_proc_path(runner, "/proc/net/nf_conntrack")
    }

    pub fn with_proc_path(runner: CommandRunner, proc_path: impl Into<PathBuf>) -> Self {
        Self {
            runner,
            proc_path: proc_path.into(),
        }
    }

    async fn read_proc(&self) -> Result<Vec<Flow>, ToolError> {
        // ---
        let read = tokio::fs::read_to_string(&self.proc_path);
        let text = tokio::time::timeout(self.runner.timeout(), read)
            .await
            .map_err(|_| ToolError::Timeout {
                program: self.proc_path.display().to_string(),
                timeout: self.runner.timeout(),
            })?
            .map_err(|source| ToolError::Io {
                context: format!("reading {}", self.proc_path.display()),
                source,
            })?;

        Ok(parse_flows(&text))
    }
}

#[async_trait::async_trait]
impl ConnTrack for HostConnTrack {
    // ---
    async fn udp_flows(&self) -> Result<Vec<Flow>, ToolError> {
        // ---
        let from_proc = self.read_proc().await;
        if let Ok(flows) = &from_proc {
            if !flows.is_empty() {
                return from_proc;
            }
        }

        match self.runner.run("conntrack", &["-L", "-p", "udp"]).await {
            Ok(text) => Ok(parse_flows(&text)),
            // procfs answered (with nothing), so the table is simply empty.
            Err(err) if from_proc.is_ok() => {
                tracing::debug!("conntrack CLI unavailable: {err}");
                Ok(Vec::new())
            }
            Err(err) => Err(err),
        }
    }
}

/// Parses UDP flows out of procfs or `conntrack -L` output.
pub(crate) fn parse_flows(text: &str) -> Vec<Flow> {
    // ---
    text.lines()
        .filter_map(parse_flow)
        .filter(Flow::is_udp)
        .collect()
}

/// One conntrack line. Procfs lines carry a leading `ipv4 2`; CLI lines
/// start at the protocol. Only the first (original) tuple is kept; byte
/// counters of both directions are summed.
pub(crate) fn parse_flow(line: &str) -> Option<Flow> {
    // ---
    let mut protocol = None;
    let mut src_ip = None;
    let mut src_port = None;
    let mut dst_port = None;
    let mut bytes: Option<u64> = None;

    for token in line.split_whitespace() {
        match token.split_once('=') {
            Some(("src", v)) if src_ip.is_none() => src_ip = v.parse::<IpAddr>().ok(),
            Some(("sport", v)) if src_port.is_none() => src_port = v.parse::<u16>().ok(),
            Some(("dport", v)) if dst_port.is_none() => dst_port = v.parse::<u16>().ok(),
            Some(("bytes", v)) => {
                if let Ok(n) = v.parse::<u64>() {
                    bytes = Some(bytes.unwrap_or(0).saturating_add(n));
                }
            }
            Some(_) => {}
            None if protocol.is_none()
                && token.chars().all(|c| c.is_ascii_alphabetic())
                && !token.starts_with("ipv") =>
            {
                protocol = Some(token.to_ascii_lowercase());
            }
            None => {}
        }
    }

    Some(Flow {
        protocol: protocol?,
        src_ip: src_ip?,
        src_port: src_port?,
        dst_port: dst_port?,
        bytes,
    })
}
