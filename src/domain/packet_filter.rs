use super::error::ToolError;
use serde::Serialize;
use std::fmt;
use std::net::Ipv4Addr;
use std::sync::Arc;

/// Verdict of a port-scoped rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RuleAction {
    Accept,
    Drop,
}

/// Source address match of a port-scoped rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceMatch {
    /// `-s ip`
    Only(Ipv4Addr),
    /// `! -s ip`
    Except(Ipv4Addr),
}

/// A UDP rule scoped to one destination port.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct PortRule {
    // ---
    pub port: u16,
    pub source: SourceMatch,
    pub action: RuleAction,
}

impl PortRule {
    // ---
    pub fn accept_from(port: u16, ip: Ipv4Addr) -> Self {
        Self {
            port,
            source: SourceMatch::Only(ip),
            action: RuleAction::Accept,
        }
    }

    pub fn drop_others(port: u16, ip: Ipv4Addr) -> Self {
        Self {
            port,
            source: SourceMatch::Except(ip),
            action: RuleAction::Drop,
        }
    }

    /// The ACCEPT/DROP pair that locks `port` to `ip`.
    pub fn device_lock(port: u16, ip: Ipv4Addr) -> [PortRule; 2] {
        [Self::accept_from(port, ip), Self::drop_others(port, ip)]
    }
}

impl fmt::Display for PortRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // ---
        let (neg, ip) = match self.source {
            SourceMatch::Only(ip) => ("", ip),
            SourceMatch::Except(ip) => ("!", ip),
        };
        let action = match self.action {
            RuleAction::Accept => "ACCEPT",
            RuleAction::Drop => "DROP",
        };
        write!(f, "udp dport={} src{neg}={ip} -> {action}", self.port)
    }
}

/// Structured access to the host packet filter.
///
/// Implementations only report and touch UDP rules scoped to a single
/// destination port with an IPv4 source match; everything else on the host
/// is invisible to the core.
#[async_trait::async_trait]
pub trait PacketFilter: Send + Sync {
    // ---
    /// Lists every port-scoped rule currently installed, duplicates included.
    async fn list(&self) -> Result<Vec<PortRule>, ToolError>;

    /// Installs one rule.
    async fn insert(&self, rule: &PortRule) -> Result<(), ToolError>;

    /// Removes one instance of `rule`.
    async fn delete(&self, rule: &PortRule) -> Result<(), ToolError>;
}

/// Type alias for any backend that implements PacketFilter.
pub type PacketFilterPtr = Arc<dyn PacketFilter>;
