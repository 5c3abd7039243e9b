use crate::domain::{PacketFilter, PortRule, RuleAction, SourceMatch, ToolError};
use crate::infrastructure::host::CommandRunner;
use std::net::Ipv4Addr;

/// `iptables` backend. Rules live in one chain (normally `INPUT`).
///
/// Listing parses `iptables -S <chain>` into [`PortRule`]s; rules that carry
/// any match beyond protocol, source, destination port and verdict are not
/// ours and are left out.
pub struct IptablesFilter {
    // ---
    runner: CommandRunner,
    chain: String,
}

impl IptablesFilter {
    // ---
    pub fn new(runner: CommandRunner, chain: impl Into<String>) -> Self {
        Self {
            runner,
            chain: chain.into(),
        }
    }

    async fn iptables(&self, args: &[&str]) -> Result<String, ToolError> {
        // ---
        // -w waits for the xtables lock instead of failing.
        let mut full = vec!["-w"];
        full.extend_from_slice(args);
        self.runner.run("iptables", &full).await
    }
}

#[async_trait::async_trait]
impl PacketFilter for IptablesFilter {
    // ---
    async fn list(&self) -> Result<Vec<PortRule>, ToolError> {
        // ---
        let text = self.iptables(&["-S", &self.chain]).await?;
        Ok(parse_rules(&text, &self.chain))
    }

    async fn insert(&self, rule: &PortRule) -> Result<(), ToolError> {
        // ---
        let spec = rule_spec(rule);
        let mut args = vec!["-I", self.chain.as_str()];
        args.extend(spec.iter().map(String::as_str));
        self.iptables(&args).await.map(|_| ())
    }

    async fn delete(&self, rule: &PortRule) -> Result<(), ToolError> {
        // ---
        let spec = rule_spec(rule);
        let mut args = vec!["-D", self.chain.as_str()];
        args.extend(spec.iter().map(String::as_str));
        self.iptables(&args).await.map(|_| ())
    }
}

/// Match/target arguments for `rule`, shared by insert and delete.
pub(crate) fn rule_spec(rule: &PortRule) -> Vec<String> {
    // ---
    let mut spec = vec!["-p".to_string(), "udp".to_string()];
    match rule.source {
        SourceMatch::Only(ip) => spec.extend(["-s".to_string(), ip.to_string()]),
        SourceMatch::Except(ip) => {
            spec.extend(["!".to_string(), "-s".to_string(), ip.to_string()]);
        }
    }
    spec.extend(["--dport".to_string(), rule.port.to_string(), "-j".to_string()]);
    spec.push(
        match rule.action {
            RuleAction::Accept => "ACCEPT",
            RuleAction::Drop => "DROP",
        }
        .to_string(),
    );
    spec
}

pub(crate) fn parse_rules(text: &str, chain: &str) -> Vec<PortRule> {
    text.lines().filter_map(|line| parse_rule(line, chain)).collect()
}

/// Parses one `-A <chain> ...` line of `iptables -S`.
pub(crate) fn parse_rule(line: &str, chain: &str) -> Option<PortRule> {
    // ---
    let mut tokens = line.split_whitespace();
    if tokens.next()? != "-A" || tokens.next()? != chain {
        return None;
    }

    let mut udp = false;
    let mut source = None;
    let mut port = None;
    let mut action = None;
    let mut negate = false;

    while let Some(token) = tokens.next() {
        match token {
            "!" => {
                negate = true;
                continue;
            }
            "-p" => udp = tokens.next()? == "udp",
            "-m" => {
                if tokens.next()? != "udp" {
                    return None;
                }
            }
            "-s" => {
                let ip = parse_host(tokens.next()?)?;
                source = Some(if negate {
                    SourceMatch::Except(ip)
                } else {
                    SourceMatch::Only(ip)
                });
            }
            "--dport" => port = Some(tokens.next()?.parse::<u16>().ok()?),
            "-j" => {
                action = match tokens.next()? {
                    "ACCEPT" => Some(RuleAction::Accept),
                    "DROP" => Some(RuleAction::Drop),
                    _ => return None,
                }
            }
            _ => return None,
        }
        if negate && token != "-s" {
            return None;
        }
        negate = false;
    }

    if !udp {
        return None;
    }
    Some(PortRule {
        port: port?,
        source: source?,
        action: action?,
    })
}

/// `1.2.3.4` or `1.2.3.4/32`; wider prefixes are not device locks.
fn parse_host(raw: &str) -> Option<Ipv4Addr> {
    // ---
    match raw.split_once('/') {
        Some((ip, "32")) => ip.parse().ok(),
        Some(_) => None,
        None => raw.parse().ok(),
    }
}
