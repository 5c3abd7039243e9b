use crate::domain::{ToolError, VpnServer, DEFAULT_LISTEN_PORT};
use crate::infrastructure::host::CommandRunner;
use crate::infrastructure::store::write_atomic;
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{json, Map, Value};
use std::collections::BTreeSet;
use std::path::PathBuf;
use std::str::FromStr;

static LISTEN_PORT: Lazy<Regex> = Lazy::new(|| Regex::new(r":(\d+)$").expect("static regex"));

/// How the registry secrets are combined with the passwords already in the
/// server config.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum PasswordSyncMode {
    /// The config holds exactly the registry secrets.
    #[default]
    Mirror,
    /// Registry secrets are added to whatever the config already accepts.
    Merge,
}

impl FromStr for PasswordSyncMode {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "mirror" => Ok(PasswordSyncMode::Mirror),
            "merge" => Ok(PasswordSyncMode::Merge),
            other => Err(anyhow::anyhow!("unknown password sync mode: {other}")),
        }
    }
}

/// The ZIVPN UDP server: a JSON config file plus a systemd unit.
pub struct ZivpnServer {
    // ---
    config_path: PathBuf,
    service_unit: String,
    mode: PasswordSyncMode,
    runner: CommandRunner,
}

impl ZivpnServer {
    // ---
    pub fn new(
        config_path: impl Into<PathBuf>,
        service_unit: impl Into<String>,
        mode: PasswordSyncMode,
        runner: CommandRunner,
    ) -> Self {
        // ---
        Self {
            config_path: config_path.into(),
            service_unit: service_unit.into(),
            mode,
            runner,
        }
    }

    async fn read_config(&self) -> Map<String, Value> {
        // ---
        let bytes = match tokio::fs::read(&self.config_path).await {
            Ok(bytes) => bytes,
            Err(err) => {
                tracing::debug!("no readable {} ({})", self.config_path.display(), err);
                return Map::new();
            }
        };
        match serde_json::from_slice::<Value>(&bytes) {
            Ok(Value::Object(map)) => map,
            _ => {
                tracing::warn!(
                    "{} is not a JSON object; rebuilding it",
                    self.config_path.display()
                );
                Map::new()
            }
        }
    }
}

/// Applies `passwords` to a server config document, filling the fields the
/// server needs to start when they are missing.
///
/// In merge mode the passwords already in the document are kept, except
/// those listed in `revoked`.
pub(crate) fn render_config(
    mut cfg: Map<String, Value>,
    passwords: &[String],
    revoked: &[String],
    mode: PasswordSyncMode,
) -> Map<String, Value> {
    // ---
    let mut accepted: BTreeSet<String> = passwords.iter().cloned().collect();
    if mode == PasswordSyncMode::Merge {
        if let Some(old) = cfg
            .get("auth")
            .and_then(|a| a.get("config"))
            .and_then(Value::as_array)
        {
            accepted.extend(
                old.iter()
                    .filter_map(Value::as_str)
                    .filter(|s| !revoked.iter().any(|r| r.as_str() == *s))
                    .map(str::to_string),
            );
        }
    }

    let mut auth = match cfg.remove("auth") {
        Some(Value::Object(auth)) => auth,
        _ => Map::new(),
    };
    auth.insert("mode".to_string(), json!("passwords"));
    auth.insert("config".to_string(), json!(accepted));
    cfg.insert("auth".to_string(), Value::Object(auth));

    for (key, default) in [
        ("listen", ":5667"),
        ("cert", "/etc/zivpn/zivpn.crt"),
        ("key", "/etc/zivpn/zivpn.key"),
        ("obfs", "zivpn"),
    ] {
        let missing = cfg
            .get(key)
            .and_then(Value::as_str)
            .map_or(true, str::is_empty);
        if missing {
            cfg.insert(key.to_string(), json!(default));
        }
    }
    cfg
}

/// Port part of a `listen` value such as `:5667` or `0.0.0.0:5667`.
pub(crate) fn parse_listen_port(cfg: &Map<String, Value>) -> Option<u16> {
    // ---
    let listen = cfg.get("listen")?.as_str()?.trim();
    LISTEN_PORT.captures(listen)?.get(1)?.as_str().parse().ok()
}

#[async_trait::async_trait]
impl VpnServer for ZivpnServer {
    // ---
    async fn apply_passwords(&self, passwords: &[String], revoked: &[String]) -> Result<(), ToolError> {
        // ---
        let cfg = render_config(self.read_config().await, passwords, revoked, self.mode);
        let bytes = serde_json::to_vec_pretty(&Value::Object(cfg)).map_err(|e| ToolError::Io {
            context: "encoding VPN config".to_string(),
            source: e.into(),
        })?;

        let path = self.config_path.clone();
        tokio::task::spawn_blocking(move || write_atomic(&path, &bytes))
            .await
            .map_err(|e| ToolError::Io {
                context: "writing VPN config".to_string(),
                source: std::io::Error::other(e),
            })?
            .map_err(|source| ToolError::Io {
                context: format!("writing {}", self.config_path.display()),
                source,
            })?;

        self.runner
            .run("systemctl", &["restart", &self.service_unit])
            .await?;

        tracing::info!(
            "VPN auth synced ({} passwords), {} restarted",
            passwords.len(),
            self.service_unit
        );
        Ok(())
    }

    async fn is_current(&self, passwords: &[String]) -> bool {
        // ---
        let cfg = self.read_config().await;
        render_config(cfg.clone(), passwords, &[], self.mode) == cfg
    }

    async fn listen_port(&self) -> u16 {
        // ---
        parse_listen_port(&self.read_config().await).unwrap_or(DEFAULT_LISTEN_PORT)
    }
}
