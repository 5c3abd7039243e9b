// src/config.rs

//! Application configuration loaded from environment variables.
//!
//! Every setting has a default matching a stock ZIVPN install, so the
//! service starts with no environment at all. A malformed backend or VPN
//! sync mode fails startup; a malformed numeric or boolean tuning value
//! falls back to its default.

use anyhow::Result;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

// ============================================================
// Local macros (config-only, intentionally explicit)
// ============================================================

/// Reads an optional environment variable and attempts to parse it.
///
/// If the variable is missing or cannot be parsed, the provided
/// default value is used. This macro is appropriate for non-critical
/// tuning parameters where fallback behavior is acceptable.
macro_rules! optional_env_parse {
    // ---
    ($key:literal, $ty:ty, $default:expr) => {
        std::env::var($key)
            .ok()
            .and_then(|v| v.parse::<$ty>().ok())
            .unwrap_or($default)
    };
}

/// Reads an optional environment variable that selects behavior.
///
/// Missing means the default. A value that does not parse is an error:
/// a typo in a backend or mode name must not silently pick another one.
macro_rules! optional_env_strict {
    // ---
    ($key:literal, $ty:ty, $default:expr) => {
        match std::env::var($key) {
            Ok(v) => v.parse::<$ty>().map_err(|e| {
                anyhow::anyhow!(concat!("Invalid configuration for ", $key, ": {}"), e)
            })?,
            Err(_) => $default,
        }
    };
}

/// Reads an optional string variable with a default.
macro_rules! optional_env_string {
    // ---
    ($key:literal, $default:expr) => {
        std::env::var($key).unwrap_or_else(|_| $default.to_string())
    };
}

#[cfg(test)]
/// Asserts that a configuration constructor fails because of a malformed
/// environment variable.
macro_rules! assert_invalid_config {
    // ---
    ($expr:expr, $key:literal) => {{
        let err = $expr.expect_err("expected configuration error");
        assert!(
            err.to_string()
                .contains(concat!("Invalid configuration for ", $key)),
            "unexpected error: {err}"
        );
    }};
}

// ============================================================
// Public configuration facade
// ============================================================

/// Aggregated application configuration.
///
/// This is the single source of truth for startup configuration.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub store: store::StoreConfig,
    pub vpn: vpn::VpnConfig,
    pub host: host::HostConfig,
    pub access: access::AccessConfig,
    pub server: server::ServerConfig,
}

impl AppConfig {
    /// Loads and validates all application configuration from the environment.
    ///
    /// # Errors
    /// Returns an error if any present value is invalid.
    pub fn from_env() -> Result<Self> {
        // ---
        Ok(Self {
            store: store::StoreConfig::from_env()?,
            vpn: vpn::VpnConfig::from_env()?,
            host: host::HostConfig::from_env()?,
            access: access::AccessConfig::from_env()?,
            server: server::ServerConfig::from_env()?,
        })
    }
}

// ============================================================
// Credential store configuration
// ============================================================

mod store {
    // ---
    use super::*;

    #[derive(Debug, Clone)]
    pub struct StoreConfig {
        /// The `users.json` registry. Defaults to `/etc/zivpn/users.json`.
        pub users_file: PathBuf,
    }

    impl StoreConfig {
        pub fn from_env() -> Result<Self> {
            // ---
            let users_file = optional_env_string!("ZIVPN_USERS_FILE", "/etc/zivpn/users.json");
            Ok(Self {
                users_file: PathBuf::from(users_file),
            })
        }
    }
}
pub use store::StoreConfig;

// ============================================================
// VPN server configuration
// ============================================================

mod vpn {
    // ---
    use super::*;
    use crate::infrastructure::PasswordSyncMode;

    /// Where the ZIVPN server keeps its config and how to restart it.
    #[derive(Debug, Clone)]
    pub struct VpnConfig {
        /// Server config rewritten on every password change.
        pub config_file: PathBuf,

        /// systemd unit restarted after a rewrite. Defaults to `zivpn.service`.
        pub service_unit: String,

        /// Replace (`mirror`) or extend (`merge`) the configured passwords.
        pub sync_mode: PasswordSyncMode,
    }

    impl VpnConfig {
        pub fn from_env() -> Result<Self> {
            // ---
            let config_file = optional_env_string!("ZIVPN_CONFIG_FILE", "/etc/zivpn/config.json");
            let service_unit = optional_env_string!("ZIVPN_SERVICE_UNIT", "zivpn.service");
            let sync_mode = optional_env_strict!(
                "ZIVPN_PASSWORD_SYNC_MODE",
                PasswordSyncMode,
                PasswordSyncMode::Mirror
            );

            Ok(Self {
                config_file: PathBuf::from(config_file),
                service_unit,
                sync_mode,
            })
        }
    }
}
pub use vpn::VpnConfig;

// ============================================================
// Host integration configuration
// ============================================================

mod host {
    // ---
    use super::*;

    /// Which implementations stand behind the host-facing traits.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub enum Backend {
        /// iptables, conntrack, ss and systemctl on the local host.
        System,
        /// In-process stand-ins; nothing on the host is touched.
        Memory,
    }

    impl FromStr for Backend {
        type Err = anyhow::Error;

        fn from_str(s: &str) -> Result<Self> {
            match s.trim().to_ascii_lowercase().as_str() {
                "system" => Ok(Backend::System),
                "memory" => Ok(Backend::Memory),
                other => Err(anyhow::anyhow!("unknown backend: {other}")),
            }
        }
    }

    #[derive(Debug, Clone)]
    pub struct HostConfig {
        pub backend: Backend,

        /// Chain holding the device-lock rules. Defaults to `INPUT`.
        pub iptables_chain: String,

        /// Upper bound on any single external tool call. Defaults to 2 seconds.
        pub tool_timeout: Duration,
    }

    impl HostConfig {
        pub fn from_env() -> Result<Self> {
            // ---
            let backend = optional_env_strict!("ZIVPN_BACKEND", Backend, Backend::System);
            let iptables_chain = optional_env_string!("ZIVPN_IPTABLES_CHAIN", "INPUT");
            let timeout_ms = optional_env_parse!("ZIVPN_TOOL_TIMEOUT_MS", u64, 2000);

            Ok(Self {
                backend,
                iptables_chain,
                tool_timeout: Duration::from_millis(timeout_ms),
            })
        }
    }
}
pub use host::{Backend, HostConfig};

// ============================================================
// Access policy configuration
// ============================================================

mod access {
    // ---
    use super::*;

    #[derive(Debug, Clone)]
    pub struct AccessConfig {
        /// Validity of new credentials created without an expiry. Defaults to 30.
        pub default_validity_days: u64,

        /// Lock unbound credentials to their first observed client. Defaults to true.
        pub auto_bind: bool,

        /// Period of the background reconcile pass; `None` disables it.
        /// Defaults to 300 seconds.
        pub reconcile_interval: Option<Duration>,
    }

    impl AccessConfig {
        pub fn from_env() -> Result<Self> {
            // ---
            let default_validity_days = optional_env_parse!("ZIVPN_DEFAULT_VALIDITY_DAYS", u64, 30);
            let auto_bind = optional_env_parse!("ZIVPN_AUTO_BIND", bool, true);
            let interval_secs = optional_env_parse!("ZIVPN_RECONCILE_INTERVAL_SEC", u64, 300);

            Ok(Self {
                default_validity_days,
                auto_bind,
                reconcile_interval: (interval_secs > 0).then(|| Duration::from_secs(interval_secs)),
            })
        }
    }
}
pub use access::AccessConfig;

// ============================================================
// HTTP server configuration
// ============================================================

mod server {
    // ---
    use super::*;

    #[derive(Debug, Clone)]
    pub struct ServerConfig {
        /// Listen address. Defaults to `127.0.0.1:8080`.
        pub bind_addr: String,

        /// `prom` for Prometheus, anything else for no-op metrics.
        pub metrics_type: String,
    }

    impl ServerConfig {
        pub fn from_env() -> Result<Self> {
            // ---
            Ok(Self {
                bind_addr: optional_env_string!("ZIVPN_BIND_ADDR", "127.0.0.1:8080"),
                metrics_type: optional_env_string!("ZIVPN_METRICS_TYPE", "noop"),
            })
        }
    }
}
pub use server::ServerConfig;

// ============================================================
// Tests
// ============================================================

#[cfg(test)]
mod tests {
    // ---
    use super::*;
    use crate::infrastructure::PasswordSyncMode;
    use anyhow::Result;
    use serial_test::serial;

    const ALL_KEYS: &[&str] = &[
        "ZIVPN_USERS_FILE",
        "ZIVPN_CONFIG_FILE",
        "ZIVPN_SERVICE_UNIT",
        "ZIVPN_PASSWORD_SYNC_MODE",
        "ZIVPN_BACKEND",
        "ZIVPN_IPTABLES_CHAIN",
        "ZIVPN_TOOL_TIMEOUT_MS",
        "ZIVPN_DEFAULT_VALIDITY_DAYS",
        "ZIVPN_AUTO_BIND",
        "ZIVPN_RECONCILE_INTERVAL_SEC",
        "ZIVPN_BIND_ADDR",
        "ZIVPN_METRICS_TYPE",
    ];

    fn clear_env() {
        for key in ALL_KEYS {
            std::env::remove_var(key);
        }
    }

    #[test]
    #[serial]
    fn defaults_match_stock_install() -> Result<()> {
        // ---
        clear_env();

        let cfg = AppConfig::from_env()?;
        assert_eq!(cfg.store.users_file, PathBuf::from("/etc/zivpn/users.json"));
        assert_eq!(cfg.vpn.config_file, PathBuf::from("/etc/zivpn/config.json"));
        assert_eq!(cfg.vpn.service_unit, "zivpn.service");
        assert_eq!(cfg.vpn.sync_mode, PasswordSyncMode::Mirror);
        assert_eq!(cfg.host.backend, Backend::System);
        assert_eq!(cfg.host.iptables_chain, "INPUT");
        assert_eq!(cfg.host.tool_timeout, Duration::from_secs(2));
        assert_eq!(cfg.access.default_validity_days, 30);
        assert!(cfg.access.auto_bind);
        assert_eq!(cfg.access.reconcile_interval, Some(Duration::from_secs(300)));
        assert_eq!(cfg.server.bind_addr, "127.0.0.1:8080");

        Ok(())
    }

    #[test]
    #[serial]
    fn overrides_are_applied() -> Result<()> {
        // ---
        clear_env();
        std::env::set_var("ZIVPN_USERS_FILE", "/tmp/users.json");
        std::env::set_var("ZIVPN_PASSWORD_SYNC_MODE", "merge");
        std::env::set_var("ZIVPN_BACKEND", "Memory");
        std::env::set_var("ZIVPN_TOOL_TIMEOUT_MS", "500");
        std::env::set_var("ZIVPN_AUTO_BIND", "false");
        std::env::set_var("ZIVPN_RECONCILE_INTERVAL_SEC", "0");

        let cfg = AppConfig::from_env()?;
        assert_eq!(cfg.store.users_file, PathBuf::from("/tmp/users.json"));
        assert_eq!(cfg.vpn.sync_mode, PasswordSyncMode::Merge);
        assert_eq!(cfg.host.backend, Backend::Memory);
        assert_eq!(cfg.host.tool_timeout, Duration::from_millis(500));
        assert!(!cfg.access.auto_bind);
        assert_eq!(cfg.access.reconcile_interval, None);

        clear_env();
        Ok(())
    }

    #[test]
    #[serial]
    fn unparsable_tuning_values_fall_back() -> Result<()> {
        // ---
        clear_env();
        std::env::set_var("ZIVPN_TOOL_TIMEOUT_MS", "soon");
        std::env::set_var("ZIVPN_DEFAULT_VALIDITY_DAYS", "-3");

        let cfg = AppConfig::from_env()?;
        assert_eq!(cfg.host.tool_timeout, Duration::from_secs(2));
        assert_eq!(cfg.access.default_validity_days, 30);

        clear_env();
        Ok(())
    }

    #[test]
    #[serial]
    fn unknown_backend_fails() {
        // ---
        clear_env();
        std::env::set_var("ZIVPN_BACKEND", "nftables");

        assert_invalid_config!(host::HostConfig::from_env(), "ZIVPN_BACKEND");

        clear_env();
    }

    #[test]
    #[serial]
    fn unknown_sync_mode_fails() {
        // ---
        clear_env();
        std::env::set_var("ZIVPN_PASSWORD_SYNC_MODE", "replace");

        assert_invalid_config!(AppConfig::from_env(), "ZIVPN_PASSWORD_SYNC_MODE");

        clear_env();
    }
}
