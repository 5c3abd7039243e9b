//! Request and result types of the core operations.

use super::allocator::validate_manual_port;
use super::credential::{fold, Credential};
use super::error::AccessError;
use super::probe::Liveness;
use chrono::{Days, NaiveDate};
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeSet;
use std::net::Ipv4Addr;
use std::str::FromStr;

const MAX_USERNAME_LEN: usize = 64;

/// Input of AddOrUpdateCredential, as typed by an administrator.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CredentialInput {
    // ---
    pub username: String,

    pub secret: String,

    /// `YYYY-MM-DD`, or a number of days from today.
    #[serde(default)]
    pub expires: Option<String>,

    /// Manual port, as a number or as form text. Omitted or blank means
    /// "keep the current one, or allocate".
    #[serde(default, deserialize_with = "number_or_text")]
    pub port: Option<String>,

    /// Device lock address. Empty string clears it.
    #[serde(default)]
    pub bound_ip: Option<String>,

    /// Current name of the credential being edited, when the edit renames
    /// it to `username`.
    #[serde(default, alias = "orig")]
    pub original_username: Option<String>,
}

/// Accepts `6001`, `"6001"` or `null`, keeping the text for validation.
fn number_or_text<'de, D: Deserializer<'de>>(d: D) -> Result<Option<String>, D::Error> {
    // ---
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Number(serde_json::Number),
        Text(String),
    }

    Ok(Option::<Raw>::deserialize(d)?.map(|raw| match raw {
        Raw::Number(n) => n.to_string(),
        Raw::Text(s) => s,
    }))
}

impl CredentialInput {
    // ---
    pub fn new(username: impl Into<String>, secret: impl Into<String>) -> Self {
        // ---
        Self {
            username: username.into(),
            secret: secret.into(),
            ..Self::default()
        }
    }

    /// Trimmed username, rejected when empty, too long or containing
    /// whitespace/control characters.
    pub fn validated_username(&self) -> Result<String, AccessError> {
        // ---
        let name = self.username.trim();
        if name.is_empty() {
            return Err(AccessError::validation("username is required"));
        }
        if name.chars().count() > MAX_USERNAME_LEN {
            return Err(AccessError::validation(format!(
                "username is longer than {MAX_USERNAME_LEN} characters"
            )));
        }
        if name.chars().any(|c| c.is_whitespace() || c.is_control()) {
            return Err(AccessError::validation("username may not contain spaces"));
        }
        Ok(name.to_string())
    }

    pub fn validated_secret(&self) -> Result<String, AccessError> {
        // ---
        let secret = self.secret.trim();
        if secret.is_empty() {
            return Err(AccessError::validation("password is required"));
        }
        if secret.chars().any(char::is_control) {
            return Err(AccessError::validation("password contains control characters"));
        }
        Ok(secret.to_string())
    }

    /// Manual port, checked against the pool. Anything that is not a port
    /// number gets the same out-of-range message.
    pub fn validated_port(&self) -> Result<Option<u16>, AccessError> {
        // ---
        let Some(raw) = self.port.as_deref().map(str::trim).filter(|s| !s.is_empty()) else {
            return Ok(None);
        };
        // Unparsable counts as out of range.
        let port = raw.parse::<u16>().unwrap_or(0);
        validate_manual_port(port, &BTreeSet::new()).map(Some)
    }

    /// Name the edit applies to: the original name on a rename, else
    /// `username` itself. `None` when no rename was asked for.
    pub fn validated_original_username(&self) -> Option<String> {
        // ---
        self.original_username
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
    }

    /// True when the edit renames an existing credential.
    pub fn is_rename(&self) -> bool {
        self.validated_original_username()
            .is_some_and(|orig| fold(&orig) != fold(&self.username))
    }

    /// `None` when the field was omitted, `Some(None)` when it was cleared.
    pub fn validated_bound_ip(&self) -> Result<Option<Option<Ipv4Addr>>, AccessError> {
        // ---
        match self.bound_ip.as_deref().map(str::trim) {
            None => Ok(None),
            Some("") => Ok(Some(None)),
            Some(raw) => raw
                .parse::<Ipv4Addr>()
                .map(|ip| Some(Some(ip)))
                .map_err(|_| AccessError::validation(format!("invalid IPv4 address: {raw}"))),
        }
    }

    /// Resolves the expiry field against `today`. Omitted or blank is `None`.
    pub fn validated_expiry(&self, today: NaiveDate) -> Result<Option<NaiveDate>, AccessError> {
        // ---
        let Some(raw) = self.expires.as_deref().map(str::trim).filter(|s| !s.is_empty()) else {
            return Ok(None);
        };

        if raw.chars().all(|c| c.is_ascii_digit()) {
            let days: u64 = raw
                .parse()
                .map_err(|_| AccessError::validation("expiry day count is too large"))?;
            return today
                .checked_add_days(Days::new(days))
                .map(Some)
                .ok_or_else(|| AccessError::validation("expiry day count is too large"));
        }

        NaiveDate::parse_from_str(raw, "%Y-%m-%d")
            .map(Some)
            .map_err(|_| AccessError::validation("expiry must be YYYY-MM-DD or a number of days"))
    }
}

/// Device-lock operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LockOp {
    /// Bind to the first source IP seen on the credential's port.
    Lock,
    /// Drop the binding.
    Clear,
}

impl FromStr for LockOp {
    type Err = AccessError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "lock" => Ok(LockOp::Lock),
            "clear" => Ok(LockOp::Clear),
            other => Err(AccessError::validation(format!("unknown lock op: {other}"))),
        }
    }
}

/// Which rows a status view returns.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StatusFilter {
    #[default]
    All,
    Online,
    Expired,
}

impl FromStr for StatusFilter {
    type Err = AccessError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "" | "all" => Ok(StatusFilter::All),
            "online" => Ok(StatusFilter::Online),
            "expired" => Ok(StatusFilter::Expired),
            other => Err(AccessError::validation(format!("unknown filter: {other}"))),
        }
    }
}

/// Result of a mutating operation plus any degraded side effects.
///
/// A non-empty `warnings` list means the registry change was saved but some
/// host-side step (firewall, VPN sync) did not complete; the next reconcile
/// pass retries it.
#[derive(Debug, Clone, Serialize)]
pub struct Change<T> {
    // ---
    pub value: T,
    pub warnings: Vec<String>,
}

impl<T> Change<T> {
    pub fn new(value: T, warnings: Vec<String>) -> Self {
        Self { value, warnings }
    }
}

/// One row of the status view.
#[derive(Debug, Clone, Serialize)]
pub struct StatusEntry {
    // ---
    #[serde(flatten)]
    pub credential: Credential,
    pub status: Liveness,
    pub expired: bool,
    /// Best-effort byte count over the flows currently tracked on the port.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bytes: Option<u64>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StatusCounts {
    // ---
    pub total: usize,
    pub online: usize,
    pub offline: usize,
    pub expired: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct StatusView {
    // ---
    pub entries: Vec<StatusEntry>,
    pub counts: StatusCounts,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
}

/// Outcome of one reconcile pass.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ReconcileReport {
    // ---
    /// Credentials removed because they expired.
    pub pruned: Vec<Credential>,
    /// Usernames locked to their first observed source address.
    pub auto_bound: Vec<String>,
    /// Stray rules deleted by the sweep.
    pub rules_removed: usize,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
}
