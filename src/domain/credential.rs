use chrono::NaiveDate;
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeSet;
use std::net::Ipv4Addr;

/// Lowest UDP port handed out to a credential.
pub const PORT_MIN: u16 = 6000;

/// Highest UDP port handed out to a credential (inclusive).
pub const PORT_MAX: u16 = 19999;

/// Returns true if `port` lies inside the credential port pool.
pub fn in_pool(port: u16) -> bool {
    (PORT_MIN..=PORT_MAX).contains(&port)
}

/// A VPN login: username/secret pair with its own UDP port and optional
/// one-device lock.
///
/// Field names on disk follow the legacy `users.json` layout
/// (`user`, `password`, `expires`, `port`, `bind_ip`) so files written by the
/// older panels load unchanged. Every field tolerates absence or junk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credential {
    // ---
    #[serde(rename = "user", default, deserialize_with = "loose_string")]
    pub username: String,

    #[serde(rename = "password", default, deserialize_with = "loose_string")]
    pub secret: String,

    /// Last valid day. `None` never expires.
    #[serde(
        rename = "expires",
        default,
        deserialize_with = "loose_date",
        skip_serializing_if = "Option::is_none"
    )]
    pub expires_at: Option<NaiveDate>,

    /// Dedicated UDP port. Legacy records may not have one.
    #[serde(
        default,
        deserialize_with = "loose_port",
        skip_serializing_if = "Option::is_none"
    )]
    pub port: Option<u16>,

    /// Source address the credential is locked to.
    #[serde(
        rename = "bind_ip",
        default,
        deserialize_with = "loose_ipv4",
        skip_serializing_if = "Option::is_none"
    )]
    pub bound_ip: Option<Ipv4Addr>,

    #[serde(
        rename = "created",
        default,
        deserialize_with = "loose_date",
        skip_serializing_if = "Option::is_none"
    )]
    pub created_at: Option<NaiveDate>,
}

impl Credential {
    // ---
    pub fn new(username: impl Into<String>, secret: impl Into<String>) -> Self {
        // ---
        Self {
            username: username.into(),
            secret: secret.into(),
            expires_at: None,
            port: None,
            bound_ip: None,
            created_at: None,
        }
    }

    /// Case-insensitive username comparison.
    pub fn is_named(&self, username: &str) -> bool {
        // ---
        fold(&self.username) == fold(username)
    }

    /// Expired means the last valid day is strictly before `today`.
    pub fn is_expired(&self, today: NaiveDate) -> bool {
        // ---
        self.expires_at.is_some_and(|day| day < today)
    }

    /// Port and IP of the device lock, when both are present.
    pub fn device_lock(&self) -> Option<(u16, Ipv4Addr)> {
        // ---
        Some((self.port?, self.bound_ip?))
    }
}

pub(crate) fn fold(username: &str) -> String {
    username.trim().to_lowercase()
}

/// The full set of credentials, read and written as a whole.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct Registry {
    credentials: Vec<Credential>,
}

impl Registry {
    // ---
    pub fn new(credentials: Vec<Credential>) -> Self {
        Self { credentials }
    }

    pub fn len(&self) -> usize {
        self.credentials.len()
    }

    pub fn is_empty(&self) -> bool {
        self.credentials.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Credential> {
        self.credentials.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Credential> {
        self.credentials.iter_mut()
    }

    pub fn find(&self, username: &str) -> Option<&Credential> {
        self.credentials.iter().find(|c| c.is_named(username))
    }

    pub fn find_mut(&mut self, username: &str) -> Option<&mut Credential> {
        self.credentials.iter_mut().find(|c| c.is_named(username))
    }

    /// Replaces the credential with the same (case-folded) username, or
    /// appends it. Returns the replaced record.
    pub fn upsert(&mut self, credential: Credential) -> Option<Credential> {
        // ---
        let username = credential.username.clone();
        self.replace_named(&username, credential)
    }

    /// Like [`upsert`](Self::upsert), but the record replaced is the one
    /// named `username`, so a credential can change its name in place.
    pub fn replace_named(&mut self, username: &str, credential: Credential) -> Option<Credential> {
        // ---
        match self.find_mut(username) {
            Some(slot) => Some(std::mem::replace(slot, credential)),
            None => {
                self.credentials.push(credential);
                None
            }
        }
    }

    pub fn remove(&mut self, username: &str) -> Option<Credential> {
        // ---
        let idx = self.credentials.iter().position(|c| c.is_named(username))?;
        Some(self.credentials.remove(idx))
    }

    /// Ports claimed by any credential in the registry.
    pub fn claimed_ports(&self) -> BTreeSet<u16> {
        self.credentials.iter().filter_map(|c| c.port).collect()
    }

    /// Ports claimed by credentials other than `username`.
    pub fn ports_claimed_by_others(&self, username: &str) -> BTreeSet<u16> {
        // ---
        self.credentials
            .iter()
            .filter(|c| !c.is_named(username))
            .filter_map(|c| c.port)
            .collect()
    }

    /// Sorted, de-duplicated, non-empty secrets.
    pub fn secrets(&self) -> Vec<String> {
        // ---
        let set: BTreeSet<&str> = self
            .credentials
            .iter()
            .map(|c| c.secret.as_str())
            .filter(|s| !s.is_empty())
            .collect();
        set.into_iter().map(str::to_string).collect()
    }

    pub(crate) fn retain(&mut self, keep: impl FnMut(&Credential) -> bool) {
        self.credentials.retain(keep);
    }

    pub fn into_vec(self) -> Vec<Credential> {
        self.credentials
    }
}

impl FromIterator<Credential> for Registry {
    fn from_iter<I: IntoIterator<Item = Credential>>(iter: I) -> Self {
        Registry::new(iter.into_iter().collect())
    }
}

// ============================================================
// Lenient field decoding
// ============================================================

/// Anything a hand-edited or legacy `users.json` may hold in a field.
#[derive(Deserialize)]
#[serde(untagged)]
enum Loose {
    Text(String),
    Number(u64),
    Other(serde::de::IgnoredAny),
}

impl Loose {
    // ---
    fn into_text(self) -> Option<String> {
        // ---
        match self {
            Loose::Text(s) => {
                let s = s.trim();
                (!s.is_empty()).then(|| s.to_string())
            }
            Loose::Number(n) => Some(n.to_string()),
            Loose::Other(_) => None,
        }
    }
}

fn loose_string<'de, D: Deserializer<'de>>(d: D) -> Result<String, D::Error> {
    Ok(Loose::deserialize(d)?.into_text().unwrap_or_default())
}

fn loose_port<'de, D: Deserializer<'de>>(d: D) -> Result<Option<u16>, D::Error> {
    Ok(Loose::deserialize(d)?
        .into_text()
        .and_then(|s| s.parse::<u16>().ok()))
}

fn loose_ipv4<'de, D: Deserializer<'de>>(d: D) -> Result<Option<Ipv4Addr>, D::Error> {
    Ok(Loose::deserialize(d)?
        .into_text()
        .and_then(|s| s.parse::<Ipv4Addr>().ok()))
}

fn loose_date<'de, D: Deserializer<'de>>(d: D) -> Result<Option<NaiveDate>, D::Error> {
    Ok(Loose::deserialize(d)?
        .into_text()
        .and_then(|s| NaiveDate::parse_from_str(&s, "%Y-%m-%d").ok()))
}
