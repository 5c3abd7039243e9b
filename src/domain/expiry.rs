use super::credential::{Credential, Registry};
use chrono::NaiveDate;

/// Splits `registry` into the credentials still valid on `today` and the ones
/// whose last valid day has passed. Order of both halves is preserved.
///
/// Firewall cleanup for the removed credentials is the caller's job.
pub fn prune(registry: Registry, today: NaiveDate) -> (Registry, Vec<Credential>) {
    // ---
    let (removed, kept): (Vec<_>, Vec<_>) = registry
        .into_vec()
        .into_iter()
        .partition(|c| c.is_expired(today));

    (Registry::new(kept), removed)
}
