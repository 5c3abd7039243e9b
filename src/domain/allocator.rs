//! UDP port allocation for credentials.
//!
//! Ports come from a fixed pool ([`PORT_MIN`], [`PORT_MAX`]). Allocation is a
//! plain ascending scan, so the result is deterministic for a given input.

use super::credential::{in_pool, PORT_MAX, PORT_MIN};
use super::error::AccessError;
use std::collections::BTreeSet;

/// Picks the lowest pool port claimed neither by a credential nor by a UDP
/// socket already bound on the host.
///
/// # Errors
/// [`AccessError::NoFreePort`] once every port in the pool is taken.
pub fn allocate(existing: &BTreeSet<u16>, os_listening: &BTreeSet<u16>) -> Result<u16, AccessError> {
    // ---
    (PORT_MIN..=PORT_MAX)
        .find(|port| !existing.contains(port) && !os_listening.contains(port))
        .ok_or(AccessError::NoFreePort)
}

/// Validates a port typed in by an administrator.
///
/// `claimed_by_others` holds ports owned by other credentials; a manual port
/// may not collide with any of them.
pub fn validate_manual_port(port: u16, claimed_by_others: &BTreeSet<u16>) -> Result<u16, AccessError> {
    // ---
    if !in_pool(port) {
        return Err(AccessError::validation(format!(
            "port must be between {PORT_MIN} and {PORT_MAX}"
        )));
    }
    if claimed_by_others.contains(&port) {
        return Err(AccessError::validation(format!(
            "port {port} is already assigned to another user"
        )));
    }
    Ok(port)
}
