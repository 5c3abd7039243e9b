// src/services/mod.rs
//
// Orchestration over the domain abstractions. Nothing here knows which
// backend sits behind a trait object.

mod access;
mod device_lock;
mod liveness;
mod reconciler;
mod vpn_sync;

pub use access::{AccessService, AccessServicePtr, AccessSettings, Collaborators, HealthReport};
pub use reconciler::spawn_reconciler;
