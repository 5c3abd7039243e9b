// Gateway module - controls public API for handlers
// Modules are private, only exported symbols are public

mod credentials;
mod health;
mod metrics;
mod root;
mod shared_types;

// Core handlers
pub use health::health_check;
pub use metrics::{metrics_handler, track_requests};
pub use root::root_handler;

// Credential management handlers
pub use credentials::{delete_credential, list_credentials, run_reconcile, save_credential, set_lock};
