use super::credential::Registry;
use super::error::StoreError;
use std::sync::Arc;

/// Abstraction for credential registry persistence.
///
/// The store does no locking of its own; callers serialize
/// load-modify-save sequences.
#[async_trait::async_trait]
pub trait CredentialStore: Send + Sync {
    // ---
    /// Reads the registry. A missing or unreadable document is an empty registry.
    async fn load(&self) -> Registry;

    /// Replaces the persisted registry atomically.
    async fn save(&self, registry: &Registry) -> Result<(), StoreError>;
}

/// Type alias for any backend that implements CredentialStore.
pub type CredentialStorePtr = Arc<dyn CredentialStore>;
