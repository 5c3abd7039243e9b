mod adapters;
mod firewall;
mod host;
mod memory;
pub mod metrics;
mod store;
mod vpn;

// Re-export the factory functions for easy access
pub use adapters::{create_host_adapters, HostAdapters};
pub use metrics::{create_noop_metrics, create_prom_metrics};
pub use store::create_json_store;

// Concrete adapters, for callers that wire collaborators by hand
pub use firewall::IptablesFilter;
pub use host::{CommandRunner, HostConnTrack, HostSockets};
pub use memory::{MemoryPacketFilter, RecordingVpnServer, StaticNetwork};
pub use store::JsonFileStore;
pub use vpn::{PasswordSyncMode, ZivpnServer};
