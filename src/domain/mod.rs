mod allocator;
mod clock;
mod credential;
mod error;
mod expiry;
mod metrics;
mod operations;
mod packet_filter;
mod probe;
mod store;
mod vpn;

// Publicly expose the Metrics abstraction
pub use metrics::{Metrics, MetricsPtr};

// Credential model and the pure parts of the core
pub use allocator::{allocate, validate_manual_port};
pub use credential::{in_pool, Credential, Registry, PORT_MAX, PORT_MIN};
pub use expiry::prune;

// Errors
pub use error::{AccessError, StoreError, ToolError};

// Operation inputs and results
pub use operations::{
    Change, CredentialInput, LockOp, ReconcileReport, StatusCounts, StatusEntry, StatusFilter,
    StatusView,
};

// Collaborator abstractions
pub use clock::{Clock, ClockPtr, FixedClock, SystemClock};
pub use packet_filter::{PacketFilter, PacketFilterPtr, PortRule, RuleAction, SourceMatch};
pub use probe::{ConnTrack, ConnTrackPtr, Flow, ListeningSockets, ListeningSocketsPtr, Liveness};
pub use store::{CredentialStore, CredentialStorePtr};
pub use vpn::{VpnServer, VpnServerPtr, DEFAULT_LISTEN_PORT};
