// src/infrastructure/memory/mod.rs
//
// In-memory stand-ins for every host collaborator. Selected with
// ZIVPN_BACKEND=memory for dry runs, and used by the test suites.

mod network;
mod packet_filter;
mod vpn;

pub use network::StaticNetwork;
pub use packet_filter::MemoryPacketFilter;
pub use vpn::RecordingVpnServer;
