// src/infrastructure/host/mod.rs
//
// Adapters that query the local host through OS utilities and procfs.

mod command;
mod conntrack;
mod sockets;

pub use command::CommandRunner;
pub use conntrack::HostConnTrack;
pub use sockets::HostSockets;
