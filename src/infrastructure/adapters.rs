use crate::config::{Backend, HostConfig, VpnConfig};
use crate::domain::{ConnTrackPtr, ListeningSocketsPtr, PacketFilterPtr, VpnServerPtr};
use std::sync::Arc;

use super::firewall::IptablesFilter;
use super::host::{CommandRunner, HostConnTrack, HostSockets};
use super::memory::{MemoryPacketFilter, RecordingVpnServer, StaticNetwork};
use super::vpn::ZivpnServer;

/// The host-facing collaborators of the access service.
pub struct HostAdapters {
    // ---
    pub packet_filter: PacketFilterPtr,
    pub conntrack: ConnTrackPtr,
    pub sockets: ListeningSocketsPtr,
    pub vpn: VpnServerPtr,
}

/// Creates the host adapters selected by `host.backend`.
///
/// The system backend shells out to iptables, conntrack, ss and systemctl,
/// each call bounded by `host.tool_timeout`. The memory backend touches
/// nothing outside the process.
pub fn create_host_adapters(host: &HostConfig, vpn: &VpnConfig) -> HostAdapters {
    // ---
    match host.backend {
        Backend::System => {
            tracing::info!(
                "Using system backend (chain {}, tool timeout {:?})",
                host.iptables_chain,
                host.tool_timeout
            );
            let runner = CommandRunner::new(host.tool_timeout);
            HostAdapters {
                packet_filter: Arc::new(IptablesFilter::new(runner.clone(), &host.iptables_chain)),
                conntrack: Arc::new(HostConnTrack::new(runner.clone())),
                sockets: Arc::new(HostSockets::new(runner.clone())),
                vpn: Arc::new(ZivpnServer::new(
                    &vpn.config_file,
                    &vpn.service_unit,
                    vpn.sync_mode,
                    runner,
                )),
            }
        }
        Backend::Memory => {
            tracing::info!("Using in-memory backend; host firewall and VPN are not touched");
            let network = Arc::new(StaticNetwork::new());
            HostAdapters {
                packet_filter: Arc::new(MemoryPacketFilter::new()),
                conntrack: network.clone(),
                sockets: network,
                vpn: Arc::new(RecordingVpnServer::default()),
            }
        }
    }
}
