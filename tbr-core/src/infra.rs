//! Collaborators injected into the tracker: the infrastructure interface
//! (packet tx, local addresses) and the routing context (local prefixes,
//! RIO advertiser, Network Data).

use std::net::Ipv6Addr;

use crate::ip6::Prefix;
use crate::netdata::{LowpanContext, NetworkData, OnMeshPrefixConfig, StaticNetworkData};

/// Error sending an ICMPv6 packet on the infrastructure link.
#[derive(Debug, thiserror::Error)]
pub enum SendError {
    #[error("infrastructure interface is not ready")]
    NotReady,
    #[error("send failed: {0}")]
    Io(#[from] std::io::Error),
}

/// Infrastructure network interface.
pub trait InfraIf {
    /// Send an ICMPv6 packet (checksum left to the platform).
    fn send(&mut self, packet: &[u8], dest: &Ipv6Addr) -> Result<(), SendError>;

    fn link_layer_address(&self) -> Option<Vec<u8>>;

    /// Whether `addr` is currently assigned to the interface.
    fn has_address(&self, addr: &Ipv6Addr) -> bool;
}

/// What the routing manager side knows about this device.
pub trait RoutingContext: NetworkData {
    fn local_on_link_prefix(&self) -> Option<Prefix>;

    fn local_omr_prefix(&self) -> Option<Prefix>;

    /// Whether this device itself is advertising `prefix` in an RIO.
    fn has_advertised_route(&self, prefix: &Prefix) -> bool;

    fn address_matches_local_on_link_prefix(&self, addr: &Ipv6Addr) -> bool {
        self.local_on_link_prefix()
            .is_some_and(|prefix| prefix.contains(addr))
    }
}

/// A fixed routing context.
#[derive(Debug, Clone, Default)]
pub struct StaticRoutingContext {
    pub local_on_link_prefix: Option<Prefix>,
    pub local_omr_prefix: Option<Prefix>,
    pub advertised_routes: Vec<Prefix>,
    pub network_data: StaticNetworkData,
}

impl NetworkData for StaticRoutingContext {
    fn on_mesh_prefixes(&self) -> Vec<OnMeshPrefixConfig> {
        self.network_data.on_mesh_prefixes()
    }

    fn lowpan_contexts(&self) -> Vec<LowpanContext> {
        self.network_data.lowpan_contexts()
    }
}

impl RoutingContext for StaticRoutingContext {
    fn local_on_link_prefix(&self) -> Option<Prefix> {
        self.local_on_link_prefix
    }

    fn local_omr_prefix(&self) -> Option<Prefix> {
        self.local_omr_prefix
    }

    fn has_advertised_route(&self, prefix: &Prefix) -> bool {
        self.advertised_routes.contains(prefix)
    }
}
