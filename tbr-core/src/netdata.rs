//! Thread Network Data view: on-mesh prefixes and 6LoWPAN contexts.

use std::net::Ipv6Addr;

use serde::{Deserialize, Serialize};

use crate::ip6::Prefix;

/// OMR prefixes are /64.
pub const OMR_PREFIX_LENGTH: u8 = 64;

/// On-mesh prefix entry as published in Network Data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OnMeshPrefixConfig {
    pub prefix: Prefix,
    #[serde(default = "default_true")]
    pub on_mesh: bool,
    #[serde(default = "default_true")]
    pub slaac: bool,
    #[serde(default = "default_true")]
    pub stable: bool,
}

fn default_true() -> bool {
    true
}

impl OnMeshPrefixConfig {
    pub fn new(prefix: Prefix) -> Self {
        Self {
            prefix,
            on_mesh: true,
            slaac: true,
            stable: true,
        }
    }

    pub fn is_valid_omr(&self) -> bool {
        is_valid_omr_prefix(&self.prefix) && self.on_mesh && self.slaac && self.stable
    }
}

/// ULA or GUA /64.
pub fn is_valid_omr_prefix(prefix: &Prefix) -> bool {
    prefix.length() == OMR_PREFIX_LENGTH && !prefix.is_link_local() && !prefix.is_multicast()
}

/// 6LoWPAN context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LowpanContext {
    pub context_id: u8,
    pub prefix: Prefix,
    #[serde(default = "default_true")]
    pub compress: bool,
}

/// Read-only Network Data queries.
pub trait NetworkData {
    fn on_mesh_prefixes(&self) -> Vec<OnMeshPrefixConfig>;

    fn lowpan_contexts(&self) -> Vec<LowpanContext>;

    fn contains_omr_prefix(&self, prefix: &Prefix) -> bool {
        self.on_mesh_prefixes()
            .iter()
            .any(|c| c.is_valid_omr() && c.prefix == *prefix)
    }

    /// Longest-prefix context covering `addr`.
    fn context_for_address(&self, addr: &Ipv6Addr) -> Option<LowpanContext> {
        self.lowpan_contexts()
            .into_iter()
            .filter(|c| c.prefix.contains(addr))
            .max_by_key(|c| c.prefix.length())
    }

    fn context_by_id(&self, context_id: u8) -> Option<LowpanContext> {
        self.lowpan_contexts()
            .into_iter()
            .find(|c| c.context_id == context_id)
    }
}

/// Fixed Network Data, for hosts without a live Thread stack and for tests.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StaticNetworkData {
    #[serde(default)]
    pub on_mesh_prefixes: Vec<OnMeshPrefixConfig>,
    #[serde(default)]
    pub contexts: Vec<LowpanContext>,
}

impl NetworkData for StaticNetworkData {
    fn on_mesh_prefixes(&self) -> Vec<OnMeshPrefixConfig> {
        self.on_mesh_prefixes.clone()
    }

    fn lowpan_contexts(&self) -> Vec<LowpanContext> {
        self.contexts.clone()
    }
}
