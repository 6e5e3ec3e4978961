//! One record per neighboring infrastructure router.

use std::net::Ipv6Addr;

use rand::Rng;

use super::entries::{OnLinkPrefix, RdnssAddress, RoutePrefix};
use super::iterator::RouterEntry;
use crate::ip6::Prefix;
use crate::nd::RoutePreference;
use crate::time::{add_jitter, TimeMilli};

pub(crate) const MAX_NS_PROBES: u8 = 5;
pub(crate) const NS_PROBE_RETRY_INTERVAL_MS: u64 = 1000;
pub(crate) const NS_PROBE_TIMEOUT_MS: u64 = 2000;
pub(crate) const JITTER_MS: u64 = 2000;
pub(crate) const PEER_BR_REACHABLE_INTERVAL_MS: u64 = 200_000;

#[derive(Debug, Clone)]
pub struct Router {
    pub(crate) address: Ipv6Addr,
    pub(crate) discover_uptime: u64,
    pub(crate) managed_address_config: bool,
    pub(crate) other_config: bool,
    pub(crate) snac_router: bool,
    pub(crate) is_local_device: bool,
    pub(crate) all_entries_disregarded: bool,
    pub(crate) ns_probe_count: u8,
    pub(crate) timeout_time: TimeMilli,
    pub(crate) last_update_time: TimeMilli,
    pub(crate) on_link_prefixes: Vec<OnLinkPrefix>,
    pub(crate) route_prefixes: Vec<RoutePrefix>,
    pub(crate) rdnss_addresses: Vec<RdnssAddress>,
    pub(crate) history: HistoryInfo,
}

impl Router {
    pub(crate) fn new(address: Ipv6Addr, uptime: u64) -> Self {
        Self {
            address,
            discover_uptime: uptime,
            managed_address_config: false,
            other_config: false,
            snac_router: false,
            is_local_device: false,
            all_entries_disregarded: false,
            ns_probe_count: 0,
            timeout_time: TimeMilli::ZERO,
            last_update_time: TimeMilli::ZERO,
            on_link_prefixes: Vec::new(),
            route_prefixes: Vec::new(),
            rdnss_addresses: Vec::new(),
            history: HistoryInfo::default(),
        }
    }

    pub fn address(&self) -> &Ipv6Addr {
        &self.address
    }

    pub fn on_link_prefixes(&self) -> &[OnLinkPrefix] {
        &self.on_link_prefixes
    }

    pub fn route_prefixes(&self) -> &[RoutePrefix] {
        &self.route_prefixes
    }

    pub fn rdnss_addresses(&self) -> &[RdnssAddress] {
        &self.rdnss_addresses
    }

    pub fn ns_probe_count(&self) -> u8 {
        self.ns_probe_count
    }

    pub fn is_reachable(&self) -> bool {
        self.ns_probe_count <= MAX_NS_PROBES
    }

    /// Probe only reachable routers, and never our own echoed RA.
    pub fn should_check_reachability(&self) -> bool {
        self.is_reachable() && !self.is_local_device
    }

    /// Called when an RA or NA from this router is processed.
    pub(crate) fn reset_reachability_state<R: Rng + ?Sized>(
        &mut self,
        now: TimeMilli,
        reachable_interval: u64,
        rng: &mut R,
    ) {
        self.ns_probe_count = 0;
        self.last_update_time = now;
        self.timeout_time = now + add_jitter(rng, reachable_interval, JITTER_MS);
    }

    /// Peer BRs (all entries disregarded) are checked less often.
    pub(crate) fn determine_reachability_timeout<R: Rng + ?Sized>(
        &mut self,
        reachable_interval: u64,
        rng: &mut R,
    ) {
        if !self.should_check_reachability() || self.ns_probe_count != 0 {
            return;
        }
        let interval = if self.all_entries_disregarded {
            PEER_BR_REACHABLE_INTERVAL_MS
        } else {
            reachable_interval
        };
        self.timeout_time = self.last_update_time + add_jitter(rng, interval, JITTER_MS);
    }

    /// No relevant flags and no entries. Flags of an unreachable router
    /// no longer count.
    pub(crate) fn is_empty(&self) -> bool {
        let has_flags = self.is_reachable() && (self.managed_address_config || self.other_config);
        !has_flags
            && self.on_link_prefixes.is_empty()
            && self.route_prefixes.is_empty()
            && self.rdnss_addresses.is_empty()
    }

    /// Likely another BR on the same mesh: has prefix entries, all disregarded.
    pub fn is_peer_br(&self) -> bool {
        self.all_entries_disregarded
            && !(self.on_link_prefixes.is_empty() && self.route_prefixes.is_empty())
    }

    pub(crate) fn entry_count(&self) -> usize {
        self.on_link_prefixes.len() + self.route_prefixes.len() + self.rdnss_addresses.len()
    }

    pub(crate) fn info(&self, now: TimeMilli, uptime: u64) -> RouterEntry {
        RouterEntry {
            address: self.address,
            msec_since_last_update: now.since(self.last_update_time),
            age_secs: uptime.saturating_sub(self.discover_uptime),
            managed_address_config_flag: self.managed_address_config,
            other_config_flag: self.other_config,
            snac_router_flag: self.snac_router,
            is_local_device: self.is_local_device,
            is_reachable: self.is_reachable(),
            is_peer_br: self.is_peer_br(),
        }
    }
}

/// Snapshot of what was last reported to the history log for a router.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct HistoryInfo {
    pub(crate) recorded: bool,
    pub(crate) managed_address_config: bool,
    pub(crate) other_config: bool,
    pub(crate) snac_router: bool,
    pub(crate) is_local_device: bool,
    pub(crate) is_reachable: bool,
    pub(crate) is_peer_br: bool,
    pub(crate) provides_default_route: bool,
    pub(crate) def_route_preference: RoutePreference,
    pub(crate) favored_on_link_prefix: Option<Prefix>,
}

impl HistoryInfo {
    pub(crate) fn determine_from(router: &Router, now: TimeMilli) -> Self {
        let mut info = HistoryInfo {
            recorded: true,
            managed_address_config: router.managed_address_config,
            other_config: router.other_config,
            snac_router: router.snac_router,
            is_local_device: router.is_local_device,
            is_reachable: router.is_reachable(),
            is_peer_br: router.is_peer_br(),
            ..Default::default()
        };

        if let Some(def_route) = router
            .route_prefixes
            .iter()
            .find(|e| e.prefix().is_empty() && e.valid_lifetime() > 0)
        {
            info.provides_default_route = true;
            info.def_route_preference = def_route.route_preference();
        }

        for entry in &router.on_link_prefixes {
            if entry.is_favored_over(info.favored_on_link_prefix.as_ref(), now) {
                info.favored_on_link_prefix = Some(*entry.prefix());
            }
        }

        info
    }
}
