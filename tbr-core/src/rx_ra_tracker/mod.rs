//! Tracks Router Advertisements received on the infrastructure link.
//!
//! Keeps one [`Router`] per RA source with its on-link prefixes, route
//! prefixes and RDNSS addresses, ages them, probes router reachability
//! with Neighbor Solicitations and derives [`DecisionFactors`] for the
//! routing policy. Host-driven: every entry point takes `now`, the host
//! polls [`RxRaTracker::next_fire_time`] and drains [`TrackerEvent`]s.

mod decision;
mod entries;
mod history;
mod iterator;
mod router;

use std::net::Ipv6Addr;

use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

pub use decision::DecisionFactors;
pub use entries::{IfAddress, OnLinkPrefix, RdnssAddress, RoutePrefix};
pub use history::{AilRouterEvent, AilRouterEventKind, HistoryLog};
pub use iterator::{IfAddrEntry, PrefixTableEntry, PrefixTableIterator, RdnssAddrEntry, RouterEntry, TableIterError};
pub use router::Router;

use entries::{remove_matching, EntryPool, STALE_TIME_SECS};
use router::{HistoryInfo, MAX_NS_PROBES, NS_PROBE_RETRY_INTERVAL_MS, NS_PROBE_TIMEOUT_MS};

use crate::infra::{InfraIf, RoutingContext};
use crate::ip6::Prefix;
use crate::nd::{
    self, NeighborAdvert, PrefixInfoOption, RaHeader, RdnssOption, RouteInfoOption, RouterAdvert,
    OPTION_PREFIX_INFO, OPTION_RECURSIVE_DNS_SERVER, OPTION_ROUTE_INFO,
};
use crate::rs_sender::{BorderRoutingCounters, RsSender};
use crate::time::{clamped_expiration, earliest, NextFireTime, TimeMilli, Timer};

pub const DEFAULT_MAX_ROUTERS: usize = 16;
pub const DEFAULT_MAX_ENTRIES: usize = 64;
pub const DEFAULT_REACHABLE_INTERVAL_MS: u64 = 60_000;
pub const DEFAULT_HISTORY_CAPACITY: usize = 32;

/// Tracker limits and behavior switches.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TrackerConfig {
    /// Most routers tracked at once.
    #[serde(default = "default_max_routers")]
    pub max_routers: usize,
    /// Shared budget for on-link, route, RDNSS and interface address entries.
    #[serde(default = "default_max_entries")]
    pub max_entries: usize,
    /// Interval between reachability checks of a non-peer router.
    #[serde(default = "default_reachable_interval_ms")]
    pub reachable_interval_ms: u64,
    /// Keep prefixes echoed by peer BRs as disregarded entries instead of dropping them.
    #[serde(default = "default_track_peer_br_info")]
    pub track_peer_br_info: bool,
    #[serde(default = "default_history_capacity")]
    pub history_capacity: usize,
}

fn default_max_routers() -> usize {
    DEFAULT_MAX_ROUTERS
}
fn default_max_entries() -> usize {
    DEFAULT_MAX_ENTRIES
}
fn default_reachable_interval_ms() -> u64 {
    DEFAULT_REACHABLE_INTERVAL_MS
}
fn default_track_peer_br_info() -> bool {
    true
}
fn default_history_capacity() -> usize {
    DEFAULT_HISTORY_CAPACITY
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            max_routers: default_max_routers(),
            max_entries: default_max_entries(),
            reachable_interval_ms: default_reachable_interval_ms(),
            track_peer_br_info: default_track_peer_br_info(),
            history_capacity: default_history_capacity(),
        }
    }
}

/// Who sent an RA that arrived on the infrastructure interface.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouterAdvOrigin {
    /// Another software entity on this device.
    ThisBrOtherEntity,
    /// Our own routing manager.
    ThisBrRoutingManager,
    AnotherRouter,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum EvaluationDelay {
    Immediately,
    AfterRandomDelay,
}

/// One-shot notifications for the routing-policy owner. Each kind is
/// delivered at most once per drain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum TrackerEvent {
    DecisionChanged,
    RdnssChanged,
    EvaluateRoutingPolicy(EvaluationDelay),
}

/// Current deadlines of the tracker's timers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TimerState {
    pub expiration: Option<TimeMilli>,
    pub stale: Option<TimeMilli>,
    pub router: Option<TimeMilli>,
    pub rdnss_addr: Option<TimeMilli>,
    pub rs_sender: Option<TimeMilli>,
}

pub struct RxRaTracker<I, C> {
    config: TrackerConfig,
    infra_if: I,
    context: C,
    rng: StdRng,
    running: bool,
    routers: Vec<Router>,
    if_addresses: Vec<IfAddress>,
    entry_pool: EntryPool,
    local_ra_header: Option<RaHeader>,
    local_ra_header_update_time: TimeMilli,
    decision: DecisionFactors,
    expiration_timer: Timer,
    stale_timer: Timer,
    router_timer: Timer,
    rdnss_addr_timer: Timer,
    rs_sender: RsSender,
    counters: BorderRoutingCounters,
    signal_task_posted: bool,
    rdnss_task_posted: bool,
    policy_evaluation: Option<EvaluationDelay>,
    rdnss_callback: Option<Box<dyn FnMut() + Send>>,
    history: HistoryLog,
}

impl<I: InfraIf, C: RoutingContext> RxRaTracker<I, C> {
    pub fn new(config: TrackerConfig, infra_if: I, context: C) -> Self {
        Self::with_rng(config, infra_if, context, StdRng::from_entropy())
    }

    pub fn with_rng(config: TrackerConfig, infra_if: I, context: C, rng: StdRng) -> Self {
        Self {
            entry_pool: EntryPool::new(config.max_entries),
            history: HistoryLog::new(config.history_capacity),
            config,
            infra_if,
            context,
            rng,
            running: false,
            routers: Vec::new(),
            if_addresses: Vec::new(),
            local_ra_header: None,
            local_ra_header_update_time: TimeMilli::ZERO,
            decision: DecisionFactors::default(),
            expiration_timer: Timer::default(),
            stale_timer: Timer::default(),
            router_timer: Timer::default(),
            rdnss_addr_timer: Timer::default(),
            rs_sender: RsSender::new(),
            counters: BorderRoutingCounters::default(),
            signal_task_posted: false,
            rdnss_task_posted: false,
            policy_evaluation: None,
            rdnss_callback: None,
        }
    }

    pub fn start(&mut self, now: TimeMilli) {
        self.running = true;
        self.handle_net_data_changed(now);
    }

    /// Drops all routers and interface addresses and halts every timer.
    pub fn stop(&mut self) {
        self.running = false;
        self.routers.clear();
        self.if_addresses.clear();
        self.entry_pool = EntryPool::new(self.config.max_entries);
        self.local_ra_header = None;
        self.decision = DecisionFactors::default();
        self.expiration_timer.stop();
        self.stale_timer.stop();
        self.router_timer.stop();
        self.rdnss_addr_timer.stop();
        self.rs_sender.stop();
        self.signal_task_posted = false;
        self.rdnss_task_posted = false;
        self.policy_evaluation = None;
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn set_rdnss_callback(&mut self, callback: Option<Box<dyn FnMut() + Send>>) {
        self.rdnss_callback = callback;
    }

    //- - - - - - - - - - - - - - - - - - - - - - - - - - - - - - - - -
    // Inbound messages

    pub fn process_router_advert(&mut self, packet: &[u8], src: Ipv6Addr, origin: RouterAdvOrigin, now: TimeMilli) {
        if !self.running {
            return;
        }
        let ra = match RouterAdvert::parse(packet) {
            Ok(ra) => ra,
            Err(e) => {
                debug!("Ignoring invalid RA from {}: {}", src, e);
                return;
            }
        };

        match origin {
            RouterAdvOrigin::ThisBrOtherEntity | RouterAdvOrigin::ThisBrRoutingManager => {
                self.update_if_addresses(src, now);
            }
            RouterAdvOrigin::AnotherRouter => {}
        }

        if origin == RouterAdvOrigin::ThisBrRoutingManager {
            return;
        }

        let index = match self.routers.iter().position(|r| r.address == src) {
            Some(index) => index,
            None => {
                if self.routers.len() >= self.config.max_routers {
                    warn!("Received RA from too many routers, ignore RA from {}", src);
                    return;
                }
                self.routers.push(Router::new(src, now.as_secs()));
                self.routers.len() - 1
            }
        };

        // The header's default route is processed first so that a `::/0`
        // RIO in the same message overrides it (RFC 4191 §3.1).
        self.process_ra_header(ra.header(), index, origin, now);

        for option in ra.options() {
            match option.kind {
                OPTION_PREFIX_INFO => {
                    if let Some(pio) = PrefixInfoOption::parse(&option) {
                        self.process_prefix_info_option(&pio, index, now);
                    }
                }
                OPTION_ROUTE_INFO => {
                    if let Some(rio) = RouteInfoOption::parse(&option) {
                        self.process_route_info_option(&rio, index, now);
                    }
                }
                OPTION_RECURSIVE_DNS_SERVER => {
                    if let Some(rdnss) = RdnssOption::parse(&option) {
                        self.process_rdnss_option(&rdnss, index, now);
                    }
                }
                _ => {}
            }
        }

        let reachable_interval = self.config.reachable_interval_ms;
        let router = &mut self.routers[index];
        router.is_local_device = origin == RouterAdvOrigin::ThisBrOtherEntity;
        router.reset_reachability_state(now, reachable_interval, &mut self.rng);

        self.evaluate(now);
    }

    fn process_ra_header(&mut self, header: &RaHeader, index: usize, origin: RouterAdvOrigin, now: TimeMilli) {
        debug!(
            "RA header: flags {:#04x}, router lifetime {}, preference {:?}",
            header.flags,
            header.router_lifetime,
            header.default_router_preference()
        );

        let router = &mut self.routers[index];
        router.managed_address_config = header.is_managed_address_config_flag_set();
        router.other_config = header.is_other_config_flag_set();
        router.snac_router = header.is_snac_router_flag_set();

        if origin == RouterAdvOrigin::ThisBrOtherEntity {
            let old = self.local_ra_header;
            if header.router_lifetime == 0 {
                self.local_ra_header = None;
            } else {
                // Zero checksum tells the platform to compute it.
                self.local_ra_header = Some(RaHeader { checksum: 0, ..*header });
                self.local_ra_header_update_time = now;
            }
            if self.local_ra_header != old {
                self.schedule_policy_evaluation(EvaluationDelay::AfterRandomDelay);
            }
        }

        let router = &mut self.routers[index];
        let new_entry = RoutePrefix::from_ra_header(header, now);
        match router.route_prefixes.iter_mut().find(|e| e.prefix().is_empty()) {
            Some(entry) => entry.update_from(new_entry),
            None => {
                if header.router_lifetime == 0 {
                    return;
                }
                if !self.entry_pool.allocate() {
                    warn!("Discovered too many prefixes, ignore default route from RA header");
                    return;
                }
                router.route_prefixes.push(new_entry);
            }
        }
    }

    fn process_prefix_info_option(&mut self, pio: &PrefixInfoOption, index: usize, now: TimeMilli) {
        let prefix = pio.prefix;
        if prefix.is_link_local() || prefix.is_multicast() {
            return;
        }

        let router = &mut self.routers[index];

        if !pio.is_on_link_flag_set() {
            remove_matching(&mut router.on_link_prefixes, &mut self.entry_pool, |e| *e.prefix() == prefix);
            return;
        }

        // Our own local on-link prefix is most likely echoed by a peer BR
        // on the same mesh.
        let disregard = self.context.local_on_link_prefix() == Some(prefix);
        if disregard && !self.config.track_peer_br_info {
            return;
        }

        debug!(
            "PIO {} valid {} preferred {} flags {:#04x}",
            prefix, pio.valid_lifetime, pio.preferred_lifetime, pio.flags
        );

        let new_entry = OnLinkPrefix::from_pio(pio, now);
        let entry = match router.on_link_prefixes.iter().position(|e| *e.prefix() == prefix) {
            Some(i) => {
                let entry = &mut router.on_link_prefixes[i];
                entry.adopt_flags_and_lifetimes_from(&new_entry);
                entry
            }
            None => {
                if pio.valid_lifetime == 0 {
                    return;
                }
                if !self.entry_pool.allocate() {
                    warn!("Discovered too many prefixes, ignore on-link prefix {}", prefix);
                    return;
                }
                router.on_link_prefixes.push(new_entry);
                let last = router.on_link_prefixes.len() - 1;
                &mut router.on_link_prefixes[last]
            }
        };
        entry.set_disregard(disregard);
    }

    fn process_route_info_option(&mut self, rio: &RouteInfoOption, index: usize, now: TimeMilli) {
        let prefix = rio.prefix;
        if prefix.is_link_local() || prefix.is_multicast() {
            return;
        }

        // Our own OMR prefix, one we advertise, or one already in Network
        // Data: RA and Network Data propagate at different times, so all
        // three are checked.
        let disregard = self.context.local_omr_prefix() == Some(prefix)
            || self.context.has_advertised_route(&prefix)
            || self.context.contains_omr_prefix(&prefix);
        if disregard && !self.config.track_peer_br_info {
            return;
        }

        debug!(
            "RIO {} lifetime {} preference {:?}",
            prefix, rio.route_lifetime, rio.preference
        );

        let router = &mut self.routers[index];
        let new_entry = RoutePrefix::from_rio(rio, now);
        let entry = match router.route_prefixes.iter().position(|e| *e.prefix() == prefix) {
            Some(i) => {
                let entry = &mut router.route_prefixes[i];
                entry.update_from(new_entry);
                entry
            }
            None => {
                if rio.route_lifetime == 0 {
                    return;
                }
                if !self.entry_pool.allocate() {
                    warn!("Discovered too many prefixes, ignore route prefix {}", prefix);
                    return;
                }
                router.route_prefixes.push(new_entry);
                let last = router.route_prefixes.len() - 1;
                &mut router.route_prefixes[last]
            }
        };
        entry.set_disregard(disregard);
    }

    fn process_rdnss_option(&mut self, rdnss: &RdnssOption<'_>, index: usize, now: TimeMilli) {
        let lifetime = rdnss.lifetime;
        let router = &mut self.routers[index];
        let mut did_change = false;

        for address in rdnss.addresses() {
            debug!("RDNSS {} lifetime {}", address, lifetime);

            if lifetime == 0 {
                did_change |=
                    remove_matching(&mut router.rdnss_addresses, &mut self.entry_pool, |e| *e.address() == address) > 0;
                continue;
            }

            match router.rdnss_addresses.iter_mut().find(|e| *e.address() == address) {
                Some(entry) => entry.refresh(lifetime, now),
                None => {
                    if !self.entry_pool.allocate() {
                        warn!("Discovered too many entries, ignore RDNSS address {}", address);
                        break;
                    }
                    router.rdnss_addresses.push(RdnssAddress::new(address, lifetime, now));
                    did_change = true;
                }
            }
        }

        if did_change {
            self.rdnss_task_posted = true;
        }
    }

    fn update_if_addresses(&mut self, address: Ipv6Addr, now: TimeMilli) {
        let infra_if = &self.infra_if;
        remove_matching(&mut self.if_addresses, &mut self.entry_pool, |e| {
            !infra_if.has_address(e.address())
        });

        let uptime = now.as_secs();
        match self.if_addresses.iter_mut().find(|e| *e.address() == address) {
            Some(entry) => entry.touch(uptime),
            None => {
                if self.entry_pool.allocate() {
                    self.if_addresses.push(IfAddress::new(address, uptime));
                }
            }
        }
    }

    pub fn process_neighbor_advert(&mut self, packet: &[u8], now: TimeMilli) {
        if !self.running {
            return;
        }
        let na = match NeighborAdvert::parse(packet) {
            Ok(na) => na,
            Err(_) => return,
        };

        let reachable_interval = self.config.reachable_interval_ms;
        let Some(router) = self.routers.iter_mut().find(|r| r.address == na.target) else {
            return;
        };

        info!("Received NA from router {}", router.address);
        router.reset_reachability_state(now, reachable_interval, &mut self.rng);
        self.evaluate(now);
    }

    //- - - - - - - - - - - - - - - - - - - - - - - - - - - - - - - - -
    // External state changes

    /// Mark tracked on-link entries matching the new local on-link prefix
    /// as disregarded (or drop them when peer BRs are not tracked).
    pub fn handle_local_on_link_prefix_changed(&mut self, now: TimeMilli) {
        let Some(prefix) = self.context.local_on_link_prefix() else {
            return;
        };
        let mut did_change = false;

        for router in &mut self.routers {
            if self.config.track_peer_br_info {
                if let Some(entry) = router
                    .on_link_prefixes
                    .iter_mut()
                    .find(|e| *e.prefix() == prefix && !e.should_disregard())
                {
                    entry.set_disregard(true);
                    did_change = true;
                }
            } else {
                did_change |=
                    remove_matching(&mut router.on_link_prefixes, &mut self.entry_pool, |e| *e.prefix() == prefix) > 0;
            }
        }

        if did_change {
            self.evaluate(now);
        }
    }

    /// Re-check route entries against the OMR prefixes in Network Data.
    pub fn handle_net_data_changed(&mut self, now: TimeMilli) {
        let mut did_change = false;

        for config in self.context.on_mesh_prefixes() {
            if !config.is_valid_omr() {
                continue;
            }
            for router in &mut self.routers {
                if self.config.track_peer_br_info {
                    if let Some(entry) = router
                        .route_prefixes
                        .iter_mut()
                        .find(|e| *e.prefix() == config.prefix && !e.should_disregard())
                    {
                        entry.set_disregard(true);
                        did_change = true;
                    }
                } else {
                    did_change |= remove_matching(&mut router.route_prefixes, &mut self.entry_pool, |e| {
                        *e.prefix() == config.prefix
                    }) > 0;
                }
            }
        }

        if did_change {
            self.evaluate(now);
        }
    }

    /// End of an RS cycle started at `start_time`: entries not refreshed
    /// since then are aged out and the routing policy re-evaluated.
    pub fn handle_rs_sender_finished(&mut self, start_time: TimeMilli, now: TimeMilli) {
        self.remove_or_deprecate_old_entries(start_time, now);
        self.schedule_policy_evaluation(EvaluationDelay::Immediately);
    }

    /// Deprecate on-link entries and invalidate route and RDNSS entries
    /// not updated since `threshold`.
    fn remove_or_deprecate_old_entries(&mut self, threshold: TimeMilli, now: TimeMilli) {
        for router in &mut self.routers {
            for entry in &mut router.on_link_prefixes {
                if entry.last_update_time() <= threshold {
                    entry.clear_preferred_lifetime();
                }
            }
            for entry in &mut router.route_prefixes {
                if entry.last_update_time() <= threshold {
                    entry.clear_valid_lifetime();
                }
            }
            for entry in &mut router.rdnss_addresses {
                if entry.last_update_time() <= threshold {
                    entry.clear_lifetime();
                }
            }
        }

        if self.local_ra_header.is_some() && self.local_ra_header_update_time <= threshold {
            self.local_ra_header = None;
        }

        self.evaluate(now);
    }

    //- - - - - - - - - - - - - - - - - - - - - - - - - - - - - - - - -
    // Timers

    /// Earliest deadline across all timers, including the RS sender.
    pub fn next_fire_time(&self) -> Option<TimeMilli> {
        let t = self.timers();
        earliest([t.expiration, t.stale, t.router, t.rdnss_addr, t.rs_sender])
    }

    pub fn timers(&self) -> TimerState {
        TimerState {
            expiration: self.expiration_timer.fire_time(),
            stale: self.stale_timer.fire_time(),
            router: self.router_timer.fire_time(),
            rdnss_addr: self.rdnss_addr_timer.fire_time(),
            rs_sender: self.rs_sender.fire_time(),
        }
    }

    /// Run every timer whose deadline is at or before `now`.
    pub fn handle_timers(&mut self, now: TimeMilli) {
        if let Some(start_time) = self.rs_sender.handle_timer(now, &mut self.infra_if, &mut self.counters) {
            self.handle_rs_sender_finished(start_time, now);
        }
        if self.router_timer.take_if_due(now) {
            self.handle_router_timer(now);
        }
        if self.expiration_timer.take_if_due(now) {
            self.evaluate(now);
        }
        if self.stale_timer.take_if_due(now) {
            self.handle_stale_timer(now);
        }
        if self.rdnss_addr_timer.take_if_due(now) {
            self.evaluate(now);
        }
    }

    fn handle_stale_timer(&mut self, now: TimeMilli) {
        if !self.running {
            return;
        }
        info!("Stale timer expired");
        self.rs_sender.start(now, &mut self.rng);
    }

    fn handle_router_timer(&mut self, now: TimeMilli) {
        let rs_in_progress = self.rs_sender.is_in_progress();
        let link_layer_addr = self.infra_if.link_layer_address();

        for router in &mut self.routers {
            if !router.should_check_reachability() || router.timeout_time > now {
                continue;
            }

            router.ns_probe_count += 1;

            if router.is_reachable() {
                let wait = if router.ns_probe_count < MAX_NS_PROBES {
                    NS_PROBE_RETRY_INTERVAL_MS
                } else {
                    NS_PROBE_TIMEOUT_MS
                };
                router.timeout_time = now + wait;

                // RAs answering our RS refresh reachability anyway.
                if rs_in_progress {
                    continue;
                }
                let ns = nd::neighbor_solicit(&router.address, link_layer_addr.as_deref());
                if let Err(e) = self.infra_if.send(&ns, &router.address) {
                    debug!("Failed to send NS to {}: {}", router.address, e);
                }
                info!(
                    "Sent Neighbor Solicitation to {} - attempt:{}/{}",
                    router.address, router.ns_probe_count, MAX_NS_PROBES
                );
            } else {
                info!(
                    "No response to all Neighbor Solicitations attempts from router {} - marking it unreachable",
                    router.address
                );
                for entry in &mut router.on_link_prefixes {
                    if !entry.is_deprecated(now) {
                        entry.clear_preferred_lifetime();
                    }
                }
                for entry in &mut router.route_prefixes {
                    entry.clear_valid_lifetime();
                }
                for entry in &mut router.rdnss_addresses {
                    entry.clear_lifetime();
                }
            }
        }

        self.evaluate(now);
    }

    //- - - - - - - - - - - - - - - - - - - - - - - - - - - - - - - - -
    // Evaluation

    fn evaluate(&mut self, now: TimeMilli) {
        let old_factors = self.decision.clone();
        let mut router_timeout = NextFireTime::new(now);
        let mut entry_expire = NextFireTime::new(now);
        let mut stale = NextFireTime::new(now);
        let mut rdnss_expire = NextFireTime::new(now);

        // Remove expired entries.
        for router in &mut self.routers {
            remove_matching(&mut router.on_link_prefixes, &mut self.entry_pool, |e| e.expire_time() <= now);
            remove_matching(&mut router.route_prefixes, &mut self.entry_pool, |e| e.expire_time() <= now);
            if remove_matching(&mut router.rdnss_addresses, &mut self.entry_pool, |e| e.expire_time() <= now) > 0 {
                self.rdnss_task_posted = true;
            }
        }

        // Remove routers with no entries and no relevant flags.
        let (removed, kept): (Vec<Router>, Vec<Router>) =
            std::mem::take(&mut self.routers).into_iter().partition(|r| r.is_empty());
        self.routers = kept;
        for mut router in removed {
            self.entry_pool.free(router.entry_count());
            report_history(&mut self.history, &mut router, true, now);
        }

        // Decision factors.
        self.decision = DecisionFactors::default();
        for router in &mut self.routers {
            router.all_entries_disregarded = true;
            self.decision.update_flags_from(router);

            for entry in &mut router.on_link_prefixes {
                self.decision.update_from_on_link(entry, now);
                entry.set_stale_time_calculated(false);
                router.all_entries_disregarded &= entry.should_disregard();
            }
            for entry in &mut router.route_prefixes {
                self.decision.update_from_route(entry);
                entry.set_stale_time_calculated(false);
                router.all_entries_disregarded &= entry.should_disregard();
            }
        }
        self.decision.reachable_peer_br_count = self
            .routers
            .iter()
            .filter(|r| !r.is_local_device && r.is_peer_br() && r.is_reachable())
            .count() as u16;

        if self.decision != old_factors {
            self.signal_task_posted = true;
        }

        // Timers. When several routers advertise the same prefix, its
        // stale time is the latest among them; the calculated flag makes
        // each distinct prefix be scanned once.
        let reachable_interval = self.config.reachable_interval_ms;
        for i in 0..self.routers.len() {
            let router = &mut self.routers[i];
            if router.should_check_reachability() {
                router.determine_reachability_timeout(reachable_interval, &mut self.rng);
                router_timeout.update_if_earlier(router.timeout_time);
            }

            for j in 0..self.routers[i].on_link_prefixes.len() {
                let entry = &self.routers[i].on_link_prefixes[j];
                entry_expire.update_if_earlier(entry.expire_time());
                if !entry.is_deprecated(now) {
                    entry_expire.update_if_earlier(entry.deprecation_time());
                }
                if !entry.is_stale_time_calculated() {
                    let prefix = *entry.prefix();
                    determine_on_link_stale_time(&mut self.routers, &prefix, &mut stale);
                }
            }

            for j in 0..self.routers[i].route_prefixes.len() {
                let entry = &self.routers[i].route_prefixes[j];
                entry_expire.update_if_earlier(entry.expire_time());
                if !entry.is_stale_time_calculated() {
                    let prefix = *entry.prefix();
                    determine_route_stale_time(&mut self.routers, &prefix, &mut stale);
                }
            }

            for entry in &self.routers[i].rdnss_addresses {
                rdnss_expire.update_if_earlier(entry.expire_time());
            }
        }

        if let Some(header) = &self.local_ra_header {
            let mut interval = STALE_TIME_SECS;
            if header.router_lifetime > 0 {
                interval = interval.min(u32::from(header.router_lifetime));
            }
            stale.update_if_earlier(clamped_expiration(self.local_ra_header_update_time, interval));
        }

        self.router_timer.fire_at(&router_timeout);
        self.expiration_timer.fire_at(&entry_expire);
        self.stale_timer.fire_at(&stale);
        self.rdnss_addr_timer.fire_at(&rdnss_expire);

        for router in &mut self.routers {
            report_history(&mut self.history, router, false, now);
        }
    }

    fn schedule_policy_evaluation(&mut self, delay: EvaluationDelay) {
        self.policy_evaluation = match (self.policy_evaluation, delay) {
            (Some(EvaluationDelay::Immediately), _) => Some(EvaluationDelay::Immediately),
            (_, delay) => Some(delay),
        };
    }

    /// Deliver pending one-shot notifications. The RDNSS callback, if
    /// set, runs when an RDNSS change is delivered.
    pub fn take_events(&mut self) -> Vec<TrackerEvent> {
        let mut events = Vec::new();
        if std::mem::take(&mut self.signal_task_posted) {
            events.push(TrackerEvent::DecisionChanged);
        }
        if std::mem::take(&mut self.rdnss_task_posted) {
            if let Some(callback) = self.rdnss_callback.as_mut() {
                callback();
            }
            events.push(TrackerEvent::RdnssChanged);
        }
        if let Some(delay) = self.policy_evaluation.take() {
            events.push(TrackerEvent::EvaluateRoutingPolicy(delay));
        }
        events
    }

    //- - - - - - - - - - - - - - - - - - - - - - - - - - - - - - - - -
    // Queries

    pub fn decision_factors(&self) -> &DecisionFactors {
        &self.decision
    }

    /// Header of an RA emitted by another entity on this device, if valid.
    pub fn local_ra_header(&self) -> Option<&RaHeader> {
        self.local_ra_header.as_ref()
    }

    /// Merge the M/O flags seen on the link into a header we emit.
    pub fn set_header_flags_on(&self, header: &mut RaHeader) {
        if self.decision.header_managed_address_config_flag {
            header.set_managed_address_config_flag();
        }
        if self.decision.header_other_config_flag {
            header.set_other_config_flag();
        }
    }

    pub fn is_address_on_link(&self, address: &Ipv6Addr) -> bool {
        self.context.address_matches_local_on_link_prefix(address)
            || self
                .routers
                .iter()
                .flat_map(|r| r.on_link_prefixes.iter())
                .any(|e| e.prefix().contains(address))
    }

    /// Matches a tracked route prefix other than `::/0`.
    pub fn is_address_reachable_through_explicit_route(&self, address: &Ipv6Addr) -> bool {
        self.routers
            .iter()
            .flat_map(|r| r.route_prefixes.iter())
            .any(|e| !e.prefix().is_empty() && e.prefix().contains(address))
    }

    pub fn routers(&self) -> &[Router] {
        &self.routers
    }

    pub fn if_addresses(&self) -> &[IfAddress] {
        &self.if_addresses
    }

    pub fn counters(&self) -> &BorderRoutingCounters {
        &self.counters
    }

    pub fn history(&self) -> &HistoryLog {
        &self.history
    }

    pub fn rs_sender(&self) -> &RsSender {
        &self.rs_sender
    }

    pub fn infra_if(&self) -> &I {
        &self.infra_if
    }

    pub fn infra_if_mut(&mut self) -> &mut I {
        &mut self.infra_if
    }

    pub fn context(&self) -> &C {
        &self.context
    }

    /// Callers changing prefixes should follow up with
    /// `handle_local_on_link_prefix_changed` or `handle_net_data_changed`.
    pub fn context_mut(&mut self) -> &mut C {
        &mut self.context
    }

    //- - - - - - - - - - - - - - - - - - - - - - - - - - - - - - - - -
    // Diagnostics iteration

    pub fn init_iterator(&self, now: TimeMilli) -> PrefixTableIterator {
        PrefixTableIterator::new(now)
    }

    pub fn next_prefix_table_entry(&self, iterator: &mut PrefixTableIterator) -> Result<PrefixTableEntry, TableIterError> {
        iterator.next_prefix(&self.routers)
    }

    pub fn next_router_entry(&self, iterator: &mut PrefixTableIterator) -> Result<RouterEntry, TableIterError> {
        iterator.next_router(&self.routers)
    }

    pub fn next_rdnss_addr_entry(&self, iterator: &mut PrefixTableIterator) -> Result<RdnssAddrEntry, TableIterError> {
        iterator.next_rdnss_addr(&self.routers)
    }

    pub fn next_if_addr_entry(&self, iterator: &mut PrefixTableIterator) -> Result<IfAddrEntry, TableIterError> {
        iterator.next_if_addr(&self.if_addresses)
    }
}

fn determine_on_link_stale_time(routers: &mut [Router], prefix: &Prefix, stale: &mut NextFireTime) {
    let now = stale.now();
    let mut prefix_stale_time = now;
    let mut found = false;

    for router in routers.iter_mut() {
        for entry in router.on_link_prefixes.iter_mut().filter(|e| e.prefix() == prefix) {
            entry.set_stale_time_calculated(true);
            if entry.is_deprecated(now) {
                continue;
            }
            prefix_stale_time = prefix_stale_time.max(entry.stale_time());
            found = true;
        }
    }

    if found {
        stale.update_if_earlier(prefix_stale_time);
    }
}

fn determine_route_stale_time(routers: &mut [Router], prefix: &Prefix, stale: &mut NextFireTime) {
    let now = stale.now();
    let mut prefix_stale_time = now;
    let mut found = false;

    for router in routers.iter_mut() {
        for entry in router.route_prefixes.iter_mut().filter(|e| e.prefix() == prefix) {
            entry.set_stale_time_calculated(true);
            prefix_stale_time = prefix_stale_time.max(entry.stale_time());
            found = true;
        }
    }

    if found {
        stale.update_if_earlier(prefix_stale_time);
    }
}

/// Record a router event if anything changed since the last record.
/// Removals are only recorded for routers that were recorded before.
fn report_history(history: &mut HistoryLog, router: &mut Router, removed: bool, now: TimeMilli) {
    let old = router.history.clone();
    if removed && !old.recorded {
        return;
    }

    router.history = HistoryInfo::determine_from(router, now);
    if !removed && router.history == old {
        return;
    }

    let kind = if removed {
        AilRouterEventKind::Removed
    } else if old.recorded {
        AilRouterEventKind::Changed
    } else {
        AilRouterEventKind::Added
    };
    history.record(AilRouterEvent::new(kind, now, router.address, &router.history));
}

#[cfg(test)]
mod tests;
