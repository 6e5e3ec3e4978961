//! Per-router table entries (on-link prefix, route prefix, RDNSS address)
//! and local interface addresses, plus the shared entry budget.

use std::net::Ipv6Addr;

use crate::ip6::Prefix;
use crate::nd::{PrefixInfoOption, RaHeader, RouteInfoOption, RoutePreference};
use crate::time::{clamped_expiration, TimeMilli};

/// Upper bound on the interval after which a prefix is treated as stale.
pub(crate) const STALE_TIME_SECS: u32 = 600;

const TWO_HOURS_SECS: u32 = 2 * 3600;
const FAVORED_PREFIX_LENGTH: u8 = 64;
const FAVORED_MIN_PREFERRED_LIFETIME_SECS: u32 = 1800;

/// Shared capacity for on-link, route, RDNSS and if-address entries.
#[derive(Debug, Clone)]
pub(crate) struct EntryPool {
    capacity: usize,
    in_use: usize,
}

impl EntryPool {
    pub(crate) fn new(capacity: usize) -> Self {
        Self {
            capacity,
            in_use: 0,
        }
    }

    /// Reserve one slot. False when exhausted.
    pub(crate) fn allocate(&mut self) -> bool {
        if self.in_use >= self.capacity {
            return false;
        }
        self.in_use += 1;
        true
    }

    pub(crate) fn free(&mut self, count: usize) {
        self.in_use = self.in_use.saturating_sub(count);
    }

    pub(crate) fn in_use(&self) -> usize {
        self.in_use
    }
}

/// Remove every item matching `pred`, returning slots to the pool.
/// Returns how many were removed.
pub(crate) fn remove_matching<T>(
    list: &mut Vec<T>,
    pool: &mut EntryPool,
    mut pred: impl FnMut(&T) -> bool,
) -> usize {
    let before = list.len();
    list.retain(|item| !pred(item));
    let removed = before - list.len();
    pool.free(removed);
    removed
}

/// Prefix learned from a PIO with the L flag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OnLinkPrefix {
    prefix: Prefix,
    valid_lifetime: u32,
    preferred_lifetime: u32,
    last_update_time: TimeMilli,
    auto_addr_config: bool,
    dhcp6_pd_preferred: bool,
    disregard: bool,
    stale_time_calculated: bool,
}

impl OnLinkPrefix {
    pub(crate) fn from_pio(pio: &PrefixInfoOption, now: TimeMilli) -> Self {
        Self {
            prefix: pio.prefix,
            valid_lifetime: pio.valid_lifetime,
            preferred_lifetime: pio.preferred_lifetime,
            last_update_time: now,
            auto_addr_config: pio.is_auto_addr_config_flag_set(),
            dhcp6_pd_preferred: pio.is_dhcp6_pd_preferred_flag_set(),
            disregard: false,
            stale_time_calculated: false,
        }
    }

    pub fn prefix(&self) -> &Prefix {
        &self.prefix
    }

    pub fn valid_lifetime(&self) -> u32 {
        self.valid_lifetime
    }

    pub fn preferred_lifetime(&self) -> u32 {
        self.preferred_lifetime
    }

    pub fn last_update_time(&self) -> TimeMilli {
        self.last_update_time
    }

    pub fn is_auto_addr_config_flag_set(&self) -> bool {
        self.auto_addr_config
    }

    pub fn is_dhcp6_pd_preferred_flag_set(&self) -> bool {
        self.dhcp6_pd_preferred
    }

    pub fn should_disregard(&self) -> bool {
        self.disregard
    }

    pub(crate) fn set_disregard(&mut self, disregard: bool) {
        self.disregard = disregard;
    }

    pub(crate) fn is_stale_time_calculated(&self) -> bool {
        self.stale_time_calculated
    }

    pub(crate) fn set_stale_time_calculated(&mut self, calculated: bool) {
        self.stale_time_calculated = calculated;
    }

    pub fn expire_time(&self) -> TimeMilli {
        clamped_expiration(self.last_update_time, self.valid_lifetime)
    }

    pub fn stale_time(&self) -> TimeMilli {
        clamped_expiration(
            self.last_update_time,
            self.preferred_lifetime.min(STALE_TIME_SECS),
        )
    }

    pub fn deprecation_time(&self) -> TimeMilli {
        clamped_expiration(self.last_update_time, self.preferred_lifetime)
    }

    pub fn is_deprecated(&self, now: TimeMilli) -> bool {
        self.deprecation_time() <= now
    }

    pub(crate) fn clear_preferred_lifetime(&mut self) {
        self.preferred_lifetime = 0;
    }

    /// Refresh from a re-received PIO. The valid lifetime follows the
    /// RFC 4862 §5.5.3(e) two-hour rule.
    pub(crate) fn adopt_flags_and_lifetimes_from(&mut self, newer: &OnLinkPrefix) {
        let now = newer.last_update_time;
        let current_expire = self.expire_time();

        if newer.valid_lifetime > TWO_HOURS_SECS || newer.expire_time() > current_expire {
            self.valid_lifetime = newer.valid_lifetime;
        } else if current_expire > now + u64::from(TWO_HOURS_SECS) * 1000 {
            self.valid_lifetime = TWO_HOURS_SECS;
        } else {
            // Keep the remaining lifetime, rebased on the new update time.
            let remaining_ms = current_expire.since(now);
            self.valid_lifetime = u32::try_from(remaining_ms.div_ceil(1000)).unwrap_or(u32::MAX);
        }

        self.preferred_lifetime = newer.preferred_lifetime;
        self.auto_addr_config = newer.auto_addr_config;
        self.dhcp6_pd_preferred = newer.dhcp6_pd_preferred;
        self.last_update_time = now;
    }

    /// Whether this entry should replace `favored` as the favored on-link
    /// prefix: a non-deprecated /64 with `A` or `P` and a long enough
    /// preferred lifetime; the numerically smaller prefix wins.
    pub fn is_favored_over(&self, favored: Option<&Prefix>, now: TimeMilli) -> bool {
        if self.prefix.length() != FAVORED_PREFIX_LENGTH {
            return false;
        }
        if !(self.auto_addr_config || self.dhcp6_pd_preferred) {
            return false;
        }
        if self.preferred_lifetime < FAVORED_MIN_PREFERRED_LIFETIME_SECS || self.is_deprecated(now) {
            return false;
        }
        match favored {
            None => true,
            Some(favored) => self.prefix < *favored,
        }
    }
}

/// Route learned from an RIO, or `::/0` from the RA header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoutePrefix {
    prefix: Prefix,
    valid_lifetime: u32,
    preference: RoutePreference,
    last_update_time: TimeMilli,
    disregard: bool,
    stale_time_calculated: bool,
}

impl RoutePrefix {
    pub(crate) fn from_rio(rio: &RouteInfoOption, now: TimeMilli) -> Self {
        Self {
            prefix: rio.prefix,
            valid_lifetime: rio.route_lifetime,
            preference: rio.preference,
            last_update_time: now,
            disregard: false,
            stale_time_calculated: false,
        }
    }

    pub(crate) fn from_ra_header(header: &RaHeader, now: TimeMilli) -> Self {
        Self {
            prefix: Prefix::empty(),
            valid_lifetime: u32::from(header.router_lifetime),
            preference: header.default_router_preference(),
            last_update_time: now,
            disregard: false,
            stale_time_calculated: false,
        }
    }

    /// Overwrite lifetime and preference, keeping the disregard flag.
    pub(crate) fn update_from(&mut self, other: RoutePrefix) {
        self.valid_lifetime = other.valid_lifetime;
        self.preference = other.preference;
        self.last_update_time = other.last_update_time;
    }

    pub fn prefix(&self) -> &Prefix {
        &self.prefix
    }

    pub fn valid_lifetime(&self) -> u32 {
        self.valid_lifetime
    }

    pub fn route_preference(&self) -> RoutePreference {
        self.preference
    }

    pub fn last_update_time(&self) -> TimeMilli {
        self.last_update_time
    }

    pub fn should_disregard(&self) -> bool {
        self.disregard
    }

    pub(crate) fn set_disregard(&mut self, disregard: bool) {
        self.disregard = disregard;
    }

    pub(crate) fn is_stale_time_calculated(&self) -> bool {
        self.stale_time_calculated
    }

    pub(crate) fn set_stale_time_calculated(&mut self, calculated: bool) {
        self.stale_time_calculated = calculated;
    }

    pub fn expire_time(&self) -> TimeMilli {
        clamped_expiration(self.last_update_time, self.valid_lifetime)
    }

    pub fn stale_time(&self) -> TimeMilli {
        clamped_expiration(
            self.last_update_time,
            self.valid_lifetime.min(STALE_TIME_SECS),
        )
    }

    pub(crate) fn clear_valid_lifetime(&mut self) {
        self.valid_lifetime = 0;
    }
}

/// DNS server address from an RDNSS option.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RdnssAddress {
    address: Ipv6Addr,
    lifetime: u32,
    last_update_time: TimeMilli,
}

impl RdnssAddress {
    pub(crate) fn new(address: Ipv6Addr, lifetime: u32, now: TimeMilli) -> Self {
        Self {
            address,
            lifetime,
            last_update_time: now,
        }
    }

    pub(crate) fn refresh(&mut self, lifetime: u32, now: TimeMilli) {
        self.lifetime = lifetime;
        self.last_update_time = now;
    }

    pub fn address(&self) -> &Ipv6Addr {
        &self.address
    }

    pub fn lifetime(&self) -> u32 {
        self.lifetime
    }

    pub fn last_update_time(&self) -> TimeMilli {
        self.last_update_time
    }

    pub fn expire_time(&self) -> TimeMilli {
        clamped_expiration(self.last_update_time, self.lifetime)
    }

    pub(crate) fn clear_lifetime(&mut self) {
        self.lifetime = 0;
    }
}

/// Address used by this device on the infrastructure link, learned from
/// self-originated RAs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IfAddress {
    address: Ipv6Addr,
    last_use_uptime: u64,
}

impl IfAddress {
    pub(crate) fn new(address: Ipv6Addr, uptime: u64) -> Self {
        Self {
            address,
            last_use_uptime: uptime,
        }
    }

    pub(crate) fn touch(&mut self, uptime: u64) {
        self.last_use_uptime = uptime;
    }

    pub fn address(&self) -> &Ipv6Addr {
        &self.address
    }

    pub fn last_use_uptime(&self) -> u64 {
        self.last_use_uptime
    }
}
