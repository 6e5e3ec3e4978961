//! Diagnostics iteration over the tracked table. An iterator snapshots
//! `now` and uptime once so ages stay consistent over a full traversal.

use std::net::Ipv6Addr;

use serde::Serialize;

use super::entries::IfAddress;
use super::router::Router;
use crate::ip6::Prefix;
use crate::nd::RoutePreference;
use crate::time::TimeMilli;

/// Error advancing a table iterator.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum TableIterError {
    #[error("no more entries")]
    NotFound,
    #[error("iterator already used for a different table")]
    InvalidArgs,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum IterKind {
    Unspecified,
    Prefix,
    Router,
    RdnssAddr,
    IfAddr,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PrefixKind {
    OnLink,
    Route,
}

/// Cursor into the tracker's table. Positions are indices, so a table
/// mutated between calls can only shift the cursor, never dangle.
#[derive(Debug, Clone)]
pub struct PrefixTableIterator {
    kind: IterKind,
    router: usize,
    entry: Option<usize>,
    prefix_kind: PrefixKind,
    init_time: TimeMilli,
    init_uptime: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RouterEntry {
    pub address: Ipv6Addr,
    pub msec_since_last_update: u64,
    pub age_secs: u64,
    pub managed_address_config_flag: bool,
    pub other_config_flag: bool,
    pub snac_router_flag: bool,
    pub is_local_device: bool,
    pub is_reachable: bool,
    pub is_peer_br: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PrefixTableEntry {
    pub router: RouterEntry,
    pub prefix: Prefix,
    pub is_on_link: bool,
    pub msec_since_last_update: u64,
    pub valid_lifetime: u32,
    pub preferred_lifetime: u32,
    pub route_preference: RoutePreference,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RdnssAddrEntry {
    pub router: RouterEntry,
    pub address: Ipv6Addr,
    pub msec_since_last_update: u64,
    pub lifetime: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IfAddrEntry {
    pub address: Ipv6Addr,
    pub secs_since_last_use: u64,
}

impl PrefixTableIterator {
    pub(crate) fn new(now: TimeMilli) -> Self {
        Self {
            kind: IterKind::Unspecified,
            router: 0,
            entry: None,
            prefix_kind: PrefixKind::Route,
            init_time: now,
            init_uptime: now.as_secs(),
        }
    }

    pub fn init_time(&self) -> TimeMilli {
        self.init_time
    }

    fn router_entry(&self, routers: &[Router]) -> Result<RouterEntry, TableIterError> {
        routers
            .get(self.router)
            .map(|r| r.info(self.init_time, self.init_uptime))
            .ok_or(TableIterError::NotFound)
    }

    fn advance_to_next_router(&mut self, kind: IterKind, routers: &[Router]) -> Result<(), TableIterError> {
        if self.kind == IterKind::Unspecified {
            // First call: keep the cursor on the first router.
            self.kind = kind;
        } else {
            if self.kind != kind {
                return Err(TableIterError::InvalidArgs);
            }
            if self.router >= routers.len() {
                return Err(TableIterError::NotFound);
            }
            self.router += 1;
        }
        if self.router >= routers.len() {
            return Err(TableIterError::NotFound);
        }
        Ok(())
    }

    pub(crate) fn next_router(&mut self, routers: &[Router]) -> Result<RouterEntry, TableIterError> {
        self.advance_to_next_router(IterKind::Router, routers)?;
        self.router_entry(routers)
    }

    pub(crate) fn next_prefix(&mut self, routers: &[Router]) -> Result<PrefixTableEntry, TableIterError> {
        if self.router >= routers.len() {
            return Err(TableIterError::NotFound);
        }

        if let Some(index) = self.entry {
            let len = self.current_prefix_list_len(&routers[self.router]);
            self.entry = (index + 1 < len).then_some(index + 1);
        }

        while self.entry.is_none() {
            match self.prefix_kind {
                PrefixKind::OnLink => {
                    self.prefix_kind = PrefixKind::Route;
                }
                PrefixKind::Route => {
                    self.advance_to_next_router(IterKind::Prefix, routers)?;
                    self.prefix_kind = PrefixKind::OnLink;
                }
            }
            let len = self.current_prefix_list_len(&routers[self.router]);
            self.entry = (len > 0).then_some(0);
        }

        let router = &routers[self.router];
        let index = self.entry.ok_or(TableIterError::NotFound)?;
        let router_entry = router.info(self.init_time, self.init_uptime);

        match self.prefix_kind {
            PrefixKind::OnLink => {
                let e = router.on_link_prefixes.get(index).ok_or(TableIterError::NotFound)?;
                Ok(PrefixTableEntry {
                    router: router_entry,
                    prefix: *e.prefix(),
                    is_on_link: true,
                    msec_since_last_update: self.init_time.since(e.last_update_time()),
                    valid_lifetime: e.valid_lifetime(),
                    preferred_lifetime: e.preferred_lifetime(),
                    route_preference: RoutePreference::Medium,
                })
            }
            PrefixKind::Route => {
                let e = router.route_prefixes.get(index).ok_or(TableIterError::NotFound)?;
                Ok(PrefixTableEntry {
                    router: router_entry,
                    prefix: *e.prefix(),
                    is_on_link: false,
                    msec_since_last_update: self.init_time.since(e.last_update_time()),
                    valid_lifetime: e.valid_lifetime(),
                    preferred_lifetime: 0,
                    route_preference: e.route_preference(),
                })
            }
        }
    }

    fn current_prefix_list_len(&self, router: &Router) -> usize {
        match self.prefix_kind {
            PrefixKind::OnLink => router.on_link_prefixes.len(),
            PrefixKind::Route => router.route_prefixes.len(),
        }
    }

    pub(crate) fn next_rdnss_addr(&mut self, routers: &[Router]) -> Result<RdnssAddrEntry, TableIterError> {
        if self.router >= routers.len() {
            return Err(TableIterError::NotFound);
        }

        if let Some(index) = self.entry {
            if self.kind != IterKind::RdnssAddr {
                return Err(TableIterError::InvalidArgs);
            }
            let len = routers[self.router].rdnss_addresses.len();
            self.entry = (index + 1 < len).then_some(index + 1);
        }

        while self.entry.is_none() {
            self.advance_to_next_router(IterKind::RdnssAddr, routers)?;
            let len = routers[self.router].rdnss_addresses.len();
            self.entry = (len > 0).then_some(0);
        }

        let router = &routers[self.router];
        let index = self.entry.ok_or(TableIterError::NotFound)?;
        let e = router.rdnss_addresses.get(index).ok_or(TableIterError::NotFound)?;
        Ok(RdnssAddrEntry {
            router: router.info(self.init_time, self.init_uptime),
            address: *e.address(),
            msec_since_last_update: self.init_time.since(e.last_update_time()),
            lifetime: e.lifetime(),
        })
    }

    pub(crate) fn next_if_addr(&mut self, if_addresses: &[IfAddress]) -> Result<IfAddrEntry, TableIterError> {
        if self.kind == IterKind::Unspecified {
            self.kind = IterKind::IfAddr;
            self.entry = (!if_addresses.is_empty()).then_some(0);
        } else {
            if self.kind != IterKind::IfAddr {
                return Err(TableIterError::InvalidArgs);
            }
            let index = self.entry.ok_or(TableIterError::NotFound)?;
            self.entry = (index + 1 < if_addresses.len()).then_some(index + 1);
        }

        let index = self.entry.ok_or(TableIterError::NotFound)?;
        let e = if_addresses.get(index).ok_or(TableIterError::NotFound)?;
        Ok(IfAddrEntry {
            address: *e.address(),
            secs_since_last_use: self.init_uptime.saturating_sub(e.last_use_uptime()),
        })
    }
}
