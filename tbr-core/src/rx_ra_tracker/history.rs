//! Bounded log of router additions, changes and removals on the
//! infrastructure link.

use std::collections::VecDeque;
use std::net::Ipv6Addr;

use serde::Serialize;

use super::router::HistoryInfo;
use crate::ip6::Prefix;
use crate::nd::RoutePreference;
use crate::time::TimeMilli;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum AilRouterEventKind {
    Added,
    Changed,
    Removed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AilRouterEvent {
    pub kind: AilRouterEventKind,
    pub time: TimeMilli,
    pub address: Ipv6Addr,
    pub managed_address_config_flag: bool,
    pub other_config_flag: bool,
    pub snac_router_flag: bool,
    pub is_local_device: bool,
    pub is_reachable: bool,
    pub is_peer_br: bool,
    pub provides_default_route: bool,
    pub def_route_preference: RoutePreference,
    pub favored_on_link_prefix: Option<Prefix>,
}

impl AilRouterEvent {
    pub(crate) fn new(kind: AilRouterEventKind, time: TimeMilli, address: Ipv6Addr, info: &HistoryInfo) -> Self {
        Self {
            kind,
            time,
            address,
            managed_address_config_flag: info.managed_address_config,
            other_config_flag: info.other_config,
            snac_router_flag: info.snac_router,
            is_local_device: info.is_local_device,
            is_reachable: info.is_reachable,
            is_peer_br: info.is_peer_br,
            provides_default_route: info.provides_default_route,
            def_route_preference: info.def_route_preference,
            favored_on_link_prefix: info.favored_on_link_prefix,
        }
    }
}

/// Oldest events are dropped once `capacity` is reached.
#[derive(Debug, Clone)]
pub struct HistoryLog {
    capacity: usize,
    events: VecDeque<AilRouterEvent>,
}

impl HistoryLog {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            events: VecDeque::with_capacity(capacity),
        }
    }

    pub(crate) fn record(&mut self, event: AilRouterEvent) {
        if self.capacity == 0 {
            return;
        }
        if self.events.len() == self.capacity {
            self.events.pop_front();
        }
        self.events.push_back(event);
    }

    pub fn iter(&self) -> impl Iterator<Item = &AilRouterEvent> {
        self.events.iter()
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}
