//! Aggregate decision derived from all tracked routers.

use serde::Serialize;

use super::entries::{OnLinkPrefix, RoutePrefix};
use super::router::Router;
use crate::ip6::Prefix;
use crate::time::TimeMilli;

/// Recomputed from scratch on every evaluation; a change is signalled.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DecisionFactors {
    pub favored_on_link_prefix: Option<Prefix>,
    pub has_ula_on_link: bool,
    pub has_non_ula_on_link: bool,
    pub has_non_ula_route: bool,
    pub header_managed_address_config_flag: bool,
    pub header_other_config_flag: bool,
    pub reachable_peer_br_count: u16,
}

impl DecisionFactors {
    /// M/O flags to mirror in our own RA. Ignored from stub (SNAC)
    /// routers and from routers that stopped answering probes.
    pub(crate) fn update_flags_from(&mut self, router: &Router) {
        if router.snac_router || !router.is_reachable() {
            return;
        }
        self.header_managed_address_config_flag |= router.managed_address_config;
        self.header_other_config_flag |= router.other_config;
    }

    pub(crate) fn update_from_on_link(&mut self, entry: &OnLinkPrefix, now: TimeMilli) {
        if entry.should_disregard() {
            return;
        }
        if entry.prefix().is_unique_local() {
            self.has_ula_on_link = true;
        } else {
            self.has_non_ula_on_link = true;
        }
        if entry.is_favored_over(self.favored_on_link_prefix.as_ref(), now) {
            self.favored_on_link_prefix = Some(*entry.prefix());
        }
    }

    pub(crate) fn update_from_route(&mut self, entry: &RoutePrefix) {
        if entry.should_disregard() {
            return;
        }
        self.has_non_ula_route |= !entry.prefix().is_unique_local();
    }
}
