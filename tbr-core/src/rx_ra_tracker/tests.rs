use std::net::Ipv6Addr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use rand::rngs::StdRng;
use rand::SeedableRng;

use super::*;
use crate::infra::StaticRoutingContext;
use crate::nd::{PrefixInfoOption, RouterAdvertBuilder, RoutePreference, ICMP6_TYPE_NEIGHBOR_SOLICIT};
use crate::netdata::OnMeshPrefixConfig;
use crate::rs_sender::tests::MockInfraIf;

type Tracker = RxRaTracker<MockInfraIf, StaticRoutingContext>;

const LA: u8 = PrefixInfoOption::ON_LINK_FLAG | PrefixInfoOption::AUTO_ADDR_CONFIG_FLAG;

fn p(s: &str) -> Prefix {
    s.parse().unwrap()
}

fn a(s: &str) -> Ipv6Addr {
    s.parse().unwrap()
}

fn secs(s: u64) -> TimeMilli {
    TimeMilli::from_secs(s)
}

fn context() -> StaticRoutingContext {
    StaticRoutingContext {
        local_on_link_prefix: Some(p("fd00:aaaa:bbbb:cccc::/64")),
        local_omr_prefix: Some(p("2001:db8:cafe:1::/64")),
        ..Default::default()
    }
}

fn tracker_with(config: TrackerConfig) -> Tracker {
    let mut t = RxRaTracker::with_rng(config, MockInfraIf::default(), context(), StdRng::seed_from_u64(42));
    t.start(TimeMilli::ZERO);
    t
}

fn tracker() -> Tracker {
    tracker_with(TrackerConfig::default())
}

fn header(flags: u8, router_lifetime: u16) -> RaHeader {
    RaHeader {
        flags,
        router_lifetime,
        ..Default::default()
    }
}

fn bare_ra() -> RouterAdvertBuilder {
    RouterAdvertBuilder::new(&header(0, 0))
}

fn receive(t: &mut Tracker, from: &str, ra: RouterAdvertBuilder, now: TimeMilli) {
    t.process_router_advert(&ra.build(), a(from), RouterAdvOrigin::AnotherRouter, now);
}

fn na_from(addr: Ipv6Addr) -> Vec<u8> {
    NeighborAdvert { flags: 0x40, target: addr }.to_bytes()
}

/// Runs timers up to `end`. A responsive link answers every probe.
fn run_until(t: &mut Tracker, end: TimeMilli, responsive: bool) {
    while let Some(next) = t.next_fire_time() {
        if next > end {
            break;
        }
        t.handle_timers(next);
        if responsive {
            let probed: Vec<Ipv6Addr> = t
                .routers()
                .iter()
                .filter(|r| r.ns_probe_count() > 0 && r.is_reachable())
                .map(|r| *r.address())
                .collect();
            for addr in probed {
                t.process_neighbor_advert(&na_from(addr), next);
            }
        }
    }
}

fn ns_sent_to(t: &Tracker, dest: Ipv6Addr) -> usize {
    t.infra_if()
        .sent
        .iter()
        .filter(|(pkt, d)| pkt[0] == ICMP6_TYPE_NEIGHBOR_SOLICIT && *d == dest)
        .count()
}

#[test]
fn on_link_prefix_is_favored_then_deprecated_then_removed() {
    let mut t = tracker();
    let prefix = p("2001:db8::/64");
    receive(&mut t, "fe80::a", bare_ra().prefix_info(&prefix, LA, 3600, 1800), TimeMilli::ZERO);

    assert!(t.is_address_on_link(&a("2001:db8::1")));
    assert_eq!(t.decision_factors().favored_on_link_prefix, Some(prefix));
    assert!(t.decision_factors().has_non_ula_on_link);
    assert!(t.take_events().contains(&TrackerEvent::DecisionChanged));
    assert_eq!(t.timers().stale, Some(secs(600)));

    // Never refreshed: the RS cycle started by the stale timer deprecates it.
    run_until(&mut t, secs(1800), true);
    assert_eq!(t.decision_factors().favored_on_link_prefix, None);
    assert!(t.decision_factors().has_non_ula_on_link);
    assert!(t.is_address_on_link(&a("2001:db8::1")));
    assert!(t.take_events().contains(&TrackerEvent::DecisionChanged));
    assert_eq!(t.counters().rs_tx_success, 3);

    run_until(&mut t, secs(3601), true);
    assert!(!t.is_address_on_link(&a("2001:db8::1")));
    assert!(t.routers().is_empty());
    assert_eq!(*t.decision_factors(), DecisionFactors::default());
}

#[test]
fn refreshed_prefix_stays_favored() {
    let mut t = tracker();
    let prefix = p("2001:db8::/64");
    let ra = || bare_ra().prefix_info(&p("2001:db8::/64"), LA, 3600, 1800);
    receive(&mut t, "fe80::a", ra(), TimeMilli::ZERO);

    for refresh in [590, 1180, 1770] {
        run_until(&mut t, secs(refresh), true);
        receive(&mut t, "fe80::a", ra(), secs(refresh));
    }
    run_until(&mut t, secs(1800), true);

    assert_eq!(t.decision_factors().favored_on_link_prefix, Some(prefix));
    assert_eq!(t.counters().rs_tx_success, 0);
}

#[test]
fn unchanged_decision_is_not_signalled_again() {
    let mut t = tracker();
    receive(&mut t, "fe80::a", bare_ra().prefix_info(&p("2001:db8::/64"), LA, 3600, 1800), TimeMilli::ZERO);
    t.take_events();

    t.process_neighbor_advert(&na_from(a("fe80::a")), secs(1));
    assert!(t.take_events().is_empty());
}

#[test]
fn empty_router_is_not_kept() {
    let mut t = tracker();
    receive(&mut t, "fe80::a", bare_ra(), TimeMilli::ZERO);
    assert!(t.routers().is_empty());

    let ra = RouterAdvertBuilder::new(&header(RaHeader::OTHER_CONFIG_FLAG, 0));
    receive(&mut t, "fe80::a", ra, TimeMilli::ZERO);
    assert_eq!(t.routers().len(), 1);
    assert!(t.decision_factors().header_other_config_flag);
}

#[test]
fn expired_route_is_removed_with_its_router() {
    let mut t = tracker();
    receive(&mut t, "fe80::a", bare_ra().route_info(&p("2001:db8:1::/48"), RoutePreference::Medium, 10), TimeMilli::ZERO);
    assert!(t.decision_factors().has_non_ula_route);
    assert_eq!(t.timers().expiration, Some(secs(10)));

    run_until(&mut t, secs(10), true);
    assert!(t.routers().is_empty());
    assert!(!t.decision_factors().has_non_ula_route);
    assert_eq!(t.entry_pool.in_use(), 0);
}

#[test]
fn stale_time_is_latest_among_routers() {
    let mut t = tracker();
    let prefix = p("2001:db8:2::/48");
    receive(&mut t, "fe80::a", bare_ra().route_info(&prefix, RoutePreference::Medium, 300), TimeMilli::ZERO);
    receive(&mut t, "fe80::b", bare_ra().route_info(&prefix, RoutePreference::Medium, 500), TimeMilli::ZERO);

    assert_eq!(t.routers().len(), 2);
    assert_eq!(t.timers().stale, Some(secs(500)));
    assert_eq!(t.timers().expiration, Some(secs(300)));
}

#[test]
fn peer_br_prefixes_are_disregarded_but_listed() {
    let mut t = tracker();
    let ra = bare_ra()
        .prefix_info(&p("fd00:aaaa:bbbb:cccc::/64"), LA, 1800, 1800)
        .route_info(&p("2001:db8:cafe:1::/64"), RoutePreference::Medium, 1800);
    receive(&mut t, "fe80::b", ra, TimeMilli::ZERO);

    let factors = t.decision_factors();
    assert_eq!(factors.favored_on_link_prefix, None);
    assert!(!factors.has_ula_on_link);
    assert!(!factors.has_non_ula_route);
    assert_eq!(factors.reachable_peer_br_count, 1);
    assert!(t.routers()[0].is_peer_br());

    let mut it = t.init_iterator(secs(1));
    assert!(t.next_prefix_table_entry(&mut it).unwrap().is_on_link);
    assert!(!t.next_prefix_table_entry(&mut it).unwrap().is_on_link);
    assert_eq!(t.next_prefix_table_entry(&mut it), Err(TableIterError::NotFound));

    // Peer BRs are checked on the longer interval.
    let router_deadline = t.timers().router.unwrap();
    assert!(router_deadline >= secs(198) && router_deadline <= secs(202));
}

#[test]
fn peer_br_prefixes_dropped_when_not_tracked() {
    let mut t = tracker_with(TrackerConfig {
        track_peer_br_info: false,
        ..Default::default()
    });
    let ra = bare_ra()
        .prefix_info(&p("fd00:aaaa:bbbb:cccc::/64"), LA, 1800, 1800)
        .route_info(&p("2001:db8:cafe:1::/64"), RoutePreference::Medium, 1800);
    receive(&mut t, "fe80::b", ra, TimeMilli::ZERO);
    assert!(t.routers().is_empty());
}

#[test]
fn unanswered_probes_make_router_unreachable() {
    let mut t = tracker();
    let router = a("fe80::a");
    let ra = bare_ra()
        .prefix_info(&p("fd11:22::/64"), LA, 1800, 1800)
        .route_info(&p("2001:db8:1::/48"), RoutePreference::Medium, 1800)
        .rdnss(1800, &[a("2001:db8::53")]);
    receive(&mut t, "fe80::a", ra, TimeMilli::ZERO);
    t.take_events();

    run_until(&mut t, secs(80), false);

    assert_eq!(ns_sent_to(&t, router), 5);
    let r = &t.routers()[0];
    assert!(!r.is_reachable());
    assert!(r.route_prefixes().is_empty());
    assert!(r.rdnss_addresses().is_empty());
    assert_eq!(r.on_link_prefixes().len(), 1);
    assert_eq!(r.on_link_prefixes()[0].preferred_lifetime(), 0);
    assert_eq!(t.timers().router, None);

    let events = t.take_events();
    assert!(events.contains(&TrackerEvent::DecisionChanged));
    assert!(events.contains(&TrackerEvent::RdnssChanged));
}

#[test]
fn probe_carries_link_layer_address() {
    let mut t = tracker();
    receive(&mut t, "fe80::a", bare_ra().route_info(&p("2001:db8:1::/48"), RoutePreference::Medium, 1800), TimeMilli::ZERO);
    let deadline = t.timers().router.unwrap();
    t.handle_timers(deadline);

    let (ns, dest) = &t.infra_if().sent[0];
    assert_eq!(*dest, a("fe80::a"));
    assert_eq!(ns[0], ICMP6_TYPE_NEIGHBOR_SOLICIT);
    assert_eq!(&ns[8..24], &a("fe80::a").octets());
    assert_eq!(ns[24], crate::nd::OPTION_SOURCE_LINK_LAYER_ADDR);
    assert_eq!(t.timers().router, Some(deadline + NS_PROBE_RETRY_INTERVAL_MS));
}

#[test]
fn neighbor_advert_resets_probing() {
    let mut t = tracker();
    receive(&mut t, "fe80::a", bare_ra().route_info(&p("2001:db8:1::/48"), RoutePreference::Medium, 1800), TimeMilli::ZERO);
    let first = t.timers().router.unwrap();
    run_until(&mut t, first + 1500, false);
    assert_eq!(t.routers()[0].ns_probe_count(), 2);

    t.process_neighbor_advert(&na_from(a("fe80::a")), first + 1500);
    assert_eq!(t.routers()[0].ns_probe_count(), 0);

    // NA for an unknown router is ignored.
    t.process_neighbor_advert(&na_from(a("fe80::99")), first + 1600);
    assert_eq!(t.routers().len(), 1);
}

#[test]
fn probing_is_paused_during_rs_cycle() {
    let mut t = tracker();
    receive(&mut t, "fe80::a", bare_ra().route_info(&p("2001:db8:1::/48"), RoutePreference::Medium, 1800), TimeMilli::ZERO);
    let deadline = t.timers().router.unwrap();

    t.rs_sender.start(deadline - 10, &mut t.rng);
    t.handle_timers(deadline);
    assert_eq!(ns_sent_to(&t, a("fe80::a")), 0);
    assert_eq!(t.routers()[0].ns_probe_count(), 1);
}

#[test]
fn rs_cycle_ages_out_stale_entries() {
    let mut t = tracker();
    let ra = bare_ra()
        .prefix_info(&p("2001:db8::/64"), LA, 3600, 3600)
        .route_info(&p("2001:db8:1::/48"), RoutePreference::Medium, 3600)
        .rdnss(3600, &[a("2001:db8::53")]);
    receive(&mut t, "fe80::a", ra, TimeMilli::ZERO);
    t.take_events();

    t.handle_rs_sender_finished(secs(1), secs(5));

    let r = &t.routers()[0];
    assert!(r.route_prefixes().is_empty());
    assert!(r.rdnss_addresses().is_empty());
    assert_eq!(r.on_link_prefixes()[0].preferred_lifetime(), 0);
    let events = t.take_events();
    assert!(events.contains(&TrackerEvent::EvaluateRoutingPolicy(EvaluationDelay::Immediately)));
    assert!(events.contains(&TrackerEvent::RdnssChanged));
}

#[test]
fn entries_newer_than_rs_start_survive() {
    let mut t = tracker();
    receive(&mut t, "fe80::a", bare_ra().route_info(&p("2001:db8:1::/48"), RoutePreference::Medium, 3600), secs(10));
    t.handle_rs_sender_finished(secs(5), secs(12));
    assert_eq!(t.routers()[0].route_prefixes().len(), 1);
}

#[test]
fn pio_without_on_link_flag_removes_entry() {
    let mut t = tracker();
    let prefix = p("2001:db8::/64");
    receive(&mut t, "fe80::a", bare_ra().prefix_info(&prefix, LA, 3600, 1800), TimeMilli::ZERO);
    receive(
        &mut t,
        "fe80::a",
        bare_ra().prefix_info(&prefix, PrefixInfoOption::AUTO_ADDR_CONFIG_FLAG, 3600, 1800),
        secs(1),
    );
    assert!(t.routers().is_empty());
}

#[test]
fn zero_lifetimes_do_not_create_entries() {
    let mut t = tracker();
    let ra = bare_ra()
        .prefix_info(&p("2001:db8::/64"), LA, 0, 0)
        .route_info(&p("2001:db8:1::/48"), RoutePreference::Medium, 0)
        .rdnss(0, &[a("2001:db8::53")]);
    receive(&mut t, "fe80::a", ra, TimeMilli::ZERO);
    assert!(t.routers().is_empty());
}

#[test]
fn link_local_and_multicast_prefixes_are_ignored() {
    let mut t = tracker();
    let ra = bare_ra()
        .prefix_info(&p("fe80::/64"), LA, 1800, 1800)
        .route_info(&p("ff00::/8"), RoutePreference::Medium, 1800);
    receive(&mut t, "fe80::a", ra, TimeMilli::ZERO);
    assert!(t.routers().is_empty());
}

#[test]
fn router_table_is_bounded() {
    let mut t = tracker_with(TrackerConfig {
        max_routers: 2,
        ..Default::default()
    });
    for src in ["fe80::a", "fe80::b", "fe80::c"] {
        receive(&mut t, src, bare_ra().route_info(&p("2001:db8:1::/48"), RoutePreference::Medium, 1800), TimeMilli::ZERO);
    }
    assert_eq!(t.routers().len(), 2);
    assert!(t.routers().iter().all(|r| *r.address() != a("fe80::c")));
}

#[test]
fn entry_pool_is_shared_and_bounded() {
    let mut t = tracker_with(TrackerConfig {
        max_entries: 2,
        ..Default::default()
    });
    let ra = bare_ra()
        .prefix_info(&p("2001:db8::/64"), LA, 1800, 1800)
        .route_info(&p("2001:db8:1::/48"), RoutePreference::Medium, 1800)
        .rdnss(1800, &[a("2001:db8::53")]);
    receive(&mut t, "fe80::a", ra, TimeMilli::ZERO);

    let r = &t.routers()[0];
    assert_eq!(r.on_link_prefixes().len(), 1);
    assert_eq!(r.route_prefixes().len(), 1);
    assert!(r.rdnss_addresses().is_empty());
    assert_eq!(t.entry_pool.in_use(), 2);

    t.stop();
    assert_eq!(t.entry_pool.in_use(), 0);
}

#[test]
fn default_route_rio_overrides_header() {
    let mut t = tracker();
    let ra = RouterAdvertBuilder::new(&header(0, 1800))
        .route_info(&Prefix::empty(), RoutePreference::High, 600)
        .route_info(&p("2001:db8:4::/48"), RoutePreference::Low, 1800);
    receive(&mut t, "fe80::a", ra, TimeMilli::ZERO);

    let routes = t.routers()[0].route_prefixes();
    assert_eq!(routes.len(), 2);
    let default_route = routes.iter().find(|e| e.prefix().is_empty()).unwrap();
    assert_eq!(default_route.valid_lifetime(), 600);
    assert_eq!(default_route.route_preference(), RoutePreference::High);

    assert!(t.is_address_reachable_through_explicit_route(&a("2001:db8:4::1")));
    assert!(!t.is_address_reachable_through_explicit_route(&a("2001:db8:5::1")));
}

#[test]
fn header_default_route_follows_router_lifetime() {
    let mut t = tracker();
    receive(&mut t, "fe80::a", RouterAdvertBuilder::new(&header(0, 1800)), TimeMilli::ZERO);
    assert_eq!(t.routers()[0].route_prefixes()[0].valid_lifetime(), 1800);
    assert!(t.decision_factors().has_non_ula_route);

    receive(&mut t, "fe80::a", RouterAdvertBuilder::new(&header(0, 0)), secs(1));
    assert!(t.routers().is_empty());
}

#[test]
fn rdnss_changes_invoke_callback() {
    let mut t = tracker();
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&calls);
    t.set_rdnss_callback(Some(Box::new(move || {
        counter.fetch_add(1, Ordering::SeqCst);
    })));
    let dns = a("2001:4860::8888");

    receive(&mut t, "fe80::a", bare_ra().rdnss(300, &[dns]), TimeMilli::ZERO);
    assert!(t.take_events().contains(&TrackerEvent::RdnssChanged));
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(t.timers().rdnss_addr, Some(secs(300)));

    receive(&mut t, "fe80::a", bare_ra().rdnss(300, &[dns]), secs(10));
    assert!(!t.take_events().contains(&TrackerEvent::RdnssChanged));

    receive(&mut t, "fe80::a", bare_ra().rdnss(0, &[dns]), secs(20));
    assert!(t.take_events().contains(&TrackerEvent::RdnssChanged));
    assert_eq!(calls.load(Ordering::SeqCst), 2);
    assert!(t.routers().is_empty());
}

#[test]
fn rdnss_expiry_is_reported() {
    let mut t = tracker();
    receive(&mut t, "fe80::a", bare_ra().rdnss(30, &[a("2001:4860::8888")]), TimeMilli::ZERO);
    t.take_events();
    run_until(&mut t, secs(30), true);
    assert!(t.take_events().contains(&TrackerEvent::RdnssChanged));
    assert!(t.routers().is_empty());
}

#[test]
fn local_ra_header_is_tracked() {
    let mut t = tracker();
    t.infra_if_mut().addresses = vec![a("fe80::1"), a("fe80::2")];

    let ra = RouterAdvertBuilder::new(&RaHeader {
        checksum: 0xbeef,
        ..header(RaHeader::MANAGED_ADDRESS_CONFIG_FLAG, 1800)
    });
    t.process_router_advert(&ra.build(), a("fe80::1"), RouterAdvOrigin::ThisBrOtherEntity, TimeMilli::ZERO);

    let local = t.local_ra_header().unwrap();
    assert_eq!(local.checksum, 0);
    assert_eq!(local.router_lifetime, 1800);
    assert!(t.take_events().contains(&TrackerEvent::EvaluateRoutingPolicy(EvaluationDelay::AfterRandomDelay)));
    assert!(t.routers()[0].info(TimeMilli::ZERO, 0).is_local_device);
    assert_eq!(t.timers().router, None);
    assert_eq!(t.timers().stale, Some(secs(600)));

    let mut ours = RaHeader::default();
    t.set_header_flags_on(&mut ours);
    assert!(ours.is_managed_address_config_flag_set());
    assert!(!ours.is_other_config_flag_set());

    // Our own routing manager's RA only refreshes interface addresses.
    t.process_router_advert(&bare_ra().build(), a("fe80::2"), RouterAdvOrigin::ThisBrRoutingManager, secs(1));
    assert_eq!(t.routers().len(), 1);
    assert_eq!(t.if_addresses().len(), 2);

    t.process_router_advert(&bare_ra().build(), a("fe80::1"), RouterAdvOrigin::ThisBrOtherEntity, secs(2));
    assert!(t.local_ra_header().is_none());
    assert!(t.take_events().contains(&TrackerEvent::EvaluateRoutingPolicy(EvaluationDelay::AfterRandomDelay)));
}

#[test]
fn removed_interface_addresses_are_dropped() {
    let mut t = tracker();
    t.infra_if_mut().addresses = vec![a("fe80::1"), a("fe80::2")];
    t.process_router_advert(&bare_ra().build(), a("fe80::1"), RouterAdvOrigin::ThisBrRoutingManager, TimeMilli::ZERO);
    t.process_router_advert(&bare_ra().build(), a("fe80::2"), RouterAdvOrigin::ThisBrRoutingManager, secs(5));
    assert_eq!(t.if_addresses().len(), 2);

    t.infra_if_mut().addresses = vec![a("fe80::2")];
    t.process_router_advert(&bare_ra().build(), a("fe80::2"), RouterAdvOrigin::ThisBrRoutingManager, secs(10));
    assert_eq!(t.if_addresses().len(), 1);

    let mut it = t.init_iterator(secs(12));
    let entry = t.next_if_addr_entry(&mut it).unwrap();
    assert_eq!(entry.address, a("fe80::2"));
    assert_eq!(entry.secs_since_last_use, 2);
    assert_eq!(t.next_if_addr_entry(&mut it), Err(TableIterError::NotFound));
}

#[test]
fn immediate_evaluation_wins_over_delayed() {
    let mut t = tracker();
    let ra = RouterAdvertBuilder::new(&header(0, 1800));
    t.process_router_advert(&ra.build(), a("fe80::1"), RouterAdvOrigin::ThisBrOtherEntity, TimeMilli::ZERO);
    t.handle_rs_sender_finished(TimeMilli::ZERO, secs(1));

    let events = t.take_events();
    assert!(events.contains(&TrackerEvent::EvaluateRoutingPolicy(EvaluationDelay::Immediately)));
    assert!(!events.contains(&TrackerEvent::EvaluateRoutingPolicy(EvaluationDelay::AfterRandomDelay)));
    assert!(t.local_ra_header().is_none());
}

#[test]
fn snac_router_flags_are_ignored() {
    let mut t = tracker();
    let flags = RaHeader::MANAGED_ADDRESS_CONFIG_FLAG | RaHeader::SNAC_ROUTER_FLAG;
    let ra = RouterAdvertBuilder::new(&header(flags, 0)).route_info(&p("2001:db8:1::/48"), RoutePreference::Medium, 1800);
    receive(&mut t, "fe80::a", ra, TimeMilli::ZERO);

    assert!(t.routers()[0].info(TimeMilli::ZERO, 0).snac_router_flag);
    assert!(!t.decision_factors().header_managed_address_config_flag);
}

#[test]
fn net_data_omr_prefix_becomes_disregarded() {
    let mut t = tracker();
    let prefix = p("2001:db8:3::/64");
    receive(&mut t, "fe80::a", bare_ra().route_info(&prefix, RoutePreference::Medium, 1800), TimeMilli::ZERO);
    assert!(t.decision_factors().has_non_ula_route);
    t.take_events();

    t.context_mut().network_data.on_mesh_prefixes.push(OnMeshPrefixConfig::new(prefix));
    t.handle_net_data_changed(secs(1));

    assert!(!t.decision_factors().has_non_ula_route);
    assert_eq!(t.decision_factors().reachable_peer_br_count, 1);
    assert!(t.take_events().contains(&TrackerEvent::DecisionChanged));
    assert!(t.routers()[0].route_prefixes()[0].should_disregard());
}

#[test]
fn local_on_link_prefix_change_disregards_entry() {
    let mut t = tracker();
    let prefix = p("fd00:1234::/64");
    receive(&mut t, "fe80::a", bare_ra().prefix_info(&prefix, LA, 1800, 1800), TimeMilli::ZERO);
    assert!(t.decision_factors().has_ula_on_link);

    t.context_mut().local_on_link_prefix = Some(prefix);
    t.handle_local_on_link_prefix_changed(secs(1));
    assert!(!t.decision_factors().has_ula_on_link);
    assert!(t.is_address_on_link(&a("fd00:1234::5")));
}

#[test]
fn iterator_walks_prefixes_and_routers() {
    let mut t = tracker();
    receive(
        &mut t,
        "fe80::a",
        bare_ra()
            .prefix_info(&p("2001:db8::/64"), LA, 1800, 1800)
            .route_info(&p("2001:db8:1::/48"), RoutePreference::High, 1800),
        TimeMilli::ZERO,
    );
    receive(&mut t, "fe80::b", bare_ra().route_info(&p("2001:db8:2::/48"), RoutePreference::Low, 900), secs(1));

    let mut it = t.init_iterator(secs(3));
    let first = t.next_prefix_table_entry(&mut it).unwrap();
    assert_eq!(first.prefix, p("2001:db8::/64"));
    assert!(first.is_on_link);
    assert_eq!(first.msec_since_last_update, 3000);
    let second = t.next_prefix_table_entry(&mut it).unwrap();
    assert_eq!(second.route_preference, RoutePreference::High);
    let third = t.next_prefix_table_entry(&mut it).unwrap();
    assert_eq!(third.router.address, a("fe80::b"));
    assert_eq!(third.valid_lifetime, 900);
    assert_eq!(t.next_prefix_table_entry(&mut it), Err(TableIterError::NotFound));
    assert_eq!(t.next_prefix_table_entry(&mut it), Err(TableIterError::NotFound));

    let mut it = t.init_iterator(secs(3));
    assert_eq!(t.next_router_entry(&mut it).unwrap().address, a("fe80::a"));
    assert_eq!(t.next_router_entry(&mut it).unwrap().address, a("fe80::b"));
    assert_eq!(t.next_router_entry(&mut it), Err(TableIterError::NotFound));

    let mut it = t.init_iterator(secs(3));
    t.next_prefix_table_entry(&mut it).unwrap();
    assert_eq!(t.next_router_entry(&mut it), Err(TableIterError::InvalidArgs));

    let mut it = t.init_iterator(secs(3));
    assert_eq!(t.next_rdnss_addr_entry(&mut it), Err(TableIterError::NotFound));
}

#[test]
fn history_records_router_lifecycle() {
    let mut t = tracker();
    let prefix = p("2001:db8:1::/48");
    receive(&mut t, "fe80::a", bare_ra().route_info(&prefix, RoutePreference::Medium, 1800), TimeMilli::ZERO);
    let ra = RouterAdvertBuilder::new(&header(RaHeader::MANAGED_ADDRESS_CONFIG_FLAG, 0))
        .route_info(&prefix, RoutePreference::Medium, 1800);
    receive(&mut t, "fe80::a", ra, secs(1));
    receive(&mut t, "fe80::a", bare_ra().route_info(&prefix, RoutePreference::Medium, 0), secs(2));

    let kinds: Vec<AilRouterEventKind> = t.history().iter().map(|e| e.kind).collect();
    assert_eq!(
        kinds,
        vec![AilRouterEventKind::Added, AilRouterEventKind::Changed, AilRouterEventKind::Removed]
    );
    assert!(t.history().iter().nth(1).unwrap().managed_address_config_flag);
}

#[test]
fn stop_clears_state_and_ignores_input() {
    let mut t = tracker();
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&calls);
    t.set_rdnss_callback(Some(Box::new(move || {
        counter.fetch_add(1, Ordering::SeqCst);
    })));
    receive(
        &mut t,
        "fe80::a",
        bare_ra().prefix_info(&p("2001:db8::/64"), LA, 1800, 1800).rdnss(300, &[a("2001:4860::8888")]),
        TimeMilli::ZERO,
    );
    t.handle_rs_sender_finished(secs(1), secs(1));
    t.stop();

    assert!(!t.is_running());
    assert!(t.routers().is_empty());
    assert_eq!(t.next_fire_time(), None);
    assert_eq!(*t.decision_factors(), DecisionFactors::default());
    assert!(t.take_events().is_empty());
    assert_eq!(calls.load(Ordering::SeqCst), 0);

    receive(&mut t, "fe80::a", bare_ra().prefix_info(&p("2001:db8::/64"), LA, 1800, 1800), secs(1));
    assert!(t.routers().is_empty());
}

#[test]
fn malformed_ra_is_ignored() {
    let mut t = tracker();
    t.process_router_advert(&[134, 0, 0], a("fe80::a"), RouterAdvOrigin::AnotherRouter, TimeMilli::ZERO);
    t.process_router_advert(&[133; 16], a("fe80::a"), RouterAdvOrigin::AnotherRouter, TimeMilli::ZERO);
    assert!(t.routers().is_empty());
    assert!(t.take_events().is_empty());
}
