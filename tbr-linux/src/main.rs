// Thread border router RA tracker daemon for Linux.

mod config;
mod infra_if;

use std::net::Ipv6Addr;
use std::time::{Duration, Instant};

use anyhow::{bail, Context};
use tbr_core::nd;
use tbr_core::rx_ra_tracker::{RouterAdvOrigin, RxRaTracker, TrackerEvent};
use tbr_core::{InfraIf, StaticRoutingContext, TimeMilli};
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

use crate::config::Config;
use crate::infra_if::LinuxInfraIf;

const VERSION: &str = env!("CARGO_PKG_VERSION");

type Tracker = RxRaTracker<LinuxInfraIf, StaticRoutingContext>;

fn main() -> anyhow::Result<()> {
    let mut decode_arg = None;
    let mut args = std::env::args().skip(1);
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--version" | "-V" => {
                println!("tbr-linux {}", VERSION);
                return Ok(());
            }
            "--decode-srp" => {
                decode_arg = Some(args.next().context("--decode-srp needs a hex argument")?);
            }
            other => bail!("unknown argument: {}", other),
        }
    }

    let cfg = config::load()?;
    init_tracing(&cfg.log_level);

    if let Some(coded) = decode_arg {
        return decode_srp(&coded, &cfg);
    }

    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(run(cfg))
}

fn init_tracing(default_level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

/// Transcodes one coded SRP message to a DNS Update and prints it as hex.
fn decode_srp(coded: &str, cfg: &Config) -> anyhow::Result<()> {
    let coded = hex::decode(coded.trim()).context("coded message is not valid hex")?;
    let update = tbr_core::decode_srp(&coded, &cfg.routing_context())?;
    println!("{}", hex::encode(update));
    Ok(())
}

/// Monotonic milliseconds since daemon start.
struct Clock(Instant);

impl Clock {
    fn now(&self) -> TimeMilli {
        TimeMilli(self.0.elapsed().as_millis() as u64)
    }
}

async fn run(cfg: Config) -> anyhow::Result<()> {
    let infra_if = LinuxInfraIf::open(&cfg.infra_if)
        .with_context(|| format!("failed to open infrastructure interface {}", cfg.infra_if))?;
    let socket = infra_if.socket();
    info!("tracking routers on {}", infra_if.name());

    let clock = Clock(Instant::now());
    let mut tracker = RxRaTracker::new(cfg.tracker.clone(), infra_if, cfg.routing_context());
    tracker.set_rdnss_callback(Some(Box::new(|| info!("RDNSS address set changed"))));
    tracker.start(clock.now());

    let shutdown = shutdown_signal();
    tokio::pin!(shutdown);

    loop {
        let deadline = tracker.next_fire_time();
        let wait = deadline.map_or(Duration::ZERO, |t| Duration::from_millis(t.since(clock.now())));

        tokio::select! {
            res = &mut shutdown => {
                res?;
                info!("shutting down");
                break;
            }
            received = infra_if::recv(&socket) => {
                let (packet, src) = received?;
                handle_packet(&mut tracker, &packet, src, clock.now());
            }
            _ = tokio::time::sleep(wait), if deadline.is_some() => {
                tracker.handle_timers(clock.now());
            }
        }

        log_events(&mut tracker);
    }

    tracker.stop();
    Ok(())
}

fn handle_packet(tracker: &mut Tracker, packet: &[u8], src: Ipv6Addr, now: TimeMilli) {
    match packet.first().copied() {
        Some(nd::ICMP6_TYPE_ROUTER_ADVERT) => {
            tracker.infra_if_mut().refresh_addresses();
            let origin = if tracker.infra_if().has_address(&src) {
                RouterAdvOrigin::ThisBrOtherEntity
            } else {
                RouterAdvOrigin::AnotherRouter
            };
            debug!("RA from {} ({} bytes)", src, packet.len());
            tracker.process_router_advert(packet, src, origin, now);
        }
        Some(nd::ICMP6_TYPE_NEIGHBOR_ADVERT) => tracker.process_neighbor_advert(packet, now),
        _ => {}
    }
}

fn log_events(tracker: &mut Tracker) {
    for event in tracker.take_events() {
        match event {
            TrackerEvent::DecisionChanged => {
                let factors = tracker.decision_factors();
                info!(
                    favored_on_link_prefix = ?factors.favored_on_link_prefix,
                    has_ula_on_link = factors.has_ula_on_link,
                    has_non_ula_on_link = factors.has_non_ula_on_link,
                    has_non_ula_route = factors.has_non_ula_route,
                    m_flag = factors.header_managed_address_config_flag,
                    o_flag = factors.header_other_config_flag,
                    reachable_peer_brs = factors.reachable_peer_br_count,
                    "routing decision changed"
                );
            }
            TrackerEvent::RdnssChanged => {}
            TrackerEvent::EvaluateRoutingPolicy(delay) => {
                debug!("routing policy evaluation requested ({:?})", delay);
            }
        }
    }
}

/// Wait for Ctrl+C or SIGTERM.
async fn shutdown_signal() -> std::io::Result<()> {
    use tokio::signal::unix::{signal, SignalKind};
    let mut sigterm = signal(SignalKind::terminate())?;
    tokio::select! {
        res = tokio::signal::ctrl_c() => res?,
        _ = sigterm.recv() => {}
    }
    Ok(())
}
