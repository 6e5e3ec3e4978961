//! Router Solicitation burst: a randomly delayed first RS, then up to
//! `MAX_TX_COUNT` transmissions, then a short wait for RAs before the
//! cycle is reported finished.

use rand::Rng;
use serde::Serialize;
use tracing::{error, info};

use crate::infra::InfraIf;
use crate::ip6::LINK_LOCAL_ALL_ROUTERS;
use crate::nd;
use crate::time::{TimeMilli, Timer};

pub const MAX_START_DELAY_MS: u64 = 1000;
pub const TX_INTERVAL_MS: u64 = 4000;
pub const RETRY_DELAY_MS: u64 = 4000;
pub const WAIT_ON_LAST_ATTEMPT_MS: u64 = 1000;
pub const MAX_TX_COUNT: u8 = 3;

/// Platform-visible RS transmission counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BorderRoutingCounters {
    pub rs_tx_success: u32,
    pub rs_tx_failure: u32,
}

#[derive(Debug, Clone, Default)]
pub struct RsSender {
    tx_count: u8,
    start_time: TimeMilli,
    timer: Timer,
}

impl RsSender {
    pub fn new() -> Self {
        Self::default()
    }

    /// No-op while a cycle is already running.
    pub fn start<R: Rng + ?Sized>(&mut self, now: TimeMilli, rng: &mut R) {
        if self.is_in_progress() {
            return;
        }
        let delay = rng.gen_range(0..MAX_START_DELAY_MS);
        info!("RsSender: starting, first RS in {} msec", delay);
        self.tx_count = 0;
        self.start_time = now;
        self.timer.start_at(now + delay);
    }

    pub fn stop(&mut self) {
        self.timer.stop();
    }

    pub fn is_in_progress(&self) -> bool {
        self.timer.is_running()
    }

    pub fn fire_time(&self) -> Option<TimeMilli> {
        self.timer.fire_time()
    }

    pub fn tx_count(&self) -> u8 {
        self.tx_count
    }

    /// Runs the timer if due. Returns the cycle start time once the
    /// cycle has finished; the sender is then idle.
    pub fn handle_timer<I: InfraIf + ?Sized>(
        &mut self,
        now: TimeMilli,
        infra_if: &mut I,
        counters: &mut BorderRoutingCounters,
    ) -> Option<TimeMilli> {
        if !self.timer.take_if_due(now) {
            return None;
        }

        if self.tx_count >= MAX_TX_COUNT {
            info!("RsSender: finished sending RS msgs and waiting for RAs");
            return Some(self.start_time);
        }

        let delay = match infra_if.send(&nd::router_solicit(), &LINK_LOCAL_ALL_ROUTERS) {
            Ok(()) => {
                counters.rs_tx_success += 1;
                self.tx_count += 1;
                info!("RsSender: sent RS {}/{}", self.tx_count, MAX_TX_COUNT);
                if self.tx_count == MAX_TX_COUNT {
                    WAIT_ON_LAST_ATTEMPT_MS
                } else {
                    TX_INTERVAL_MS
                }
            }
            Err(e) => {
                counters.rs_tx_failure += 1;
                error!("RsSender: failed to send RS {}/{}: {}", self.tx_count + 1, MAX_TX_COUNT, e);
                // A failed attempt does not count toward the budget.
                RETRY_DELAY_MS
            }
        };

        self.timer.start_at(now + delay);
        None
    }
}
