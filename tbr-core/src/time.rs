//! Millisecond time, one-shot deadlines and jitter.
//! Host-driven: the host supplies `now` and polls the earliest deadline.

use std::fmt;
use std::ops::{Add, Sub};

use rand::Rng;
use serde::Serialize;

/// Longest delay a timer accepts (2^31 - 1 ms). Lifetimes converted to
/// absolute times are clamped to it.
pub const MAX_DELAY_MS: u64 = (1 << 31) - 1;

/// Monotonic time in milliseconds, supplied by the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize)]
pub struct TimeMilli(pub u64);

impl TimeMilli {
    pub const ZERO: TimeMilli = TimeMilli(0);

    pub fn from_secs(secs: u64) -> Self {
        TimeMilli(secs.saturating_mul(1000))
    }

    pub fn as_millis(self) -> u64 {
        self.0
    }

    /// Whole seconds, used as the uptime base for ages.
    pub fn as_secs(self) -> u64 {
        self.0 / 1000
    }

    /// Milliseconds elapsed from `earlier` to `self` (zero if `earlier` is later).
    pub fn since(self, earlier: TimeMilli) -> u64 {
        self.0.saturating_sub(earlier.0)
    }
}

impl Add<u64> for TimeMilli {
    type Output = TimeMilli;

    fn add(self, ms: u64) -> TimeMilli {
        TimeMilli(self.0.saturating_add(ms))
    }
}

impl Sub<u64> for TimeMilli {
    type Output = TimeMilli;

    fn sub(self, ms: u64) -> TimeMilli {
        TimeMilli(self.0.saturating_sub(ms))
    }
}

impl fmt::Display for TimeMilli {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}ms", self.0)
    }
}

/// `start + lifetime_secs`, with the delay clamped to [`MAX_DELAY_MS`].
pub fn clamped_expiration(start: TimeMilli, lifetime_secs: u32) -> TimeMilli {
    let delay = u64::from(lifetime_secs).saturating_mul(1000).min(MAX_DELAY_MS);
    start + delay
}

/// Uniform in `[value - jitter, value + jitter]`.
pub fn add_jitter<R: Rng + ?Sized>(rng: &mut R, value: u64, jitter: u64) -> u64 {
    let jitter = jitter.min(value);
    value - jitter + rng.gen_range(0..=2 * jitter)
}

/// Accumulates the earliest of several deadlines, never earlier than `now`.
#[derive(Debug, Clone, Copy)]
pub struct NextFireTime {
    now: TimeMilli,
    next: Option<TimeMilli>,
}

impl NextFireTime {
    pub fn new(now: TimeMilli) -> Self {
        Self { now, next: None }
    }

    pub fn now(&self) -> TimeMilli {
        self.now
    }

    pub fn update_if_earlier(&mut self, time: TimeMilli) {
        let time = time.max(self.now);
        self.next = Some(match self.next {
            Some(next) => next.min(time),
            None => time,
        });
    }

    pub fn get(&self) -> Option<TimeMilli> {
        self.next
    }
}

/// One-shot deadline. Stopped when `None`.
#[derive(Debug, Clone, Copy, Default)]
pub struct Timer {
    fire_time: Option<TimeMilli>,
}

impl Timer {
    pub fn start_at(&mut self, time: TimeMilli) {
        self.fire_time = Some(time);
    }

    /// Arm at the accumulated deadline, or stop if nothing was accumulated.
    pub fn fire_at(&mut self, next: &NextFireTime) {
        self.fire_time = next.get();
    }

    pub fn stop(&mut self) {
        self.fire_time = None;
    }

    pub fn is_running(&self) -> bool {
        self.fire_time.is_some()
    }

    pub fn fire_time(&self) -> Option<TimeMilli> {
        self.fire_time
    }

    /// Stops and returns true if the deadline has been reached.
    pub fn take_if_due(&mut self, now: TimeMilli) -> bool {
        match self.fire_time {
            Some(t) if t <= now => {
                self.fire_time = None;
                true
            }
            _ => false,
        }
    }
}

/// Earliest of optional deadlines.
pub fn earliest(times: impl IntoIterator<Item = Option<TimeMilli>>) -> Option<TimeMilli> {
    times.into_iter().flatten().min()
}
