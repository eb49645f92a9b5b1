//! Exponentially decaying measurements.
//!
//! Both types take the current time as an argument rather than reading the clock, which keeps
//! them deterministic under test. A `now` earlier than the last update is treated as the last
//! update, so the decay is monotonic in time.

use std::time::{Duration, Instant};

fn decay(elapsed: Duration, half_life: Duration) -> f64 {
    if half_life.is_zero() {
        return 0.0;
    }
    0.5f64.powf(elapsed.as_secs_f64() / half_life.as_secs_f64())
}

/// Tracks how many units of something (e.g. messages being processed) are active, smoothed
/// over time.
///
/// The reading converges towards the number of active units with the configured half-life.
#[derive(Debug, Clone)]
pub struct ContinuousMeter {
    half_life: Duration,
    value: f64,
    active: f64,
    last_updated: Instant,
}

impl ContinuousMeter {
    pub fn new(half_life: Duration, now: Instant) -> Self {
        ContinuousMeter { half_life, value: 0.0, active: 0.0, last_updated: now }
    }

    fn advance(&mut self, now: Instant) {
        if now <= self.last_updated {
            return;
        }
        self.value = self.read(now);
        self.last_updated = now;
    }

    pub fn inc(&mut self, now: Instant, amount: f64) {
        self.advance(now);
        self.active += amount;
    }

    pub fn dec(&mut self, now: Instant, amount: f64) {
        self.advance(now);
        self.active = (self.active - amount).max(0.0);
    }

    pub fn read(&self, now: Instant) -> f64 {
        let elapsed = now.saturating_duration_since(self.last_updated);
        self.active + (self.value - self.active) * decay(elapsed, self.half_life)
    }

    pub fn active(&self) -> f64 {
        self.active
    }

    /// How long until the reading drops to `target`, assuming no further updates. `None` if it
    /// never will.
    pub fn time_until(&self, now: Instant, target: f64) -> Option<Duration> {
        let current = self.read(now);
        if current <= target {
            return Some(Duration::from_secs(0));
        }
        if self.active >= target {
            return None;
        }
        let halvings = ((current - self.active) / (target - self.active)).log2();
        Some(self.half_life.mul_f64(halvings))
    }
}

/// Time-weighted moving average of observations.
#[derive(Debug, Clone)]
pub struct Averager {
    half_life: Duration,
    weighted_sum: f64,
    normalizer: f64,
    last_updated: Instant,
}

impl Averager {
    pub fn new(initial: f64, half_life: Duration, now: Instant) -> Self {
        Averager { half_life, weighted_sum: initial, normalizer: 1.0, last_updated: now }
    }

    pub fn observe(&mut self, value: f64, now: Instant) {
        let factor = decay(now.saturating_duration_since(self.last_updated), self.half_life);
        self.weighted_sum = self.weighted_sum * factor + value;
        self.normalizer = self.normalizer * factor + 1.0;
        if now > self.last_updated {
            self.last_updated = now;
        }
    }

    pub fn read(&self) -> f64 {
        self.weighted_sum / self.normalizer
    }
}
