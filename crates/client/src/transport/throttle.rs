//! Per-host request spacing.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use rand::Rng;

/// Last-call clock and call counters, grouped by host.
#[derive(Debug, Default)]
pub struct ThrottleClock {
    last_call: HashMap<String, Instant>,
    host_calls: HashMap<String, u64>,
    calls: u64,
}

impl ThrottleClock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Range the next call to `host` should sleep for, or `None` for the
    /// first call. `min` and `max` may be given in either order.
    pub fn window(&self, host: &str, min: Duration, max: Duration, now: Instant) -> Option<(Duration, Duration)> {
        let (min, max) = if min <= max { (min, max) } else { (max, min) };
        let last = self.last_call.get(host)?;
        let elapsed = now.saturating_duration_since(*last);
        Some((min.saturating_sub(elapsed), max.saturating_sub(elapsed)))
    }

    /// Pick a delay inside [`window`](Self::window).
    pub fn delay(&self, host: &str, min: Duration, max: Duration, now: Instant) -> Duration {
        match self.window(host, min, max, now) {
            Some((lo, hi)) if hi > lo => rand::thread_rng().gen_range(lo..=hi),
            Some((lo, _)) => lo,
            None => Duration::ZERO,
        }
    }

    /// Mark a call to `host` at `now`.
    pub fn record(&mut self, host: &str, now: Instant) {
        self.last_call.insert(host.to_string(), now);
        *self.host_calls.entry(host.to_string()).or_default() += 1;
        self.calls += 1;
    }

    pub fn calls(&self) -> u64 {
        self.calls
    }

    pub fn host_calls(&self, host: &str) -> u64 {
        self.host_calls.get(host).copied().unwrap_or(0)
    }
}
