//! Transfer statistics.

use std::time::{Duration, Instant};

/// Human-readable view of [`TransportStats`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatsSummary {
    /// Every size but the received total, e.g. `["sent: 2.0 kB"]`.
    pub sizes: Vec<String>,
    /// Split of the wall time, e.g. `["Local: 1s", "NET: 2s", ...]`.
    pub times: Vec<String>,
    /// One line, e.g. `Received 20.1 MB (sent: 2.0 kB) in 4m 21s (...)`.
    pub line: String,
}

/// Counters accumulated by a transport.
///
/// The summary is rebuilt lazily on read after any counter changed.
#[derive(Debug)]
pub struct TransportStats {
    calls: u64,
    net_time: Duration,
    sleep_time: Duration,
    sent: u64,
    received: u64,
    last_url: Option<String>,
    started: Instant,
    summary: Option<StatsSummary>,
}

impl Default for TransportStats {
    fn default() -> Self {
        Self {
            calls: 0,
            net_time: Duration::ZERO,
            sleep_time: Duration::ZERO,
            sent: 0,
            received: 0,
            last_url: None,
            started: Instant::now(),
            summary: None,
        }
    }
}

impl TransportStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> u64 {
        self.calls
    }

    pub fn net_time(&self) -> Duration {
        self.net_time
    }

    pub fn sleep_time(&self) -> Duration {
        self.sleep_time
    }

    pub fn sent(&self) -> u64 {
        self.sent
    }

    pub fn received(&self) -> u64 {
        self.received
    }

    pub fn last_url(&self) -> Option<&str> {
        self.last_url.as_deref()
    }

    pub fn record_call(&mut self) {
        self.calls += 1;
        self.summary = None;
    }

    pub fn record_sleep(&mut self, wait: Duration) {
        self.sleep_time += wait;
        self.summary = None;
    }

    pub fn record_exchange(&mut self, elapsed: Duration, sent: u64, received: u64) {
        self.net_time += elapsed;
        self.sent += sent;
        self.received += received;
        self.summary = None;
    }

    pub fn set_last_url(&mut self, url: impl Into<String>) {
        self.last_url = Some(url.into());
        self.summary = None;
    }

    /// Time since these stats were created.
    pub fn wall_time(&self) -> Duration {
        self.started.elapsed()
    }

    pub fn is_dirty(&self) -> bool {
        self.summary.is_none()
    }

    /// Formatted summary, recomputed only when a counter changed.
    pub fn summary(&mut self) -> &StatsSummary {
        let (calls, net, sleep, sent, received) =
            (self.calls, self.net_time, self.sleep_time, self.sent, self.received);
        let wall = self.started.elapsed();

        self.summary.get_or_insert_with(|| {
            let local = wall.saturating_sub(net).saturating_sub(sleep);
            let sizes = vec![format!("sent: {}", byte_string(sent))];
            let times = vec![
                format!("Local: {}", time_string(local)),
                format!("NET: {}", time_string(net)),
                format!("Sleep: {}", time_string(sleep)),
                format!("Requests: {calls}"),
            ];
            let line = format!(
                "Received {} ({}) in {} ({})",
                byte_string(received),
                sizes.join(", "),
                time_string(wall),
                times.join(", ")
            );
            StatsSummary { sizes, times, line }
        })
    }
}

/// `512 B`, `1.5 kB`, `20.1 MB`
pub fn byte_string(bytes: u64) -> String {
    const UNITS: [&str; 5] = ["B", "kB", "MB", "GB", "TB"];
    if bytes < 1024 {
        return format!("{bytes} B");
    }
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    format!("{value:.1} {}", UNITS[unit])
}

/// `0.250s`, `42s`, `4m 21s`, `1h 2m 3s`
pub fn time_string(duration: Duration) -> String {
    let secs = duration.as_secs();
    if secs < 10 {
        return format!("{:.3}s", duration.as_secs_f64());
    }
    let (h, m, s) = (secs / 3600, secs % 3600 / 60, secs % 60);
    match (h, m) {
        (0, 0) => format!("{s}s"),
        (0, _) => format!("{m}m {s}s"),
        _ => format!("{h}h {m}m {s}s"),
    }
}
