//! Rate limiting for repeated warnings.
//!
//! Dropped delivery requests and failing connectivity polls can repeat many
//! times a second. Callers record each occurrence and let the warner decide
//! when a summary line is due.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use once_cell::sync::Lazy;

/// Default minimum spacing between two emitted warnings.
pub const DEFAULT_WARN_INTERVAL: Duration = Duration::from_secs(5);

static EPOCH: Lazy<Instant> = Lazy::new(Instant::now);

fn now_millis() -> u64 {
    u64::try_from(EPOCH.elapsed().as_millis()).unwrap_or(u64::MAX)
}

/// Counts suppressed events and emits at most one warning per interval.
///
/// [`record`](Self::record) increments the counter. The next call to
/// [`warn_if_due`](Self::warn_if_due) hands the accumulated count to the
/// supplied callback once the interval has elapsed. [`flush`](Self::flush)
/// reports pending events immediately.
#[derive(Debug)]
pub struct RateLimitedWarner {
    interval_ms: u64,
    /// `None` encoded as `u64::MAX` so the first warning is never delayed.
    last_warn: AtomicU64,
    pending: AtomicU64,
}

impl Default for RateLimitedWarner {
    fn default() -> Self {
        Self::new(DEFAULT_WARN_INTERVAL)
    }
}

impl RateLimitedWarner {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval_ms: u64::try_from(interval.as_millis()).unwrap_or(u64::MAX),
            last_warn: AtomicU64::new(u64::MAX),
            pending: AtomicU64::new(0),
        }
    }

    /// Count one suppressed event.
    pub fn record(&self) {
        self.pending.fetch_add(1, Ordering::Relaxed);
    }

    /// Emit a warning if the interval has elapsed since the last one.
    pub fn warn_if_due(&self, warn: impl FnOnce(u64)) {
        let now = now_millis();
        let prev = self.last_warn.load(Ordering::Relaxed);
        let due = prev == u64::MAX || now.saturating_sub(prev) >= self.interval_ms;
        if !due {
            return;
        }
        if self
            .last_warn
            .compare_exchange(prev, now, Ordering::Relaxed, Ordering::Relaxed)
            .is_err()
        {
            return;
        }
        let count = self.pending.swap(0, Ordering::Relaxed);
        if count > 0 {
            warn(count);
        }
    }

    /// Record one event and warn if due.
    pub fn record_and_warn(&self, warn: impl FnOnce(u64)) {
        self.record();
        self.warn_if_due(warn);
    }

    /// Immediately report any pending events.
    pub fn flush(&self, warn: impl FnOnce(u64)) {
        let count = self.pending.swap(0, Ordering::Relaxed);
        if count > 0 {
            warn(count);
            self.last_warn.store(now_millis(), Ordering::Relaxed);
        }
    }
}
