//! Logging setup and rate-limited reporting.
//!
//! # Architecture
//!
//! ```text
//! tracing macros ──▶ fmt subscriber ──▶ stdout
//!   any thread         (no ANSI)         UART0 console on the board
//! ```
//!
//! # Rules
//!
//! - Task loops never log per event on a hot failure path; they go through a
//!   [`RateLimiter`] which emits at most once per interval and reports how
//!   many events it swallowed in between.
//! - Logging is best-effort: a second `init` is a no-op.

use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tracing_subscriber::EnvFilter;

/// Install the global subscriber.
///
/// `default_level` applies when `RUST_LOG` is not set (e.g. `"info"` or
/// `"light_tower_link=debug"`).
///
/// # Returns
///
/// `true` if this call installed the subscriber.
pub fn init(default_level: &str) -> bool {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_ansi(false)
        .with_target(true)
        .try_init()
        .is_ok()
}

struct RateState {
    last_emit: Option<Instant>,
    suppressed: u32,
}

/// Lets one event through per interval and counts the rest.
///
/// # Usage
///
/// ```ignore
/// let unknown = RateLimiter::new(Duration::from_secs(5));
///
/// if let Some(suppressed) = unknown.check() {
///     warn!(name, suppressed, "unknown item");
/// }
/// ```
pub struct RateLimiter {
    interval: Duration,
    state: Mutex<RateState>,
}

impl RateLimiter {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            state: Mutex::new(RateState {
                last_emit: None,
                suppressed: 0,
            }),
        }
    }

    /// Record one event.
    ///
    /// Returns `Some(n)` if it should be logged now, where `n` is the number
    /// of events suppressed since the last emission.
    pub fn check(&self) -> Option<u32> {
        self.check_at(Instant::now())
    }

    fn check_at(&self, now: Instant) -> Option<u32> {
        let mut state = self.state.lock();
        let due = state
            .last_emit
            .map_or(true, |last| now.saturating_duration_since(last) >= self.interval);
        if due {
            state.last_emit = Some(now);
            Some(std::mem::take(&mut state.suppressed))
        } else {
            state.suppressed += 1;
            None
        }
    }
}

/// Fires once per interval when polled from a loop.
pub struct Interval {
    period: Duration,
    last: Instant,
}

impl Interval {
    pub fn new(period: Duration) -> Self {
        Self {
            period,
            last: Instant::now(),
        }
    }

    /// `true` once per elapsed period.
    pub fn tick(&mut self) -> bool {
        if self.last.elapsed() >= self.period {
            self.last = Instant::now();
            true
        } else {
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rate_limiter_first_event_passes() {
        let limiter = RateLimiter::new(Duration::from_secs(5));
        assert_eq!(limiter.check(), Some(0));
    }

    #[test]
    fn test_rate_limiter_counts_suppressed() {
        let limiter = RateLimiter::new(Duration::from_secs(5));
        let t0 = Instant::now();

        assert_eq!(limiter.check_at(t0), Some(0));
        assert_eq!(limiter.check_at(t0 + Duration::from_secs(1)), None);
        assert_eq!(limiter.check_at(t0 + Duration::from_secs(2)), None);
        assert_eq!(limiter.check_at(t0 + Duration::from_secs(6)), Some(2));
        assert_eq!(limiter.check_at(t0 + Duration::from_secs(7)), None);
    }

    #[test]
    fn test_interval_tick() {
        let mut every = Interval::new(Duration::from_millis(10));
        assert!(!every.tick());
        std::thread::sleep(Duration::from_millis(15));
        assert!(every.tick());
        assert!(!every.tick());
    }

    #[test]
    fn test_init_twice_is_noop() {
        let _ = init("warn");
        assert!(!init("warn"));
    }
}
