use axum::http::{HeaderMap, HeaderValue};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use crate::rate_limit_config::Quota;

/// Time source for window accounting
pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// Outcome of an admission check
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Decision {
    pub allowed: bool,
    pub limit: u64,
    pub remaining: u64,
    /// Time until the current window resets
    pub reset_after: Duration,
}

impl Decision {
    /// Write the `X-RateLimit-*` headers, plus `Retry-After` on rejection
    pub fn apply_headers(&self, headers: &mut HeaderMap) {
        let reset_secs = self.reset_after.as_secs_f64().ceil() as u64;
        headers.insert("x-ratelimit-limit", HeaderValue::from(self.limit));
        headers.insert("x-ratelimit-remaining", HeaderValue::from(self.remaining));
        headers.insert("x-ratelimit-reset", HeaderValue::from(reset_secs));
        if !self.allowed {
            headers.insert("retry-after", HeaderValue::from(reset_secs.max(1)));
        }
    }
}

/// Fixed-window counter for one client
#[derive(Debug, Clone)]
struct Window {
    started: Instant,
    count: u64,
}

/// In-process fixed-window admission control keyed by client.
///
/// State is local to this instance; nothing is shared across processes.
#[derive(Clone)]
pub struct RateLimiter {
    quota: Quota,
    clock: Arc<dyn Clock>,
    windows: Arc<Mutex<HashMap<String, Window>>>,
}

impl RateLimiter {
    pub fn new(quota: Quota) -> Self {
        Self::with_clock(quota, Arc::new(SystemClock))
    }

    pub fn with_clock(quota: Quota, clock: Arc<dyn Clock>) -> Self {
        Self {
            quota,
            clock,
            windows: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn quota(&self) -> Quota {
        self.quota
    }

    /// Count one request for `key` and decide whether it may proceed
    pub fn admit(&self, key: &str) -> Decision {
        let now = self.clock.now();
        let period = self.quota.period;
        let limit = self.quota.limit;

        let mut windows = self
            .windows
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        let window = windows.entry(key.to_string()).or_insert(Window {
            started: now,
            count: 0,
        });

        if now.saturating_duration_since(window.started) >= period {
            window.started = now;
            window.count = 0;
        }

        window.count = window.count.saturating_add(1);
        let elapsed = now.saturating_duration_since(window.started);

        Decision {
            allowed: window.count <= limit,
            limit,
            remaining: limit.saturating_sub(window.count),
            reset_after: period.saturating_sub(elapsed),
        }
    }

    /// Drop windows that have fully elapsed, returning how many were removed
    pub fn prune_expired(&self) -> usize {
        let now = self.clock.now();
        let period = self.quota.period;

        let mut windows = self
            .windows
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let initial_count = windows.len();
        windows.retain(|_, window| now.saturating_duration_since(window.started) < period);
        initial_count - windows.len()
    }

    /// Number of clients currently tracked
    pub fn tracked_clients(&self) -> usize {
        self.windows
            .lock()
            .map(|windows| windows.len())
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Clone)]
    struct MockClock {
        current: Arc<Mutex<Instant>>,
    }

    impl MockClock {
        fn new() -> Self {
            Self {
                current: Arc::new(Mutex::new(Instant::now())),
            }
        }

        fn advance(&self, duration: Duration) {
            *self.current.lock().unwrap() += duration;
        }
    }

    impl Clock for MockClock {
        fn now(&self) -> Instant {
            *self.current.lock().unwrap()
        }
    }

    fn limiter(limit: u64) -> (RateLimiter, MockClock) {
        let clock = MockClock::new();
        let limiter = RateLimiter::with_clock(Quota::per_second(limit), Arc::new(clock.clone()));
        (limiter, clock)
    }

    #[test]
    fn test_nth_admitted_next_rejected() {
        let (limiter, _clock) = limiter(3);

        for expected_remaining in [2, 1, 0] {
            let decision = limiter.admit("client");
            assert!(decision.allowed);
            assert_eq!(decision.remaining, expected_remaining);
        }

        let decision = limiter.admit("client");
        assert!(!decision.allowed);
        assert_eq!(decision.remaining, 0);
    }

    #[test]
    fn test_window_resets_after_period() {
        let (limiter, clock) = limiter(1);

        assert!(limiter.admit("client").allowed);
        assert!(!limiter.admit("client").allowed);

        clock.advance(Duration::from_millis(999));
        assert!(!limiter.admit("client").allowed);

        clock.advance(Duration::from_millis(1));
        assert!(limiter.admit("client").allowed);
    }

    #[test]
    fn test_clients_are_independent() {
        let (limiter, _clock) = limiter(1);

        assert!(limiter.admit("a").allowed);
        assert!(limiter.admit("b").allowed);
        assert!(!limiter.admit("a").allowed);
        assert_eq!(limiter.tracked_clients(), 2);
    }

    #[test]
    fn test_reset_after_counts_down() {
        let (limiter, clock) = limiter(5);

        assert_eq!(limiter.admit("c").reset_after, Duration::from_secs(1));
        clock.advance(Duration::from_millis(400));
        assert_eq!(limiter.admit("c").reset_after, Duration::from_millis(600));
    }

    #[test]
    fn test_prune_expired() {
        let (limiter, clock) = limiter(1);
        limiter.admit("old");
        clock.advance(Duration::from_millis(500));
        limiter.admit("new");
        clock.advance(Duration::from_millis(600));

        assert_eq!(limiter.prune_expired(), 1);
        assert_eq!(limiter.tracked_clients(), 1);
    }

    #[test]
    fn test_headers() {
        let (limiter, _clock) = limiter(1);
        limiter.admit("h");
        let decision = limiter.admit("h");

        let mut headers = HeaderMap::new();
        decision.apply_headers(&mut headers);
        assert_eq!(headers["x-ratelimit-limit"], "1");
        assert_eq!(headers["x-ratelimit-remaining"], "0");
        assert_eq!(headers["retry-after"], "1");
    }
}
