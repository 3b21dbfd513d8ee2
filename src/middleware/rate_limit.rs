//! Rate limiting middleware
//!
//! Counts failed login attempts per username inside a window. Once the limit
//! is reached every further attempt is refused until the oldest failure ages
//! out of the window, regardless of whether the credentials are correct.

use std::collections::HashMap;
use std::time::{Duration, Instant};

/// Failed-attempt limiter keyed by username
pub struct RateLimiter {
    failures: HashMap<String, Vec<Instant>>,
    max_failures: usize,
    window: Duration,
    last_prune: Instant,
}

impl RateLimiter {
    pub fn new(max_failures: usize, window: Duration) -> Self {
        Self {
            failures: HashMap::new(),
            max_failures,
            window,
            last_prune: Instant::now(),
        }
    }

    /// Applies limits read from runtime configuration.
    pub fn set_limits(&mut self, max_failures: usize, window: Duration) {
        self.max_failures = max_failures;
        self.window = window;
    }

    pub fn is_allowed(&mut self, key: &str) -> bool {
        let now = Instant::now();
        let window = self.window;

        let Some(entry) = self.failures.get_mut(key) else {
            return true;
        };

        // Remove old failures
        entry.retain(|&time| now.duration_since(time) <= window);

        if entry.is_empty() {
            self.failures.remove(key);
            return true;
        }

        entry.len() < self.max_failures
    }

    pub fn record_failure(&mut self, key: &str) {
        let now = Instant::now();
        if now.duration_since(self.last_prune) >= self.window {
            self.prune(now);
        }
        self.failures
            .entry(key.to_string())
            .or_default()
            .push(Instant::now());
    }

    pub fn reset(&mut self, key: &str) {
        self.failures.remove(key);
    }

    /// Drops every key whose failures have all left the window.
    fn prune(&mut self, now: Instant) {
        let window = self.window;
        self.failures.retain(|_, times| {
            times.retain(|&time| now.duration_since(time) <= window);
            !times.is_empty()
        });
        self.last_prune = now;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn blocks_after_max_failures() {
        let mut limiter = RateLimiter::new(3, Duration::from_secs(3600));
        for _ in 0..3 {
            assert!(limiter.is_allowed("alice"));
            limiter.record_failure("alice");
        }
        assert!(!limiter.is_allowed("alice"));
        assert!(limiter.is_allowed("bob"));
    }

    #[test]
    fn reset_clears_failures() {
        let mut limiter = RateLimiter::new(1, Duration::from_secs(3600));
        limiter.record_failure("alice");
        assert!(!limiter.is_allowed("alice"));
        limiter.reset("alice");
        assert!(limiter.is_allowed("alice"));
    }

    #[test]
    fn failures_age_out_of_window() {
        let mut limiter = RateLimiter::new(1, Duration::from_millis(30));
        limiter.record_failure("alice");
        assert!(!limiter.is_allowed("alice"));
        thread::sleep(Duration::from_millis(60));
        assert!(limiter.is_allowed("alice"));
    }

    #[test]
    fn stale_keys_are_pruned_on_later_failures() {
        let mut limiter = RateLimiter::new(5, Duration::from_millis(200));
        for n in 0..100 {
            limiter.record_failure(&format!("sprayed-{n}"));
        }
        assert_eq!(limiter.failures.len(), 100);

        thread::sleep(Duration::from_millis(300));
        limiter.record_failure("mallory");
        assert_eq!(limiter.failures.len(), 1);
        assert!(limiter.failures.contains_key("mallory"));
    }
}
