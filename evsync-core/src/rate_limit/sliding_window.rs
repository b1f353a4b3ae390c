//! Sliding window limiter with named windows.
//!
//! A window admits a key iff fewer than `max_requests` admissions for that
//! key fall inside the trailing `window`. Admissions older than the window
//! are pruned on each check.

use compact_str::CompactString;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;
use tokio::time::Instant;

use super::keyed::KeyedState;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlidingWindowConfig {
    pub max_requests: u32,
    pub window_ms: u64,
}

impl SlidingWindowConfig {
    pub fn window(&self) -> Duration {
        Duration::from_millis(self.window_ms)
    }
}

impl Default for SlidingWindowConfig {
    /// One webhook per page per second.
    fn default() -> Self {
        Self {
            max_requests: 1,
            window_ms: 1000,
        }
    }
}

struct Window {
    config: SlidingWindowConfig,
    /// Admission times per key, oldest first. With `max_requests == 1` this
    /// holds at most the last admission.
    admissions: KeyedState<VecDeque<Instant>>,
}

impl Window {
    fn check(&self, key: &str, now: Instant) -> bool {
        let max = self.config.max_requests as usize;
        let window = self.config.window();
        self.admissions.with(key, VecDeque::new, |admitted| {
            while admitted
                .front()
                .is_some_and(|at| now.saturating_duration_since(*at) >= window)
            {
                admitted.pop_front();
            }
            if admitted.len() < max {
                admitted.push_back(now);
                true
            } else {
                false
            }
        })
    }
}

#[derive(Default)]
pub struct SlidingWindowLimiter {
    windows: RwLock<HashMap<CompactString, Arc<Window>>>,
}

impl SlidingWindowLimiter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create or replace the window `name`. Replacing discards its state.
    pub fn initialize(&self, name: &str, max_requests: u32, window: Duration) {
        self.initialize_with(
            name,
            SlidingWindowConfig {
                max_requests,
                window_ms: window.as_millis() as u64,
            },
        );
    }

    pub fn initialize_with(&self, name: &str, config: SlidingWindowConfig) {
        let window = Arc::new(Window {
            config,
            admissions: KeyedState::default(),
        });
        self.windows
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(CompactString::from(name), window);
    }

    pub fn is_initialized(&self, name: &str) -> bool {
        self.window(name).is_some()
    }

    /// Admit one request for `key` in window `name` now.
    ///
    /// Windows that were never initialized do not limit.
    pub fn check(&self, name: &str, key: &str) -> bool {
        self.check_at(name, key, Instant::now())
    }

    pub fn check_at(&self, name: &str, key: &str, now: Instant) -> bool {
        match self.window(name) {
            Some(window) => window.check(key, now),
            None => true,
        }
    }

    /// Forget keys whose admissions have all left their window.
    pub fn prune(&self, now: Instant) {
        let windows: Vec<Arc<Window>> = self
            .windows
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .collect();
        for window in windows {
            let span = window.config.window();
            window.admissions.retain(|admitted| {
                admitted
                    .back()
                    .is_some_and(|at| now.saturating_duration_since(*at) < span)
            });
        }
    }

    /// Number of keys with state in window `name`.
    pub fn tracked_keys(&self, name: &str) -> usize {
        self.window(name).map_or(0, |w| w.admissions.len())
    }

    fn window(&self, name: &str) -> Option<Arc<Window>> {
        self.windows
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const WEBHOOK: &str = "webhook";

    fn limiter(max: u32, window_ms: u64) -> SlidingWindowLimiter {
        let limiter = SlidingWindowLimiter::new();
        limiter.initialize(WEBHOOK, max, Duration::from_millis(window_ms));
        limiter
    }

    #[test]
    fn one_per_second_per_key() {
        let limiter = limiter(1, 1000);
        let start = Instant::now();
        assert!(limiter.check_at(WEBHOOK, "page-1", start));
        assert!(!limiter.check_at(WEBHOOK, "page-1", start));
        assert!(!limiter.check_at(WEBHOOK, "page-1", start + Duration::from_millis(999)));
        assert!(limiter.check_at(WEBHOOK, "page-1", start + Duration::from_millis(1000)));
    }

    #[test]
    fn different_keys_are_independent() {
        let limiter = limiter(1, 1000);
        let now = Instant::now();
        assert!(limiter.check_at(WEBHOOK, "page-1", now));
        assert!(limiter.check_at(WEBHOOK, "page-2", now));
        assert!(!limiter.check_at(WEBHOOK, "page-1", now));
    }

    #[test]
    fn denied_checks_do_not_extend_the_window() {
        let limiter = limiter(1, 1000);
        let start = Instant::now();
        assert!(limiter.check_at(WEBHOOK, "k", start));
        assert!(!limiter.check_at(WEBHOOK, "k", start + Duration::from_millis(600)));
        assert!(limiter.check_at(WEBHOOK, "k", start + Duration::from_millis(1000)));
    }

    #[test]
    fn general_case_counts_within_window() {
        let limiter = limiter(3, 1000);
        let t0 = Instant::now();
        assert!(limiter.check_at(WEBHOOK, "k", t0));
        assert!(limiter.check_at(WEBHOOK, "k", t0 + Duration::from_millis(100)));
        assert!(limiter.check_at(WEBHOOK, "k", t0 + Duration::from_millis(200)));
        assert!(!limiter.check_at(WEBHOOK, "k", t0 + Duration::from_millis(300)));
        // The first admission slides out at t0+1000.
        assert!(limiter.check_at(WEBHOOK, "k", t0 + Duration::from_millis(1000)));
        assert!(!limiter.check_at(WEBHOOK, "k", t0 + Duration::from_millis(1050)));
        assert!(limiter.check_at(WEBHOOK, "k", t0 + Duration::from_millis(1100)));
    }

    #[test]
    fn windows_are_independent_by_name() {
        let limiter = limiter(1, 1000);
        limiter.initialize("other", 1, Duration::from_millis(1000));
        let now = Instant::now();
        assert!(limiter.check_at(WEBHOOK, "k", now));
        assert!(limiter.check_at("other", "k", now));
    }

    #[test]
    fn unknown_window_admits() {
        let limiter = SlidingWindowLimiter::new();
        assert!(!limiter.is_initialized(WEBHOOK));
        assert!(limiter.check(WEBHOOK, "k"));
        assert!(limiter.check(WEBHOOK, "k"));
    }

    #[test]
    fn zero_max_denies_everything() {
        let limiter = limiter(0, 1000);
        assert!(!limiter.check(WEBHOOK, "k"));
    }

    #[test]
    fn reinitialize_resets_state() {
        let limiter = limiter(1, 1000);
        let now = Instant::now();
        assert!(limiter.check_at(WEBHOOK, "k", now));
        limiter.initialize(WEBHOOK, 1, Duration::from_millis(1000));
        assert!(limiter.check_at(WEBHOOK, "k", now));
    }

    #[test]
    fn prune_drops_idle_keys() {
        let limiter = limiter(1, 1000);
        let t0 = Instant::now();
        assert!(limiter.check_at(WEBHOOK, "old", t0));
        assert!(limiter.check_at(WEBHOOK, "fresh", t0 + Duration::from_millis(900)));
        limiter.prune(t0 + Duration::from_millis(1000));
        assert_eq!(limiter.tracked_keys(WEBHOOK), 1);
    }
}
