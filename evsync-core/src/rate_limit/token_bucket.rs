//! Token bucket limiter.
//!
//! Each key holds `tokens` in `[0, capacity]`. A check first refills
//! `elapsed_secs * refill_rate_per_second` (capped at capacity), then admits
//! iff at least one token is left, taking exactly one.

use serde::{Deserialize, Serialize};
use std::sync::{PoisonError, RwLock};
use tokio::time::Instant;

use super::keyed::KeyedState;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TokenBucketConfig {
    pub capacity: f64,
    pub refill_rate_per_second: f64,
}

impl Default for TokenBucketConfig {
    /// Ten calls per page, refilling one every six seconds.
    fn default() -> Self {
        Self {
            capacity: 10.0,
            refill_rate_per_second: 1.0 / 6.0,
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct Bucket {
    tokens: f64,
    last_refill_at: Instant,
}

pub struct TokenBucketLimiter {
    config: RwLock<TokenBucketConfig>,
    buckets: KeyedState<Bucket>,
}

impl TokenBucketLimiter {
    pub fn new(capacity: f64, refill_rate_per_second: f64) -> Self {
        Self::from_config(TokenBucketConfig {
            capacity,
            refill_rate_per_second,
        })
    }

    pub fn from_config(config: TokenBucketConfig) -> Self {
        Self {
            config: RwLock::new(sanitize(config)),
            buckets: KeyedState::default(),
        }
    }

    /// Change capacity and refill rate. Existing buckets keep their level,
    /// clamped to the new capacity on their next check.
    pub fn configure(&self, capacity: f64, refill_rate_per_second: f64) {
        let mut config = self.config.write().unwrap_or_else(PoisonError::into_inner);
        *config = sanitize(TokenBucketConfig {
            capacity,
            refill_rate_per_second,
        });
    }

    pub fn config(&self) -> TokenBucketConfig {
        *self.config.read().unwrap_or_else(PoisonError::into_inner)
    }

    /// Admit one request for `key` now.
    pub fn check(&self, key: &str) -> bool {
        self.check_at(key, Instant::now())
    }

    /// Admit one request for `key` at `now`.
    pub fn check_at(&self, key: &str, now: Instant) -> bool {
        let config = self.config();
        self.buckets.with(
            key,
            || Bucket {
                tokens: config.capacity,
                last_refill_at: now,
            },
            |bucket| {
                let elapsed = now.saturating_duration_since(bucket.last_refill_at);
                bucket.tokens = (bucket.tokens
                    + elapsed.as_secs_f64() * config.refill_rate_per_second)
                    .min(config.capacity);
                if now > bucket.last_refill_at {
                    bucket.last_refill_at = now;
                }
                if bucket.tokens >= 1.0 {
                    bucket.tokens -= 1.0;
                    true
                } else {
                    false
                }
            },
        )
    }

    /// Current token level for `key`, without refilling. `None` for keys
    /// never checked.
    pub fn available(&self, key: &str) -> Option<f64> {
        self.buckets.peek(key, |bucket| bucket.tokens)
    }

    /// Number of keys with state.
    pub fn tracked_keys(&self) -> usize {
        self.buckets.len()
    }
}

fn sanitize(config: TokenBucketConfig) -> TokenBucketConfig {
    TokenBucketConfig {
        capacity: finite_non_negative(config.capacity),
        refill_rate_per_second: finite_non_negative(config.refill_rate_per_second),
    }
}

fn finite_non_negative(value: f64) -> f64 {
    if value.is_finite() && value > 0.0 {
        value
    } else {
        0.0
    }
}
