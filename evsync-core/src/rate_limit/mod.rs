//! In-memory rate limiters.
//!
//! - [`TokenBucketLimiter`]: continuous refill, capped reservoir; gates
//!   outbound refresh calls per page
//! - [`SlidingWindowLimiter`]: named windows counting admissions inside a
//!   trailing interval; de-duplicates inbound webhook bursts per page
//!
//! Both are owned by the composition root and injected where needed. State
//! is per key: checks on the same key are serialized, checks on different
//! keys only share the brief key-map lookup.

mod keyed;
pub mod sliding_window;
pub mod token_bucket;

pub use sliding_window::{SlidingWindowConfig, SlidingWindowLimiter};
pub use token_bucket::{TokenBucketConfig, TokenBucketLimiter};
