//! Shared types for evsync.
//!
//! * [`signature`]: HMAC-SHA256 signing and constant-time verification used
//!   for inbound webhook signatures and OAuth state tokens.
//! * [`objects`]: Graph API wire types (list envelopes, error bodies,
//!   pages, events) and webhook delivery payloads.

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]
#![forbid(unsafe_code)]

pub mod objects;
pub mod signature;
