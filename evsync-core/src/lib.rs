#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]
#![forbid(unsafe_code)]

pub mod graph;
pub mod logger;
pub mod processors;
pub mod rate_limit;
pub mod utils;
pub mod webhooks;
