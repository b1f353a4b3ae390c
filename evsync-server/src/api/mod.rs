//! HTTP API.

pub mod events;
pub mod extractors;
pub mod oauth;
pub mod webhooks;
