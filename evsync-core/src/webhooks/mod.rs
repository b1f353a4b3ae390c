//! Webhook change normalization.

pub mod normalizer;

pub use normalizer::{event_type, normalize_change, parse_action, published_at_ms, resolve_item_id};
