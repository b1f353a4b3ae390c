//! Processors composing the core.
//!
//! - `WebhookProcessor`: receives a verified `WebhookPayload`, publishes
//!   normalized events
//! - `EventRefresher`: receives a `RefreshTick`, re-fetches page events
//! - `TokenRefresher`: receives a `TokenRefreshTick`, renews page tokens
//!
//! The first two publish to an `EventSink`.

pub mod credentials;
pub mod event_refresher;
pub mod sink;
pub mod token_refresher;
pub mod webhook_processor;

pub use credentials::{CredentialStore, PageCredential};
pub use event_refresher::{
    EventRefresher, PageFailure, PageRefresh, RefreshConfig, RefreshError, RefreshReport,
    RefreshTick,
};
pub use sink::{EventSink, MemoryEventSink, SinkError};
pub use token_refresher::{TokenRefreshReport, TokenRefreshTick, TokenRefreshed, TokenRefresher};
pub use webhook_processor::{
    ChangeFailure, LIMITER_PRUNE_INTERVAL, WEBHOOK_WINDOW, WebhookProcessor, WebhookReport,
};
