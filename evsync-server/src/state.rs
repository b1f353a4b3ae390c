//! Application state shared across all request handlers.

use crate::config::{AppSecrets, LoadedConfig};
use evsync_core::graph::{GraphClient, GraphError};
use evsync_core::processors::{
    CredentialStore, EventRefresher, MemoryEventSink, TokenRefresher, WEBHOOK_WINDOW,
    WebhookProcessor,
};
use evsync_core::rate_limit::{SlidingWindowLimiter, TokenBucketLimiter};
use std::sync::Arc;

/// Application state that is shared across all request handlers.
///
/// This is cloneable and cheap to pass around (everything is behind Arc).
#[derive(Clone)]
pub struct AppState {
    pub app: Arc<AppSecrets>,
    pub credentials: Arc<CredentialStore>,
    pub sink: Arc<MemoryEventSink>,
    pub webhooks: Arc<WebhookProcessor>,
    pub refresher: Arc<EventRefresher>,
    pub tokens: Arc<TokenRefresher>,
    pub refresh_limiter: Arc<TokenBucketLimiter>,
}

impl AppState {
    /// Wire the limiters, Graph client and processors from configuration.
    pub fn new(config: LoadedConfig) -> Result<Self, GraphError> {
        let graph = Arc::new(GraphClient::new(config.graph.clone())?);
        Ok(Self::with_graph_client(config, graph))
    }

    /// Same as [`new`](Self::new) over an existing client.
    pub fn with_graph_client(config: LoadedConfig, graph: Arc<GraphClient>) -> Self {
        let credentials = Arc::new(CredentialStore::new(config.pages));
        let sink = Arc::new(MemoryEventSink::new());

        let webhook_limiter = Arc::new(SlidingWindowLimiter::new());
        webhook_limiter.initialize_with(WEBHOOK_WINDOW, config.limits.webhook);
        let webhooks = WebhookProcessor::new(webhook_limiter, sink.clone())
            .with_enrichment(graph.clone(), credentials.clone());

        let refresh_limiter = Arc::new(TokenBucketLimiter::from_config(config.limits.refresh));
        let tokens = TokenRefresher::new(
            graph.clone(),
            credentials.clone(),
            config.app.app_id.clone(),
            String::from_utf8_lossy(&config.app.app_secret),
        );
        let refresher = EventRefresher::new(
            graph,
            refresh_limiter.clone(),
            credentials.clone(),
            sink.clone(),
            config.refresh,
        );

        Self {
            app: Arc::new(config.app),
            credentials,
            sink,
            webhooks: Arc::new(webhooks),
            refresher: Arc::new(refresher),
            tokens: Arc::new(tokens),
            refresh_limiter,
        }
    }
}
