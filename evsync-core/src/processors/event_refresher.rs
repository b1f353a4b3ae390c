//! EventRefresher processor.
//!
//! On every [`RefreshTick`] the refresher walks the known pages, consults the
//! token bucket per page, fetches upcoming and recent past events, and hands
//! them to the [`EventSink`]. One page failing never stops the others; the
//! outcome is accumulated into a [`RefreshReport`].

use kanau::processor::Processor;
use serde::{Deserialize, Serialize};
use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use evsync_sdk::objects::{EventAction, GraphEvent, NormalizedEvent};

use super::credentials::{CredentialStore, PageCredential};
use super::sink::{EventSink, SinkError};
use crate::graph::{GraphClient, GraphError, GraphErrorKind};
use crate::rate_limit::TokenBucketLimiter;
use crate::utils::timestamps::{now_millis, parse_graph_time, unix_millis};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefreshConfig {
    /// Seconds between refresh passes.
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,
    /// How far back past events are kept.
    #[serde(default = "default_lookback_days")]
    pub lookback_days: u32,
    /// Sink entries older than this are pruned after each pass. 0 disables.
    #[serde(default = "default_retention_days")]
    pub retention_days: u32,
}

fn default_interval_secs() -> u64 {
    900
}

fn default_lookback_days() -> u32 {
    30
}

fn default_retention_days() -> u32 {
    90
}

impl Default for RefreshConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_interval_secs(),
            lookback_days: default_lookback_days(),
            retention_days: default_retention_days(),
        }
    }
}

impl RefreshConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs.max(1))
    }

    pub fn lookback(&self) -> time::Duration {
        time::Duration::days(i64::from(self.lookback_days))
    }
}

/// Trigger for one refresh pass.
#[derive(Debug, Clone, Copy, Default)]
pub struct RefreshTick;

#[derive(Debug, Error)]
pub enum RefreshError {
    #[error(transparent)]
    Graph(#[from] GraphError),

    #[error(transparent)]
    Sink(#[from] SinkError),
}

impl RefreshError {
    /// Graph failure kind, `None` for sink failures.
    pub fn graph_kind(&self) -> Option<GraphErrorKind> {
        match self {
            RefreshError::Graph(e) => Some(e.kind()),
            RefreshError::Sink(_) => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PageRefresh {
    pub page_id: String,
    pub events: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PageFailure {
    pub page_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kind: Option<GraphErrorKind>,
    pub message: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RefreshReport {
    pub results: Vec<PageRefresh>,
    pub errors: Vec<PageFailure>,
    /// Pages denied by the token bucket this pass.
    pub skipped: Vec<String>,
}

impl RefreshReport {
    /// Pages whose token must be renewed before they can refresh again.
    pub fn expired_credentials(&self) -> impl Iterator<Item = &str> {
        self.errors
            .iter()
            .filter(|f| f.kind == Some(GraphErrorKind::CredentialExpired))
            .map(|f| f.page_id.as_str())
    }
}

pub struct EventRefresher {
    graph: Arc<GraphClient>,
    limiter: Arc<TokenBucketLimiter>,
    credentials: Arc<CredentialStore>,
    sink: Arc<dyn EventSink>,
    config: RefreshConfig,
}

impl EventRefresher {
    pub fn new(
        graph: Arc<GraphClient>,
        limiter: Arc<TokenBucketLimiter>,
        credentials: Arc<CredentialStore>,
        sink: Arc<dyn EventSink>,
        config: RefreshConfig,
    ) -> Self {
        Self {
            graph,
            limiter,
            credentials,
            sink,
            config,
        }
    }

    pub fn config(&self) -> &RefreshConfig {
        &self.config
    }

    /// Refresh until shutdown is signaled. The first pass runs immediately.
    pub async fn run(self: Arc<Self>, mut shutdown_rx: watch::Receiver<bool>) {
        info!(
            interval_secs = self.config.interval_secs,
            pages = self.credentials.len(),
            "EventRefresher started"
        );

        let mut ticker = tokio::time::interval(self.config.interval());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;

                // Shutdown has highest priority.
                _ = shutdown_rx.changed() => {
                    if *shutdown_rx.borrow() {
                        info!("EventRefresher received shutdown signal");
                        break;
                    }
                }

                _ = ticker.tick() => {
                    let Ok(report) = self.process(RefreshTick).await;
                    for page_id in report.expired_credentials() {
                        warn!(page_id = %page_id, "Page token expired, re-authorization required");
                    }
                    self.prune_sink().await;
                }
            }
        }

        info!("EventRefresher shutdown complete");
    }

    /// Refresh a single page, bypassing the token bucket.
    pub async fn refresh_page(&self, credential: &PageCredential) -> Result<usize, RefreshError> {
        let events = self
            .graph
            .list_page_events(
                &credential.page_id,
                &credential.access_token,
                self.config.lookback(),
            )
            .await?;
        let now_ms = now_millis();
        let normalized: Vec<NormalizedEvent> = events
            .into_iter()
            .map(|event| refreshed_event(&credential.page_id, event, now_ms))
            .collect();
        let count = normalized.len();
        self.sink.publish(normalized).await?;
        Ok(count)
    }

    async fn prune_sink(&self) {
        if self.config.retention_days == 0 {
            return;
        }
        let retention = time::Duration::days(i64::from(self.config.retention_days));
        let cutoff_ms = unix_millis(time::OffsetDateTime::now_utc() - retention);
        match self.sink.prune_before(cutoff_ms).await {
            Ok(0) => {}
            Ok(removed) => debug!(removed, "Pruned expired events from sink"),
            Err(e) => error!(error = %e, "Failed to prune sink"),
        }
    }
}

/// A fetched event as a normalized `event.update`.
///
/// `occurred_at_ms` is the event's start time when it parses, otherwise the
/// fetch time.
fn refreshed_event(page_id: &str, event: GraphEvent, now_ms: i64) -> NormalizedEvent {
    let occurred_at_ms = event
        .start_time
        .as_deref()
        .and_then(parse_graph_time)
        .map(unix_millis)
        .unwrap_or(now_ms);
    let value = serde_json::to_value(&event).unwrap_or_default();
    NormalizedEvent {
        page_id: page_id.to_string(),
        field: "events".to_string(),
        action: EventAction::Updated,
        event_type: crate::webhooks::event_type("events", EventAction::Updated),
        event_id: Some(event.id.clone()),
        occurred_at_ms,
        value,
        details: Some(event),
    }
}

// ---------------------------------------------------------------------------
// Processor trait implementation
// ---------------------------------------------------------------------------

impl Processor<RefreshTick> for EventRefresher {
    type Output = RefreshReport;
    type Error = Infallible;

    async fn process(&self, _tick: RefreshTick) -> Result<RefreshReport, Infallible> {
        let mut report = RefreshReport::default();

        for credential in self.credentials.all() {
            let page_id = credential.page_id.clone();
            if !self.limiter.check(&page_id) {
                debug!(page_id = %page_id, "Refresh rate limited, skipping page");
                report.skipped.push(page_id);
                continue;
            }

            match self.refresh_page(&credential).await {
                Ok(events) => {
                    debug!(page_id = %page_id, events, "Refreshed page events");
                    report.results.push(PageRefresh { page_id, events });
                }
                Err(e) => {
                    warn!(
                        page_id = %page_id,
                        kind = ?e.graph_kind(),
                        error = %e,
                        "Failed to refresh page events"
                    );
                    report.errors.push(PageFailure {
                        page_id,
                        kind: e.graph_kind(),
                        message: e.to_string(),
                    });
                }
            }
        }

        info!(
            refreshed = report.results.len(),
            failed = report.errors.len(),
            skipped = report.skipped.len(),
            "Refresh pass complete"
        );
        Ok(report)
    }
}
