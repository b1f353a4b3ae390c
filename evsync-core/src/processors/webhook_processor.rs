//! WebhookProcessor.
//!
//! Takes a signature-verified [`WebhookPayload`] and, per entry:
//! - consults the `webhook` sliding window keyed by page id, skipping the
//!   entry's changes on denial
//! - normalizes each change
//! - for created/updated `events` changes, fetches the full event through the
//!   Graph client when enrichment is configured
//! - publishes the entry's events to the [`EventSink`]
//!
//! Failures are counted per change; one bad change never aborts the batch.

use kanau::processor::Processor;
use serde::Serialize;
use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use evsync_sdk::objects::{EventAction, NormalizedEvent, WebhookEntry, WebhookPayload};

use super::credentials::CredentialStore;
use super::sink::EventSink;
use crate::graph::{GraphClient, GraphError, GraphErrorKind};
use crate::rate_limit::SlidingWindowLimiter;
use crate::utils::timestamps::now_millis;
use crate::webhooks::normalize_change;

/// Name of the sliding window consulted for inbound deliveries.
pub const WEBHOOK_WINDOW: &str = "webhook";

/// How often [`WebhookProcessor::run_maintenance`] forgets idle pages.
pub const LIMITER_PRUNE_INTERVAL: Duration = Duration::from_secs(60);

/// Outcome of one delivery.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct WebhookReport {
    pub processed: usize,
    pub failed: usize,
    pub skipped: usize,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<ChangeFailure>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChangeFailure {
    pub page_id: String,
    pub event_id: Option<String>,
    /// Set when the failure came from a Graph lookup.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kind: Option<GraphErrorKind>,
    pub message: String,
}

struct Enrichment {
    graph: Arc<GraphClient>,
    credentials: Arc<CredentialStore>,
}

pub struct WebhookProcessor {
    limiter: Arc<SlidingWindowLimiter>,
    sink: Arc<dyn EventSink>,
    enrichment: Option<Enrichment>,
}

impl WebhookProcessor {
    /// The limiter should have [`WEBHOOK_WINDOW`] initialized; an
    /// uninitialized window admits everything.
    pub fn new(limiter: Arc<SlidingWindowLimiter>, sink: Arc<dyn EventSink>) -> Self {
        Self {
            limiter,
            sink,
            enrichment: None,
        }
    }

    /// Fetch full event details for created/updated events, using the page's
    /// token from `credentials`. Pages without a token are not enriched.
    pub fn with_enrichment(
        mut self,
        graph: Arc<GraphClient>,
        credentials: Arc<CredentialStore>,
    ) -> Self {
        self.enrichment = Some(Enrichment { graph, credentials });
        self
    }

    /// Drop limiter state for pages with no delivery inside the window.
    /// Returns the number of pages still tracked.
    pub fn prune_limiter(&self) -> usize {
        self.limiter.prune(Instant::now());
        self.limiter.tracked_keys(WEBHOOK_WINDOW)
    }

    /// Prune the limiter every `every` until shutdown.
    pub async fn run_maintenance(
        self: Arc<Self>,
        every: Duration,
        mut shutdown_rx: watch::Receiver<bool>,
    ) {
        let mut ticker = tokio::time::interval(every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;

                _ = shutdown_rx.changed() => {
                    if *shutdown_rx.borrow() {
                        debug!("Webhook limiter maintenance stopped");
                        break;
                    }
                }

                _ = ticker.tick() => {
                    let tracked = self.prune_limiter();
                    debug!(tracked, "Pruned webhook limiter");
                }
            }
        }
    }

    async fn process_entry(&self, entry: &WebhookEntry, now_ms: i64, report: &mut WebhookReport) {
        if !self.limiter.check(WEBHOOK_WINDOW, &entry.id) {
            debug!(
                page_id = %entry.id,
                changes = entry.changes.len(),
                "Webhook entry rate limited, skipping"
            );
            report.skipped += entry.changes.len();
            return;
        }

        let mut batch = Vec::with_capacity(entry.changes.len());
        for change in &entry.changes {
            let mut event = normalize_change(&entry.id, change, now_ms);
            match self.enrich(&mut event).await {
                Ok(()) => batch.push(event),
                Err(e) => {
                    warn!(
                        page_id = %event.page_id,
                        event_id = ?event.event_id,
                        kind = %e.kind(),
                        error = %e,
                        "Failed to enrich webhook change"
                    );
                    report.failed += 1;
                    report.errors.push(ChangeFailure {
                        page_id: event.page_id,
                        event_id: event.event_id,
                        kind: Some(e.kind()),
                        message: e.to_string(),
                    });
                }
            }
        }

        if batch.is_empty() {
            return;
        }
        let count = batch.len();
        let ids: Vec<Option<String>> = batch.iter().map(|e| e.event_id.clone()).collect();
        match self.sink.publish(batch).await {
            Ok(()) => report.processed += count,
            Err(e) => {
                warn!(page_id = %entry.id, error = %e, "Failed to publish webhook events");
                report.failed += count;
                report
                    .errors
                    .extend(ids.into_iter().map(|event_id| ChangeFailure {
                        page_id: entry.id.clone(),
                        event_id,
                        kind: None,
                        message: e.to_string(),
                    }));
            }
        }
    }

    /// Attach the full event for created/updated `events` changes.
    async fn enrich(&self, event: &mut NormalizedEvent) -> Result<(), GraphError> {
        let Some(enrichment) = &self.enrichment else {
            return Ok(());
        };
        if event.field != "events"
            || !matches!(event.action, EventAction::Created | EventAction::Updated)
        {
            return Ok(());
        }
        let Some(event_id) = event.event_id.as_deref() else {
            return Ok(());
        };
        let Some(token) = enrichment.credentials.token_for(&event.page_id) else {
            debug!(page_id = %event.page_id, "No page token, publishing without details");
            return Ok(());
        };

        let details = enrichment.graph.get_event(event_id, &token).await?;
        event.details = Some(details);
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Processor trait implementation
// ---------------------------------------------------------------------------

impl Processor<WebhookPayload> for WebhookProcessor {
    type Output = WebhookReport;
    type Error = Infallible;

    async fn process(&self, payload: WebhookPayload) -> Result<WebhookReport, Infallible> {
        let now_ms = now_millis();
        let mut report = WebhookReport::default();
        for entry in &payload.entry {
            self.process_entry(entry, now_ms, &mut report).await;
        }
        info!(
            object = %payload.object,
            processed = report.processed,
            failed = report.failed,
            skipped = report.skipped,
            "Processed webhook delivery"
        );
        Ok(report)
    }
}
