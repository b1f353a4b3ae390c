//! Where normalized events go once processed.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};
use thiserror::Error;

use evsync_sdk::objects::{EventAction, NormalizedEvent};

#[derive(Debug, Error)]
pub enum SinkError {
    /// The downstream store rejected or could not take the batch.
    #[error("sink unavailable: {0}")]
    Unavailable(String),

    #[error("event serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Receives batches of normalized events.
#[async_trait]
pub trait EventSink: Send + Sync {
    async fn publish(&self, events: Vec<NormalizedEvent>) -> Result<(), SinkError>;

    /// Drop everything that occurred before `cutoff_ms`. Returns how many
    /// events were removed.
    async fn prune_before(&self, cutoff_ms: i64) -> Result<usize, SinkError>;
}

/// Latest state per `(page_id, event_id)`, held in memory.
///
/// A `Deleted` event removes its entry. Events without an id cannot be
/// addressed and are not stored.
#[derive(Debug, Default)]
pub struct MemoryEventSink {
    events: RwLock<HashMap<(String, String), NormalizedEvent>>,
}

impl MemoryEventSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// All stored events, most recent first.
    pub fn snapshot(&self) -> Vec<NormalizedEvent> {
        let mut events: Vec<NormalizedEvent> = self
            .events
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .collect();
        events.sort_by(|a, b| {
            b.occurred_at_ms
                .cmp(&a.occurred_at_ms)
                .then_with(|| a.event_id.cmp(&b.event_id))
        });
        events
    }

    pub fn for_page(&self, page_id: &str) -> Vec<NormalizedEvent> {
        self.snapshot()
            .into_iter()
            .filter(|e| e.page_id == page_id)
            .collect()
    }

    pub fn len(&self) -> usize {
        self.events.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl EventSink for MemoryEventSink {
    async fn publish(&self, events: Vec<NormalizedEvent>) -> Result<(), SinkError> {
        let mut stored = self.events.write().unwrap_or_else(PoisonError::into_inner);
        for event in events {
            let Some(event_id) = event.event_id.clone() else {
                continue;
            };
            let key = (event.page_id.clone(), event_id);
            if event.action == EventAction::Deleted {
                stored.remove(&key);
            } else {
                stored.insert(key, event);
            }
        }
        Ok(())
    }

    async fn prune_before(&self, cutoff_ms: i64) -> Result<usize, SinkError> {
        let mut stored = self.events.write().unwrap_or_else(PoisonError::into_inner);
        let before = stored.len();
        stored.retain(|_, event| event.occurred_at_ms >= cutoff_ms);
        Ok(before - stored.len())
    }
}
