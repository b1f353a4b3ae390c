//! Normalized events republished to evsync consumers.

use serde::{Deserialize, Serialize};

use super::graph::GraphEvent;

/// What happened to the item a webhook change refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventAction {
    Created,
    Updated,
    Deleted,
    Unknown,
}

impl std::fmt::Display for EventAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EventAction::Created => write!(f, "created"),
            EventAction::Updated => write!(f, "updated"),
            EventAction::Deleted => write!(f, "deleted"),
            EventAction::Unknown => write!(f, "unknown"),
        }
    }
}

/// A webhook change or refreshed event in its source-independent form.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NormalizedEvent {
    pub page_id: String,
    pub field: String,
    pub action: EventAction,
    /// e.g. `event.delete`
    pub event_type: String,
    pub event_id: Option<String>,
    /// Unix milliseconds.
    pub occurred_at_ms: i64,
    #[serde(default)]
    pub value: serde_json::Value,
    /// Full event fetched from the Graph API, when enrichment succeeded.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<GraphEvent>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serializes_camel_case() {
        let event = NormalizedEvent {
            page_id: "p1".into(),
            field: "events".into(),
            action: EventAction::Deleted,
            event_type: "event.delete".into(),
            event_id: Some("e1".into()),
            occurred_at_ms: 1_700_000_000_000,
            value: serde_json::Value::Null,
            details: None,
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["action"], "deleted");
        assert_eq!(json["eventType"], "event.delete");
        assert_eq!(json["eventId"], "e1");
        assert!(json.get("details").is_none());
    }
}
