//! Turn a raw `{field, value}` webhook change into a [`NormalizedEvent`].
//!
//! Pure functions; rate limiting and enrichment are the caller's concern
//! (see [`crate::processors::WebhookProcessor`]).

use serde_json::Value;

use evsync_sdk::objects::{EventAction, NormalizedEvent, WebhookChange};

/// Top-level keys that may carry the item id, in priority order.
const ID_KEYS: [&str; 5] = ["id", "event_id", "eventId", "parent_id", "parentId"];

/// Nested objects whose `id` is consulted after [`ID_KEYS`].
const NESTED_ID_PARENTS: [&str; 2] = ["event", "object"];

/// Map a change `verb` to an action. Case-insensitive.
pub fn parse_action(verb: Option<&str>) -> EventAction {
    let Some(verb) = verb else {
        return EventAction::Unknown;
    };
    match verb.to_lowercase().as_str() {
        "add" | "create" => EventAction::Created,
        "edit" | "update" => EventAction::Updated,
        "delete" | "remove" => EventAction::Deleted,
        _ => EventAction::Unknown,
    }
}

fn field_prefix(field: &str) -> &str {
    match field {
        "events" => "event",
        "feed" => "post",
        "live_videos" => "live_video",
        other => other,
    }
}

/// `{prefix}.{create|update|delete}`; the raw field name when the action is
/// unknown.
pub fn event_type(field: &str, action: EventAction) -> String {
    let op = match action {
        EventAction::Created => "create",
        EventAction::Updated => "update",
        EventAction::Deleted => "delete",
        EventAction::Unknown => return field.to_string(),
    };
    format!("{}.{}", field_prefix(field), op)
}

fn non_empty_str(value: Option<&Value>) -> Option<String> {
    value
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .map(str::to_owned)
}

/// First non-empty string id found in `value`.
pub fn resolve_item_id(value: &Value) -> Option<String> {
    ID_KEYS
        .iter()
        .find_map(|key| non_empty_str(value.get(key)))
        .or_else(|| {
            NESTED_ID_PARENTS
                .iter()
                .find_map(|parent| non_empty_str(value.get(parent).and_then(|p| p.get("id"))))
        })
}

/// `published` (Unix seconds) as milliseconds, or `now_ms` when absent or
/// unusable.
pub fn published_at_ms(value: &Value, now_ms: i64) -> i64 {
    let seconds = match value.get("published") {
        Some(Value::Number(n)) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
        Some(Value::String(s)) => s.trim().parse::<i64>().ok(),
        _ => None,
    };
    seconds
        .and_then(|s| s.checked_mul(1000))
        .unwrap_or(now_ms)
}

pub fn normalize_change(page_id: &str, change: &WebhookChange, now_ms: i64) -> NormalizedEvent {
    let value = &change.value;
    let action = parse_action(value.get("verb").and_then(Value::as_str));
    NormalizedEvent {
        page_id: page_id.to_string(),
        field: change.field.clone(),
        action,
        event_type: event_type(&change.field, action),
        event_id: resolve_item_id(value),
        occurred_at_ms: published_at_ms(value, now_ms),
        value: value.clone(),
        details: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn change(field: &str, value: Value) -> WebhookChange {
        WebhookChange {
            field: field.into(),
            value,
        }
    }

    #[test]
    fn remove_on_events_normalizes_to_delete() {
        let event = normalize_change(
            "page-1",
            &change("events", json!({"verb": "remove", "id": "e1"})),
            42,
        );
        assert_eq!(event.action, EventAction::Deleted);
        assert_eq!(event.event_id.as_deref(), Some("e1"));
        assert_eq!(event.event_type, "event.delete");
        assert_eq!(event.page_id, "page-1");
        assert_eq!(event.occurred_at_ms, 42);
    }

    #[test]
    fn verbs_map_case_insensitively() {
        assert_eq!(parse_action(Some("ADD")), EventAction::Created);
        assert_eq!(parse_action(Some("create")), EventAction::Created);
        assert_eq!(parse_action(Some("Edit")), EventAction::Updated);
        assert_eq!(parse_action(Some("update")), EventAction::Updated);
        assert_eq!(parse_action(Some("delete")), EventAction::Deleted);
        assert_eq!(parse_action(Some("remove")), EventAction::Deleted);
        assert_eq!(parse_action(Some("hide")), EventAction::Unknown);
        assert_eq!(parse_action(None), EventAction::Unknown);
    }

    #[test]
    fn event_types_per_field() {
        assert_eq!(event_type("events", EventAction::Created), "event.create");
        assert_eq!(event_type("feed", EventAction::Updated), "post.update");
        assert_eq!(event_type("ratings", EventAction::Deleted), "ratings.delete");
        assert_eq!(event_type("events", EventAction::Unknown), "events");
    }

    #[test]
    fn id_resolution_order() {
        assert_eq!(
            resolve_item_id(&json!({"event_id": "b", "parentId": "c"})).as_deref(),
            Some("b")
        );
        assert_eq!(
            resolve_item_id(&json!({"id": "", "eventId": "x"})).as_deref(),
            Some("x")
        );
        assert_eq!(
            resolve_item_id(&json!({"id": 12, "parent_id": "p"})).as_deref(),
            Some("p")
        );
        assert_eq!(
            resolve_item_id(&json!({"event": {"id": "n"}, "object": {"id": "o"}})).as_deref(),
            Some("n")
        );
        assert_eq!(
            resolve_item_id(&json!({"event": {"id": ""}, "object": {"id": "o"}})).as_deref(),
            Some("o")
        );
        assert_eq!(resolve_item_id(&json!({"verb": "add"})), None);
        assert_eq!(resolve_item_id(&Value::Null), None);
    }

    #[test]
    fn published_seconds_to_millis() {
        assert_eq!(published_at_ms(&json!({"published": 1_700_000_000}), 0), 1_700_000_000_000);
        assert_eq!(published_at_ms(&json!({"published": "1700000000"}), 0), 1_700_000_000_000);
        assert_eq!(published_at_ms(&json!({}), 7), 7);
        assert_eq!(published_at_ms(&json!({"published": "soon"}), 7), 7);
    }

    #[test]
    fn normalized_event_keeps_raw_value() {
        let value = json!({"verb": "add", "event": {"id": "e9"}, "published": 10});
        let event = normalize_change("p", &change("events", value.clone()), 0);
        assert_eq!(event.action, EventAction::Created);
        assert_eq!(event.event_type, "event.create");
        assert_eq!(event.event_id.as_deref(), Some("e9"));
        assert_eq!(event.occurred_at_ms, 10_000);
        assert_eq!(event.value, value);
    }
}
