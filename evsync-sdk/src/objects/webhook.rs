//! Webhook delivery payloads pushed by the Graph API.
//!
//! ```json
//! {"object":"page","entry":[{"id":"123","time":1700000000,
//!   "changes":[{"field":"events","value":{"verb":"add","id":"e1"}}]}]}
//! ```

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WebhookPayload {
    #[serde(default)]
    pub object: String,
    #[serde(default)]
    pub entry: Vec<WebhookEntry>,
}

impl WebhookPayload {
    /// Total number of changes across all entries.
    pub fn change_count(&self) -> usize {
        self.entry.iter().map(|e| e.changes.len()).sum()
    }
}

/// Changes for one page.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WebhookEntry {
    /// Page id the changes belong to.
    pub id: String,
    #[serde(default)]
    pub time: Option<i64>,
    #[serde(default)]
    pub changes: Vec<WebhookChange>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WebhookChange {
    pub field: String,
    #[serde(default)]
    pub value: serde_json::Value,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_delivery() {
        let payload: WebhookPayload = serde_json::from_str(
            r#"{"object":"page","entry":[
                {"id":"p1","time":1700000000,"changes":[
                    {"field":"events","value":{"verb":"add","id":"e1"}},
                    {"field":"feed","value":{"verb":"edit","post_id":"p1_2"}}]},
                {"id":"p2","changes":[]}]}"#,
        )
        .unwrap();
        assert_eq!(payload.entry.len(), 2);
        assert_eq!(payload.change_count(), 2);
        assert_eq!(payload.entry[0].changes[0].value["id"], "e1");
        assert_eq!(payload.entry[1].time, None);
    }
}
