//! Graph client settings, read from the `[graph]` config section.

use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphClientConfig {
    /// API root including the version segment.
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// Attempts per call, including the first one.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// Backoff before the second attempt; doubles after each retry.
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
    /// `limit` sent with list requests.
    #[serde(default = "default_page_limit")]
    pub page_limit: u32,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    #[serde(default = "default_event_fields")]
    pub event_fields: String,
}

fn default_base_url() -> String {
    "https://graph.facebook.com/v19.0/".to_string()
}

fn default_max_retries() -> u32 {
    3
}

fn default_base_delay_ms() -> u64 {
    1000
}

fn default_page_limit() -> u32 {
    100
}

fn default_request_timeout_secs() -> u64 {
    30
}

fn default_event_fields() -> String {
    "id,name,description,start_time,end_time,place,is_canceled".to_string()
}

impl Default for GraphClientConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            max_retries: default_max_retries(),
            base_delay_ms: default_base_delay_ms(),
            page_limit: default_page_limit(),
            request_timeout_secs: default_request_timeout_secs(),
            event_fields: default_event_fields(),
        }
    }
}

impl GraphClientConfig {
    /// Point the client at another API root (mock servers, other versions).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn with_retries(mut self, max_retries: u32, base_delay: Duration) -> Self {
        self.max_retries = max_retries;
        self.base_delay_ms = base_delay.as_millis() as u64;
        self
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}
