//! Typed Graph API operations built on the retrying client.

use std::collections::HashSet;
use time::OffsetDateTime;

use evsync_sdk::objects::{GraphEvent, GraphPage, TokenExchange};

use super::client::GraphClient;
use super::error::GraphError;
use crate::utils::timestamps::parse_graph_time;

const PAGE_FIELDS: &str = "id,name,access_token,category";

impl GraphClient {
    /// Pages managed by the owner of `user_token` (`GET /me/accounts`).
    pub async fn list_pages(&self, user_token: &str) -> Result<Vec<GraphPage>, GraphError> {
        let limit = self.config().page_limit.to_string();
        let query = [
            ("access_token", user_token),
            ("fields", PAGE_FIELDS),
            ("limit", limit.as_str()),
        ];
        let url = self.endpoint(&["me", "accounts"], &query)?;
        self.fetch_all_pages(url, &query).await
    }

    /// Upcoming events of a page plus past events that started within
    /// `lookback`, de-duplicated by id.
    pub async fn list_page_events(
        &self,
        page_id: &str,
        page_token: &str,
        lookback: time::Duration,
    ) -> Result<Vec<GraphEvent>, GraphError> {
        let limit = self.config().page_limit.to_string();
        let fields = self.config().event_fields.as_str();
        let upcoming_query = [
            ("access_token", page_token),
            ("fields", fields),
            ("limit", limit.as_str()),
            ("time_filter", "upcoming"),
        ];
        let past_query = [
            ("access_token", page_token),
            ("fields", fields),
            ("limit", limit.as_str()),
            ("time_filter", "past"),
        ];
        let upcoming_url = self.endpoint(&[page_id, "events"], &upcoming_query)?;
        let past_url = self.endpoint(&[page_id, "events"], &past_query)?;

        let (upcoming, past) = tokio::try_join!(
            self.fetch_all_pages::<GraphEvent>(upcoming_url, &upcoming_query),
            self.fetch_all_pages::<GraphEvent>(past_url, &past_query),
        )?;

        let cutoff = OffsetDateTime::now_utc() - lookback;
        let (upcoming_count, past_count) = (upcoming.len(), past.len());
        let events = merge_event_segments(upcoming, past, cutoff);
        let merged = events.len();
        self.logger().info(
            "Fetched page events",
            &[
                ("page_id", &page_id),
                ("upcoming", &upcoming_count),
                ("past", &past_count),
                ("merged", &merged),
            ],
        );
        Ok(events)
    }

    /// A single event by id.
    pub async fn get_event(&self, event_id: &str, token: &str) -> Result<GraphEvent, GraphError> {
        let query = [
            ("access_token", token),
            ("fields", self.config().event_fields.as_str()),
        ];
        let url = self.endpoint(&[event_id], &query)?;
        let value = self.fetch_json(&url).await?;
        serde_json::from_value(value).map_err(GraphError::malformed)
    }

    /// Trade a short-lived user token for a long-lived one.
    pub async fn exchange_token(
        &self,
        app_id: &str,
        app_secret: &str,
        short_lived_token: &str,
    ) -> Result<TokenExchange, GraphError> {
        let query = [
            ("grant_type", "fb_exchange_token"),
            ("client_id", app_id),
            ("client_secret", app_secret),
            ("fb_exchange_token", short_lived_token),
        ];
        let url = self.endpoint(&["oauth", "access_token"], &query)?;
        let value = self.fetch_json(&url).await?;
        serde_json::from_value(value).map_err(GraphError::malformed)
    }
}

/// Union of the upcoming and past segments.
///
/// Past events are kept only if their start time parses and is not before
/// `cutoff`. On duplicate ids the first-seen copy wins, upcoming first.
pub fn merge_event_segments(
    upcoming: Vec<GraphEvent>,
    past: Vec<GraphEvent>,
    cutoff: OffsetDateTime,
) -> Vec<GraphEvent> {
    let recent_past = past.into_iter().filter(|event| {
        event
            .start_time
            .as_deref()
            .and_then(parse_graph_time)
            .is_some_and(|start| start >= cutoff)
    });

    let mut seen = HashSet::new();
    upcoming
        .into_iter()
        .chain(recent_past)
        .filter(|event| seen.insert(event.id.clone()))
        .collect()
}
