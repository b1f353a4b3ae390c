//! Read side of the event store, plus a manual refresh trigger.
//!
//! Every route requires the `Evsync-Admin-Authorization` header.
//!
//! # Endpoints
//!
//! - `GET  /api/events`  - normalized events, most recent first
//! - `POST /api/refresh` - run one refresh pass now
//! - `POST /api/tokens/refresh` - exchange every page token for a long-lived one

use axum::{
    Json, Router,
    extract::{Query, State},
    response::IntoResponse,
    routing::{get, post},
};
use evsync_core::processors::{RefreshTick, TokenRefreshTick};
use kanau::processor::Processor;
use serde::Deserialize;

use crate::api::extractors::AdminAuth;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/events", get(list_events))
        .route("/api/refresh", post(refresh_now))
        .route("/api/tokens/refresh", post(refresh_tokens))
}

#[derive(Deserialize)]
struct ListEventsQuery {
    page_id: Option<String>,
}

/// `GET /api/events?page_id=...`
async fn list_events(
    _auth: AdminAuth,
    State(state): State<AppState>,
    Query(query): Query<ListEventsQuery>,
) -> impl IntoResponse {
    let events = match query.page_id.as_deref() {
        Some(page_id) => state.sink.for_page(page_id),
        None => state.sink.snapshot(),
    };
    Json(events)
}

/// `POST /api/refresh`: pages denied by the refresh limiter are reported as
/// skipped.
async fn refresh_now(_auth: AdminAuth, State(state): State<AppState>) -> impl IntoResponse {
    let Ok(report) = state.refresher.process(RefreshTick).await;
    Json(report)
}

/// `POST /api/tokens/refresh`
async fn refresh_tokens(_auth: AdminAuth, State(state): State<AppState>) -> impl IntoResponse {
    let Ok(report) = state.tokens.process(TokenRefreshTick).await;
    Json(report)
}
