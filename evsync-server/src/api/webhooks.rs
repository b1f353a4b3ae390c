//! Graph webhook endpoint.
//!
//! # Endpoints
//!
//! - `GET  /webhooks/graph` - subscription handshake
//! - `POST /webhooks/graph` - signed change delivery

use axum::{
    Json, Router,
    extract::{Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::get,
};
use evsync_sdk::signature::constant_time_eq;
use kanau::processor::Processor;
use serde::Deserialize;

use crate::api::extractors::SignedWebhook;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new().route("/webhooks/graph", get(handshake).post(receive))
}

#[derive(Deserialize)]
struct HandshakeQuery {
    #[serde(rename = "hub.mode")]
    mode: Option<String>,
    #[serde(rename = "hub.verify_token")]
    verify_token: Option<String>,
    #[serde(rename = "hub.challenge")]
    challenge: Option<String>,
}

/// `GET /webhooks/graph`: echo `hub.challenge` when the verify token
/// matches.
async fn handshake(
    State(state): State<AppState>,
    Query(query): Query<HandshakeQuery>,
) -> impl IntoResponse {
    let token_matches = query.verify_token.as_deref().is_some_and(|token| {
        constant_time_eq(token.as_bytes(), state.app.verify_token.as_bytes())
    });

    match (query.mode.as_deref(), query.challenge) {
        (Some("subscribe"), Some(challenge)) if token_matches => {
            tracing::info!("Webhook subscription verified");
            (StatusCode::OK, challenge)
        }
        _ => {
            tracing::warn!(mode = ?query.mode, "Webhook subscription handshake rejected");
            (StatusCode::FORBIDDEN, "verification failed".to_string())
        }
    }
}

/// `POST /webhooks/graph`: process a verified delivery and report counts.
async fn receive(
    State(state): State<AppState>,
    SignedWebhook(payload): SignedWebhook,
) -> impl IntoResponse {
    let Ok(report) = state.webhooks.process(payload).await;
    Json(report)
}
