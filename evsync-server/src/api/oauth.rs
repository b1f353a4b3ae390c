//! OAuth state round trip.
//!
//! # Endpoints
//!
//! - `GET /oauth/state`    - issue a signed state token
//! - `GET /oauth/callback` - verify the state token on return
//!
//! Exchanging the authorization code is left to the caller.

use axum::{
    Json, Router,
    extract::{Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::get,
};
use evsync_sdk::signature::format_state_token;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::api::extractors::VerifiedState;
use crate::state::AppState;

/// What a state token carries. Serialized as JSON before signing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OAuthState {
    pub nonce: String,
    /// Unix seconds.
    pub issued_at: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub return_to: Option<String>,
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/oauth/state", get(issue_state))
        .route("/oauth/callback", get(callback))
}

#[derive(Deserialize)]
struct IssueQuery {
    return_to: Option<String>,
}

#[derive(Serialize)]
struct IssuedState {
    state: String,
    expires_in: u64,
}

/// Only same-site paths are accepted as redirect targets.
fn is_local_path(path: &str) -> bool {
    path.starts_with('/') && !path.starts_with("//") && !path.contains('\\')
}

/// `GET /oauth/state?return_to=/settings`: issue a state token.
async fn issue_state(
    State(state): State<AppState>,
    Query(query): Query<IssueQuery>,
) -> Result<impl IntoResponse, OAuthApiError> {
    let return_to = query.return_to.filter(|r| !r.is_empty());
    if return_to.as_deref().is_some_and(|target| !is_local_path(target)) {
        return Err(OAuthApiError::InvalidReturnTo);
    }

    let payload = OAuthState {
        nonce: hex::encode(rand::random::<[u8; 16]>()),
        issued_at: OffsetDateTime::now_utc().unix_timestamp(),
        return_to,
    };
    let json = serde_json::to_string(&payload).map_err(OAuthApiError::Serialization)?;
    let token = format_state_token(&json, &state.app.state_secret);

    Ok(Json(IssuedState {
        state: token,
        expires_in: state.app.state_ttl.as_secs(),
    }))
}

#[derive(Deserialize)]
struct CallbackQuery {
    code: Option<String>,
    error: Option<String>,
    error_description: Option<String>,
}

#[derive(Serialize)]
struct CallbackResponse {
    verified: bool,
    code_received: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    return_to: Option<String>,
}

/// `GET /oauth/callback?state=...&code=...`: verify the state token.
async fn callback(
    VerifiedState(oauth_state): VerifiedState,
    Query(query): Query<CallbackQuery>,
) -> Result<impl IntoResponse, OAuthApiError> {
    if let Some(error) = query.error {
        tracing::info!(
            error = %error,
            description = ?query.error_description,
            "Authorization was declined"
        );
        return Err(OAuthApiError::Declined(error));
    }

    tracing::info!(nonce = %oauth_state.nonce, "OAuth state verified");
    Ok(Json(CallbackResponse {
        verified: true,
        code_received: query.code.is_some_and(|c| !c.is_empty()),
        return_to: oauth_state.return_to,
    }))
}

#[derive(Debug)]
enum OAuthApiError {
    InvalidReturnTo,
    Declined(String),
    Serialization(serde_json::Error),
}

impl IntoResponse for OAuthApiError {
    fn into_response(self) -> axum::response::Response {
        match self {
            OAuthApiError::InvalidReturnTo => {
                (StatusCode::BAD_REQUEST, "return_to must be a local path").into_response()
            }
            OAuthApiError::Declined(error) => {
                (StatusCode::BAD_REQUEST, format!("authorization declined: {error}"))
                    .into_response()
            }
            OAuthApiError::Serialization(e) => {
                tracing::error!(error = %e, "Failed to serialize OAuth state");
                (StatusCode::INTERNAL_SERVER_ERROR, "internal server error").into_response()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn local_paths_only() {
        assert!(is_local_path("/settings"));
        assert!(is_local_path("/pages?id=1"));
        assert!(!is_local_path("//evil.example"));
        assert!(!is_local_path("https://evil.example"));
        assert!(!is_local_path("/\\evil.example"));
        assert!(!is_local_path("settings"));
    }
}
