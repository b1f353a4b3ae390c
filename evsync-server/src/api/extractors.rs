//! Custom Axum extractors for request integrity.
//!
//! Provides:
//! - `SignedWebhook` verifies `X-Hub-Signature-256` over the raw request
//!   body before parsing it as a [`WebhookPayload`].
//! - `VerifiedState` verifies the OAuth `state` query parameter and decodes
//!   the [`OAuthState`] it carries.
//! - `AdminAuth` guards the operator `/api` routes with the admin secret.
//!
//! All cryptographic operations are delegated to [`evsync_sdk::signature`].

use axum::{
    extract::{FromRequest, FromRequestParts, Query, Request},
    http::{StatusCode, request::Parts},
    response::{IntoResponse, Response},
};
use evsync_sdk::objects::WebhookPayload;
use evsync_sdk::signature::{
    WEBHOOK_SIGNATURE_HEADER, parse_and_verify_state_token, verify_webhook_signature,
};
use serde::Deserialize;
use time::OffsetDateTime;

use crate::api::oauth::OAuthState;
use crate::state::AppState;

/// Header carrying the plaintext admin secret.
pub const ADMIN_AUTH_HEADER: &str = "Evsync-Admin-Authorization";

/// Deliveries larger than this are refused.
const MAX_WEBHOOK_BODY: usize = 1024 * 1024;

/// Accepted clock skew for state tokens issued "in the future".
const STATE_CLOCK_SKEW_SECS: i64 = 30;

// ---------------------------------------------------------------------------
// SignedWebhook: Graph webhook deliveries
// ---------------------------------------------------------------------------

/// An Axum extractor that verifies the `X-Hub-Signature-256` header against
/// the raw body and then deserializes it.
///
/// # Header format
///
/// ```text
/// X-Hub-Signature-256: sha256={hex_hmac}
/// ```
///
/// The HMAC is `HMAC-SHA256(raw_body, app_secret)`. The body is verified
/// byte for byte, before any JSON parsing.
pub struct SignedWebhook(pub WebhookPayload);

#[derive(Debug, thiserror::Error)]
pub enum SignedWebhookError {
    #[error("missing X-Hub-Signature-256 header")]
    MissingHeader,
    #[error("invalid X-Hub-Signature-256 header")]
    InvalidHeader,
    #[error("failed to read request body")]
    BodyReadError,
    #[error("signature verification failed")]
    VerificationFailed,
    #[error("invalid JSON body: {0}")]
    JsonError(serde_json::Error),
}

impl IntoResponse for SignedWebhookError {
    fn into_response(self) -> Response {
        let status = match self {
            SignedWebhookError::MissingHeader | SignedWebhookError::VerificationFailed => {
                StatusCode::UNAUTHORIZED
            }
            SignedWebhookError::InvalidHeader
            | SignedWebhookError::BodyReadError
            | SignedWebhookError::JsonError(_) => StatusCode::BAD_REQUEST,
        };
        if status == StatusCode::UNAUTHORIZED {
            tracing::warn!(error = %self, "Rejected webhook delivery");
        }
        (status, self.to_string()).into_response()
    }
}

impl FromRequest<AppState> for SignedWebhook {
    type Rejection = SignedWebhookError;

    async fn from_request(req: Request, state: &AppState) -> Result<Self, Self::Rejection> {
        let header_value = req
            .headers()
            .get(WEBHOOK_SIGNATURE_HEADER)
            .ok_or(SignedWebhookError::MissingHeader)?
            .to_str()
            .map_err(|_| SignedWebhookError::InvalidHeader)?
            .to_owned();

        let body_bytes = axum::body::to_bytes(req.into_body(), MAX_WEBHOOK_BODY)
            .await
            .map_err(|_| SignedWebhookError::BodyReadError)?;

        if !verify_webhook_signature(&body_bytes, &header_value, &state.app.app_secret).is_valid()
        {
            return Err(SignedWebhookError::VerificationFailed);
        }

        let payload =
            serde_json::from_slice(&body_bytes).map_err(SignedWebhookError::JsonError)?;
        Ok(SignedWebhook(payload))
    }
}

// ---------------------------------------------------------------------------
// VerifiedState: OAuth callback CSRF protection
// ---------------------------------------------------------------------------

/// An Axum extractor that verifies the `state` query parameter issued by
/// `GET /oauth/state`.
///
/// # Token format
///
/// ```text
/// state={url_encoded_json}|{hex_hmac}
/// ```
///
/// Implements `FromRequestParts` so it can be combined with `Query<T>`.
pub struct VerifiedState(pub OAuthState);

#[derive(Debug)]
pub enum VerifiedStateError {
    MissingState,
    SignatureMismatch,
    MalformedPayload,
    Expired,
}

impl IntoResponse for VerifiedStateError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            VerifiedStateError::MissingState => {
                (StatusCode::BAD_REQUEST, "missing state parameter")
            }
            VerifiedStateError::SignatureMismatch => {
                (StatusCode::FORBIDDEN, "state verification failed")
            }
            VerifiedStateError::MalformedPayload => (StatusCode::BAD_REQUEST, "malformed state"),
            VerifiedStateError::Expired => (StatusCode::FORBIDDEN, "state expired"),
        };
        (status, message).into_response()
    }
}

#[derive(Deserialize)]
struct StateQuery {
    state: Option<String>,
}

impl FromRequestParts<AppState> for VerifiedState {
    type Rejection = VerifiedStateError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let Query(query) = Query::<StateQuery>::try_from_uri(&parts.uri)
            .map_err(|_| VerifiedStateError::MissingState)?;
        let token = query
            .state
            .filter(|s| !s.is_empty())
            .ok_or(VerifiedStateError::MissingState)?;

        let payload = parse_and_verify_state_token(&token, &state.app.state_secret)
            .into_payload()
            .ok_or(VerifiedStateError::SignatureMismatch)?;

        let decoded: OAuthState =
            serde_json::from_str(&payload).map_err(|_| VerifiedStateError::MalformedPayload)?;

        let now = OffsetDateTime::now_utc().unix_timestamp();
        let ttl = i64::try_from(state.app.state_ttl.as_secs()).unwrap_or(i64::MAX);
        if decoded.issued_at > now + STATE_CLOCK_SKEW_SECS
            || now.saturating_sub(decoded.issued_at) > ttl
        {
            return Err(VerifiedStateError::Expired);
        }

        Ok(VerifiedState(decoded))
    }
}

// ---------------------------------------------------------------------------
// AdminAuth: operator endpoints
// ---------------------------------------------------------------------------

/// An Axum extractor that admits the request only when the
/// `Evsync-Admin-Authorization` header matches `app.admin_secret`.
///
/// A plaintext secret is compared in constant time; an argon2 hash is
/// verified with argon2.
pub struct AdminAuth;

#[derive(Debug)]
pub enum AdminAuthError {
    MissingHeader,
    InvalidSecret,
}

impl IntoResponse for AdminAuthError {
    fn into_response(self) -> Response {
        let message = match self {
            AdminAuthError::MissingHeader => "missing Evsync-Admin-Authorization header",
            AdminAuthError::InvalidSecret => "invalid admin secret",
        };
        tracing::warn!(reason = message, "Rejected admin request");
        (StatusCode::UNAUTHORIZED, message).into_response()
    }
}

impl FromRequestParts<AppState> for AdminAuth {
    type Rejection = AdminAuthError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let provided = parts
            .headers
            .get(ADMIN_AUTH_HEADER)
            .ok_or(AdminAuthError::MissingHeader)?;
        if state.app.admin_secret.verify(provided.as_bytes()) {
            Ok(AdminAuth)
        } else {
            Err(AdminAuthError::InvalidSecret)
        }
    }
}
