//! Classified Graph API failures.
//!
//! A failure is classified exactly once, where the HTTP status and body are
//! still at hand. Callers match on the variant and never parse messages.

use thiserror::Error;

/// Error code the API uses for invalid or expired access tokens.
pub const EXPIRED_TOKEN_CODE: i64 = 190;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GraphError {
    /// The access token is invalid or expired. Never retried; the caller
    /// should trigger re-authentication.
    #[error("credential expired (status {status}{}): {message}", code_suffix(.code))]
    CredentialExpired {
        status: u16,
        code: Option<i64>,
        message: String,
    },

    /// 429 or 5xx. Retried with backoff until attempts run out.
    #[error("retryable upstream error (status {status}): {message}")]
    Retryable { status: u16, message: String },

    /// Any other non-success status. Never retried.
    #[error("upstream error (status {status}): {message}")]
    Permanent { status: u16, message: String },

    /// No HTTP response: DNS failure, connection reset, timeout.
    #[error("transport error: {message}")]
    Transport { message: String },

    /// The body was not the JSON we expected. Never retried.
    #[error("malformed response body: {message}")]
    Malformed { message: String },

    /// A request or cursor URL could not be built.
    #[error("invalid url: {0}")]
    InvalidUrl(String),
}

fn code_suffix(code: &Option<i64>) -> String {
    code.map(|code| format!(", code {code}")).unwrap_or_default()
}

/// Fieldless view of [`GraphError`] for reports and log fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum GraphErrorKind {
    CredentialExpired,
    Retryable,
    Permanent,
    Transport,
    Malformed,
    InvalidUrl,
}

impl std::fmt::Display for GraphErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GraphErrorKind::CredentialExpired => write!(f, "credential_expired"),
            GraphErrorKind::Retryable => write!(f, "retryable"),
            GraphErrorKind::Permanent => write!(f, "permanent"),
            GraphErrorKind::Transport => write!(f, "transport"),
            GraphErrorKind::Malformed => write!(f, "malformed"),
            GraphErrorKind::InvalidUrl => write!(f, "invalid_url"),
        }
    }
}

impl GraphError {
    pub fn kind(&self) -> GraphErrorKind {
        match self {
            GraphError::CredentialExpired { .. } => GraphErrorKind::CredentialExpired,
            GraphError::Retryable { .. } => GraphErrorKind::Retryable,
            GraphError::Permanent { .. } => GraphErrorKind::Permanent,
            GraphError::Transport { .. } => GraphErrorKind::Transport,
            GraphError::Malformed { .. } => GraphErrorKind::Malformed,
            GraphError::InvalidUrl(_) => GraphErrorKind::InvalidUrl,
        }
    }

    /// Whether another attempt may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            GraphError::Retryable { .. } | GraphError::Transport { .. }
        )
    }

    pub fn is_credential_expired(&self) -> bool {
        matches!(self, GraphError::CredentialExpired { .. })
    }

    /// HTTP status, when the failure came with a response.
    pub fn status(&self) -> Option<u16> {
        match self {
            GraphError::CredentialExpired { status, .. }
            | GraphError::Retryable { status, .. }
            | GraphError::Permanent { status, .. } => Some(*status),
            _ => None,
        }
    }

    pub(crate) fn malformed(err: impl std::fmt::Display) -> Self {
        GraphError::Malformed {
            message: err.to_string(),
        }
    }
}

impl From<url::ParseError> for GraphError {
    fn from(err: url::ParseError) -> Self {
        GraphError::InvalidUrl(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn credential_expired_message_shows_code_only_when_present() {
        let with_code = GraphError::CredentialExpired {
            status: 400,
            code: Some(EXPIRED_TOKEN_CODE),
            message: "Session has expired".into(),
        };
        assert_eq!(
            with_code.to_string(),
            "credential expired (status 400, code 190): Session has expired"
        );

        let without_code = GraphError::CredentialExpired {
            status: 401,
            code: None,
            message: "Unauthorized".into(),
        };
        assert_eq!(
            without_code.to_string(),
            "credential expired (status 401): Unauthorized"
        );
    }
}
