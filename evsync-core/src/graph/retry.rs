//! Retry bound, backoff schedule and status classification.

use std::time::Duration;

use super::error::{EXPIRED_TOKEN_CODE, GraphError};

/// Exponent cap for the backoff multiplier (2^16 * base).
const MAX_BACKOFF_EXPONENT: u32 = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(1000),
        }
    }
}

impl RetryPolicy {
    /// At least one attempt is always made.
    pub fn new(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
        }
    }

    /// Delay after failed attempt `attempt` (1-based): `base * 2^(attempt-1)`.
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(MAX_BACKOFF_EXPONENT);
        self.base_delay.saturating_mul(1u32 << exponent)
    }

    /// Whether `err` on attempt `attempt` earns another try.
    pub fn should_retry(&self, err: &GraphError, attempt: u32) -> bool {
        err.is_retryable() && attempt < self.max_attempts
    }
}

/// 429 and the whole 5xx range are transient.
pub fn is_retryable_status(status: u16) -> bool {
    status == 429 || (500..=599).contains(&status)
}

/// Classify a non-success response from its status and raw body.
///
/// Order matters: an unparseable body is `Malformed` whatever the status,
/// then the credential check (code 190 or HTTP 401) wins over status-based
/// classification.
pub fn classify_failure(status: u16, body: &[u8]) -> GraphError {
    let parsed: serde_json::Value = match serde_json::from_slice(body) {
        Ok(value) => value,
        Err(e) => {
            return GraphError::Malformed {
                message: format!("error body (status {status}) is not JSON: {e}"),
            };
        }
    };

    let error = parsed.get("error");
    let code = error.and_then(|e| e.get("code")).and_then(|c| c.as_i64());
    let message = error
        .and_then(|e| e.get("message"))
        .and_then(|m| m.as_str())
        .map(str::to_owned)
        .unwrap_or_else(|| format!("HTTP {status}"));

    if code == Some(EXPIRED_TOKEN_CODE) || status == 401 {
        return GraphError::CredentialExpired {
            status,
            code,
            message,
        };
    }

    if is_retryable_status(status) {
        GraphError::Retryable { status, message }
    } else {
        GraphError::Permanent { status, message }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_doubles_from_base() {
        let policy = RetryPolicy::new(5, Duration::from_millis(100));
        assert_eq!(policy.backoff_delay(1), Duration::from_millis(100));
        assert_eq!(policy.backoff_delay(2), Duration::from_millis(200));
        assert_eq!(policy.backoff_delay(3), Duration::from_millis(400));
        assert_eq!(policy.backoff_delay(4), Duration::from_millis(800));
    }

    #[test]
    fn backoff_is_capped() {
        let policy = RetryPolicy::new(100, Duration::from_millis(1));
        assert_eq!(policy.backoff_delay(17), Duration::from_millis(65536));
        assert_eq!(policy.backoff_delay(90), Duration::from_millis(65536));
    }

    #[test]
    fn zero_attempts_means_one() {
        assert_eq!(RetryPolicy::new(0, Duration::ZERO).max_attempts, 1);
    }

    #[test]
    fn retryable_statuses() {
        assert!(is_retryable_status(429));
        for status in 500..=599 {
            assert!(is_retryable_status(status));
        }
        for status in [400, 403, 404, 408, 499, 600] {
            assert!(!is_retryable_status(status));
        }
    }

    #[test]
    fn classify_expired_token_code_on_any_status() {
        let body = br#"{"error":{"code":190,"message":"Session has expired"}}"#;
        let err = classify_failure(400, body);
        assert_eq!(
            err,
            GraphError::CredentialExpired {
                status: 400,
                code: Some(190),
                message: "Session has expired".into(),
            }
        );
        // Credential check wins over a retryable status.
        assert!(classify_failure(500, body).is_credential_expired());
    }

    #[test]
    fn classify_401_without_code() {
        let err = classify_failure(401, br#"{"error":{"message":"nope"}}"#);
        assert!(err.is_credential_expired());
        assert_eq!(err.status(), Some(401));
    }

    #[test]
    fn classify_by_status() {
        let body = br#"{"error":{"code":2,"message":"Service temporarily unavailable"}}"#;
        assert!(matches!(
            classify_failure(503, body),
            GraphError::Retryable { status: 503, .. }
        ));
        assert!(matches!(
            classify_failure(429, b"{}"),
            GraphError::Retryable { status: 429, .. }
        ));
        assert_eq!(
            classify_failure(404, b"{}"),
            GraphError::Permanent {
                status: 404,
                message: "HTTP 404".into()
            }
        );
    }

    #[test]
    fn classify_non_json_body_as_malformed() {
        let err = classify_failure(503, b"<html>Bad Gateway</html>");
        assert_eq!(err.kind(), super::super::GraphErrorKind::Malformed);
        assert!(!err.is_retryable());
    }

    #[test]
    fn should_retry_respects_bound() {
        let policy = RetryPolicy::new(3, Duration::from_millis(10));
        let err = GraphError::Retryable {
            status: 502,
            message: String::new(),
        };
        assert!(policy.should_retry(&err, 1));
        assert!(policy.should_retry(&err, 2));
        assert!(!policy.should_retry(&err, 3));
        let fatal = GraphError::Permanent {
            status: 400,
            message: String::new(),
        };
        assert!(!policy.should_retry(&fatal, 1));
    }
}
