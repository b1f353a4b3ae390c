//! HMAC-SHA256 integrity primitives.
//!
//! Two consumers share the same primitive:
//!
//! * **Webhook signatures** sent by the Graph API on every delivery:
//!
//!   ```text
//!   X-Hub-Signature-256: sha256={hex(HMAC-SHA256(raw_body, app_secret))}
//!   ```
//!
//! * **OAuth state tokens** carried through the authorization redirect:
//!
//!   ```text
//!   state={urlencode(payload)}|{hex(HMAC-SHA256(payload, state_secret))}
//!   ```
//!
//! All comparisons go through [`constant_time_eq`]. Signature lengths are
//! public, so a length mismatch fails fast; equal-length inputs are always
//! scanned to the end.

use std::borrow::Cow;

/// Header carrying the webhook payload signature.
pub const WEBHOOK_SIGNATURE_HEADER: &str = "X-Hub-Signature-256";

/// Prefix the provider puts in front of the hex digest.
pub const SHA256_PREFIX: &str = "sha256=";

/// Separator between the encoded payload and its MAC in a state token.
pub const STATE_TOKEN_SEPARATOR: char = '|';

/// How the provided signature is encoded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignatureEncoding {
    /// Bare lowercase hex digest.
    Hex,
    /// Hex digest behind a literal `sha256=` prefix.
    Sha256Prefixed,
}

/// Outcome of a signature check.
#[must_use]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Verification {
    pub valid: bool,
}

impl Verification {
    const INVALID: Self = Self { valid: false };

    pub fn is_valid(&self) -> bool {
        self.valid
    }
}

/// Outcome of a state token check. `payload` is only populated when the
/// token verified.
#[must_use]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StateVerification {
    pub valid: bool,
    pub payload: Option<String>,
}

impl StateVerification {
    fn rejected() -> Self {
        Self {
            valid: false,
            payload: None,
        }
    }

    /// Consume the verification, yielding the payload if it was authentic.
    pub fn into_payload(self) -> Option<String> {
        if self.valid { self.payload } else { None }
    }
}

// ---------------------------------------------------------------------------
// HMAC
// ---------------------------------------------------------------------------

/// Compute `HMAC-SHA256(payload, secret)` as lowercase hex.
pub fn compute_hmac(payload: impl AsRef<[u8]>, secret: &[u8]) -> String {
    let key = ring::hmac::Key::new(ring::hmac::HMAC_SHA256, secret);
    let tag = ring::hmac::sign(&key, payload.as_ref());
    hex::encode(tag.as_ref())
}

/// Verify `provided` against the HMAC of `payload`.
///
/// With [`SignatureEncoding::Sha256Prefixed`] a missing `sha256=` prefix is
/// reported as an invalid signature rather than an error.
pub fn verify(
    payload: impl AsRef<[u8]>,
    provided: &str,
    secret: &[u8],
    encoding: SignatureEncoding,
) -> Verification {
    let digest = match encoding {
        SignatureEncoding::Hex => provided,
        SignatureEncoding::Sha256Prefixed => match provided.strip_prefix(SHA256_PREFIX) {
            Some(digest) => digest,
            None => return Verification::INVALID,
        },
    };
    let expected = compute_hmac(payload, secret);
    Verification {
        valid: constant_time_eq(expected.as_bytes(), digest.as_bytes()),
    }
}

/// Verify an `X-Hub-Signature-256` header value against the raw request body.
pub fn verify_webhook_signature(raw_body: &[u8], header_value: &str, secret: &[u8]) -> Verification {
    verify(raw_body, header_value, secret, SignatureEncoding::Sha256Prefixed)
}

/// Compare two byte strings without exiting early on the first difference.
pub fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut diff = 0u8;
    for (x, y) in a.iter().zip(b.iter()) {
        diff |= x ^ y;
    }
    diff == 0
}

// ---------------------------------------------------------------------------
// OAuth state tokens
// ---------------------------------------------------------------------------

/// Build `{urlencode(payload)}|{hex_hmac(payload)}`.
pub fn format_state_token(payload: &str, secret: &[u8]) -> String {
    format!(
        "{}{}{}",
        urlencoding::encode(payload),
        STATE_TOKEN_SEPARATOR,
        compute_hmac(payload, secret)
    )
}

/// Split a state token on its first separator, decode the payload, and check
/// the MAC of the decoded value.
///
/// Any structural problem (missing half, bad percent-encoding) fails closed.
pub fn parse_and_verify_state_token(token: &str, secret: &[u8]) -> StateVerification {
    let Some((encoded, mac)) = token.split_once(STATE_TOKEN_SEPARATOR) else {
        return StateVerification::rejected();
    };
    if encoded.is_empty() || mac.is_empty() {
        return StateVerification::rejected();
    }
    let payload: Cow<'_, str> = match urlencoding::decode(encoded) {
        Ok(decoded) => decoded,
        Err(_) => return StateVerification::rejected(),
    };
    if !verify(payload.as_bytes(), mac, secret, SignatureEncoding::Hex).is_valid() {
        return StateVerification::rejected();
    }
    StateVerification {
        valid: true,
        payload: Some(payload.into_owned()),
    }
}
