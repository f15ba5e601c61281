//! Access-token inspection.
//!
//! Decodes the payload segment of a stored token without validating its
//! signature — the backend is the authority on validity; the client only
//! needs the expiry to schedule warnings. A token that cannot be decoded is
//! treated as already expired.

use std::time::Duration;

use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use chrono::Utc;
use serde::Deserialize;

/// Decoded, unverified token payload.
///
/// Derived on demand from the stored token string; never persisted.
#[derive(Debug, Clone, Deserialize)]
pub struct TokenClaims {
    /// Expiry, seconds since the Unix epoch.
    pub exp: Option<i64>,
    /// Issued-at, seconds since the Unix epoch.
    pub iat: Option<i64>,
    pub user_id: Option<u64>,
    pub email: Option<String>,
}

/// Errors raised when a token payload cannot be decoded.
#[derive(Debug, thiserror::Error)]
pub enum TokenError {
    /// Not three dot-separated segments.
    #[error("Malformed token: expected three dot-separated segments")]
    Malformed,

    /// Payload segment is not valid base64url.
    #[error("Token payload is not valid base64url: {0}")]
    Decode(#[from] base64::DecodeError),

    /// Payload is not a valid JSON record.
    #[error("Token payload is not valid JSON: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Decode the claims of a token without verifying its signature.
pub fn decode(token: &str) -> Result<TokenClaims, TokenError> {
    let mut segments = token.split('.');
    let payload = match (
        segments.next(),
        segments.next(),
        segments.next(),
        segments.next(),
    ) {
        (Some(_), Some(payload), Some(_), None) => payload,
        _ => return Err(TokenError::Malformed),
    };

    let bytes = URL_SAFE_NO_PAD.decode(payload)?;
    Ok(serde_json::from_slice(&bytes)?)
}

/// Whether the token is expired at `now` (seconds since the epoch).
///
/// A token that cannot be decoded, or that carries no expiry, counts as
/// expired.
pub fn is_expired_at(token: &str, now: i64) -> bool {
    match decode(token) {
        Ok(claims) => match claims.exp {
            Some(exp) => exp < now,
            None => true,
        },
        Err(_) => true,
    }
}

/// Whether the token is expired right now.
pub fn is_expired(token: &str) -> bool {
    is_expired_at(token, Utc::now().timestamp())
}

/// Seconds until the token expires, clamped to zero. Zero when the token
/// cannot be decoded.
pub fn seconds_until_expiry_at(token: &str, now: i64) -> i64 {
    match decode(token) {
        Ok(TokenClaims { exp: Some(exp), .. }) => (exp - now).max(0),
        _ => 0,
    }
}

/// Seconds until the token expires, measured from now.
pub fn seconds_until_expiry(token: &str) -> i64 {
    seconds_until_expiry_at(token, Utc::now().timestamp())
}

/// Whether the token expires within `threshold` of `now`, but has not
/// expired yet.
pub fn is_expiring_soon_at(token: &str, now: i64, threshold: Duration) -> bool {
    let remaining = seconds_until_expiry_at(token, now);
    remaining > 0 && remaining < threshold.as_secs() as i64
}

/// Whether the token expires within `threshold` of now.
pub fn is_expiring_soon(token: &str, threshold: Duration) -> bool {
    is_expiring_soon_at(token, Utc::now().timestamp(), threshold)
}
