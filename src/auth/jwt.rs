//! Unverified JWT claim extraction.
//!
//! The signature is never checked. Claims read here only estimate when the
//! access token will go stale locally; the backend stays the authority on
//! whether a token is valid, and nothing in this crate authorizes anything
//! from these values.

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use serde::Deserialize;

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct Claims {
    #[serde(default)]
    pub exp: Option<f64>,
    #[serde(default)]
    pub sub: Option<String>,
}

/// Decodes the payload segment of a compact JWT.
pub fn decode_claims(token: &str) -> Option<Claims> {
    let mut segments = token.split('.');
    let _header = segments.next()?;
    let payload = segments.next()?;
    segments.next()?;

    let bytes = URL_SAFE_NO_PAD
        .decode(payload.trim_end_matches('='))
        .ok()?;
    serde_json::from_slice(&bytes).ok()
}

/// `exp` claim converted to milliseconds since the epoch.
pub fn expiry_millis(token: &str) -> Option<i64> {
    let exp = decode_claims(token)?.exp?;
    if !exp.is_finite() || exp <= 0.0 {
        return None;
    }

    let millis = exp * 1000.0;
    if millis >= i64::MAX as f64 {
        return None;
    }
    Some(millis as i64)
}
