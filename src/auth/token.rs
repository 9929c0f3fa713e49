//! Reading JWT claims.
//!
//! Tokens are decoded, never verified: the payload segment is trusted as-is
//! and signatures are ignored.

use super::state::User;
use crate::error::TokenError;
use base64::engine::general_purpose::{STANDARD_NO_PAD, URL_SAFE_NO_PAD};
use base64::Engine;
use serde::Deserialize;
use serde_json::{Map, Value};

/// Claims the session core reads from an access token.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Claims {
    /// Expiry, seconds since the epoch.
    #[serde(default)]
    pub exp: Option<f64>,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub sub: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Claims {
    pub fn subject(&self) -> Option<&str> {
        self.username.as_deref().or(self.sub.as_deref())
    }
}

/// Decode the payload segment of `token`.
pub fn decode_claims(token: &str) -> Result<Claims, TokenError> {
    let segment = token.split('.').nth(1).ok_or(TokenError::MissingPayload)?;
    let segment = segment.trim_end_matches('=');
    if segment.is_empty() {
        return Err(TokenError::MissingPayload);
    }
    let bytes = URL_SAFE_NO_PAD
        .decode(segment)
        .or_else(|_| STANDARD_NO_PAD.decode(segment))?;
    Ok(serde_json::from_slice(&bytes)?)
}

/// Whether `token` is expired at `now` (seconds since the epoch).
///
/// Anything that cannot be read, including a missing `exp`, counts as
/// expired.
pub fn is_expired_at(token: &str, now: i64) -> bool {
    match decode_claims(token) {
        Ok(Claims { exp: Some(exp), .. }) => exp < now as f64,
        _ => true,
    }
}

/// Whether `token` is expired right now.
pub fn is_token_expired(token: &str) -> bool {
    is_expired_at(token, chrono::Utc::now().timestamp())
}

/// Build the user described by `token`.
pub fn user_from_token(token: &str) -> Result<User, TokenError> {
    let claims = decode_claims(token)?;
    let username = claims.subject().ok_or(TokenError::MissingSubject)?.to_string();
    Ok(User {
        username,
        email: claims.email,
        preferences: None,
    })
}
