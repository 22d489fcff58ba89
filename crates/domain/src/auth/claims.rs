//! Unverified claim extraction from bearer tokens.
//!
//! The payload segment of a compact token is decoded without checking the
//! signature. The portal verifies every token it receives; the client only
//! reads `exp` and the user id to make caching decisions. Nothing decoded
//! here may be used for an authorization decision.

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::error::{TokenError, TokenResult};

/// Claim carrying the expiration as Unix epoch seconds.
pub const EXPIRATION_CLAIM: &str = "exp";

/// Claim names searched for the user id, highest priority first.
pub const USER_ID_CLAIMS: [&str; 4] = ["sub", "userId", "user_id", "id"];

/// Claims the client cares about, decoded from an access token.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TokenClaims {
    /// Absolute expiration, `None` when the token carries no usable `exp`.
    pub expires_at: Option<DateTime<Utc>>,
    /// User id, `None` when no claim matched or it was not a UUID.
    pub user_id: Option<Uuid>,
}

impl TokenClaims {
    /// Decodes the claims of a compact token.
    ///
    /// Missing claims inside a well-formed payload are not errors; they are
    /// reported as `None` fields.
    ///
    /// # Errors
    ///
    /// Returns a [`TokenError`] if the token has no payload segment or the
    /// payload is not base64url-encoded JSON object.
    pub fn decode(token: &str) -> TokenResult<Self> {
        let payload = decode_payload(token)?;
        Ok(Self {
            expires_at: expiration(&payload),
            user_id: user_id(&payload),
        })
    }

    /// Decodes the claims, logging and swallowing any decoding failure.
    #[must_use]
    pub fn decode_lenient(token: &str) -> Self {
        Self::decode(token).unwrap_or_else(|e| {
            tracing::warn!(error = %e, "Could not decode token claims");
            Self::default()
        })
    }
}

fn decode_payload(token: &str) -> TokenResult<Map<String, Value>> {
    if token.trim().is_empty() {
        return Err(TokenError::Empty);
    }

    let segments: Vec<&str> = token.trim().split('.').collect();
    if segments.len() < 2 {
        return Err(TokenError::MissingPayload(segments.len()));
    }

    // Some issuers keep the padding.
    let encoded = segments[1].trim_end_matches('=');
    let bytes = URL_SAFE_NO_PAD
        .decode(encoded)
        .map_err(|e| TokenError::InvalidEncoding(e.to_string()))?;

    match serde_json::from_slice::<Value>(&bytes) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(_) => Err(TokenError::NotAnObject),
        Err(e) => Err(TokenError::InvalidJson(e.to_string())),
    }
}

#[allow(clippy::cast_possible_truncation)]
fn expiration(payload: &Map<String, Value>) -> Option<DateTime<Utc>> {
    let Some(raw) = payload.get(EXPIRATION_CLAIM) else {
        tracing::warn!("No exp claim found in token");
        return None;
    };

    let seconds = raw
        .as_i64()
        .or_else(|| raw.as_f64().map(|secs| secs.trunc() as i64));
    let expires_at = seconds.and_then(|secs| DateTime::from_timestamp(secs, 0));

    if expires_at.is_none() {
        tracing::warn!(exp = %raw, "Token exp claim is not a usable timestamp");
    }
    expires_at
}

/// First claim present as a string wins; a value that is not a UUID makes
/// the user id absent rather than falling through to lower-priority claims.
fn user_id(payload: &Map<String, Value>) -> Option<Uuid> {
    let found = USER_ID_CLAIMS.iter().find_map(|name| {
        payload
            .get(*name)
            .and_then(Value::as_str)
            .map(|value| (*name, value))
    });

    let Some((claim, raw)) = found else {
        let available: Vec<&str> = payload.keys().map(String::as_str).collect();
        tracing::debug!(
            ?available,
            "No user id claim found in token, checked sub, userId, user_id, id"
        );
        return None;
    };

    match Uuid::parse_str(raw) {
        Ok(id) => Some(id),
        Err(_) => {
            tracing::warn!(claim, "User id claim in token is not a valid UUID");
            None
        }
    }
}
