//! Domain error types

use thiserror::Error;

/// Errors raised while decoding the claims of a bearer token.
///
/// These never cross the authentication boundary: callers log them and
/// treat the affected claims as absent.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TokenError {
    /// The token string is empty or blank.
    #[error("malformed token: token is empty")]
    Empty,

    /// The token has no payload segment.
    #[error("malformed token: expected at least 2 segments, found {0}")]
    MissingPayload(usize),

    /// The payload segment is not valid base64url.
    #[error("malformed token: payload is not base64url: {0}")]
    InvalidEncoding(String),

    /// The decoded payload is not valid JSON.
    #[error("malformed token: payload is not JSON: {0}")]
    InvalidJson(String),

    /// The decoded payload is JSON but not an object.
    #[error("malformed token: payload is not a JSON object")]
    NotAnObject,
}

/// Result type alias for token decoding.
pub type TokenResult<T> = Result<T, TokenError>;
