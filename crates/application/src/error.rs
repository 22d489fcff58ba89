//! Application error types

use thiserror::Error;

use crate::ports::GatewayError;

/// Authentication failure.
///
/// This is the only error type returned by the authentication service.
/// Every variant means no usable token could be obtained or a required
/// piece of authentication state is missing.
#[derive(Debug, Error)]
pub enum AuthError {
    /// Username or password is not configured.
    #[error("no credentials configured, please set BIM_PORTAL_USERNAME and BIM_PORTAL_PASSWORD")]
    NoCredentials,

    /// A refresh was requested but no refresh token is cached.
    #[error("no refresh token available")]
    NoRefreshToken,

    /// The portal answered successfully but without an access token.
    #[error("{operation} failed: no token in server response")]
    EmptyResponse {
        /// The operation that produced the empty response.
        operation: &'static str,
    },

    /// The remote call itself failed.
    #[error("{operation} failed: {source}")]
    Gateway {
        /// The operation that failed.
        operation: &'static str,
        /// Underlying gateway error.
        #[source]
        source: GatewayError,
    },

    /// Neither a refresh nor a full login produced a token.
    #[error("failed to authenticate, please check credentials")]
    Exhausted {
        /// Why the final login attempt failed.
        #[source]
        source: Box<AuthError>,
    },

    /// The current token carries no usable user id.
    #[error("user id not available, authenticate first and make sure the token carries a user claim")]
    UserIdUnavailable,
}

impl AuthError {
    pub(crate) const fn gateway(operation: &'static str, source: GatewayError) -> Self {
        Self::Gateway { operation, source }
    }
}

/// Result type alias for authentication operations.
pub type AuthResult<T> = Result<T, AuthError>;
