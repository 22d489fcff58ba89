//! Remote auth gateway port
//!
//! Defines the login, refresh and logout calls the orchestrator makes
//! against the portal.

use std::sync::Arc;

use async_trait::async_trait;
use bimportal_domain::{Credentials, TokenResponse};

/// Errors that can occur while talking to the portal's auth endpoints.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GatewayError {
    /// The request never produced an HTTP response.
    #[error("transport error: {0}")]
    Transport(String),

    /// The portal answered with a non-success status.
    #[error("HTTP {status}: {body}")]
    Status {
        /// HTTP status code.
        status: u16,
        /// Response body, possibly empty.
        body: String,
    },

    /// The response body could not be decoded.
    #[error("invalid response body: {0}")]
    Decode(String),
}

/// Gateway trait for the portal's authentication endpoints.
#[async_trait]
pub trait AuthGateway: Send + Sync {
    /// Exchanges credentials for a token pair.
    ///
    /// # Errors
    /// Returns an error if the request fails or the portal rejects it.
    async fn login(&self, credentials: &Credentials) -> Result<TokenResponse, GatewayError>;

    /// Exchanges a refresh token for a new token pair.
    ///
    /// # Errors
    /// Returns an error if the request fails or the portal rejects it.
    async fn refresh(&self, refresh_token: &str) -> Result<TokenResponse, GatewayError>;

    /// Invalidates the session identified by the access token.
    ///
    /// # Errors
    /// Returns an error if the request fails or the portal rejects it.
    async fn logout(&self, access_token: &str) -> Result<(), GatewayError>;
}

#[async_trait]
impl<T: AuthGateway + ?Sized> AuthGateway for Arc<T> {
    async fn login(&self, credentials: &Credentials) -> Result<TokenResponse, GatewayError> {
        (**self).login(credentials).await
    }

    async fn refresh(&self, refresh_token: &str) -> Result<TokenResponse, GatewayError> {
        (**self).refresh(refresh_token).await
    }

    async fn logout(&self, access_token: &str) -> Result<(), GatewayError> {
        (**self).logout(access_token).await
    }
}
