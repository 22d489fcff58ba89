//! HTTP implementation of the auth gateway.
//!
//! Talks JSON to the portal's public auth endpoints using reqwest.

use async_trait::async_trait;
use bimportal_application::ports::{AuthGateway, GatewayError};
use bimportal_domain::{Credentials, TokenResponse, bearer_header};
use reqwest::header::AUTHORIZATION;
use reqwest::{Client, RequestBuilder, Response};
use serde::Serialize;

use crate::config::BimPortalConfig;

const USER_AGENT: &str = concat!("bimportal-client/", env!("CARGO_PKG_VERSION"));

/// Login request body.
#[derive(Serialize)]
struct LoginRequest<'a> {
    mail: &'a str,
    password: &'a str,
}

/// Refresh request body.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct RefreshRequest<'a> {
    refresh_token: &'a str,
}

/// Auth gateway backed by the portal's REST endpoints.
#[derive(Debug, Clone)]
pub struct HttpAuthGateway {
    client: Client,
    login_url: String,
    refresh_url: String,
    logout_url: String,
}

impl HttpAuthGateway {
    /// Creates a gateway with timeouts taken from the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be created.
    pub fn new(config: &BimPortalConfig) -> Result<Self, GatewayError> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(config.request_timeout)
            .connect_timeout(config.connect_timeout)
            .build()
            .map_err(|e| GatewayError::Transport(e.to_string()))?;

        Ok(Self::with_client(client, config))
    }

    /// Creates a gateway around an existing reqwest client.
    #[must_use]
    pub fn with_client(client: Client, config: &BimPortalConfig) -> Self {
        Self {
            client,
            login_url: config.login_url(),
            refresh_url: config.refresh_url(),
            logout_url: config.logout_url(),
        }
    }

    async fn send(builder: RequestBuilder) -> Result<Response, GatewayError> {
        let response = builder
            .header("Accept", "application/json")
            .send()
            .await
            .map_err(Self::map_error)?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = match response.text().await {
                Ok(body) => body,
                Err(e) => {
                    tracing::debug!(status, error = %e, "Could not read error response body");
                    String::new()
                }
            };
            return Err(GatewayError::Status { status, body });
        }
        Ok(response)
    }

    async fn token_request<B: Serialize + Sync>(
        &self,
        url: &str,
        body: &B,
    ) -> Result<TokenResponse, GatewayError> {
        let response = Self::send(self.client.post(url).json(body)).await?;
        response
            .json::<TokenResponse>()
            .await
            .map_err(|e| GatewayError::Decode(e.to_string()))
    }

    /// Maps reqwest errors to `GatewayError`.
    fn map_error(error: reqwest::Error) -> GatewayError {
        if error.is_timeout() {
            return GatewayError::Transport(format!("request timed out: {error}"));
        }
        if error.is_connect() {
            return GatewayError::Transport(format!("connection failed: {error}"));
        }
        GatewayError::Transport(error.to_string())
    }
}

#[async_trait]
impl AuthGateway for HttpAuthGateway {
    async fn login(&self, credentials: &Credentials) -> Result<TokenResponse, GatewayError> {
        let body = LoginRequest {
            mail: &credentials.username,
            password: &credentials.password,
        };
        self.token_request(&self.login_url, &body).await
    }

    async fn refresh(&self, refresh_token: &str) -> Result<TokenResponse, GatewayError> {
        let body = RefreshRequest { refresh_token };
        self.token_request(&self.refresh_url, &body).await
    }

    async fn logout(&self, access_token: &str) -> Result<(), GatewayError> {
        let request = self
            .client
            .post(&self.logout_url)
            .header(AUTHORIZATION, bearer_header(access_token));
        Self::send(request).await?;
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use super::*;
    use crate::config::{LOGIN_ENDPOINT, LOGOUT_ENDPOINT, REFRESH_ENDPOINT};
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use wiremock::matchers::{body_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn gateway_for(server: &MockServer) -> HttpAuthGateway {
        let config = BimPortalConfig::default().with_base_url(&server.uri());
        HttpAuthGateway::new(&config).unwrap()
    }

    #[tokio::test]
    async fn test_login_posts_credentials() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(LOGIN_ENDPOINT))
            .and(body_json(json!({"mail": "user@example.com", "password": "secret"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "token": "access",
                "refreshToken": "refresh",
                "validTill": "2030-01-01T00:00:00Z"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let response = gateway_for(&server)
            .login(&Credentials::new("user@example.com", "secret"))
            .await
            .unwrap();

        assert_eq!(response.access_token(), Some("access"));
        assert_eq!(response.refresh_token.as_deref(), Some("refresh"));
    }

    #[tokio::test]
    async fn test_refresh_posts_refresh_token() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(REFRESH_ENDPOINT))
            .and(body_json(json!({"refreshToken": "refresh"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"token": "new"})))
            .expect(1)
            .mount(&server)
            .await;

        let response = gateway_for(&server).refresh("refresh").await.unwrap();

        assert_eq!(response.access_token(), Some("new"));
        assert_eq!(response.refresh_token, None);
    }

    #[tokio::test]
    async fn test_rejected_login_maps_to_status() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(LOGIN_ENDPOINT))
            .respond_with(ResponseTemplate::new(401).set_body_string("bad credentials"))
            .mount(&server)
            .await;

        let error = gateway_for(&server)
            .login(&Credentials::new("user@example.com", "wrong"))
            .await
            .unwrap_err();

        assert_eq!(
            error,
            GatewayError::Status {
                status: 401,
                body: "bad credentials".to_string()
            }
        );
    }

    #[tokio::test]
    async fn test_invalid_body_maps_to_decode() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(REFRESH_ENDPOINT))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>"))
            .mount(&server)
            .await;

        let error = gateway_for(&server).refresh("refresh").await.unwrap_err();

        assert!(matches!(error, GatewayError::Decode(_)));
    }

    #[tokio::test]
    async fn test_empty_error_body_keeps_status() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(LOGOUT_ENDPOINT))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let error = gateway_for(&server).logout("access").await.unwrap_err();

        assert_eq!(
            error,
            GatewayError::Status {
                status: 503,
                body: String::new()
            }
        );
    }

    #[tokio::test]
    async fn test_logout_sends_bearer_token() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(LOGOUT_ENDPOINT))
            .and(header("authorization", "Bearer access"))
            .respond_with(ResponseTemplate::new(200).set_body_string("ok"))
            .expect(1)
            .mount(&server)
            .await;

        gateway_for(&server).logout("access").await.unwrap();
    }

    #[tokio::test]
    async fn test_unreachable_server_maps_to_transport() {
        let server = MockServer::start().await;
        let gateway = gateway_for(&server);
        drop(server);

        let error = gateway.refresh("refresh").await.unwrap_err();

        assert!(matches!(error, GatewayError::Transport(_)));
    }
}
