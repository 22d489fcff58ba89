//! Authentication service: login, refresh, fallback and logout.
//!
//! Callers ask for a valid token and never learn whether it came from the
//! cache, a refresh or a full login. Refresh failures are swallowed and
//! answered with a login attempt; only when both paths fail does the caller
//! see an [`AuthError`].

use bimportal_domain::{Credentials, TokenResponse};
use tokio::sync::Mutex;
use uuid::Uuid;

use super::token_store::{TokenStatus, TokenStore};
use crate::error::{AuthError, AuthResult};
use crate::ports::AuthGateway;

/// Produces usable access tokens for API callers.
pub struct AuthService<G> {
    gateway: G,
    token_store: TokenStore,
    credentials: Option<Credentials>,
    /// Serializes refresh/login round-trips between concurrent callers.
    renewal: Mutex<()>,
}

impl<G: AuthGateway> AuthService<G> {
    /// Creates a new `AuthService`.
    ///
    /// # Arguments
    /// * `gateway` - The remote auth endpoints
    /// * `token_store` - Store holding the cached tokens
    /// * `credentials` - Credentials used for full logins, if configured
    pub fn new(gateway: G, token_store: TokenStore, credentials: Option<Credentials>) -> Self {
        if let Some(credentials) = &credentials {
            tracing::debug!(username = %credentials.username, "AuthService initialized");
        }
        Self {
            gateway,
            token_store,
            credentials,
            renewal: Mutex::new(()),
        }
    }

    /// Get access to the token store.
    #[must_use]
    pub const fn token_store(&self) -> &TokenStore {
        &self.token_store
    }

    /// Returns a usable access token, refreshing or logging in if needed.
    ///
    /// 1. A cached token outside the refresh margin is returned as is.
    /// 2. Otherwise a cached refresh token is exchanged for a new pair.
    /// 3. If that is not possible or fails, a full login is attempted.
    ///
    /// # Errors
    /// Returns [`AuthError::Exhausted`] carrying the login failure if
    /// neither refresh nor login produced a token.
    pub async fn get_valid_token(&self) -> AuthResult<String> {
        if let Some(token) = self.token_store.access_token().await {
            tracing::debug!("Using cached token");
            return Ok(token);
        }

        let _renewal = self.renewal.lock().await;

        // Another caller may have renewed while we waited.
        if let Some(token) = self.token_store.access_token().await {
            tracing::debug!("Using token renewed by a concurrent request");
            return Ok(token);
        }

        tracing::info!("Token is missing or expiring, attempting to refresh");
        if self.token_store.refresh_token().await.is_some() {
            match self.refresh_token().await {
                Ok(response) => return access_token_of(response, "token refresh"),
                Err(e) => tracing::debug!(error = %e, "Token refresh failed"),
            }
        }

        tracing::info!("Token refresh failed or not possible, attempting to log in");
        match self.login_with_configured().await {
            Ok(response) => access_token_of(response, "login"),
            Err(e) => {
                tracing::error!(error = %e, "Could not obtain a valid token after login attempt");
                Err(AuthError::Exhausted {
                    source: Box::new(e),
                })
            }
        }
    }

    /// Logs in with explicit credentials and stores the returned tokens.
    ///
    /// # Errors
    /// Returns an error if the credentials are incomplete, the remote call
    /// fails, or the response carries no token.
    pub async fn login(&self, credentials: &Credentials) -> AuthResult<TokenResponse> {
        if !credentials.is_complete() {
            return Err(AuthError::NoCredentials);
        }

        tracing::debug!(username = %credentials.username, "Attempting login");
        let response = self.gateway.login(credentials).await.map_err(|e| {
            tracing::error!(error = %e, "Login failed");
            AuthError::gateway("login", e)
        })?;

        let response = self.accept("login", response).await?;
        match self.token_store.user_id().await {
            Some(user_id) => tracing::info!(%user_id, "Login successful"),
            None => tracing::info!("Login successful, user id not available"),
        }
        Ok(response)
    }

    /// Logs in with the configured credentials.
    ///
    /// # Errors
    /// Returns [`AuthError::NoCredentials`] if none are configured, or any
    /// error from [`Self::login`].
    pub async fn login_with_configured(&self) -> AuthResult<TokenResponse> {
        let credentials = self
            .credentials
            .as_ref()
            .filter(|c| c.is_complete())
            .ok_or(AuthError::NoCredentials)?;
        self.login(credentials).await
    }

    /// Exchanges the cached refresh token for a new token pair.
    ///
    /// # Errors
    /// Returns an error if no refresh token is cached, the remote call
    /// fails, or the response carries no token.
    pub async fn refresh_token(&self) -> AuthResult<TokenResponse> {
        let Some(refresh_token) = self.token_store.refresh_token().await else {
            return Err(AuthError::NoRefreshToken);
        };

        tracing::debug!("Attempting to refresh token");
        let response = self.gateway.refresh(&refresh_token).await.map_err(|e| {
            tracing::warn!(error = %e, "Token refresh request failed");
            AuthError::gateway("token refresh", e)
        })?;

        let response = self.accept("token refresh", response).await?;
        tracing::info!("Token refresh successful");
        Ok(response)
    }

    /// Logs out remotely (best effort) and always clears local state.
    ///
    /// Returns true once local state is cleared, whether or not the remote
    /// call succeeded.
    pub async fn logout(&self) -> bool {
        tracing::debug!("Attempting logout");

        if let Some(access_token) = self.token_store.snapshot().await.access_token
            && let Err(e) = self.gateway.logout(&access_token).await
        {
            tracing::warn!(error = %e, "Logout request failed, clearing tokens anyway");
        }

        self.token_store.clear_tokens().await;
        tracing::info!("Logout completed");
        true
    }

    /// Returns true if a valid, non-expiring token is cached.
    ///
    /// This never triggers a refresh.
    pub async fn is_authenticated(&self) -> bool {
        self.token_store.access_token().await.is_some()
    }

    /// Returns true if both username and password are configured.
    #[must_use]
    pub fn has_credentials(&self) -> bool {
        self.credentials.as_ref().is_some_and(Credentials::is_complete)
    }

    /// Clears all cached tokens.
    pub async fn clear_tokens(&self) {
        self.token_store.clear_tokens().await;
    }

    /// User id extracted from the current token, if any.
    pub async fn current_user_id(&self) -> Option<Uuid> {
        self.token_store.user_id().await
    }

    /// User id extracted from the current token.
    ///
    /// # Errors
    /// Returns [`AuthError::UserIdUnavailable`] if no user id is cached.
    pub async fn require_user_id(&self) -> AuthResult<Uuid> {
        self.current_user_id()
            .await
            .ok_or(AuthError::UserIdUnavailable)
    }

    /// Returns true if a user id is cached.
    pub async fn has_user_id(&self) -> bool {
        self.token_store.has_user_id().await
    }

    /// Current token status for diagnostics.
    pub async fn token_status(&self) -> TokenStatus {
        self.token_store.status().await
    }

    /// Drops all cached state and obtains a fresh token.
    ///
    /// # Errors
    /// Returns an error if no new token can be obtained.
    pub async fn force_refresh(&self) -> AuthResult<String> {
        self.token_store.clear_tokens().await;
        self.get_valid_token().await
    }

    async fn accept(
        &self,
        operation: &'static str,
        response: TokenResponse,
    ) -> AuthResult<TokenResponse> {
        let Some(access_token) = response.access_token() else {
            tracing::error!(operation, "No token in server response");
            return Err(AuthError::EmptyResponse { operation });
        };

        self.token_store
            .store_tokens(access_token, response.refresh_token.as_deref())
            .await;
        Ok(response)
    }
}

impl<G> std::fmt::Debug for AuthService<G> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthService")
            .field("token_store", &self.token_store)
            .field("credentials", &self.credentials)
            .finish_non_exhaustive()
    }
}

fn access_token_of(response: TokenResponse, operation: &'static str) -> AuthResult<String> {
    response
        .access_token()
        .map(str::to_string)
        .ok_or(AuthError::EmptyResponse { operation })
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::significant_drop_tightening
)]
mod tests {
    use super::*;
    use crate::ports::{Clock, GatewayError};
    use async_trait::async_trait;
    use base64::Engine;
    use base64::engine::general_purpose::URL_SAFE_NO_PAD;
    use chrono::{DateTime, Utc};
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    const NOW: i64 = 1_700_000_000;
    const USER: &str = "4559818c-faea-4bb7-bbdd-e6470df8261b";

    struct FixedClock;

    impl Clock for FixedClock {
        fn now(&self) -> DateTime<Utc> {
            DateTime::from_timestamp(NOW, 0).unwrap()
        }
    }

    fn token(label: &str, expires_in: i64) -> String {
        let payload = json!({"exp": NOW + expires_in, "sub": USER, "jti": label});
        let body = URL_SAFE_NO_PAD.encode(serde_json::to_vec(&payload).unwrap());
        format!("eyJhbGciOiJIUzI1NiJ9.{body}.sig")
    }

    fn network_down() -> GatewayError {
        GatewayError::Transport("connection refused".to_string())
    }

    struct MockGateway {
        login_result: std::sync::Mutex<Result<TokenResponse, GatewayError>>,
        refresh_result: std::sync::Mutex<Result<TokenResponse, GatewayError>>,
        logout_result: Result<(), GatewayError>,
        login_delay: Option<Duration>,
        login_calls: AtomicUsize,
        refresh_calls: AtomicUsize,
        logout_calls: AtomicUsize,
    }

    impl MockGateway {
        fn new() -> Self {
            Self {
                login_result: std::sync::Mutex::new(Ok(TokenResponse::new(
                    token("login", 3600),
                    Some("refresh-from-login".to_string()),
                ))),
                refresh_result: std::sync::Mutex::new(Ok(TokenResponse::new(
                    token("refresh", 3600),
                    Some("refresh-from-refresh".to_string()),
                ))),
                logout_result: Ok(()),
                login_delay: None,
                login_calls: AtomicUsize::new(0),
                refresh_calls: AtomicUsize::new(0),
                logout_calls: AtomicUsize::new(0),
            }
        }

        fn failing_login(self) -> Self {
            *self.login_result.lock().expect("Lock poisoned") = Err(GatewayError::Status {
                status: 401,
                body: "bad credentials".to_string(),
            });
            self
        }

        fn failing_refresh(self) -> Self {
            *self.refresh_result.lock().expect("Lock poisoned") = Err(network_down());
            self
        }

        fn failing_logout(mut self) -> Self {
            self.logout_result = Err(network_down());
            self
        }

        fn slow_login(mut self) -> Self {
            self.login_delay = Some(Duration::from_millis(50));
            self
        }

        fn logins(&self) -> usize {
            self.login_calls.load(Ordering::SeqCst)
        }

        fn refreshes(&self) -> usize {
            self.refresh_calls.load(Ordering::SeqCst)
        }

        fn logouts(&self) -> usize {
            self.logout_calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl AuthGateway for MockGateway {
        async fn login(&self, _: &Credentials) -> Result<TokenResponse, GatewayError> {
            self.login_calls.fetch_add(1, Ordering::SeqCst);
            if let Some(delay) = self.login_delay {
                tokio::time::sleep(delay).await;
            }
            self.login_result.lock().expect("Lock poisoned").clone()
        }

        async fn refresh(&self, _: &str) -> Result<TokenResponse, GatewayError> {
            self.refresh_calls.fetch_add(1, Ordering::SeqCst);
            self.refresh_result.lock().expect("Lock poisoned").clone()
        }

        async fn logout(&self, _: &str) -> Result<(), GatewayError> {
            self.logout_calls.fetch_add(1, Ordering::SeqCst);
            self.logout_result.clone()
        }
    }

    fn credentials() -> Option<Credentials> {
        Some(Credentials::new("user@example.com", "secret"))
    }

    fn service(
        gateway: MockGateway,
        credentials: Option<Credentials>,
    ) -> (AuthService<Arc<MockGateway>>, Arc<MockGateway>) {
        let gateway = Arc::new(gateway);
        let store = TokenStore::new(Arc::new(FixedClock));
        (
            AuthService::new(Arc::clone(&gateway), store, credentials),
            gateway,
        )
    }

    #[tokio::test]
    async fn test_cached_token_skips_network() {
        let (auth, gateway) = service(MockGateway::new(), credentials());
        let cached = token("cached", 3600);
        auth.token_store()
            .store_tokens(&cached, Some("refresh"))
            .await;

        assert_eq!(auth.get_valid_token().await.unwrap(), cached);
        assert_eq!(gateway.logins(), 0);
        assert_eq!(gateway.refreshes(), 0);
    }

    #[tokio::test]
    async fn test_empty_store_logs_in() {
        let (auth, gateway) = service(MockGateway::new(), credentials());

        let token_value = auth.get_valid_token().await.unwrap();

        assert_eq!(token_value, token("login", 3600));
        assert_eq!(gateway.logins(), 1);
        assert_eq!(gateway.refreshes(), 0);
        assert!(auth.is_authenticated().await);
        assert_eq!(
            auth.token_store().refresh_token().await.as_deref(),
            Some("refresh-from-login")
        );
    }

    #[tokio::test]
    async fn test_expiring_token_is_refreshed() {
        let (auth, gateway) = service(MockGateway::new(), credentials());
        auth.token_store()
            .store_tokens(&token("old", 5), Some("refresh"))
            .await;

        let token_value = auth.get_valid_token().await.unwrap();

        assert_eq!(token_value, token("refresh", 3600));
        assert_eq!(gateway.refreshes(), 1);
        assert_eq!(gateway.logins(), 0);
    }

    #[tokio::test]
    async fn test_refresh_failure_falls_back_to_login() {
        let (auth, gateway) = service(MockGateway::new().failing_refresh(), credentials());
        auth.token_store()
            .store_tokens(&token("old", -10), Some("stale-refresh"))
            .await;

        let token_value = auth.get_valid_token().await.unwrap();

        assert_eq!(token_value, token("login", 3600));
        assert_eq!(gateway.refreshes(), 1);
        assert_eq!(gateway.logins(), 1);
    }

    #[tokio::test]
    async fn test_refresh_without_token_in_response_falls_back_to_login() {
        let gateway = MockGateway::new();
        *gateway.refresh_result.lock().unwrap() = Ok(TokenResponse::default());
        let (auth, gateway) = service(gateway, credentials());
        auth.token_store()
            .store_tokens(&token("old", -10), Some("refresh"))
            .await;

        assert_eq!(auth.get_valid_token().await.unwrap(), token("login", 3600));
        assert_eq!(gateway.logins(), 1);
    }

    #[tokio::test]
    async fn test_refresh_and_login_failure_is_reported() {
        let (auth, gateway) = service(
            MockGateway::new().failing_refresh().failing_login(),
            credentials(),
        );
        auth.token_store()
            .store_tokens(&token("old", -10), Some("refresh"))
            .await;

        let error = auth.get_valid_token().await.unwrap_err();

        match error {
            AuthError::Exhausted { source } => assert!(matches!(
                *source,
                AuthError::Gateway {
                    operation: "login",
                    source: GatewayError::Status { status: 401, .. }
                }
            )),
            other => panic!("expected Exhausted, got {other:?}"),
        }
        assert_eq!(gateway.refreshes(), 1);
        assert_eq!(gateway.logins(), 1);
    }

    #[tokio::test]
    async fn test_missing_credentials_is_reported() {
        let (auth, gateway) = service(MockGateway::new(), None);

        let error = auth.get_valid_token().await.unwrap_err();

        assert!(matches!(
            error,
            AuthError::Exhausted { ref source } if matches!(**source, AuthError::NoCredentials)
        ));
        assert_eq!(gateway.logins(), 0);
        assert!(!auth.has_credentials());
    }

    #[tokio::test]
    async fn test_login_rejects_blank_credentials() {
        let (auth, gateway) = service(MockGateway::new(), None);

        let result = auth.login(&Credentials::new("user@example.com", " ")).await;

        assert!(matches!(result, Err(AuthError::NoCredentials)));
        assert_eq!(gateway.logins(), 0);
    }

    #[tokio::test]
    async fn test_login_with_empty_response_fails() {
        let gateway = MockGateway::new();
        *gateway.login_result.lock().unwrap() = Ok(TokenResponse::default());
        let (auth, _) = service(gateway, credentials());

        let result = auth.login_with_configured().await;

        assert!(matches!(
            result,
            Err(AuthError::EmptyResponse { operation: "login" })
        ));
        assert!(!auth.token_store().has_tokens().await);
    }

    #[tokio::test]
    async fn test_refresh_without_refresh_token_fails() {
        let (auth, gateway) = service(MockGateway::new(), credentials());

        let result = auth.refresh_token().await;

        assert!(matches!(result, Err(AuthError::NoRefreshToken)));
        assert_eq!(gateway.refreshes(), 0);
    }

    #[tokio::test]
    async fn test_logout_clears_even_when_remote_fails() {
        let (auth, gateway) = service(MockGateway::new().failing_logout(), credentials());
        auth.login_with_configured().await.unwrap();

        assert!(auth.logout().await);
        assert_eq!(gateway.logouts(), 1);
        assert!(!auth.token_store().has_tokens().await);
        assert!(!auth.is_authenticated().await);
        assert_eq!(auth.current_user_id().await, None);
    }

    #[tokio::test]
    async fn test_logout_without_tokens_skips_remote_call() {
        let (auth, gateway) = service(MockGateway::new(), credentials());

        assert!(auth.logout().await);
        assert_eq!(gateway.logouts(), 0);
    }

    #[tokio::test]
    async fn test_user_id_accessors() {
        let (auth, _) = service(MockGateway::new(), credentials());
        assert!(matches!(
            auth.require_user_id().await,
            Err(AuthError::UserIdUnavailable)
        ));
        assert!(!auth.has_user_id().await);

        auth.login_with_configured().await.unwrap();

        let expected = Uuid::parse_str(USER).unwrap();
        assert_eq!(auth.require_user_id().await.unwrap(), expected);
        assert!(auth.has_user_id().await);
        assert!(auth.token_status().await.is_valid());
    }

    #[tokio::test]
    async fn test_force_refresh_performs_full_login() {
        let (auth, gateway) = service(MockGateway::new(), credentials());
        auth.token_store()
            .store_tokens(&token("cached", 3600), Some("refresh"))
            .await;

        let token_value = auth.force_refresh().await.unwrap();

        assert_eq!(token_value, token("login", 3600));
        assert_eq!(gateway.refreshes(), 0);
        assert_eq!(gateway.logins(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_callers_share_one_login() {
        let (auth, gateway) = service(MockGateway::new().slow_login(), credentials());
        let auth = Arc::new(auth);

        let tasks: Vec<_> = (0..8)
            .map(|_| {
                let auth = Arc::clone(&auth);
                tokio::spawn(async move { auth.get_valid_token().await })
            })
            .collect();

        for task in tasks {
            assert_eq!(task.await.unwrap().unwrap(), token("login", 3600));
        }
        assert_eq!(gateway.logins(), 1);
    }
}
