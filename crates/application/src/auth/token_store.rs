//! In-memory token storage with expiry tracking.
//!
//! This module provides a thread-safe store for the portal's access and
//! refresh tokens. All four fields of the token state are written together
//! under one write lock, so readers always see a snapshot that belongs to a
//! single authentication event.

use std::sync::Arc;

use bimportal_domain::{TokenClaims, token_preview};
use chrono::{DateTime, Duration, Utc};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::ports::Clock;

/// Default lead time before expiry at which a token counts as expiring.
pub const DEFAULT_REFRESH_MARGIN_SECONDS: i64 = 20;

/// Largest accepted refresh margin; larger values are clamped to it.
pub const MAX_REFRESH_MARGIN_SECONDS: i64 = 86_400;

/// Cached authentication state.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct TokenState {
    /// Bearer access token.
    pub access_token: Option<String>,
    /// Refresh token, independent of the access token's lifetime.
    pub refresh_token: Option<String>,
    /// Expiry derived from the access token's `exp` claim.
    pub expires_at: Option<DateTime<Utc>>,
    /// User id derived from the access token's user claim.
    pub user_id: Option<Uuid>,
}

impl TokenState {
    fn from_tokens(access_token: &str, refresh_token: Option<&str>) -> Self {
        let claims = TokenClaims::decode_lenient(access_token);
        Self {
            access_token: Some(access_token.to_string()),
            refresh_token: refresh_token
                .filter(|t| !t.trim().is_empty())
                .map(str::to_string),
            expires_at: claims.expires_at,
            user_id: claims.user_id,
        }
    }

    /// Returns true if expiry is unknown or falls before `now + margin`.
    ///
    /// A deadline outside the representable time range counts as expiring.
    #[must_use]
    pub fn is_expiring_at(&self, now: DateTime<Utc>, margin: Duration) -> bool {
        self.expires_at.is_none_or(|expires_at| {
            now.checked_add_signed(margin)
                .is_none_or(|deadline| expires_at < deadline)
        })
    }

    /// Seconds until expiry relative to `now`, or `None` if unknown.
    #[must_use]
    pub fn seconds_until_expiry(&self, now: DateTime<Utc>) -> Option<i64> {
        self.expires_at.map(|exp| (exp - now).num_seconds())
    }
}

impl std::fmt::Debug for TokenState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenState")
            .field("access_token", &self.access_token.as_deref().map(token_preview))
            .field("refresh_token", &self.refresh_token.as_ref().map(|_| "***"))
            .field("expires_at", &self.expires_at)
            .field("user_id", &self.user_id)
            .finish()
    }
}

/// Thread-safe in-memory token store.
///
/// Cloning is cheap and every clone shares the same state.
#[derive(Clone)]
pub struct TokenStore {
    state: Arc<RwLock<TokenState>>,
    clock: Arc<dyn Clock>,
    /// Lead time before expiry at which a token is treated as expiring.
    refresh_margin: Duration,
}

impl TokenStore {
    /// Create an empty store with the default refresh margin.
    #[must_use]
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self::with_refresh_margin(clock, DEFAULT_REFRESH_MARGIN_SECONDS)
    }

    /// Create an empty store with a custom refresh margin.
    ///
    /// The margin is clamped to `0..=MAX_REFRESH_MARGIN_SECONDS`.
    #[must_use]
    pub fn with_refresh_margin(clock: Arc<dyn Clock>, refresh_margin_seconds: i64) -> Self {
        let clamped = refresh_margin_seconds.clamp(0, MAX_REFRESH_MARGIN_SECONDS);
        if clamped != refresh_margin_seconds {
            tracing::warn!(
                requested = refresh_margin_seconds,
                used = clamped,
                "Refresh margin out of range, clamping"
            );
        }
        Self {
            state: Arc::new(RwLock::new(TokenState::default())),
            clock,
            refresh_margin: Duration::try_seconds(clamped).unwrap_or_else(Duration::zero),
        }
    }

    /// The configured refresh margin.
    #[must_use]
    pub const fn refresh_margin(&self) -> Duration {
        self.refresh_margin
    }

    /// Replace the whole token state with a new token pair.
    ///
    /// Claims are decoded from the access token; decoding failures leave
    /// the expiry and user id absent. An empty access token is ignored and
    /// the previous state is kept.
    pub async fn store_tokens(&self, access_token: &str, refresh_token: Option<&str>) {
        if access_token.trim().is_empty() {
            tracing::warn!("Cannot store empty access token, keeping previous state");
            return;
        }

        let new_state = TokenState::from_tokens(access_token, refresh_token);
        let now = self.clock.now();

        if let Some(secs) = new_state.seconds_until_expiry(now) {
            tracing::info!(expires_at = ?new_state.expires_at, secs, "Token stored");
            if new_state.is_expiring_at(now, self.refresh_margin()) {
                tracing::warn!(secs, "Stored token is already within the refresh margin");
            }
        } else {
            tracing::warn!("Token stored without a known expiration, it will be treated as expired");
        }
        match new_state.user_id {
            Some(user_id) => tracing::info!(%user_id, "Extracted user id from token"),
            None => tracing::warn!("Could not extract user id from token"),
        }

        let mut state = self.state.write().await;
        *state = new_state;
    }

    /// Get the access token if present and not expiring soon.
    pub async fn access_token(&self) -> Option<String> {
        let state = self.state.read().await;
        let Some(token) = state.access_token.as_ref() else {
            tracing::debug!("No access token available");
            return None;
        };

        if state.is_expiring_at(self.clock.now(), self.refresh_margin()) {
            tracing::debug!("Access token is expiring soon or expired");
            return None;
        }
        Some(token.clone())
    }

    /// Get the refresh token regardless of access token expiry.
    pub async fn refresh_token(&self) -> Option<String> {
        self.state.read().await.refresh_token.clone()
    }

    /// Get the user id extracted from the current access token.
    pub async fn user_id(&self) -> Option<Uuid> {
        self.state.read().await.user_id
    }

    /// Returns true if a user id is cached.
    pub async fn has_user_id(&self) -> bool {
        self.state.read().await.user_id.is_some()
    }

    /// Returns true if an access token is cached, expired or not.
    pub async fn has_tokens(&self) -> bool {
        self.state.read().await.access_token.is_some()
    }

    /// Returns true if expiry is unknown or within the refresh margin.
    pub async fn is_expiring_soon(&self) -> bool {
        let state = self.state.read().await;
        let now = self.clock.now();
        let expiring = state.is_expiring_at(now, self.refresh_margin());
        if expiring {
            tracing::debug!(
                seconds_remaining = ?state.seconds_until_expiry(now),
                refresh_margin = self.refresh_margin.num_seconds(),
                "Token expiring"
            );
        }
        expiring
    }

    /// Get a consistent copy of the whole token state.
    pub async fn snapshot(&self) -> TokenState {
        self.state.read().await.clone()
    }

    /// Reset all fields to absent.
    pub async fn clear_tokens(&self) {
        let mut state = self.state.write().await;
        *state = TokenState::default();
        tracing::info!("All tokens and user information cleared");
    }

    /// Get token status for display.
    pub async fn status(&self) -> TokenStatus {
        let state = self.state.read().await;
        if state.access_token.is_none() {
            return TokenStatus::NotAuthenticated;
        }

        let now = self.clock.now();
        match state.seconds_until_expiry(now) {
            None => TokenStatus::ExpiryUnknown,
            Some(seconds_remaining) if state.is_expiring_at(now, self.refresh_margin()) => {
                TokenStatus::Expiring { seconds_remaining }
            }
            Some(seconds_remaining) => TokenStatus::Valid { seconds_remaining },
        }
    }
}

impl std::fmt::Debug for TokenStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenStore")
            .field("refresh_margin", &self.refresh_margin)
            .finish_non_exhaustive()
    }
}

/// Status of the cached token for display.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenStatus {
    /// No access token is cached.
    NotAuthenticated,
    /// A token is cached but its expiry is unknown, so it is not used.
    ExpiryUnknown,
    /// Token is within the refresh margin or already expired.
    Expiring {
        /// Seconds until expiry, negative once expired.
        seconds_remaining: i64,
    },
    /// Token is valid and not expiring soon.
    Valid {
        /// Seconds until expiry.
        seconds_remaining: i64,
    },
}

impl TokenStatus {
    /// Returns true if the cached token can be used as is.
    #[must_use]
    pub const fn is_valid(&self) -> bool {
        matches!(self, Self::Valid { .. })
    }

    /// Get a user-friendly display message.
    #[must_use]
    pub fn display_message(&self) -> String {
        match self {
            Self::NotAuthenticated => "No token".to_string(),
            Self::ExpiryUnknown => "Token available (expiration unknown)".to_string(),
            Self::Expiring { seconds_remaining } if *seconds_remaining <= 0 => {
                "Token expired".to_string()
            }
            Self::Expiring { seconds_remaining } => {
                format!("Token expiring soon (expires in {seconds_remaining} seconds)")
            }
            Self::Valid { seconds_remaining } => {
                if *seconds_remaining > 3600 {
                    format!("Token valid for {} hours", seconds_remaining / 3600)
                } else if *seconds_remaining > 60 {
                    format!("Token valid for {} minutes", seconds_remaining / 60)
                } else {
                    format!("Token valid for {seconds_remaining} seconds")
                }
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use super::*;
    use base64::Engine;
    use base64::engine::general_purpose::URL_SAFE_NO_PAD;
    use pretty_assertions::assert_eq;
    use serde_json::{Value, json};

    const NOW: i64 = 1_700_000_000;
    const USER_A: &str = "4559818c-faea-4bb7-bbdd-e6470df8261b";
    const USER_B: &str = "80730a51-a953-4a80-9eaa-debfab31f6e9";

    struct FixedClock(DateTime<Utc>);

    impl Clock for FixedClock {
        fn now(&self) -> DateTime<Utc> {
            self.0
        }
    }

    fn fixed_clock() -> Arc<dyn Clock> {
        Arc::new(FixedClock(DateTime::from_timestamp(NOW, 0).unwrap()))
    }

    fn token(payload: &Value) -> String {
        let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"HS256"}"#);
        let body = URL_SAFE_NO_PAD.encode(serde_json::to_vec(payload).unwrap());
        format!("{header}.{body}.sig")
    }

    fn token_expiring_in(secs: i64) -> String {
        token(&json!({"exp": NOW + secs, "sub": USER_A}))
    }

    #[tokio::test]
    async fn test_store_and_get_token() {
        let store = TokenStore::new(fixed_clock());
        let access = token_expiring_in(3600);

        store.store_tokens(&access, Some("refresh456")).await;

        assert_eq!(store.access_token().await, Some(access));
        assert_eq!(store.refresh_token().await.as_deref(), Some("refresh456"));
        assert_eq!(store.user_id().await, Some(Uuid::parse_str(USER_A).unwrap()));
        assert!(store.has_tokens().await);
        assert!(store.has_user_id().await);
        assert!(!store.is_expiring_soon().await);
    }

    #[tokio::test]
    async fn test_empty_access_token_is_ignored() {
        let store = TokenStore::new(fixed_clock());
        let access = token_expiring_in(3600);
        store.store_tokens(&access, Some("refresh")).await;

        store.store_tokens("", Some("other")).await;
        store.store_tokens("   ", None).await;

        assert_eq!(store.access_token().await, Some(access));
        assert_eq!(store.refresh_token().await.as_deref(), Some("refresh"));
    }

    #[tokio::test]
    async fn test_store_replaces_every_field() {
        let store = TokenStore::new(fixed_clock());
        store
            .store_tokens(&token_expiring_in(3600), Some("refresh-a"))
            .await;

        let second = token(&json!({"exp": NOW + 600}));
        store.store_tokens(&second, None).await;

        let state = store.snapshot().await;
        assert_eq!(state.access_token, Some(second));
        assert_eq!(state.refresh_token, None);
        assert_eq!(state.expires_at, DateTime::from_timestamp(NOW + 600, 0));
        assert_eq!(state.user_id, None);
    }

    #[tokio::test]
    async fn test_clear_tokens_is_idempotent() {
        let store = TokenStore::new(fixed_clock());
        store
            .store_tokens(&token_expiring_in(3600), Some("refresh"))
            .await;

        store.clear_tokens().await;
        assert_eq!(store.snapshot().await, TokenState::default());

        store.clear_tokens().await;
        assert_eq!(store.snapshot().await, TokenState::default());
        assert!(!store.has_tokens().await);
    }

    #[tokio::test]
    async fn test_missing_exp_is_treated_as_expired() {
        let store = TokenStore::new(fixed_clock());
        store
            .store_tokens(&token(&json!({"sub": USER_A})), Some("refresh"))
            .await;

        assert!(store.is_expiring_soon().await);
        assert_eq!(store.access_token().await, None);
        assert!(store.has_tokens().await);
        assert_eq!(store.refresh_token().await.as_deref(), Some("refresh"));
        assert_eq!(store.status().await, TokenStatus::ExpiryUnknown);
    }

    #[tokio::test]
    async fn test_refresh_margin_boundary() {
        let store = TokenStore::new(fixed_clock());
        let margin = DEFAULT_REFRESH_MARGIN_SECONDS;

        store.store_tokens(&token_expiring_in(margin - 1), None).await;
        assert!(store.is_expiring_soon().await);
        assert_eq!(store.access_token().await, None);

        store.store_tokens(&token_expiring_in(margin + 1), None).await;
        assert!(!store.is_expiring_soon().await);
        assert!(store.access_token().await.is_some());
    }

    #[tokio::test]
    async fn test_custom_refresh_margin() {
        let store = TokenStore::with_refresh_margin(fixed_clock(), 300);
        store.store_tokens(&token_expiring_in(200), None).await;

        assert!(store.is_expiring_soon().await);
        assert_eq!(store.refresh_margin(), Duration::seconds(300));
    }

    #[tokio::test]
    async fn test_out_of_range_margin_is_clamped() {
        let store = TokenStore::with_refresh_margin(fixed_clock(), i64::MAX);
        assert_eq!(
            store.refresh_margin(),
            Duration::seconds(MAX_REFRESH_MARGIN_SECONDS)
        );
        assert!(store.is_expiring_soon().await);

        let store = TokenStore::with_refresh_margin(fixed_clock(), 9_000_000_000_000);
        store.store_tokens(&token_expiring_in(3600), None).await;
        assert_eq!(store.access_token().await, None);
        assert!(matches!(
            store.status().await,
            TokenStatus::Expiring { .. }
        ));

        let store = TokenStore::with_refresh_margin(fixed_clock(), -5);
        assert_eq!(store.refresh_margin(), Duration::zero());
    }

    #[test]
    fn test_unrepresentable_deadline_counts_as_expiring() {
        let state = TokenState {
            access_token: Some("token".to_string()),
            expires_at: Some(DateTime::<Utc>::MAX_UTC),
            ..TokenState::default()
        };

        assert!(state.is_expiring_at(DateTime::<Utc>::MAX_UTC, Duration::seconds(20)));
        assert!(!state.is_expiring_at(
            DateTime::from_timestamp(NOW, 0).unwrap(),
            Duration::seconds(20)
        ));
    }

    #[tokio::test]
    async fn test_malformed_token_is_stored_without_claims() {
        let store = TokenStore::new(fixed_clock());
        store.store_tokens("opaque-token", Some("refresh")).await;

        let state = store.snapshot().await;
        assert_eq!(state.access_token.as_deref(), Some("opaque-token"));
        assert_eq!(state.expires_at, None);
        assert_eq!(state.user_id, None);
        assert!(store.has_tokens().await);
        assert_eq!(store.access_token().await, None);
    }

    #[tokio::test]
    async fn test_refresh_token_survives_access_expiry() {
        let store = TokenStore::new(fixed_clock());
        store
            .store_tokens(&token_expiring_in(-60), Some("refresh"))
            .await;

        assert_eq!(store.access_token().await, None);
        assert_eq!(store.refresh_token().await.as_deref(), Some("refresh"));
        assert_eq!(
            store.status().await,
            TokenStatus::Expiring {
                seconds_remaining: -60
            }
        );
    }

    #[tokio::test]
    async fn test_token_status() {
        let store = TokenStore::new(fixed_clock());
        assert_eq!(store.status().await, TokenStatus::NotAuthenticated);

        store.store_tokens(&token_expiring_in(7200), None).await;
        let status = store.status().await;
        assert_eq!(
            status,
            TokenStatus::Valid {
                seconds_remaining: 7200
            }
        );
        assert!(status.is_valid());

        store.store_tokens(&token_expiring_in(10), None).await;
        assert!(!store.status().await.is_valid());
    }

    #[test]
    fn test_token_status_display_messages() {
        assert_eq!(TokenStatus::NotAuthenticated.display_message(), "No token");
        assert!(
            TokenStatus::Valid {
                seconds_remaining: 7200
            }
            .display_message()
            .contains("hours")
        );
        assert!(
            TokenStatus::Expiring {
                seconds_remaining: 5
            }
            .display_message()
            .contains("expiring soon")
        );
        assert_eq!(
            TokenStatus::Expiring {
                seconds_remaining: -5
            }
            .display_message(),
            "Token expired"
        );
    }

    #[test]
    fn test_debug_hides_secrets() {
        let state = TokenState {
            access_token: Some("abcdefghijklmnopqrstuvwxyz".to_string()),
            refresh_token: Some("super-secret-refresh".to_string()),
            expires_at: None,
            user_id: None,
        };
        let debug = format!("{state:?}");
        assert!(!debug.contains("qrstuvwxyz"));
        assert!(!debug.contains("super-secret-refresh"));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_readers_never_observe_mixed_state() {
        let store = TokenStore::new(fixed_clock());
        let token_a = token(&json!({"exp": NOW + 3600, "sub": USER_A}));
        let token_b = token(&json!({"exp": NOW + 7200, "sub": USER_B}));
        store.store_tokens(&token_a, Some("refresh-a")).await;

        let writer = {
            let store = store.clone();
            let (token_a, token_b) = (token_a.clone(), token_b.clone());
            tokio::spawn(async move {
                for i in 0..500 {
                    if i % 2 == 0 {
                        store.store_tokens(&token_b, Some("refresh-b")).await;
                    } else {
                        store.store_tokens(&token_a, Some("refresh-a")).await;
                    }
                    tokio::task::yield_now().await;
                }
            })
        };

        let readers: Vec<_> = (0..4)
            .map(|_| {
                let store = store.clone();
                let token_a = token_a.clone();
                tokio::spawn(async move {
                    for _ in 0..500 {
                        let state = store.snapshot().await;
                        let expected = if state.access_token.as_deref() == Some(token_a.as_str())
                        {
                            (NOW + 3600, "refresh-a", USER_A)
                        } else {
                            (NOW + 7200, "refresh-b", USER_B)
                        };
                        assert_eq!(state.expires_at, DateTime::from_timestamp(expected.0, 0));
                        assert_eq!(state.refresh_token.as_deref(), Some(expected.1));
                        assert_eq!(state.user_id, Uuid::parse_str(expected.2).ok());
                        tokio::task::yield_now().await;
                    }
                })
            })
            .collect();

        writer.await.unwrap();
        for reader in readers {
            reader.await.unwrap();
        }
    }
}
