//! Client configuration loaded from the environment.
//!
//! Values come from process environment variables, after an optional
//! `.env` file has been merged in. Missing or unparsable values fall back
//! to defaults.

use std::env;
use std::time::Duration;

use bimportal_application::{DEFAULT_REFRESH_MARGIN_SECONDS, MAX_REFRESH_MARGIN_SECONDS};
use bimportal_domain::Credentials;
use url::Url;

/// Production portal.
pub const DEFAULT_BASE_URL: &str = "https://via.bund.de/bim";

/// Login endpoint, relative to the base URL.
pub const LOGIN_ENDPOINT: &str = "/infrastruktur/api/v1/public/auth/login";
/// Refresh endpoint, relative to the base URL.
pub const REFRESH_ENDPOINT: &str = "/infrastruktur/api/v1/public/auth/refresh";
/// Logout endpoint, relative to the base URL.
pub const LOGOUT_ENDPOINT: &str = "/infrastruktur/api/v1/public/auth/logout";

/// Environment variable overriding the base URL.
pub const BASE_URL_ENV_VAR: &str = "BIM_PORTAL_BASE_URL";
/// Environment variable holding the username.
pub const USERNAME_ENV_VAR: &str = "BIM_PORTAL_USERNAME";
/// Environment variable holding the password.
pub const PASSWORD_ENV_VAR: &str = "BIM_PORTAL_PASSWORD";
/// Environment variable for the request timeout in seconds.
pub const REQUEST_TIMEOUT_ENV_VAR: &str = "REQUEST_TIMEOUT";
/// Environment variable for the connect timeout in seconds.
pub const CONNECT_TIMEOUT_ENV_VAR: &str = "CONNECT_TIMEOUT";
/// Environment variable for the token refresh margin in seconds.
pub const REFRESH_MARGIN_ENV_VAR: &str = "TOKEN_REFRESH_MARGIN";

const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Configuration for the BIM Portal client.
#[derive(Clone)]
pub struct BimPortalConfig {
    /// Base URL without trailing slash.
    pub base_url: String,
    /// Login name, if configured.
    pub username: Option<String>,
    /// Password, if configured.
    pub password: Option<String>,
    /// Total timeout for one HTTP request.
    pub request_timeout: Duration,
    /// Timeout for establishing a connection.
    pub connect_timeout: Duration,
    /// Seconds before expiry at which a token is renewed.
    pub token_refresh_margin_seconds: i64,
}

impl Default for BimPortalConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            username: None,
            password: None,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            token_refresh_margin_seconds: DEFAULT_REFRESH_MARGIN_SECONDS,
        }
    }
}

impl BimPortalConfig {
    /// Loads configuration from `.env` (if present) and the environment.
    #[must_use]
    pub fn from_env() -> Self {
        match dotenv::dotenv() {
            Ok(path) => tracing::info!(path = %path.display(), "Loaded configuration file"),
            Err(_) => tracing::debug!("No .env file found, using environment variables only"),
        }
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds configuration from an arbitrary key lookup.
    #[must_use]
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let non_blank = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        Self {
            base_url: non_blank(BASE_URL_ENV_VAR)
                .map_or(defaults.base_url, |url| normalize_base_url(&url)),
            username: non_blank(USERNAME_ENV_VAR),
            password: non_blank(PASSWORD_ENV_VAR),
            request_timeout: non_blank(REQUEST_TIMEOUT_ENV_VAR)
                .and_then(|v| parse_number(REQUEST_TIMEOUT_ENV_VAR, &v))
                .map_or(defaults.request_timeout, Duration::from_secs),
            connect_timeout: non_blank(CONNECT_TIMEOUT_ENV_VAR)
                .and_then(|v| parse_number(CONNECT_TIMEOUT_ENV_VAR, &v))
                .map_or(defaults.connect_timeout, Duration::from_secs),
            token_refresh_margin_seconds: non_blank(REFRESH_MARGIN_ENV_VAR)
                .and_then(|v| parse_number(REFRESH_MARGIN_ENV_VAR, &v))
                .unwrap_or(defaults.token_refresh_margin_seconds),
        }
    }

    /// Overrides the base URL.
    #[must_use]
    pub fn with_base_url(mut self, base_url: &str) -> Self {
        self.base_url = normalize_base_url(base_url);
        self
    }

    /// Overrides the credentials.
    #[must_use]
    pub fn with_credentials(
        mut self,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        self.username = Some(username.into());
        self.password = Some(password.into());
        self
    }

    /// Credentials if both username and password are non-blank.
    #[must_use]
    pub fn credentials(&self) -> Option<Credentials> {
        Credentials::from_parts(self.username.clone(), self.password.clone())
    }

    /// Returns true if both username and password are configured.
    #[must_use]
    pub fn has_credentials(&self) -> bool {
        self.credentials().is_some()
    }

    /// Joins the base URL with an endpoint path.
    #[must_use]
    pub fn full_url(&self, endpoint: &str) -> String {
        if endpoint.is_empty() {
            return self.base_url.clone();
        }
        if endpoint.starts_with('/') {
            format!("{}{endpoint}", self.base_url)
        } else {
            format!("{}/{endpoint}", self.base_url)
        }
    }

    /// Complete login URL.
    #[must_use]
    pub fn login_url(&self) -> String {
        self.full_url(LOGIN_ENDPOINT)
    }

    /// Complete refresh URL.
    #[must_use]
    pub fn refresh_url(&self) -> String {
        self.full_url(REFRESH_ENDPOINT)
    }

    /// Complete logout URL.
    #[must_use]
    pub fn logout_url(&self) -> String {
        self.full_url(LOGOUT_ENDPOINT)
    }

    /// Lists configuration problems; empty when the configuration is usable.
    #[must_use]
    pub fn validate(&self) -> Vec<String> {
        let mut issues = Vec::new();

        if self.base_url.trim().is_empty() {
            issues.push(format!("{BASE_URL_ENV_VAR} is not set"));
        } else {
            match Url::parse(&self.base_url) {
                Ok(url) if matches!(url.scheme(), "http" | "https") => {}
                Ok(_) => issues.push(format!(
                    "{BASE_URL_ENV_VAR} must start with http:// or https://"
                )),
                Err(e) => issues.push(format!("{BASE_URL_ENV_VAR} is not a valid URL: {e}")),
            }
        }

        if self.request_timeout < Duration::from_secs(1) {
            issues.push(format!("{REQUEST_TIMEOUT_ENV_VAR} must be at least 1 second"));
        }
        if self.token_refresh_margin_seconds < 0 {
            issues.push(format!("{REFRESH_MARGIN_ENV_VAR} must not be negative"));
        } else if self.token_refresh_margin_seconds > MAX_REFRESH_MARGIN_SECONDS {
            issues.push(format!(
                "{REFRESH_MARGIN_ENV_VAR} must not exceed {MAX_REFRESH_MARGIN_SECONDS} seconds"
            ));
        }

        issues
    }
}

impl std::fmt::Debug for BimPortalConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BimPortalConfig")
            .field("base_url", &self.base_url)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "[configured]"))
            .field("request_timeout", &self.request_timeout)
            .field("connect_timeout", &self.connect_timeout)
            .field(
                "token_refresh_margin_seconds",
                &self.token_refresh_margin_seconds,
            )
            .finish()
    }
}

fn normalize_base_url(url: &str) -> String {
    url.trim().trim_end_matches('/').to_string()
}

fn parse_number<T: std::str::FromStr>(key: &str, value: &str) -> Option<T> {
    let parsed = value.trim().parse().ok();
    if parsed.is_none() {
        tracing::warn!(key, value, "Ignoring unparsable configuration value");
    }
    parsed
}
