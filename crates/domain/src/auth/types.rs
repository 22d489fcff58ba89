//! Credential and token response types

use serde::{Deserialize, Serialize};

/// Username/password pair used for a full login.
///
/// The password is never printed by the `Debug` implementation.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    /// Login name (the portal uses the e-mail address).
    pub username: String,
    /// Plain-text password.
    pub password: String,
}

impl Credentials {
    /// Creates a credential pair.
    #[must_use]
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }

    /// Builds credentials only when both values are present and non-blank.
    #[must_use]
    pub fn from_parts(username: Option<String>, password: Option<String>) -> Option<Self> {
        match (username, password) {
            (Some(username), Some(password))
                if !username.trim().is_empty() && !password.trim().is_empty() =>
            {
                Some(Self { username, password })
            }
            _ => None,
        }
    }

    /// Returns true if both username and password are non-blank.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        !self.username.trim().is_empty() && !self.password.trim().is_empty()
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"[redacted]")
            .finish()
    }
}

/// Token pair returned by the portal's login and refresh endpoints.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenResponse {
    /// Bearer access token.
    #[serde(default)]
    pub token: Option<String>,
    /// Refresh token, expected but not guaranteed.
    #[serde(default)]
    pub refresh_token: Option<String>,
    /// Server-reported validity, informational only.
    ///
    /// Expiry is always derived from the token's own `exp` claim.
    #[serde(default)]
    pub valid_till: Option<String>,
}

impl TokenResponse {
    /// Creates a response carrying an access token and optional refresh token.
    #[must_use]
    pub fn new(token: impl Into<String>, refresh_token: Option<String>) -> Self {
        Self {
            token: Some(token.into()),
            refresh_token,
            valid_till: None,
        }
    }

    /// Returns the access token if it is present and non-blank.
    #[must_use]
    pub fn access_token(&self) -> Option<&str> {
        self.token.as_deref().filter(|t| !t.trim().is_empty())
    }
}

/// Formats a bearer `Authorization` header value.
#[must_use]
pub fn bearer_header(access_token: &str) -> String {
    format!("Bearer {access_token}")
}

/// Get a preview of a token (first 8 chars + ...), safe for logs.
#[must_use]
pub fn token_preview(token: &str) -> String {
    if token.len() > 12 {
        let end = token
            .char_indices()
            .nth(8)
            .map_or(token.len(), |(idx, _)| idx);
        format!("{}...", &token[..end])
    } else {
        "***".to_string()
    }
}
