//! Client configuration.
//!
//! `ClientOptions` is the validated form handed to [`crate::Client`]. It is
//! produced by [`OptionsBuilder`], which accepts the loose set of optional
//! fields a caller (or a config file) supplies and rejects combinations that
//! cannot describe exactly one credential form.

use std::fmt;
use std::time::Duration;

use reqwest::Url;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::transport::BasicAuth;

/// Base URL used when none is configured
pub const DEFAULT_BASE_URL: &str = "https://api.example.com";

/// Name of the cookie carrying the server-issued session
pub const DEFAULT_SESSION_COOKIE: &str = "session";

/// Identity-check endpoint used for password authentication
pub const DEFAULT_IDENTITY_PATH: &str = "/me";

/// Pseudo-password paired with the API token in token mode
pub const TOKEN_PSEUDO_PASSWORD: &str = "api_token";

/// HTTP request timeout in seconds.
const REQUEST_TIMEOUT_SECS: u64 = 30;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Missing credentials: supply an API token or both username and password")]
    MissingCredentials,

    #[error("Ambiguous credentials: supply either an API token or a username/password pair, not both")]
    AmbiguousCredentials,

    #[error("Base URL must not be empty")]
    EmptyBaseUrl,

    #[error("Invalid base URL: {0}")]
    InvalidBaseUrl(String),

    #[error("Failed to build HTTP client: {0}")]
    Http(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CredentialMode {
    Token,
    Password,
}

impl fmt::Display for CredentialMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CredentialMode::Token => f.write_str("token"),
            CredentialMode::Password => f.write_str("password"),
        }
    }
}

#[derive(Clone, PartialEq, Eq)]
pub enum Credentials {
    Token { token: String },
    Password { username: String, password: String },
}

impl Credentials {
    pub fn mode(&self) -> CredentialMode {
        match self {
            Credentials::Token { .. } => CredentialMode::Token,
            Credentials::Password { .. } => CredentialMode::Password,
        }
    }
}

// Secrets never reach logs through Debug.
impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Credentials::Token { .. } => f.debug_struct("Token").field("token", &"<redacted>").finish(),
            Credentials::Password { username, .. } => f
                .debug_struct("Password")
                .field("username", username)
                .field("password", &"<redacted>")
                .finish(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ClientOptions {
    credentials: Credentials,
    base_url: String,
    session_cookie_name: String,
    reauth_enabled: bool,
    identity_path: String,
    request_timeout: Duration,
}

impl ClientOptions {
    pub fn builder() -> OptionsBuilder {
        OptionsBuilder::default()
    }

    /// Token-mode options against the default base URL
    pub fn with_token(token: impl Into<String>) -> Result<Self, ConfigError> {
        Self::builder().api_token(token).build()
    }

    /// Password-mode options against the default base URL
    pub fn with_password(
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Result<Self, ConfigError> {
        Self::builder().username(username).password(password).build()
    }

    pub fn credentials(&self) -> &Credentials {
        &self.credentials
    }

    pub fn mode(&self) -> CredentialMode {
        self.credentials.mode()
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn session_cookie_name(&self) -> &str {
        &self.session_cookie_name
    }

    /// Always true in token mode, where there is no session to expire.
    pub fn reauth_enabled(&self) -> bool {
        self.reauth_enabled
    }

    pub fn identity_path(&self) -> &str {
        &self.identity_path
    }

    pub fn request_timeout(&self) -> Duration {
        self.request_timeout
    }

    /// Join an API-relative path onto the base URL with exactly one slash.
    pub fn endpoint(&self, path: &str) -> String {
        let path = path.trim_start_matches('/');
        if path.is_empty() {
            return self.base_url.clone();
        }
        format!("{}/{}", self.base_url, path)
    }

    /// Credentials attached to ordinary API calls.
    ///
    /// Password mode attaches nothing: the session cookie travels with the
    /// transport's credential store.
    pub(crate) fn request_auth(&self) -> Option<BasicAuth> {
        match &self.credentials {
            Credentials::Token { token } => Some(BasicAuth {
                username: token.clone(),
                password: Some(TOKEN_PSEUDO_PASSWORD.to_string()),
            }),
            Credentials::Password { .. } => None,
        }
    }
}

/// Loose option set, validated by [`OptionsBuilder::build`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct OptionsBuilder {
    pub api_token: Option<String>,
    pub username: Option<String>,
    #[serde(skip_serializing)]
    pub password: Option<String>,
    pub base_url: Option<String>,
    pub session_cookie_name: Option<String>,
    pub reauth_enabled: Option<bool>,
    pub identity_path: Option<String>,
    #[serde(skip)]
    pub request_timeout: Option<Duration>,
}

impl OptionsBuilder {
    pub fn api_token(mut self, token: impl Into<String>) -> Self {
        self.api_token = Some(token.into());
        self
    }

    pub fn username(mut self, username: impl Into<String>) -> Self {
        self.username = Some(username.into());
        self
    }

    pub fn password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(password.into());
        self
    }

    pub fn base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = Some(base_url.into());
        self
    }

    pub fn session_cookie_name(mut self, name: impl Into<String>) -> Self {
        self.session_cookie_name = Some(name.into());
        self
    }

    pub fn reauth_enabled(mut self, enabled: bool) -> Self {
        self.reauth_enabled = Some(enabled);
        self
    }

    pub fn identity_path(mut self, path: impl Into<String>) -> Self {
        self.identity_path = Some(path.into());
        self
    }

    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = Some(timeout);
        self
    }

    pub fn build(self) -> Result<ClientOptions, ConfigError> {
        let token = non_empty(self.api_token);
        let username = non_empty(self.username);
        let password = non_empty(self.password);

        let credentials = match (token, username, password) {
            (Some(_), Some(_), _) | (Some(_), _, Some(_)) => {
                return Err(ConfigError::AmbiguousCredentials)
            }
            (Some(token), None, None) => Credentials::Token { token },
            (None, Some(username), Some(password)) => Credentials::Password { username, password },
            _ => return Err(ConfigError::MissingCredentials),
        };

        let base_url = validate_base_url(self.base_url.as_deref().unwrap_or(DEFAULT_BASE_URL))?;

        let reauth_enabled = match credentials.mode() {
            CredentialMode::Token => true,
            CredentialMode::Password => self.reauth_enabled.unwrap_or(false),
        };

        let identity_path = non_empty(self.identity_path)
            .unwrap_or_else(|| DEFAULT_IDENTITY_PATH.to_string());

        Ok(ClientOptions {
            credentials,
            base_url,
            session_cookie_name: non_empty(self.session_cookie_name)
                .unwrap_or_else(|| DEFAULT_SESSION_COOKIE.to_string()),
            reauth_enabled,
            identity_path,
            request_timeout: self
                .request_timeout
                .unwrap_or(Duration::from_secs(REQUEST_TIMEOUT_SECS)),
        })
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

fn validate_base_url(raw: &str) -> Result<String, ConfigError> {
    let trimmed = raw.trim().trim_end_matches('/');
    if trimmed.is_empty() {
        return Err(ConfigError::EmptyBaseUrl);
    }
    let url = Url::parse(trimmed).map_err(|e| ConfigError::InvalidBaseUrl(format!("{}: {}", trimmed, e)))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(ConfigError::InvalidBaseUrl(format!(
            "{}: unsupported scheme {}",
            trimmed,
            url.scheme()
        )));
    }
    Ok(trimmed.to_string())
}

// ============================================================================
// Tests
// ============================================================================
