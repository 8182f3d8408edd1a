//! Transport seam between the client and the network.
//!
//! The client never talks to `reqwest` directly. It hands a
//! [`TransportRequest`] to a [`Transport`] and reads session credentials
//! back from the transport's cookie store. [`HttpTransport`] is the
//! production implementation.

pub mod cookies;
pub mod http;
#[cfg(test)]
pub(crate) mod mock;

use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::future::BoxFuture;
use reqwest::Method;
use serde_json::Value;
use thiserror::Error;

pub use cookies::CredentialStore;
pub use http::HttpTransport;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BasicAuth {
    pub username: String,
    pub password: Option<String>,
}

#[derive(Debug, Clone)]
pub struct TransportRequest {
    pub method: Method,
    pub url: String,
    pub query: Vec<(String, String)>,
    pub body: Option<Value>,
    pub basic_auth: Option<BasicAuth>,
}

/// Raw response: the status plus the undecoded body text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportResponse {
    pub status: u16,
    pub body: String,
}

impl TransportResponse {
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }
}

/// No response was obtained (connect failure, timeout, broken body).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{0}")]
pub struct TransportError(pub String);

/// Server-issued session cookie as held by the credential store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionCredential {
    pub name: String,
    pub value: String,
    /// Lifetime announced by the server; `None` for a session-scoped cookie.
    pub ttl: Option<Duration>,
    pub received_at: DateTime<Utc>,
}

impl SessionCredential {
    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        let ttl = chrono::Duration::from_std(self.ttl?).ok()?;
        self.received_at.checked_add_signed(ttl)
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at().map(|at| now >= at).unwrap_or(false)
    }
}

pub trait Transport: Send + Sync {
    /// Issue one HTTP request. Errors mean no response was obtained; any
    /// status code, including 4xx/5xx, is an `Ok` response.
    fn send(&self, request: TransportRequest) -> BoxFuture<'_, Result<TransportResponse, TransportError>>;

    /// Look up a stored session credential by cookie name.
    fn session_credential(&self, name: &str) -> Option<SessionCredential>;
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_credential_expiry() {
        let received_at = Utc::now();
        let credential = SessionCredential {
            name: "session".to_string(),
            value: "abc".to_string(),
            ttl: Some(Duration::from_secs(60)),
            received_at,
        };
        assert_eq!(credential.expires_at(), Some(received_at + chrono::Duration::seconds(60)));
        assert!(!credential.is_expired_at(received_at + chrono::Duration::seconds(59)));
        assert!(credential.is_expired_at(received_at + chrono::Duration::seconds(60)));
    }

    #[test]
    fn test_session_scoped_credential_never_expires() {
        let credential = SessionCredential {
            name: "session".to_string(),
            value: "abc".to_string(),
            ttl: None,
            received_at: Utc::now(),
        };
        assert_eq!(credential.expires_at(), None);
        assert!(!credential.is_expired_at(Utc::now() + chrono::Duration::days(365)));
    }
}
