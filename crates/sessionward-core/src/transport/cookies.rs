//! Cookie-jar style store for server-issued session credentials.
//!
//! Populated from `Set-Cookie` headers and replayed as a `Cookie` header on
//! later calls. Only the transport writes to it.

use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, SystemTime};

use chrono::{DateTime, Utc};
use tracing::debug;

use super::SessionCredential;

#[derive(Debug, Default)]
pub struct CredentialStore {
    entries: Mutex<BTreeMap<String, SessionCredential>>,
}

/// What a single `Set-Cookie` does to the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CookieUpdate {
    Set(SessionCredential),
    Remove(String),
}

impl CookieUpdate {
    /// Interpret one cookie. `Max-Age` wins over `Expires`; a zero or
    /// past lifetime deletes the cookie.
    pub fn from_parts(
        name: &str,
        value: &str,
        max_age: Option<Duration>,
        expires: Option<SystemTime>,
        now: DateTime<Utc>,
    ) -> Self {
        let ttl = match (max_age, expires) {
            (Some(max_age), _) => Some(max_age),
            (None, Some(expires)) => {
                let expires: DateTime<Utc> = expires.into();
                Some((expires - now).to_std().unwrap_or(Duration::ZERO))
            }
            (None, None) => None,
        };

        if ttl.map(|t| t.is_zero()).unwrap_or(false) {
            return CookieUpdate::Remove(name.to_string());
        }

        CookieUpdate::Set(SessionCredential {
            name: name.to_string(),
            value: value.to_string(),
            ttl,
            received_at: now,
        })
    }
}

impl CredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn entries(&self) -> MutexGuard<'_, BTreeMap<String, SessionCredential>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Current credential for `name`, if present and not yet expired.
    pub fn get(&self, name: &str) -> Option<SessionCredential> {
        let now = Utc::now();
        self.entries()
            .get(name)
            .filter(|c| !c.is_expired_at(now))
            .cloned()
    }

    pub fn apply(&self, update: CookieUpdate) {
        let mut entries = self.entries();
        match update {
            CookieUpdate::Set(credential) => {
                debug!(cookie = %credential.name, ttl = ?credential.ttl, "Storing session credential");
                entries.insert(credential.name.clone(), credential);
            }
            CookieUpdate::Remove(name) => {
                if entries.remove(&name).is_some() {
                    debug!(cookie = %name, "Server cleared session credential");
                }
            }
        }
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.entries().len()
    }

    #[cfg(test)]
    pub(crate) fn is_empty(&self) -> bool {
        self.entries().is_empty()
    }

    /// `Cookie` header value for all live credentials, or `None` when
    /// there is nothing to send.
    pub fn header_value(&self) -> Option<String> {
        let now = Utc::now();
        let mut entries = self.entries();
        entries.retain(|_, c| !c.is_expired_at(now));
        if entries.is_empty() {
            return None;
        }
        Some(
            entries
                .values()
                .map(|c| format!("{}={}", c.name, c.value))
                .collect::<Vec<_>>()
                .join("; "),
        )
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn set(name: &str, value: &str, ttl: Option<Duration>) -> CookieUpdate {
        CookieUpdate::from_parts(name, value, ttl, None, Utc::now())
    }

    #[test]
    fn test_max_age_becomes_ttl() {
        let now = Utc::now();
        let update = CookieUpdate::from_parts("session", "abc", Some(Duration::from_secs(60)), None, now);
        match update {
            CookieUpdate::Set(c) => {
                assert_eq!(c.ttl, Some(Duration::from_secs(60)));
                assert_eq!(c.received_at, now);
            }
            other => panic!("expected Set, got {:?}", other),
        }
    }

    #[test]
    fn test_expires_becomes_ttl() {
        let now = Utc::now();
        let expires = SystemTime::from(now + chrono::Duration::seconds(90));
        match CookieUpdate::from_parts("session", "abc", None, Some(expires), now) {
            CookieUpdate::Set(c) => assert_eq!(c.ttl, Some(Duration::from_secs(90))),
            other => panic!("expected Set, got {:?}", other),
        }
    }

    #[test]
    fn test_zero_or_past_lifetime_removes() {
        let now = Utc::now();
        assert_eq!(
            CookieUpdate::from_parts("session", "", Some(Duration::ZERO), None, now),
            CookieUpdate::Remove("session".to_string())
        );
        let past = SystemTime::from(now - chrono::Duration::seconds(10));
        assert_eq!(
            CookieUpdate::from_parts("session", "", None, Some(past), now),
            CookieUpdate::Remove("session".to_string())
        );
    }

    #[test]
    fn test_session_cookie_without_lifetime() {
        match set("session", "abc", None) {
            CookieUpdate::Set(c) => assert_eq!(c.ttl, None),
            other => panic!("expected Set, got {:?}", other),
        }
    }

    #[test]
    fn test_store_set_replace_remove() {
        let store = CredentialStore::new();
        assert!(store.is_empty());

        store.apply(set("session", "one", Some(Duration::from_secs(60))));
        assert_eq!(store.get("session").map(|c| c.value), Some("one".to_string()));

        store.apply(set("session", "two", Some(Duration::from_secs(60))));
        assert_eq!(store.len(), 1);
        assert_eq!(store.get("session").map(|c| c.value), Some("two".to_string()));

        store.apply(CookieUpdate::Remove("session".to_string()));
        assert!(store.get("session").is_none());
    }

    #[test]
    fn test_header_value_joins_live_cookies() {
        let store = CredentialStore::new();
        assert_eq!(store.header_value(), None);

        store.apply(set("session", "abc", Some(Duration::from_secs(60))));
        store.apply(set("locale", "en", None));
        // BTreeMap keeps names ordered
        assert_eq!(store.header_value(), Some("locale=en; session=abc".to_string()));
    }

    #[test]
    fn test_expired_credentials_are_dropped() {
        let store = CredentialStore::new();
        store.apply(CookieUpdate::Set(SessionCredential {
            name: "session".to_string(),
            value: "stale".to_string(),
            ttl: Some(Duration::from_secs(1)),
            received_at: Utc::now() - chrono::Duration::seconds(5),
        }));
        assert!(store.get("session").is_none());
        assert_eq!(store.header_value(), None);
        assert!(store.is_empty());
    }
}
