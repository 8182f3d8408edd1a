//! Session-aware client for JSON HTTP APIs.
//!
//! The client supports two credential modes:
//! - Token: a static API token sent as a basic-auth pair on every call.
//! - Password: a username/password identity check that makes the server
//!   issue a session cookie. The cookie's lifetime drives a proactive
//!   re-authentication shortly before it lapses.
//!
//! Every API call passes through a gate that holds it while an
//! authentication attempt is in flight and releases (or fails) it once the
//! attempt resolves.

pub mod api;
pub mod auth;
pub mod config;
pub mod transport;

pub use api::{ApiError, Client, RequestOptions};
pub use auth::{AuthData, AuthEvent, AuthOutcome, AuthTrigger, Keychain, SAFETY_MARGIN};
pub use config::{ClientOptions, ConfigError, CredentialMode, Credentials, OptionsBuilder};
pub use transport::{HttpTransport, SessionCredential, Transport};
