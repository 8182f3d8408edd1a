//! Client surface: authentication and gated API calls.
//!
//! `Client` owns the session state for one API account. Every call made
//! through [`Client::request`] is held while an authentication attempt is
//! outstanding, then replayed on success or failed with the attempt's error.

pub mod client;
pub mod error;
pub mod request;

pub use client::Client;
pub use error::ApiError;
pub use request::RequestOptions;
