//! Authentication state and its supporting pieces.
//!
//! This module provides:
//! - `SessionState`: attempt flag, last auth data and the re-auth timer
//! - `Notifier`: one-shot fan-out of an attempt's outcome
//! - `Keychain`: OS-level password storage via keyring
//!
//! Sessions re-authenticate `SAFETY_MARGIN` before their cookie lapses.

pub mod credentials;
pub mod notifier;
pub mod session;

pub use credentials::Keychain;
pub use notifier::Notifier;
pub use session::{
    reauth_delay, AuthData, AuthEvent, AuthOutcome, AuthTrigger, ScheduleHandle, SessionState,
    SAFETY_MARGIN,
};
