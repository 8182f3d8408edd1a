use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use tokio::sync::oneshot;
use tokio::task::AbortHandle;
use tokio::time::Instant;

use super::notifier::Notifier;
use crate::api::ApiError;

/// Lead time before session expiry at which re-authentication fires.
pub const SAFETY_MARGIN: Duration = Duration::from_millis(5000);

/// Delay from a fresh session to its proactive re-authentication.
///
/// Sessions shorter than the margin re-authenticate at half their lifetime,
/// which stays positive and still lands before expiry.
pub fn reauth_delay(ttl: Duration) -> Duration {
    if ttl > SAFETY_MARGIN {
        ttl - SAFETY_MARGIN
    } else {
        ttl / 2
    }
}

/// Outcome of a successful identity check.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AuthData {
    /// Decoded identity response
    pub body: Value,
    pub authenticated_at: DateTime<Utc>,
    /// Derived from the session cookie; `None` for non-expiring sessions.
    pub session_expires_at: Option<DateTime<Utc>>,
}

impl AuthData {
    /// Remaining session lifetime at `now`, zero once expired.
    pub fn time_until_expiry(&self, now: DateTime<Utc>) -> Option<chrono::Duration> {
        self.session_expires_at
            .map(|at| (at - now).max(chrono::Duration::zero()))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum AuthOutcome {
    Success(AuthData),
    Failure(ApiError),
}

impl AuthOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, AuthOutcome::Success(_))
    }

    pub fn into_result(self) -> Result<AuthData, ApiError> {
        match self {
            AuthOutcome::Success(data) => Ok(data),
            AuthOutcome::Failure(err) => Err(err),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthTrigger {
    /// A caller asked for it
    Explicit,
    /// The re-authentication timer fired
    Scheduled,
}

/// Published on the client's event channel after every attempt.
#[derive(Debug, Clone, PartialEq)]
pub struct AuthEvent {
    pub trigger: AuthTrigger,
    pub outcome: AuthOutcome,
}

/// Pending re-authentication timer.
#[derive(Debug)]
pub struct ScheduleHandle {
    id: u64,
    task: AbortHandle,
    fires_at: Instant,
}

impl ScheduleHandle {
    pub fn new(id: u64, task: AbortHandle, fires_at: Instant) -> Self {
        Self { id, task, fires_at }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn fires_at(&self) -> Instant {
        self.fires_at
    }

    fn cancel(self) {
        self.task.abort();
    }
}

/// Mutable authentication state of one client.
///
/// `authenticating` is true strictly between the start of an attempt and
/// its resolution. At most one re-authentication timer is tracked.
#[derive(Debug, Default)]
pub struct SessionState {
    authenticating: bool,
    auth_data: Option<AuthData>,
    reauth_scheduled: Option<ScheduleHandle>,
    destroyed: bool,
    notifier: Notifier,
    next_timer_id: u64,
}

impl SessionState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_authenticating(&self) -> bool {
        self.authenticating
    }

    pub fn auth_data(&self) -> Option<&AuthData> {
        self.auth_data.as_ref()
    }

    pub fn reauth_scheduled(&self) -> Option<&ScheduleHandle> {
        self.reauth_scheduled.as_ref()
    }

    pub fn is_destroyed(&self) -> bool {
        self.destroyed
    }

    /// Mark an attempt as started. Returns false if one is already
    /// outstanding.
    pub fn begin_attempt(&mut self) -> bool {
        if self.authenticating {
            return false;
        }
        self.authenticating = true;
        true
    }

    /// Wait for the outcome of the outstanding (or next) attempt.
    pub fn subscribe(&mut self) -> oneshot::Receiver<AuthOutcome> {
        self.notifier.subscribe()
    }

    /// Resolve the outstanding attempt and wake everyone waiting on it.
    /// A failure leaves the last successful `auth_data` in place.
    pub fn finish_attempt(&mut self, outcome: &AuthOutcome) -> usize {
        if let AuthOutcome::Success(data) = outcome {
            self.auth_data = Some(data.clone());
        }
        self.authenticating = false;
        self.notifier.announce(outcome)
    }

    pub fn next_timer_id(&mut self) -> u64 {
        self.next_timer_id += 1;
        self.next_timer_id
    }

    /// Track a new timer, cancelling any previous one.
    pub fn arm(&mut self, handle: ScheduleHandle) {
        if let Some(previous) = self.reauth_scheduled.replace(handle) {
            previous.cancel();
        }
    }

    /// Called from inside the timer task once it fires. Clears the handle
    /// without aborting the running task. Returns false for a stale timer.
    pub fn clear_fired(&mut self, id: u64) -> bool {
        if self.reauth_scheduled.as_ref().map(ScheduleHandle::id) != Some(id) {
            return false;
        }
        self.reauth_scheduled = None;
        true
    }

    pub fn cancel_reauth(&mut self) -> bool {
        match self.reauth_scheduled.take() {
            Some(handle) => {
                handle.cancel();
                true
            }
            None => false,
        }
    }

    /// Cancel the timer and refuse to arm new ones. Idempotent.
    pub fn destroy(&mut self) -> bool {
        self.destroyed = true;
        self.cancel_reauth()
    }
}

// ============================================================================
// Tests
// ============================================================================
