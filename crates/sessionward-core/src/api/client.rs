//! Session-aware API client.
//!
//! `Client` drives password authentication, arms the proactive
//! re-authentication timer and gates every API call on the session state.
//! Clone is cheap: all clones share one session.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use chrono::{DateTime, Utc};
use reqwest::Method;
use serde_json::Value;
use tokio::sync::{broadcast, oneshot};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use super::{ApiError, RequestOptions};
use crate::auth::{
    reauth_delay, AuthData, AuthEvent, AuthOutcome, AuthTrigger, ScheduleHandle, SessionState,
};
use crate::config::{ClientOptions, ConfigError, CredentialMode, Credentials};
use crate::transport::{
    BasicAuth, HttpTransport, Transport, TransportRequest, TransportResponse,
};

/// Buffered auth events per subscriber before the slowest one starts lagging
const EVENT_CHANNEL_CAPACITY: usize = 16;

#[derive(Clone)]
pub struct Client {
    inner: Arc<Inner>,
}

struct Inner {
    options: ClientOptions,
    transport: Arc<dyn Transport>,
    state: Mutex<SessionState>,
    events: broadcast::Sender<AuthEvent>,
}

impl Client {
    /// Create a client backed by the reqwest transport.
    pub fn new(options: ClientOptions) -> Result<Self, ConfigError> {
        let transport = HttpTransport::new(options.request_timeout())
            .map_err(|e| ConfigError::Http(e.to_string()))?;
        Ok(Self::with_transport(options, Arc::new(transport)))
    }

    pub fn with_transport(options: ClientOptions, transport: Arc<dyn Transport>) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            inner: Arc::new(Inner {
                options,
                transport,
                state: Mutex::new(SessionState::new()),
                events,
            }),
        }
    }

    pub fn options(&self) -> &ClientOptions {
        &self.inner.options
    }

    pub fn mode(&self) -> CredentialMode {
        self.inner.options.mode()
    }

    /// Receive an event for every resolved authentication attempt,
    /// explicit or scheduled.
    pub fn subscribe(&self) -> broadcast::Receiver<AuthEvent> {
        self.inner.events.subscribe()
    }

    pub fn is_authenticating(&self) -> bool {
        self.inner.lock_state().is_authenticating()
    }

    /// Data from the last successful authentication. Kept after a failed
    /// attempt.
    pub fn auth_data(&self) -> Option<AuthData> {
        self.inner.lock_state().auth_data().cloned()
    }

    pub fn session_expires_at(&self) -> Option<DateTime<Utc>> {
        self.inner
            .lock_state()
            .auth_data()
            .and_then(|d| d.session_expires_at)
    }

    /// When the pending re-authentication fires, if one is armed.
    pub fn reauth_pending(&self) -> Option<Instant> {
        self.inner
            .lock_state()
            .reauth_scheduled()
            .map(ScheduleHandle::fires_at)
    }

    /// Run the identity check and establish a session.
    ///
    /// Token mode returns [`ApiError::NotNeeded`] without touching the
    /// network. If an attempt is already outstanding this call joins it.
    pub async fn authenticate(&self) -> Result<AuthData, ApiError> {
        Inner::authenticate(&self.inner).await
    }

    /// Issue an API call through the request gate.
    ///
    /// While an authentication attempt is outstanding the call is held. It
    /// is replayed once the attempt succeeds and fails with the attempt's
    /// error otherwise.
    pub async fn request(&self, path: &str, options: RequestOptions) -> Result<Value, ApiError> {
        loop {
            let waiter = {
                let mut state = self.inner.lock_state();
                if state.is_authenticating() {
                    Some(state.subscribe())
                } else {
                    None
                }
            };

            let Some(waiter) = waiter else {
                return self.inner.dispatch(path, &options).await;
            };

            debug!(path, "Authentication in flight, deferring request");
            match waiter.await.map_err(|_| ApiError::Abandoned)? {
                AuthOutcome::Success(_) => debug!(path, "Replaying deferred request"),
                AuthOutcome::Failure(err) => {
                    debug!(path, error = %err, "Dropping deferred request after failed authentication");
                    return Err(err);
                }
            }
        }
    }

    pub async fn get(&self, path: &str) -> Result<Value, ApiError> {
        self.request(path, RequestOptions::get()).await
    }

    pub async fn post(&self, path: &str, body: Value) -> Result<Value, ApiError> {
        self.request(path, RequestOptions::post(body)).await
    }

    /// Cancel any pending re-authentication. Calls already on the wire
    /// still resolve; no new timer is armed afterwards. Safe to repeat.
    pub fn destroy(&self) {
        if self.inner.lock_state().destroy() {
            info!("Cancelled pending re-authentication");
        }
    }
}

impl Inner {
    fn lock_state(&self) -> MutexGuard<'_, SessionState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    async fn authenticate(self: &Arc<Self>) -> Result<AuthData, ApiError> {
        if self.options.mode() == CredentialMode::Token {
            return Err(ApiError::NotNeeded);
        }

        let receiver = {
            let mut state = self.lock_state();
            if state.begin_attempt() {
                let (tx, rx) = oneshot::channel();
                // Detached: dropping this future does not abandon the attempt.
                tokio::spawn(Arc::clone(self).run_attempt(AuthTrigger::Explicit, Some(tx)));
                rx
            } else {
                debug!("Joining outstanding authentication attempt");
                state.subscribe()
            }
        };

        receiver.await.map_err(|_| ApiError::Abandoned)?.into_result()
    }

    async fn run_attempt(self: Arc<Self>, trigger: AuthTrigger, initiator: Option<oneshot::Sender<AuthOutcome>>) {
        let mut guard = AttemptGuard {
            inner: Arc::clone(&self),
            trigger,
            initiator,
            resolved: false,
        };

        let outcome = match self.identity_check().await {
            Ok(body) => AuthOutcome::Success(AuthData {
                body,
                authenticated_at: Utc::now(),
                session_expires_at: None,
            }),
            Err(err) => AuthOutcome::Failure(err),
        };
        self.finish_attempt(trigger, outcome, guard.initiator.take());
        guard.resolved = true;
    }

    async fn identity_check(&self) -> Result<Value, ApiError> {
        let Credentials::Password { username, password } = self.options.credentials() else {
            return Err(ApiError::NotNeeded);
        };

        let request = TransportRequest {
            method: Method::GET,
            url: self.options.endpoint(self.options.identity_path()),
            query: Vec::new(),
            body: None,
            basic_auth: Some(BasicAuth {
                username: username.clone(),
                password: Some(password.clone()),
            }),
        };

        debug!(username = %username, "Sending identity check");
        let response = self.transport.send(request).await?;
        check_response(response)
    }

    /// Mutate state, announce to waiters and listeners, then answer the
    /// caller that started the attempt.
    fn finish_attempt(
        self: &Arc<Self>,
        trigger: AuthTrigger,
        mut outcome: AuthOutcome,
        initiator: Option<oneshot::Sender<AuthOutcome>>,
    ) {
        let ttl = match outcome {
            AuthOutcome::Success(ref mut data) if self.options.reauth_enabled() => {
                let credential = self
                    .transport
                    .session_credential(self.options.session_cookie_name());
                data.session_expires_at = credential.as_ref().and_then(|c| c.expires_at());
                credential.and_then(|c| c.ttl).filter(|ttl| !ttl.is_zero())
            }
            _ => None,
        };

        let deferred = {
            let mut state = self.lock_state();
            if let Some(ttl) = ttl {
                if state.is_destroyed() {
                    debug!("Client destroyed, not scheduling re-authentication");
                } else {
                    self.arm_reauth(&mut state, reauth_delay(ttl));
                }
            }
            state.finish_attempt(&outcome)
        };

        match outcome {
            AuthOutcome::Success(_) => info!(?trigger, deferred, "Authentication succeeded"),
            AuthOutcome::Failure(ref err) => warn!(?trigger, deferred, error = %err, "Authentication failed"),
        }

        // No receivers is fine: nobody is listening for events
        let _ = self.events.send(AuthEvent {
            trigger,
            outcome: outcome.clone(),
        });

        if let Some(tx) = initiator {
            let _ = tx.send(outcome);
        }
    }

    fn arm_reauth(self: &Arc<Self>, state: &mut SessionState, delay: std::time::Duration) {
        let Some(fires_at) = Instant::now().checked_add(delay) else {
            warn!(
                delay_secs = delay.as_secs(),
                "Session lifetime out of timer range, not scheduling re-authentication"
            );
            state.cancel_reauth();
            return;
        };

        let id = state.next_timer_id();
        let client = Arc::downgrade(self);
        let task = tokio::spawn(async move {
            tokio::time::sleep_until(fires_at).await;
            Inner::fire_reauth(client, id).await;
        });
        info!(delay_ms = delay.as_millis() as u64, "Scheduled re-authentication");
        state.arm(ScheduleHandle::new(id, task.abort_handle(), fires_at));
    }

    async fn fire_reauth(client: Weak<Self>, id: u64) {
        let Some(inner) = client.upgrade() else {
            return;
        };

        let start = {
            let mut state = inner.lock_state();
            // Once cleared, destroy() cannot abort this task mid-attempt.
            if !state.clear_fired(id) || state.is_destroyed() {
                false
            } else {
                state.begin_attempt()
            }
        };

        if start {
            info!("Re-authenticating before session expiry");
            inner.run_attempt(AuthTrigger::Scheduled, None).await;
        } else {
            debug!("Skipping scheduled re-authentication");
        }
    }

    async fn dispatch(&self, path: &str, options: &RequestOptions) -> Result<Value, ApiError> {
        let request = TransportRequest {
            method: options.method.clone(),
            url: self.options.endpoint(path),
            query: options.query.clone(),
            body: options.body.clone(),
            basic_auth: self.options.request_auth(),
        };

        debug!(method = %request.method, path, "Dispatching request");
        let response = self.transport.send(request).await?;
        check_response(response)
    }
}

/// Resolves an attempt as [`ApiError::Abandoned`] when its task unwinds or
/// is dropped before `finish_attempt` returns.
struct AttemptGuard {
    inner: Arc<Inner>,
    trigger: AuthTrigger,
    initiator: Option<oneshot::Sender<AuthOutcome>>,
    resolved: bool,
}

impl Drop for AttemptGuard {
    fn drop(&mut self) {
        if self.resolved {
            return;
        }

        let outcome = AuthOutcome::Failure(ApiError::Abandoned);
        let deferred = {
            let mut state = self.inner.lock_state();
            if !state.is_authenticating() {
                return;
            }
            state.finish_attempt(&outcome)
        };
        warn!(trigger = ?self.trigger, deferred, "Authentication attempt abandoned");

        let _ = self.inner.events.send(AuthEvent {
            trigger: self.trigger,
            outcome: outcome.clone(),
        });
        if let Some(tx) = self.initiator.take() {
            let _ = tx.send(outcome);
        }
    }
}

impl Drop for Inner {
    fn drop(&mut self) {
        let state = self.state.get_mut().unwrap_or_else(PoisonError::into_inner);
        state.cancel_reauth();
    }
}

/// Classify a response: 2xx decodes as JSON, anything else is an API error.
fn check_response(response: TransportResponse) -> Result<Value, ApiError> {
    if !(200..300).contains(&response.status) {
        return Err(ApiError::from_status(response.status, &response.body));
    }
    if response.body.trim().is_empty() {
        return Ok(Value::Null);
    }
    serde_json::from_str(&response.body)
        .map_err(|e| ApiError::Decode(format!("Failed to parse JSON response: {}", e)))
}

// ============================================================================
// Tests
// ============================================================================
