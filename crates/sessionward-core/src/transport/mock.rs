//! Scripted in-memory transport for tests.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::Utc;
use futures::future::BoxFuture;
use tokio::sync::oneshot;

use super::{SessionCredential, Transport, TransportError, TransportRequest, TransportResponse};

type Reply = Result<TransportResponse, TransportError>;

enum Scripted {
    Ready(Reply),
    Held(oneshot::Receiver<Reply>),
    Crash(oneshot::Receiver<()>),
}

/// Replies are consumed in order; once the script runs dry every call gets
/// `200 {}`.
#[derive(Default)]
pub(crate) struct MockTransport {
    script: Mutex<VecDeque<Scripted>>,
    sent: Mutex<Vec<TransportRequest>>,
    credentials: Mutex<HashMap<String, SessionCredential>>,
}

impl MockTransport {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub(crate) fn respond(&self, status: u16, body: &str) {
        self.push(Scripted::Ready(Ok(TransportResponse::new(status, body))));
    }

    pub(crate) fn fail(&self, message: &str) {
        self.push(Scripted::Ready(Err(TransportError(message.to_string()))));
    }

    /// Queue a reply that is only delivered once the returned sender fires.
    pub(crate) fn hold(&self) -> oneshot::Sender<Reply> {
        let (tx, rx) = oneshot::channel();
        self.push(Scripted::Held(rx));
        tx
    }

    /// Queue a call whose future panics once the returned sender fires or
    /// is dropped.
    pub(crate) fn crash(&self) -> oneshot::Sender<()> {
        let (tx, rx) = oneshot::channel();
        self.push(Scripted::Crash(rx));
        tx
    }

    pub(crate) fn set_session(&self, name: &str, ttl: Option<Duration>) {
        self.credentials.lock().unwrap().insert(
            name.to_string(),
            SessionCredential {
                name: name.to_string(),
                value: "mock-session".to_string(),
                ttl,
                received_at: Utc::now(),
            },
        );
    }

    pub(crate) fn sent(&self) -> Vec<TransportRequest> {
        self.sent.lock().unwrap().clone()
    }

    pub(crate) fn sent_count(&self) -> usize {
        self.sent.lock().unwrap().len()
    }

    /// URLs of every call so far, in dispatch order.
    pub(crate) fn sent_urls(&self) -> Vec<String> {
        self.sent().into_iter().map(|r| r.url).collect()
    }

    fn push(&self, scripted: Scripted) {
        self.script.lock().unwrap().push_back(scripted);
    }
}

impl Transport for MockTransport {
    fn send(&self, request: TransportRequest) -> BoxFuture<'_, Result<TransportResponse, TransportError>> {
        self.sent.lock().unwrap().push(request);
        let next = self.script.lock().unwrap().pop_front();
        Box::pin(async move {
            match next {
                Some(Scripted::Ready(reply)) => reply,
                Some(Scripted::Held(rx)) => rx
                    .await
                    .unwrap_or_else(|_| Err(TransportError("held reply dropped".to_string()))),
                Some(Scripted::Crash(rx)) => {
                    let _ = rx.await;
                    panic!("scripted transport panic")
                }
                None => Ok(TransportResponse::new(200, "{}")),
            }
        })
    }

    fn session_credential(&self, name: &str) -> Option<SessionCredential> {
        self.credentials.lock().unwrap().get(name).cloned()
    }
}
