//! One-shot broadcast of an authentication outcome.
//!
//! Each subscriber gets a `oneshot` receiver. `announce` drains the list,
//! so a receiver registered after an announcement waits for the next one.

use tokio::sync::oneshot;

use super::session::AuthOutcome;

#[derive(Debug, Default)]
pub struct Notifier {
    waiters: Vec<oneshot::Sender<AuthOutcome>>,
}

impl Notifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&mut self) -> oneshot::Receiver<AuthOutcome> {
        let (tx, rx) = oneshot::channel();
        self.waiters.push(tx);
        rx
    }

    /// Deliver `outcome` to every current subscriber and clear the list.
    /// Returns how many subscribers were still listening.
    pub fn announce(&mut self, outcome: &AuthOutcome) -> usize {
        self.waiters
            .drain(..)
            .filter_map(|tx| tx.send(outcome.clone()).ok())
            .count()
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.waiters.len()
    }

    #[cfg(test)]
    pub(crate) fn is_empty(&self) -> bool {
        self.waiters.is_empty()
    }
}

// ============================================================================
// Tests
// ============================================================================
