//! Last published response plus change notifications.
//!
//! One [`SessionState`] exists per orchestrator. The orchestrator is the only writer;
//! front ends read through [`SessionState::last_response`] or follow updates through
//! [`SessionState::subscribe`].

use std::sync::RwLock;
use tokio::sync::broadcast;

/// Capacity of the notification channel. Slow subscribers skip older responses.
const NOTIFY_CAPACITY: usize = 16;

pub struct SessionState {
    last_response: RwLock<String>,
    notifier: broadcast::Sender<String>,
}

impl SessionState {
    /// Empty state: the last response is `""` until something is published.
    pub fn new() -> Self {
        let (notifier, _) = broadcast::channel(NOTIFY_CAPACITY);
        Self {
            last_response: RwLock::new(String::new()),
            notifier,
        }
    }

    /// Replace the last response and notify subscribers.
    pub fn publish(&self, response: impl Into<String>) {
        let response = response.into();
        {
            let mut slot = match self.last_response.write() {
                Ok(slot) => slot,
                Err(poisoned) => poisoned.into_inner(),
            };
            *slot = response.clone();
        }
        // no subscribers is fine
        let _ = self.notifier.send(response);
    }

    /// Snapshot of the last published response.
    pub fn last_response(&self) -> String {
        match self.last_response.read() {
            Ok(slot) => slot.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// Receive every response published from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<String> {
        self.notifier.subscribe()
    }
}

impl Default for SessionState {
    fn default() -> Self {
        Self::new()
    }
}
