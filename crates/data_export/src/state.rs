//! In-process state reporter
//!
//! Keeps the last document published per topic and the lifecycle state the
//! engine asked for. Async callers can follow transitions through a watch
//! channel.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use contracts::{ExportState, StateReporter};
use serde_json::Value;
use tokio::sync::watch;
use tracing::info;

#[derive(Default)]
struct Inner {
    topics: HashMap<String, Value>,
    transitions: Vec<ExportState>,
}

/// `StateReporter` backed by memory
pub struct StateStore {
    inner: Mutex<Inner>,
    state_tx: watch::Sender<ExportState>,
}

impl Default for StateStore {
    fn default() -> Self {
        Self::new()
    }
}

impl StateStore {
    pub fn new() -> Self {
        let (state_tx, _) = watch::channel(ExportState::Running);
        Self {
            inner: Mutex::new(Inner::default()),
            state_tx,
        }
    }

    /// Current lifecycle state
    pub fn state(&self) -> ExportState {
        *self.state_tx.borrow()
    }

    /// Follow lifecycle transitions
    pub fn subscribe(&self) -> watch::Receiver<ExportState> {
        self.state_tx.subscribe()
    }

    /// Last document published under `topic`
    pub fn topic(&self, topic: &str) -> Option<Value> {
        self.lock().topics.get(topic).cloned()
    }

    /// Every transition requested so far, oldest first
    pub fn transitions(&self) -> Vec<ExportState> {
        self.lock().transitions.clone()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl StateReporter for StateStore {
    fn report_state(&self, topic: &str, state: Value) {
        info!(topic, state = %state, "State reported");
        self.lock().topics.insert(topic.to_string(), state);
    }

    fn request_transition(&self, next: ExportState) {
        info!(from = %self.state(), to = %next, "State transition requested");
        self.lock().transitions.push(next);
        self.state_tx.send_replace(next);
    }
}
