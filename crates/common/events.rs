//! Node event reporting.
//!
//! Components raise structured events for conditions that must outlive the
//! logs, e.g. the sanity reprocessor's out-of-counters failure, which
//! attaches the full executor request for offline replay.

use std::sync::Mutex;

use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum EventSource {
    Node,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum EventComponent {
    Sequencer,
    Synchronizer,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum EventLevel {
    Critical,
    Error,
    Warning,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum EventId {
    ReprocessFullBatchOoc,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Event {
    /// Unix seconds when the event was raised.
    pub received_at: u64,
    pub source: EventSource,
    pub component: EventComponent,
    pub level: EventLevel,
    pub event_id: EventId,
    pub description: String,
    /// Structured payload; shape depends on `event_id`.
    pub json: serde_json::Value,
}

#[derive(Debug, thiserror::Error)]
pub enum EventError {
    #[error("failed to store event: {0}")]
    Storage(String),
}

/// Sink for node events.
#[async_trait::async_trait]
pub trait EventLog: Send + Sync {
    async fn log_event(&self, event: Event) -> Result<(), EventError>;
}

/// In-memory event sink.
#[derive(Debug, Default)]
pub struct VecEventLog {
    events: Mutex<Vec<Event>>,
}

impl VecEventLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<Event> {
        self.events
            .lock()
            .map(|events| events.clone())
            .unwrap_or_default()
    }
}

#[async_trait::async_trait]
impl EventLog for VecEventLog {
    async fn log_event(&self, event: Event) -> Result<(), EventError> {
        self.events
            .lock()
            .map_err(|_| EventError::Storage("event log lock poisoned".to_string()))?
            .push(event);
        Ok(())
    }
}
