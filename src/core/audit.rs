//! Pipeline event sink.
//!
//! The engine appends an event at job start, early exit and completion.
//! Storage and replay of the event log belong to the sink implementation.

use std::collections::VecDeque;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::core::{AppResult, VenueId};
use crate::util::clock::now_ms;

/// Pipeline milestone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineAction {
    /// A worker picked up the job.
    JobStarted,
    /// The job skipped automated review.
    EarlyExit,
    /// The job produced a decision.
    Completed,
    /// The job failed.
    Failed,
}

/// Audit event structure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineEvent {
    /// Event identifier.
    pub event_id: String,
    /// Venue the job was about.
    pub venue_id: VenueId,
    /// Submitting user.
    pub user_id: u64,
    /// Milestone reached.
    pub action: PipelineAction,
    /// Timestamp milliseconds.
    pub created_at_ms: u128,
    /// Additional context.
    pub payload: Option<serde_json::Value>,
}

/// Append-only sink for pipeline events.
///
/// Failures are logged by the caller and never fail the job.
#[async_trait]
pub trait EventSink: Send + Sync {
    /// Append an event.
    async fn append(&self, event: PipelineEvent) -> AppResult<()>;
}

/// In-memory sink for testing and dev. Keeps the most recent `max_events`.
pub struct InMemoryEventSink {
    events: Mutex<VecDeque<PipelineEvent>>,
    max_events: usize,
}

impl InMemoryEventSink {
    /// Create a new in-memory sink with a bounded buffer.
    #[must_use]
    pub fn new(max_events: usize) -> Self {
        Self {
            events: Mutex::new(VecDeque::with_capacity(max_events.min(1024))),
            max_events,
        }
    }

    /// Retrieve a snapshot of stored events.
    pub fn events(&self) -> Vec<PipelineEvent> {
        self.events.lock().iter().cloned().collect()
    }

    /// Events recorded for one venue, oldest first.
    pub fn events_for(&self, venue_id: VenueId) -> Vec<PipelineEvent> {
        self.events
            .lock()
            .iter()
            .filter(|e| e.venue_id == venue_id)
            .cloned()
            .collect()
    }
}

#[async_trait]
impl EventSink for InMemoryEventSink {
    async fn append(&self, event: PipelineEvent) -> AppResult<()> {
        let mut events = self.events.lock();
        if events.len() >= self.max_events {
            events.pop_front();
        }
        events.push_back(event);
        Ok(())
    }
}

/// Helper to build an event with a fresh identifier and timestamp.
pub fn build_event(
    venue_id: VenueId,
    user_id: u64,
    action: PipelineAction,
    payload: Option<serde_json::Value>,
) -> PipelineEvent {
    PipelineEvent {
        event_id: uuid::Uuid::new_v4().to_string(),
        venue_id,
        user_id,
        action,
        created_at_ms: now_ms(),
        payload,
    }
}
