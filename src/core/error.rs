//! Error types for engine operations.

use std::time::Duration;

use thiserror::Error;

/// Errors produced by the moderation engine.
///
/// Enqueue-time failures are returned synchronously to the caller; per-job
/// failures are carried on the [`JobResult`](crate::core::JobResult) and only
/// surface through statistics and the event sink.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EngineError {
    /// The bounded job queue is full. `accepted` submissions of the batch
    /// were enqueued before the rejection.
    #[error("queue full ({accepted} accepted before rejection)")]
    QueueFull {
        /// Number of batch entries enqueued before the queue filled up.
        accepted: usize,
    },
    /// The engine is shutting down and no longer accepts work.
    #[error("engine is shutting down")]
    ShuttingDown,
    /// The engine has not been started.
    #[error("engine is not running")]
    NotRunning,
    /// `start` was called on an engine that is already running.
    #[error("engine already started")]
    AlreadyStarted,
    /// The job was cancelled by engine shutdown.
    #[error("cancelled")]
    Cancelled,
    /// The job exceeded its per-job timeout.
    #[error("job timed out")]
    JobTimeout,
    /// Workers did not drain within the stop timeout.
    #[error("workers did not stop within {0:?}")]
    StopTimeout(Duration),
    /// An external dependency failed.
    #[error("external call failed: {message}")]
    External {
        /// Full error chain text.
        message: String,
        /// Whether the failure classified as transient.
        transient: bool,
    },
    /// A unit-of-work write or commit failed.
    #[error("persistence error: {0}")]
    Persistence(String),
    /// Configuration validation failed.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

impl EngineError {
    /// True for errors caused by cancellation or the per-job deadline.
    #[must_use]
    pub const fn is_cancellation(&self) -> bool {
        matches!(self, Self::Cancelled | Self::JobTimeout)
    }
}

/// Application-facing result used at collaborator seams.
pub type AppResult<T> = Result<T, anyhow::Error>;
