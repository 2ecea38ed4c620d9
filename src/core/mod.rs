//! Core moderation pipeline: model, admission policy, rate limiting,
//! retries, workers, persistence and the engine facade.

pub mod audit;
pub mod early_exit;
pub mod engine;
pub mod error;
pub mod model;
pub mod pipeline;
pub mod providers;
pub mod rate_limiter;
pub mod recycle;
pub mod result_handler;
pub mod retry;
pub mod worker_pool;

pub use audit::{build_event, EventSink, InMemoryEventSink, PipelineAction, PipelineEvent};
pub use early_exit::{EarlyExitPolicy, EarlyExitReason};
pub use engine::Engine;
pub use error::{AppResult, EngineError};
pub use model::{
    Decision, DecisionStatus, EnrichedVenue, Job, JobResult, Submission, Submitter,
    ValidationRecord, Venue, VenueId, VenueStatus, SCORE_MAX, SCORE_MIN,
};
pub use pipeline::{Collaborators, Pipeline};
pub use providers::{
    AuthorityLevel, DecisionPolicy, Enricher, PolicyOutcome, QualityReviewer, Scorer,
    ScorerUsage, ThresholdDecisionPolicy, TrustAssessment, TrustAssessor,
};
pub use rate_limiter::RateLimiter;
pub use recycle::{ObjectPool, Recycle};
pub use result_handler::ResultHandler;
pub use retry::RetryPolicy;
pub use worker_pool::{EngineStats, StatsCounters};
