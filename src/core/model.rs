//! Submission, job and result types flowing through the pipeline.

use std::collections::BTreeMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::core::early_exit::EarlyExitReason;
use crate::core::EngineError;

/// Stable numeric venue identifier.
pub type VenueId = u64;

/// Lowest score a decision may carry.
pub const SCORE_MIN: i32 = 0;
/// Highest score a decision may carry.
pub const SCORE_MAX: i32 = 100;

/// A venue listing as submitted.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Venue {
    /// Venue identifier.
    pub id: VenueId,
    /// Display name.
    pub name: String,
    /// Latitude, when known.
    pub latitude: Option<f64>,
    /// Longitude, when known.
    pub longitude: Option<f64>,
    /// Free-text category (e.g. "restaurant", "bakery").
    pub category: String,
    /// Free-text venue type classifier.
    pub venue_type: String,
    /// Fully vegan venue.
    pub vegan: bool,
    /// Vegetarian-only venue.
    pub vegetarian_only: bool,
    /// Hierarchical region path, `|`-separated (e.g. `europe|germany|berlin`).
    pub path: Option<String>,
    /// Country name or code.
    pub country: Option<String>,
    /// Free-text location (city, address).
    pub location: String,
    /// Contact phone number.
    pub phone: Option<String>,
    /// Website.
    pub url: Option<String>,
    /// Extra free-text information.
    pub additional_info: Option<String>,
    /// Administrative hold placed on the listing.
    pub admin_hold: bool,
}

impl Venue {
    /// Coordinates if both are present and not the `(0, 0)` placeholder.
    #[must_use]
    pub fn coordinates(&self) -> Option<(f64, f64)> {
        match (self.latitude, self.longitude) {
            (Some(lat), Some(lng)) if lat != 0.0 || lng != 0.0 => Some((lat, lng)),
            _ => None,
        }
    }
}

/// The user who submitted a venue.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Submitter {
    /// User identifier.
    pub id: u64,
    /// Username.
    pub username: String,
    /// Ambassador level, if the user is in the ambassador program.
    pub ambassador_level: Option<u32>,
    /// Ambassador points, if known.
    pub ambassador_points: Option<u32>,
    /// User administers this venue.
    pub is_venue_admin: bool,
    /// User owns this venue.
    pub is_venue_owner: bool,
    /// Globally trusted user.
    pub trusted: bool,
}

impl Submitter {
    /// True when the user shows any ambassador status.
    #[must_use]
    pub fn is_ambassador(&self) -> bool {
        self.ambassador_level.unwrap_or(0) > 0 || self.ambassador_points.unwrap_or(0) > 0
    }

    /// True when the user holds venue-admin or owner privilege.
    #[must_use]
    pub const fn has_venue_privilege(&self) -> bool {
        self.is_venue_admin || self.is_venue_owner
    }
}

/// A venue plus its submitter. The engine copies this into each job.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Submission {
    /// The submitted venue.
    pub venue: Venue,
    /// The submitting user.
    pub user: Submitter,
}

impl Submission {
    /// Create a submission.
    #[must_use]
    pub const fn new(venue: Venue, user: Submitter) -> Self {
        Self { venue, user }
    }

    /// Additive priority: privileged submitters first, then ambassadors,
    /// then small bonuses for data completeness.
    #[must_use]
    pub fn priority(&self) -> i32 {
        let mut priority = 0;
        if self.user.trusted || self.user.has_venue_privilege() {
            priority += 100;
        }
        if self.user.is_ambassador() {
            priority += 50;
        }
        let venue = &self.venue;
        for field in [&venue.phone, &venue.url, &venue.additional_info] {
            if field.as_deref().is_some_and(|v| !v.trim().is_empty()) {
                priority += 5;
            }
        }
        priority
    }
}

/// Terminal automated outcome.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecisionStatus {
    /// Listing goes live.
    Approved,
    /// Listing is rejected.
    Rejected,
    /// A human must decide.
    #[default]
    ManualReview,
}

impl DecisionStatus {
    /// Stable lowercase name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Approved => "approved",
            Self::Rejected => "rejected",
            Self::ManualReview => "manual_review",
        }
    }
}

/// Persisted venue status.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VenueStatus {
    /// Not yet reviewed.
    #[default]
    Pending,
    /// Active listing.
    Approved,
    /// Rejected listing.
    Rejected,
    /// Waiting for a moderator.
    ManualReview,
}

impl From<DecisionStatus> for VenueStatus {
    fn from(status: DecisionStatus) -> Self {
        match status {
            DecisionStatus::Approved => Self::Approved,
            DecisionStatus::Rejected => Self::Rejected,
            DecisionStatus::ManualReview => Self::ManualReview,
        }
    }
}

/// Decision payload produced by scoring and the decision policy.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Decision {
    /// Outcome.
    pub status: DecisionStatus,
    /// Score in `SCORE_MIN..=SCORE_MAX`.
    pub score: i32,
    /// Human-readable reason.
    pub reason: String,
    /// Scoring signals and later annotations.
    pub breakdown: BTreeMap<String, serde_json::Value>,
}

impl Decision {
    /// Create a decision, clamping the score into range.
    #[must_use]
    pub fn new(status: DecisionStatus, score: i32, reason: impl Into<String>) -> Self {
        Self {
            status,
            score: score.clamp(SCORE_MIN, SCORE_MAX),
            reason: reason.into(),
            breakdown: BTreeMap::new(),
        }
    }

    /// Manual-review decision for a submission that skipped automated review.
    #[must_use]
    pub fn manual_review(reason: &EarlyExitReason) -> Self {
        let mut decision = Self::new(DecisionStatus::ManualReview, SCORE_MIN, reason.description());
        decision.annotate("early_exit", reason.code());
        decision
    }

    /// Overwrite the score, clamping into range.
    pub fn set_score(&mut self, score: i32) {
        self.score = score.clamp(SCORE_MIN, SCORE_MAX);
    }

    /// Add a breakdown entry. Existing keys are kept; returns false when
    /// `key` was already present.
    pub fn annotate(&mut self, key: &str, value: impl Into<serde_json::Value>) -> bool {
        if self.breakdown.contains_key(key) {
            tracing::debug!(key, "breakdown key already set, keeping existing value");
            return false;
        }
        self.breakdown.insert(key.to_string(), value.into());
        true
    }
}

/// A venue after enrichment.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EnrichedVenue {
    /// Venue with any resolved fields (e.g. coordinates) filled in.
    pub venue: Venue,
    /// Raw third-party payload worth caching.
    pub payload: Option<serde_json::Value>,
}

/// Unit of work flowing through the queue.
#[derive(Debug, Clone, Default)]
pub struct Job {
    /// Value copy of the submission.
    pub submission: Submission,
    /// Priority computed at enqueue time. The queue is FIFO; this is recorded
    /// for observability only.
    pub priority: i32,
    /// Retries consumed so far.
    pub retries: u32,
    /// Enqueue timestamp (ms since epoch).
    pub enqueued_at_ms: u128,
}

/// Outcome of processing one job.
#[derive(Debug, Clone, Default)]
pub struct JobResult {
    /// Venue the job was about.
    pub venue_id: VenueId,
    /// Submitting user.
    pub user_id: u64,
    /// Whether the pipeline produced a decision.
    pub success: bool,
    /// Decision, present on success.
    pub decision: Option<Decision>,
    /// Enrichment payload, kept even when a later step failed.
    pub enrichment: Option<serde_json::Value>,
    /// Why automated review was skipped, if it was.
    pub early_exit: Option<EarlyExitReason>,
    /// Failure, if any.
    pub error: Option<EngineError>,
    /// Wall time spent in the pipeline.
    pub latency: Duration,
    /// Retries actually used.
    pub retries: u32,
}

impl JobResult {
    /// Status the result maps to, forcing manual review on failure.
    #[must_use]
    pub fn target_status(&self) -> DecisionStatus {
        match (&self.decision, self.success) {
            (Some(decision), true) => decision.status,
            _ => DecisionStatus::ManualReview,
        }
    }

    /// True when the job was aborted by engine cancellation rather than
    /// failing on its own. Such results are never persisted.
    #[must_use]
    pub const fn was_cancelled(&self) -> bool {
        matches!(self.error, Some(EngineError::Cancelled))
    }
}

/// Append-only validation history entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationRecord {
    /// Venue identifier.
    pub venue_id: VenueId,
    /// Submitting user.
    pub user_id: u64,
    /// Status recorded.
    pub status: DecisionStatus,
    /// Score recorded.
    pub score: i32,
    /// Reason recorded.
    pub reason: String,
    /// Scoring breakdown.
    pub breakdown: BTreeMap<String, serde_json::Value>,
    /// Cached enrichment payload.
    pub enrichment: Option<serde_json::Value>,
    /// Creation timestamp (ms since epoch).
    pub created_at_ms: u128,
}
