//! Capability traits for the external collaborators the pipeline drives.
//!
//! Production and test implementations sit behind the same traits so that
//! failures and latency can be injected deterministically. Optional behavior
//! (runtime reconfiguration, conditional rate limiting) is an explicit method
//! with a default, never a runtime capability probe.

use std::sync::atomic::{AtomicI32, Ordering};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::config::RuntimeSettings;
use crate::core::{AppResult, Decision, DecisionStatus, EnrichedVenue, Submitter, Venue};

/// Enriches a raw venue, typically via a paid geocoding/places API.
///
/// Must be safe to call concurrently from multiple workers.
#[async_trait]
pub trait Enricher: Send + Sync {
    /// Return the enriched venue or an error.
    async fn enrich(&self, venue: &Venue) -> AppResult<EnrichedVenue>;

    /// Receive updated runtime settings. No-op by default.
    fn update_runtime_config(&self, _settings: &RuntimeSettings) {}
}

/// Cumulative usage counters reported by a scorer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ScorerUsage {
    /// Requests issued.
    pub requests: u64,
    /// Input tokens consumed.
    pub input_tokens: u64,
    /// Output tokens produced.
    pub output_tokens: u64,
    /// Accumulated cost in USD.
    pub cost_usd: f64,
}

/// Scores an enriched venue, typically via a paid model API.
#[async_trait]
pub trait Scorer: Send + Sync {
    /// Produce a provisional decision.
    async fn score(&self, venue: &EnrichedVenue, user: &Submitter) -> AppResult<Decision>;

    /// Cumulative usage and cost.
    fn usage(&self) -> ScorerUsage;

    /// Whether calls must pass the scoring rate limiter.
    fn requires_rate_limit(&self) -> bool {
        true
    }

    /// Receive updated runtime settings. No-op by default.
    fn update_runtime_config(&self, _settings: &RuntimeSettings) {}
}

/// Optional reviewer that produces supplementary suggestions.
#[async_trait]
pub trait QualityReviewer: Send + Sync {
    /// Review the venue for the given category and trust level.
    async fn review(
        &self,
        venue: &EnrichedVenue,
        user: &Submitter,
        category: &str,
        trust: f64,
    ) -> AppResult<Vec<String>>;
}

/// Output of the decision policy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyOutcome {
    /// Final status.
    pub status: DecisionStatus,
    /// Final score.
    pub score: i32,
    /// Final reason.
    pub reason: String,
    /// Bonus granted for submitter authority.
    pub authority_bonus: i32,
    /// Number of quality flags raised.
    pub quality_flags: u32,
}

/// Turns a raw score into the final decision. Pure function of its inputs.
pub trait DecisionPolicy: Send + Sync {
    /// Decide the final outcome.
    fn decide(&self, venue: &EnrichedVenue, user: &Submitter, score: i32) -> PolicyOutcome;

    /// Receive updated runtime settings. No-op by default.
    fn update_runtime_config(&self, _settings: &RuntimeSettings) {}
}

/// Submitter authority classification.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthorityLevel {
    /// No recognized authority.
    #[default]
    Basic,
    /// Established contributor.
    Established,
    /// Ambassador in the venue's region.
    Ambassador,
    /// Venue admin, owner or globally trusted.
    Privileged,
}

impl AuthorityLevel {
    /// True for the lowest tier.
    #[must_use]
    pub const fn is_lowest(self) -> bool {
        matches!(self, Self::Basic)
    }
}

/// Trust assessment for a submitter at a location.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TrustAssessment {
    /// Trust in `0.0..=1.0`.
    pub trust: f64,
    /// Authority classification.
    pub authority: AuthorityLevel,
}

/// Computes submitter trust. Called once per job.
#[async_trait]
pub trait TrustAssessor: Send + Sync {
    /// Assess trust, or `None` when no trust data is available.
    async fn assess(&self, user: &Submitter, location: &str) -> Option<TrustAssessment>;
}

/// Threshold-based decision policy.
///
/// Approves at or above the approval threshold, rejects below
/// `reject_below`, and sends everything in between to a human. Privileged
/// submitters get a small authority bonus.
pub struct ThresholdDecisionPolicy {
    approval_threshold: AtomicI32,
    reject_below: i32,
}

impl ThresholdDecisionPolicy {
    /// Bonus applied for venue admins, owners and trusted users.
    pub const AUTHORITY_BONUS: i32 = 5;

    /// Create a policy.
    #[must_use]
    pub const fn new(approval_threshold: i32, reject_below: i32) -> Self {
        Self {
            approval_threshold: AtomicI32::new(approval_threshold),
            reject_below,
        }
    }

    /// Current approval threshold.
    #[must_use]
    pub fn approval_threshold(&self) -> i32 {
        self.approval_threshold.load(Ordering::Relaxed)
    }
}

impl DecisionPolicy for ThresholdDecisionPolicy {
    fn decide(&self, venue: &EnrichedVenue, user: &Submitter, score: i32) -> PolicyOutcome {
        let authority_bonus = if user.trusted || user.has_venue_privilege() {
            Self::AUTHORITY_BONUS
        } else {
            0
        };
        let mut quality_flags = 0;
        if venue.venue.phone.is_none() && venue.venue.url.is_none() {
            quality_flags += 1;
        }
        if venue.venue.category.trim().is_empty() {
            quality_flags += 1;
        }

        let score = score + authority_bonus;
        let threshold = self.approval_threshold();
        let (status, reason) = if score >= threshold && quality_flags == 0 {
            (DecisionStatus::Approved, format!("score {score} meets threshold {threshold}"))
        } else if score < self.reject_below {
            (DecisionStatus::Rejected, format!("score {score} below {}", self.reject_below))
        } else if quality_flags > 0 {
            (DecisionStatus::ManualReview, format!("{quality_flags} quality flag(s) raised"))
        } else {
            (DecisionStatus::ManualReview, format!("score {score} below threshold {threshold}"))
        };

        PolicyOutcome {
            status,
            score,
            reason,
            authority_bonus,
            quality_flags,
        }
    }

    fn update_runtime_config(&self, settings: &RuntimeSettings) {
        self.approval_threshold
            .store(settings.approval_threshold, Ordering::Relaxed);
    }
}
