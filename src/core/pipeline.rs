//! Per-job processing: gate checks, admission policy, rate-limited
//! enrichment and scoring with retries, then the final decision.

use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::RwLock;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::{EngineConfig, RuntimeSettings};
use crate::core::audit::{build_event, EventSink, PipelineAction};
use crate::core::early_exit::{self, EarlyExitPolicy, EarlyExitReason};
use crate::core::providers::{DecisionPolicy, Enricher, QualityReviewer, Scorer, TrustAssessor};
use crate::core::rate_limiter::RateLimiter;
use crate::core::retry::{self, RetryPolicy};
use crate::core::{Decision, EngineError, EnrichedVenue, Job, JobResult, Submission};
use crate::infra::store::VenueRepository;

/// Upper bound on a single event-sink append.
const EVENT_APPEND_TIMEOUT: Duration = Duration::from_millis(500);

/// The external collaborators a pipeline drives.
#[derive(Clone)]
pub struct Collaborators {
    /// Enrichment provider.
    pub enricher: Arc<dyn Enricher>,
    /// Scoring provider.
    pub scorer: Arc<dyn Scorer>,
    /// Optional quality reviewer.
    pub quality: Option<Arc<dyn QualityReviewer>>,
    /// Decision policy.
    pub policy: Arc<dyn DecisionPolicy>,
    /// Trust assessor.
    pub trust: Arc<dyn TrustAssessor>,
    /// Venue repository / unit-of-work factory.
    pub repository: Arc<dyn VenueRepository>,
    /// Optional event sink.
    pub events: Option<Arc<dyn EventSink>>,
}

/// Outcome of one enrichment + scoring attempt.
enum Scored {
    Decision(EnrichedVenue, Decision),
    NoLocation,
}

/// Processes jobs. Shared by all workers and the synchronous path.
pub struct Pipeline {
    collaborators: Collaborators,
    enrich_limiter: Arc<RateLimiter>,
    score_limiter: Arc<RateLimiter>,
    settings: Arc<RwLock<RuntimeSettings>>,
    retry: RetryPolicy,
    job_timeout: Duration,
    restricted_regions: Vec<String>,
    duplicate_radius_m: f64,
    duplicate_similarity: f64,
}

impl Pipeline {
    /// Create a pipeline.
    #[must_use]
    pub fn new(
        config: &EngineConfig,
        collaborators: Collaborators,
        enrich_limiter: Arc<RateLimiter>,
        score_limiter: Arc<RateLimiter>,
        settings: Arc<RwLock<RuntimeSettings>>,
    ) -> Self {
        Self {
            collaborators,
            enrich_limiter,
            score_limiter,
            settings,
            retry: RetryPolicy::from_config(&config.retry),
            job_timeout: config.job_timeout(),
            restricted_regions: config.restricted_regions.clone(),
            duplicate_radius_m: config.duplicate_radius_m,
            duplicate_similarity: config.duplicate_similarity,
        }
    }

    /// The collaborators.
    #[must_use]
    pub const fn collaborators(&self) -> &Collaborators {
        &self.collaborators
    }

    /// Forward runtime settings to every collaborator.
    pub fn propagate_settings(&self, settings: &RuntimeSettings) {
        self.collaborators.enricher.update_runtime_config(settings);
        self.collaborators.scorer.update_runtime_config(settings);
        self.collaborators.policy.update_runtime_config(settings);
    }

    /// Process a job into a fresh result.
    pub async fn process(&self, job: &Job, cancel: &CancellationToken) -> JobResult {
        let mut result = JobResult::default();
        self.process_into(job, cancel, &mut result).await;
        result
    }

    /// Process a job, writing into `result`.
    ///
    /// The per-job timeout narrows `cancel`; partial progress written to
    /// `result` before a timeout is kept.
    pub async fn process_into(&self, job: &Job, cancel: &CancellationToken, result: &mut JobResult) {
        let started = Instant::now();
        let sub = &job.submission;
        result.venue_id = sub.venue.id;
        result.user_id = sub.user.id;

        self.emit(sub, PipelineAction::JobStarted, Some(serde_json::json!({ "priority": job.priority })))
            .await;

        let job_cancel = cancel.child_token();
        let outcome = tokio::time::timeout(self.job_timeout, self.run(sub, &job_cancel, result)).await;
        if outcome.is_err() {
            job_cancel.cancel();
            warn!(venue_id = sub.venue.id, timeout_ms = self.job_timeout.as_millis(), "Job timed out");
            result.success = false;
            result.decision = None;
            result.error = Some(EngineError::JobTimeout);
        }
        result.latency = started.elapsed();

        let action = if result.success {
            PipelineAction::Completed
        } else {
            PipelineAction::Failed
        };
        let payload = serde_json::json!({
            "status": result.target_status().as_str(),
            "score": result.decision.as_ref().map(|d| d.score),
            "retries": result.retries,
            "latency_ms": result.latency.as_millis(),
            "error": result.error.as_ref().map(ToString::to_string),
        });
        self.emit(sub, action, Some(payload)).await;
    }

    async fn run(&self, sub: &Submission, cancel: &CancellationToken, result: &mut JobResult) {
        let venue = &sub.venue;
        let repository = self.collaborators.repository.as_ref();

        if let Some(reason) = early_exit::requires_manual_review(venue, &self.restricted_regions) {
            return self.exit_early(sub, reason, result).await;
        }
        if let Some(reason) = early_exit::check_path(repository, venue).await {
            return self.exit_early(sub, reason, result).await;
        }

        let trust = self.collaborators.trust.assess(&sub.user, &venue.location).await;
        let policy = EarlyExitPolicy::from_settings(&self.settings.read());
        if let Some(reason) = policy.evaluate(sub, trust.as_ref()) {
            return self.exit_early(sub, reason, result).await;
        }
        if let Some(reason) = early_exit::check_duplicate(
            repository,
            venue,
            self.duplicate_radius_m,
            self.duplicate_similarity,
        )
        .await
        {
            return self.exit_early(sub, reason, result).await;
        }

        let trust_level = trust.map_or(0.0, |t| t.trust);
        match self.enrich_and_score(sub, cancel, result).await {
            Ok(Scored::Decision(enriched, decision)) => {
                self.finalize(sub, &enriched, decision, trust_level, result).await;
            }
            Ok(Scored::NoLocation) => self.exit_early(sub, EarlyExitReason::NoLocation, result).await,
            Err(e) => {
                warn!(venue_id = venue.id, retries = result.retries, error = %e, "Job failed");
                result.success = false;
                result.decision = None;
                result.error = Some(e);
            }
        }
    }

    async fn exit_early(&self, sub: &Submission, reason: EarlyExitReason, result: &mut JobResult) {
        info!(venue_id = sub.venue.id, code = reason.code(), "Skipping automated review");
        self.emit(
            sub,
            PipelineAction::EarlyExit,
            Some(serde_json::json!({ "code": reason.code(), "description": reason.description() })),
        )
        .await;
        result.success = true;
        result.decision = Some(Decision::manual_review(&reason));
        result.early_exit = Some(reason);
    }

    /// Enrichment + scoring with bounded retries. An enrichment obtained on
    /// an earlier attempt is reused and its payload kept on `result`.
    async fn enrich_and_score(
        &self,
        sub: &Submission,
        cancel: &CancellationToken,
        result: &mut JobResult,
    ) -> Result<Scored, EngineError> {
        let mut enriched: Option<EnrichedVenue> = None;
        let mut retries = 0;
        loop {
            result.retries = retries;
            let err = match self.attempt(sub, cancel, &mut enriched, result).await {
                Ok(scored) => return Ok(scored),
                Err(err) => err,
            };
            if !self.retry.should_retry(retries, &err) {
                return Err(err);
            }
            retries += 1;
            let delay = self.retry.delay_for(retries);
            warn!(
                venue_id = sub.venue.id,
                attempt = retries,
                delay_ms = delay.as_millis(),
                error = %err,
                "Transient failure, retrying"
            );
            if let Err(cancelled) = retry::sleep_or_cancel(delay, cancel).await {
                result.retries = retries;
                return Err(cancelled);
            }
        }
    }

    async fn attempt(
        &self,
        sub: &Submission,
        cancel: &CancellationToken,
        enriched: &mut Option<EnrichedVenue>,
        result: &mut JobResult,
    ) -> Result<Scored, EngineError> {
        let venue = match enriched.take() {
            Some(cached) => enriched.insert(cached),
            None => {
                self.enrich_limiter.wait(cancel).await?;
                let fresh = retry::cancellable(cancel, self.collaborators.enricher.enrich(&sub.venue))
                    .await?
                    .map_err(|e| retry::classify(&e))?;
                if let Some(payload) = &fresh.payload {
                    result.enrichment = Some(payload.clone());
                }
                debug!(venue_id = sub.venue.id, "Enrichment complete");
                enriched.insert(fresh)
            }
        };

        if venue.venue.coordinates().is_none() {
            return Ok(Scored::NoLocation);
        }

        let scorer = &self.collaborators.scorer;
        if scorer.requires_rate_limit() {
            self.score_limiter.wait(cancel).await?;
        }
        let decision = retry::cancellable(cancel, scorer.score(venue, &sub.user))
            .await?
            .map_err(|e| retry::classify(&e))?;
        debug!(venue_id = sub.venue.id, score = decision.score, "Scoring complete");
        Ok(Scored::Decision(venue.clone(), decision))
    }

    async fn finalize(
        &self,
        sub: &Submission,
        enriched: &EnrichedVenue,
        mut decision: Decision,
        trust_level: f64,
        result: &mut JobResult,
    ) {
        let outcome = self
            .collaborators
            .policy
            .decide(enriched, &sub.user, decision.score);
        decision.status = outcome.status;
        decision.set_score(outcome.score);
        decision.reason = outcome.reason;
        decision.annotate("authority_bonus", outcome.authority_bonus);
        decision.annotate("quality_flags", outcome.quality_flags);
        decision.annotate("trust", trust_level);

        if let Some(reviewer) = &self.collaborators.quality {
            match reviewer
                .review(enriched, &sub.user, &enriched.venue.category, trust_level)
                .await
            {
                Ok(suggestions) if !suggestions.is_empty() => {
                    decision.annotate("quality_suggestions", suggestions);
                }
                Ok(_) => {}
                Err(e) => warn!(venue_id = sub.venue.id, error = %e, "Quality review failed, ignoring"),
            }
        }

        info!(
            venue_id = sub.venue.id,
            status = decision.status.as_str(),
            score = decision.score,
            "Decision reached"
        );
        result.success = true;
        result.error = None;
        result.decision = Some(decision);
    }

    async fn emit(&self, sub: &Submission, action: PipelineAction, payload: Option<serde_json::Value>) {
        let Some(sink) = &self.collaborators.events else {
            return;
        };
        let event = build_event(sub.venue.id, sub.user.id, action, payload);
        match tokio::time::timeout(EVENT_APPEND_TIMEOUT, sink.append(event)).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!(venue_id = sub.venue.id, ?action, error = %e, "Event append failed"),
            Err(_) => warn!(venue_id = sub.venue.id, ?action, "Event append timed out"),
        }
    }
}
