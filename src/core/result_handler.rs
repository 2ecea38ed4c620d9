//! Persists job results through a unit of work.
//!
//! A single consumer thread drains the result channel so writes for a venue
//! never race each other.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crossbeam_channel::Receiver;
use parking_lot::RwLock;
use tracing::{debug, error, info, warn};

use crate::config::RuntimeSettings;
use crate::core::recycle::ObjectPool;
use crate::core::worker_pool::StatsCounters;
use crate::core::{DecisionStatus, EngineError, JobResult, ValidationRecord, VenueStatus};
use crate::infra::store::{UnitOfWorkGuard, VenueRepository};
use crate::util::clock::now_ms;

/// Writes results to the venue repository.
pub struct ResultHandler {
    repository: Arc<dyn VenueRepository>,
    settings: Arc<RwLock<RuntimeSettings>>,
    score_only: Arc<AtomicBool>,
}

impl ResultHandler {
    /// Create a handler.
    #[must_use]
    pub fn new(
        repository: Arc<dyn VenueRepository>,
        settings: Arc<RwLock<RuntimeSettings>>,
        score_only: Arc<AtomicBool>,
    ) -> Self {
        Self {
            repository,
            settings,
            score_only,
        }
    }

    /// Persist one result and return the venue status applied, if any.
    ///
    /// Successful decisions write history first, then the status transition,
    /// in one unit of work. Failures force manual review and keep any
    /// salvaged enrichment as a manual-review history entry. Score-only
    /// mode never touches venue status, and cancelled jobs write nothing.
    ///
    /// # Errors
    ///
    /// Returns `EngineError::Persistence` if any write or the commit fails;
    /// nothing from the unit of work is applied in that case.
    pub async fn handle(&self, result: &JobResult) -> Result<Option<VenueStatus>, EngineError> {
        if result.was_cancelled() {
            debug!(venue_id = result.venue_id, "Cancelled job leaves the venue untouched");
            return Ok(None);
        }
        let score_only = self.score_only.load(Ordering::Acquire);
        let record = validation_record(result);

        if score_only && record.is_none() {
            debug!(venue_id = result.venue_id, "Score-only failure with nothing to keep");
            return Ok(None);
        }

        let mut uow = UnitOfWorkGuard::begin(self.repository.as_ref())
            .await
            .map_err(persistence)?;
        if let Some(record) = record {
            uow.save_validation(record).await.map_err(persistence)?;
        }

        let applied = if score_only {
            None
        } else {
            let requested = VenueStatus::from(result.target_status());
            let threshold = self.settings.read().approval_threshold;
            let applied = uow
                .update_venue_status(result.venue_id, requested, threshold)
                .await
                .map_err(persistence)?;
            if applied != requested {
                warn!(
                    venue_id = result.venue_id,
                    requested = ?requested,
                    applied = ?applied,
                    "Status transition downgraded by store"
                );
            }
            Some(applied)
        };

        uow.commit().await.map_err(persistence)?;
        debug!(venue_id = result.venue_id, status = ?applied, score_only, "Result persisted");
        Ok(applied)
    }
}

/// History record for a result: the decision on success, or a manual-review
/// entry when a failed job still salvaged enrichment data.
fn validation_record(result: &JobResult) -> Option<ValidationRecord> {
    match (&result.decision, result.success) {
        (Some(decision), true) => Some(ValidationRecord {
            venue_id: result.venue_id,
            user_id: result.user_id,
            status: decision.status,
            score: decision.score,
            reason: decision.reason.clone(),
            breakdown: decision.breakdown.clone(),
            enrichment: result.enrichment.clone(),
            created_at_ms: now_ms(),
        }),
        _ => result.enrichment.as_ref().map(|payload| ValidationRecord {
            venue_id: result.venue_id,
            user_id: result.user_id,
            status: DecisionStatus::ManualReview,
            score: 0,
            reason: result
                .error
                .as_ref()
                .map_or_else(|| "processing failed".to_string(), ToString::to_string),
            breakdown: std::collections::BTreeMap::new(),
            enrichment: Some(payload.clone()),
            created_at_ms: now_ms(),
        }),
    }
}

fn persistence(err: anyhow::Error) -> EngineError {
    EngineError::Persistence(format!("{err:#}"))
}

/// Spawn the result-handler thread. It runs until every result sender is
/// dropped.
pub(crate) fn spawn_result_handler(
    handler: Arc<ResultHandler>,
    results: Receiver<JobResult>,
    counters: Arc<StatsCounters>,
    result_pool: Arc<ObjectPool<JobResult>>,
    stack_size: usize,
) -> Result<JoinHandle<()>, EngineError> {
    thread::Builder::new()
        .name("venue-results".into())
        .stack_size(stack_size)
        .spawn(move || {
            let rt = match tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
            {
                Ok(rt) => rt,
                Err(e) => {
                    error!(error = %e, "Failed to create result handler runtime");
                    return;
                }
            };
            for result in &results {
                match rt.block_on(handler.handle(&result)) {
                    Ok(_) => {
                        counters.persisted.fetch_add(1, Ordering::Relaxed);
                    }
                    Err(e) => {
                        counters.persist_failures.fetch_add(1, Ordering::Relaxed);
                        error!(venue_id = result.venue_id, error = %e, "Failed to persist result");
                    }
                }
                result_pool.release(result);
            }
            info!("Result handler drained, exiting");
        })
        .map_err(|e| EngineError::InvalidConfig(format!("failed to spawn result handler: {e}")))
}
