//! Elastic pool of pipeline workers.
//!
//! Each worker is a dedicated OS thread with its own single-threaded tokio
//! runtime, pulling jobs from the shared bounded queue and pushing results
//! onto the bounded result channel.
//!
//! # Lock domains
//!
//! - The [`WorkerRegistry`] (handles and per-worker stop signals) lives
//!   behind the engine's registry mutex and is only touched by
//!   start/resize/stop.
//! - Hot counters in [`StatsCounters`] are atomics; compound figures
//!   (latency totals, per-reason and per-status tallies) sit behind their
//!   own mutex so snapshot reads never contend with configuration reads.

mod worker;

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use crossbeam_channel::{bounded, Receiver, Sender};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::core::pipeline::Pipeline;
use crate::core::providers::ScorerUsage;
use crate::core::recycle::ObjectPool;
use crate::core::{DecisionStatus, EngineError, Job, JobResult};

pub(crate) use worker::spawn_worker;

/// Point-in-time engine statistics.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EngineStats {
    /// Workers currently registered.
    pub worker_count: usize,
    /// Workers currently processing a job.
    pub active_workers: u64,
    /// Jobs waiting in the queue.
    pub queue_size: u64,
    /// Jobs accepted (queued or processed synchronously).
    pub submitted: u64,
    /// Jobs that went through the pipeline.
    pub processed: u64,
    /// Jobs that produced a decision (early exits included).
    pub succeeded: u64,
    /// Jobs that failed.
    pub failed: u64,
    /// Jobs routed to manual review before any external call.
    pub early_exits: u64,
    /// Retries consumed across all jobs.
    pub retries: u64,
    /// Final approvals.
    pub approved: u64,
    /// Final rejections.
    pub rejected: u64,
    /// Results routed to manual review.
    pub manual_review: u64,
    /// Results persisted.
    pub persisted: u64,
    /// Results whose persistence failed.
    pub persist_failures: u64,
    /// Jobs or results dropped during shutdown.
    pub discarded: u64,
    /// Mean pipeline latency in milliseconds.
    pub avg_latency_ms: f64,
    /// Early exits keyed by reason code.
    pub early_exits_by_reason: BTreeMap<String, u64>,
    /// Scorer usage and cost.
    pub scorer_usage: ScorerUsage,
    /// Jobs and results served from the recycle pools.
    pub recycled_objects: u64,
    /// Whether score-only mode is active.
    pub score_only: bool,
}

#[derive(Debug, Default)]
struct CompoundStats {
    total_latency: Duration,
    by_reason: BTreeMap<String, u64>,
    approved: u64,
    rejected: u64,
    manual_review: u64,
}

/// Live counters shared by workers, the result handler and the engine.
#[derive(Debug, Default)]
pub struct StatsCounters {
    pub(crate) queued: AtomicU64,
    pub(crate) active: AtomicU64,
    pub(crate) submitted: AtomicU64,
    pub(crate) processed: AtomicU64,
    pub(crate) succeeded: AtomicU64,
    pub(crate) failed: AtomicU64,
    pub(crate) early_exits: AtomicU64,
    pub(crate) retries: AtomicU64,
    pub(crate) persisted: AtomicU64,
    pub(crate) persist_failures: AtomicU64,
    pub(crate) discarded: AtomicU64,
    compound: Mutex<CompoundStats>,
}

impl StatsCounters {
    /// Account for one processed result.
    pub fn record(&self, result: &JobResult) {
        self.processed.fetch_add(1, Ordering::Relaxed);
        if result.success {
            self.succeeded.fetch_add(1, Ordering::Relaxed);
        } else {
            self.failed.fetch_add(1, Ordering::Relaxed);
        }
        self.retries
            .fetch_add(u64::from(result.retries), Ordering::Relaxed);
        if result.early_exit.is_some() {
            self.early_exits.fetch_add(1, Ordering::Relaxed);
        }

        let mut compound = self.compound.lock();
        compound.total_latency += result.latency;
        if let Some(reason) = &result.early_exit {
            *compound.by_reason.entry(reason.code().to_string()).or_default() += 1;
        }
        match result.target_status() {
            DecisionStatus::Approved => compound.approved += 1,
            DecisionStatus::Rejected => compound.rejected += 1,
            DecisionStatus::ManualReview => compound.manual_review += 1,
        }
    }

    /// Snapshot the counters. Fields the counters do not own are passed in.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn snapshot(
        &self,
        worker_count: usize,
        score_only: bool,
        scorer_usage: ScorerUsage,
        recycled_objects: u64,
    ) -> EngineStats {
        let processed = self.processed.load(Ordering::Relaxed);
        let compound = self.compound.lock();
        let avg_latency_ms = if processed == 0 {
            0.0
        } else {
            compound.total_latency.as_secs_f64() * 1000.0 / processed as f64
        };
        EngineStats {
            worker_count,
            active_workers: self.active.load(Ordering::Relaxed),
            queue_size: self.queued.load(Ordering::Relaxed),
            submitted: self.submitted.load(Ordering::Relaxed),
            processed,
            succeeded: self.succeeded.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            early_exits: self.early_exits.load(Ordering::Relaxed),
            retries: self.retries.load(Ordering::Relaxed),
            approved: compound.approved,
            rejected: compound.rejected,
            manual_review: compound.manual_review,
            persisted: self.persisted.load(Ordering::Relaxed),
            persist_failures: self.persist_failures.load(Ordering::Relaxed),
            discarded: self.discarded.load(Ordering::Relaxed),
            avg_latency_ms,
            early_exits_by_reason: compound.by_reason.clone(),
            scorer_usage,
            recycled_objects,
            score_only,
        }
    }
}

/// Everything a worker thread needs, cloned into each one.
#[derive(Clone)]
pub(crate) struct WorkerContext {
    pub jobs: Receiver<Job>,
    pub results: Sender<JobResult>,
    pub pipeline: Arc<Pipeline>,
    pub counters: Arc<StatsCounters>,
    pub job_pool: Arc<ObjectPool<Job>>,
    pub result_pool: Arc<ObjectPool<JobResult>>,
    pub cancel: CancellationToken,
    pub shutting_down: Arc<AtomicBool>,
    pub stack_size: usize,
}

struct WorkerHandle {
    id: usize,
    /// Dropping this tells the worker to exit after its current job.
    stop: Sender<()>,
    handle: JoinHandle<()>,
}

/// Registry of live and retiring workers.
pub(crate) struct WorkerRegistry {
    context: Option<WorkerContext>,
    next_id: usize,
    active: Vec<WorkerHandle>,
    retired: Vec<JoinHandle<()>>,
}

impl WorkerRegistry {
    pub(crate) const fn new() -> Self {
        Self {
            context: None,
            next_id: 0,
            active: Vec::new(),
            retired: Vec::new(),
        }
    }

    /// Install the context new workers are spawned with.
    pub(crate) fn install(&mut self, context: WorkerContext) {
        self.context = Some(context);
    }

    /// Number of live workers.
    pub(crate) fn len(&self) -> usize {
        self.active.len()
    }

    /// Grow or shrink to `target` workers.
    ///
    /// Shrinking retires the newest workers; each finishes its current job
    /// before exiting.
    pub(crate) fn resize(&mut self, target: usize) -> Result<(), EngineError> {
        let Some(context) = self.context.clone() else {
            return Err(EngineError::NotRunning);
        };
        let before = self.active.len();
        while self.active.len() < target {
            let id = self.next_id;
            self.next_id += 1;
            let (stop, stop_rx) = bounded::<()>(0);
            let handle = spawn_worker(id, stop_rx, context.clone())?;
            self.active.push(WorkerHandle { id, stop, handle });
        }
        while self.active.len() > target {
            let Some(worker) = self.active.pop() else {
                break;
            };
            debug!(worker_id = worker.id, "Retiring worker");
            drop(worker.stop);
            self.retired.push(worker.handle);
        }
        self.retired.retain(|h| !h.is_finished());
        if before != target {
            info!(from = before, to = target, "Worker pool resized");
        }
        Ok(())
    }

    /// Hand back every worker for shutdown.
    ///
    /// Live workers keep their stop signals connected, so once the job
    /// queue closes each one drains what is left before exiting.
    pub(crate) fn take_all(&mut self) -> DrainingWorkers {
        self.context = None;
        let mut stops = Vec::with_capacity(self.active.len());
        let mut handles = Vec::with_capacity(self.active.len() + self.retired.len());
        for worker in self.active.drain(..) {
            stops.push(worker.stop);
            handles.push(worker.handle);
        }
        handles.append(&mut self.retired);
        DrainingWorkers { stops, handles }
    }
}

/// Workers handed back by [`WorkerRegistry::take_all`].
pub(crate) struct DrainingWorkers {
    stops: Vec<Sender<()>>,
    handles: Vec<JoinHandle<()>>,
}

impl DrainingWorkers {
    /// Wait for every worker thread, then release the stop signals.
    pub(crate) fn join(self) {
        for handle in self.handles {
            if handle.join().is_err() {
                warn!("Worker thread panicked");
            }
        }
        drop(self.stops);
    }
}
