//! Engine facade: lifecycle, enqueue, runtime configuration and stats.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender, TrySendError};
use parking_lot::{Mutex, RwLock};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::{EngineConfig, RuntimeSettings};
use crate::core::pipeline::{Collaborators, Pipeline};
use crate::core::rate_limiter::RateLimiter;
use crate::core::recycle::ObjectPool;
use crate::core::result_handler::{spawn_result_handler, ResultHandler};
use crate::core::worker_pool::{
    DrainingWorkers, EngineStats, StatsCounters, WorkerContext, WorkerRegistry,
};
use crate::core::{EngineError, Job, JobResult, Submission};
use crate::util::clock::now_ms;

/// Idle objects kept per recycle pool.
const MAX_IDLE_OBJECTS: usize = 256;

/// The moderation engine.
///
/// Owns both rate limiters, the worker registry, the result handler thread
/// and every counter; nothing is process-global, so independent engines can
/// coexist in one process.
pub struct Engine {
    config: EngineConfig,
    pipeline: Arc<Pipeline>,
    handler: Arc<ResultHandler>,
    enrich_limiter: Arc<RateLimiter>,
    score_limiter: Arc<RateLimiter>,
    settings: Arc<RwLock<RuntimeSettings>>,
    score_only: Arc<AtomicBool>,
    counters: Arc<StatsCounters>,
    job_pool: Arc<ObjectPool<Job>>,
    result_pool: Arc<ObjectPool<JobResult>>,
    cancel: CancellationToken,
    started: AtomicBool,
    shutting_down: Arc<AtomicBool>,
    job_tx: Mutex<Option<Sender<Job>>>,
    job_rx: Mutex<Option<Receiver<Job>>>,
    result_tx: Mutex<Option<Sender<JobResult>>>,
    result_rx: Mutex<Option<Receiver<JobResult>>>,
    handler_thread: Mutex<Option<JoinHandle<()>>>,
    workers: Mutex<WorkerRegistry>,
    stop_outcome: Mutex<Option<Result<(), EngineError>>>,
}

impl Engine {
    /// Create an engine. Nothing runs until [`Engine::start`].
    ///
    /// # Errors
    ///
    /// Returns `EngineError::InvalidConfig` if `config` fails validation.
    pub fn new(config: EngineConfig, collaborators: Collaborators) -> Result<Self, EngineError> {
        config.validate().map_err(EngineError::InvalidConfig)?;

        let enrich_limiter = Arc::new(RateLimiter::new(
            "enrichment",
            config.enrichment_limit.rate,
            config.enrichment_limit.per(),
            config.enrichment_limit.burst,
        ));
        let score_limiter = Arc::new(RateLimiter::new(
            "scoring",
            config.scoring_limit.rate,
            config.scoring_limit.per(),
            config.scoring_limit.burst,
        ));
        let settings = Arc::new(RwLock::new(config.runtime_settings()));
        let score_only = Arc::new(AtomicBool::new(config.score_only));

        let handler = Arc::new(ResultHandler::new(
            Arc::clone(&collaborators.repository),
            Arc::clone(&settings),
            Arc::clone(&score_only),
        ));
        let pipeline = Arc::new(Pipeline::new(
            &config,
            collaborators,
            Arc::clone(&enrich_limiter),
            Arc::clone(&score_limiter),
            Arc::clone(&settings),
        ));
        pipeline.propagate_settings(&settings.read());

        let (job_tx, job_rx) = bounded::<Job>(config.queue_capacity);
        let (result_tx, result_rx) = bounded::<JobResult>(config.result_capacity);

        Ok(Self {
            job_pool: Arc::new(ObjectPool::new(config.object_pooling, MAX_IDLE_OBJECTS)),
            result_pool: Arc::new(ObjectPool::new(config.object_pooling, MAX_IDLE_OBJECTS)),
            config,
            pipeline,
            handler,
            enrich_limiter,
            score_limiter,
            settings,
            score_only,
            counters: Arc::new(StatsCounters::default()),
            cancel: CancellationToken::new(),
            started: AtomicBool::new(false),
            shutting_down: Arc::new(AtomicBool::new(false)),
            job_tx: Mutex::new(Some(job_tx)),
            job_rx: Mutex::new(Some(job_rx)),
            result_tx: Mutex::new(Some(result_tx)),
            result_rx: Mutex::new(Some(result_rx)),
            handler_thread: Mutex::new(None),
            workers: Mutex::new(WorkerRegistry::new()),
            stop_outcome: Mutex::new(None),
        })
    }

    /// Start the rate limiters, the result handler and the workers.
    ///
    /// # Errors
    ///
    /// - `EngineError::AlreadyStarted` on a second call
    /// - `EngineError::ShuttingDown` after `stop`
    /// - `EngineError::InvalidConfig` if a thread cannot be spawned
    pub fn start(&self) -> Result<(), EngineError> {
        if self.shutting_down.load(Ordering::Acquire) {
            return Err(EngineError::ShuttingDown);
        }
        if self
            .started
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(EngineError::AlreadyStarted);
        }

        self.enrich_limiter.start()?;
        self.score_limiter.start()?;

        let (Some(jobs), Some(results_rx), Some(results_tx)) = (
            self.job_rx.lock().take(),
            self.result_rx.lock().take(),
            self.result_tx.lock().clone(),
        ) else {
            return Err(EngineError::ShuttingDown);
        };

        let handle = spawn_result_handler(
            Arc::clone(&self.handler),
            results_rx,
            Arc::clone(&self.counters),
            Arc::clone(&self.result_pool),
            self.config.thread_stack_size,
        )?;
        *self.handler_thread.lock() = Some(handle);

        let worker_count = self.settings.read().worker_count;
        let mut registry = self.workers.lock();
        registry.install(WorkerContext {
            jobs,
            results: results_tx,
            pipeline: Arc::clone(&self.pipeline),
            counters: Arc::clone(&self.counters),
            job_pool: Arc::clone(&self.job_pool),
            result_pool: Arc::clone(&self.result_pool),
            cancel: self.cancel.clone(),
            shutting_down: Arc::clone(&self.shutting_down),
            stack_size: self.config.thread_stack_size,
        });
        registry.resize(worker_count)?;

        info!(
            workers = worker_count,
            queue_capacity = self.config.queue_capacity,
            score_only = self.score_only.load(Ordering::Relaxed),
            "Engine started"
        );
        Ok(())
    }

    /// Stop the engine, waiting up to `timeout` for workers to drain.
    ///
    /// Idempotent: concurrent and repeated calls all observe the outcome of
    /// the first. Workers drain the closed queue, counting every job that
    /// never started as discarded; in-flight jobs abort at their next
    /// suspension point and their results are discarded too.
    ///
    /// # Errors
    ///
    /// Returns `EngineError::StopTimeout` if the workers or the result
    /// handler did not finish in time. The engine is stopped either way.
    pub fn stop(&self, timeout: Duration) -> Result<(), EngineError> {
        let mut outcome = self.stop_outcome.lock();
        if let Some(previous) = outcome.as_ref() {
            return previous.clone();
        }

        info!(timeout_ms = timeout.as_millis(), "Stopping engine");
        self.shutting_down.store(true, Ordering::Release);
        self.cancel.cancel();
        drop(self.job_tx.lock().take());

        let workers = self.workers.lock().take_all();
        drop(self.result_tx.lock().take());
        drop(self.result_rx.lock().take());
        let handler = self.handler_thread.lock().take();

        let result = join_within(workers, handler, timeout);
        self.enrich_limiter.stop();
        self.score_limiter.stop();

        match &result {
            Ok(()) => info!("Engine stopped"),
            Err(e) => warn!(error = %e, "Engine stopped with errors"),
        }
        *outcome = Some(result.clone());
        result
    }

    /// Enqueue a batch without blocking.
    ///
    /// Returns the number enqueued, which is the whole batch on success.
    ///
    /// # Errors
    ///
    /// - `EngineError::NotRunning` before `start`
    /// - `EngineError::ShuttingDown` once `stop` has begun
    /// - `EngineError::QueueFull` when the queue fills, carrying how many
    ///   entries of the batch were accepted first
    pub fn enqueue(&self, batch: Vec<Submission>) -> Result<usize, EngineError> {
        if self.shutting_down.load(Ordering::Acquire) {
            return Err(EngineError::ShuttingDown);
        }
        if !self.started.load(Ordering::Acquire) {
            return Err(EngineError::NotRunning);
        }

        let guard = self.job_tx.lock();
        let Some(tx) = guard.as_ref() else {
            return Err(EngineError::ShuttingDown);
        };

        let mut accepted = 0;
        for submission in batch {
            let job = self.make_job(submission);
            self.counters.queued.fetch_add(1, Ordering::Relaxed);
            match tx.try_send(job) {
                Ok(()) => {
                    accepted += 1;
                    self.counters.submitted.fetch_add(1, Ordering::Relaxed);
                }
                Err(TrySendError::Full(job)) => {
                    self.counters.queued.fetch_sub(1, Ordering::Relaxed);
                    self.job_pool.release(job);
                    warn!(accepted, "Job queue is full");
                    return Err(EngineError::QueueFull { accepted });
                }
                Err(TrySendError::Disconnected(job)) => {
                    self.counters.queued.fetch_sub(1, Ordering::Relaxed);
                    self.job_pool.release(job);
                    return Err(EngineError::ShuttingDown);
                }
            }
        }
        debug!(accepted, "Batch enqueued");
        Ok(accepted)
    }

    /// Process one submission on the caller's task and persist it.
    ///
    /// # Errors
    ///
    /// - `EngineError::NotRunning` / `EngineError::ShuttingDown` outside the
    ///   running state
    /// - the job's own error when the pipeline failed (after persisting the
    ///   forced manual review)
    /// - `EngineError::Persistence` when persistence failed
    /// - `EngineError::Cancelled` when the engine stopped mid-job; nothing
    ///   is persisted then
    pub async fn process_now(&self, submission: Submission) -> Result<JobResult, EngineError> {
        if self.shutting_down.load(Ordering::Acquire) {
            return Err(EngineError::ShuttingDown);
        }
        if !self.started.load(Ordering::Acquire) {
            return Err(EngineError::NotRunning);
        }

        let job = self.make_job(submission);
        self.counters.submitted.fetch_add(1, Ordering::Relaxed);
        let result = self.pipeline.process(&job, &self.cancel).await;
        self.job_pool.release(job);
        if result.was_cancelled() {
            self.counters.discarded.fetch_add(1, Ordering::Relaxed);
            return Err(EngineError::Cancelled);
        }
        self.counters.record(&result);

        if let Err(e) = self.handler.handle(&result).await {
            self.counters.persist_failures.fetch_add(1, Ordering::Relaxed);
            return Err(e);
        }
        self.counters.persisted.fetch_add(1, Ordering::Relaxed);

        match &result.error {
            Some(e) if !result.success => Err(e.clone()),
            _ => Ok(result),
        }
    }

    /// Toggle score-only mode.
    pub fn set_score_only_mode(&self, enabled: bool) {
        self.score_only.store(enabled, Ordering::Release);
        info!(enabled, "Score-only mode updated");
    }

    /// Whether score-only mode is active.
    #[must_use]
    pub fn score_only_mode(&self) -> bool {
        self.score_only.load(Ordering::Acquire)
    }

    /// Change the worker count and approval threshold, and forward the new
    /// settings to every collaborator.
    ///
    /// # Errors
    ///
    /// Returns `EngineError::InvalidConfig` for a zero worker count or an
    /// out-of-range threshold.
    pub fn apply_runtime_config(
        &self,
        worker_count: usize,
        approval_threshold: i32,
    ) -> Result<(), EngineError> {
        if worker_count == 0 {
            return Err(EngineError::InvalidConfig("worker_count must be greater than 0".into()));
        }
        if !(0..=100).contains(&approval_threshold) {
            return Err(EngineError::InvalidConfig(
                "approval_threshold must be within 0..=100".into(),
            ));
        }
        let snapshot = {
            let mut settings = self.settings.write();
            settings.worker_count = worker_count;
            settings.approval_threshold = approval_threshold;
            settings.clone()
        };
        self.pipeline.propagate_settings(&snapshot);
        info!(worker_count, approval_threshold, "Runtime configuration applied");

        if self.is_running() {
            self.workers.lock().resize(worker_count)?;
        }
        Ok(())
    }

    /// Change the admission thresholds used by the early-exit policy.
    pub fn set_admission_thresholds(&self, min_points: u32, ambassador_only: bool) {
        let snapshot = {
            let mut settings = self.settings.write();
            settings.min_points = min_points;
            settings.ambassador_only = ambassador_only;
            settings.clone()
        };
        self.pipeline.propagate_settings(&snapshot);
        info!(min_points, ambassador_only, "Admission thresholds updated");
    }

    /// Resize the worker pool without interrupting in-flight jobs.
    ///
    /// # Errors
    ///
    /// - `EngineError::InvalidConfig` for zero workers
    /// - `EngineError::NotRunning` outside the running state
    pub fn resize(&self, worker_count: usize) -> Result<(), EngineError> {
        if worker_count == 0 {
            return Err(EngineError::InvalidConfig("worker_count must be greater than 0".into()));
        }
        if !self.is_running() {
            return Err(EngineError::NotRunning);
        }
        self.workers.lock().resize(worker_count)?;
        self.settings.write().worker_count = worker_count;
        Ok(())
    }

    /// Current runtime settings.
    #[must_use]
    pub fn runtime_settings(&self) -> RuntimeSettings {
        self.settings.read().clone()
    }

    /// Statistics snapshot.
    #[must_use]
    pub fn stats(&self) -> EngineStats {
        let worker_count = self.workers.lock().len();
        let recycled = self.job_pool.reused() + self.result_pool.reused();
        self.counters.snapshot(
            worker_count,
            self.score_only.load(Ordering::Relaxed),
            self.pipeline.collaborators().scorer.usage(),
            recycled,
        )
    }

    /// True between a successful `start` and `stop`.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.started.load(Ordering::Acquire) && !self.shutting_down.load(Ordering::Acquire)
    }

    /// The configuration the engine was built with.
    #[must_use]
    pub const fn config(&self) -> &EngineConfig {
        &self.config
    }

    fn make_job(&self, submission: Submission) -> Job {
        let mut job = self.job_pool.acquire();
        job.priority = submission.priority();
        job.submission = submission;
        job.retries = 0;
        job.enqueued_at_ms = now_ms();
        job
    }
}

impl Drop for Engine {
    fn drop(&mut self) {
        if self.stop_outcome.lock().is_some() {
            return;
        }
        // Signal only; joining here could block an async caller.
        self.shutting_down.store(true, Ordering::Release);
        self.cancel.cancel();
        drop(self.job_tx.lock().take());
        drop(self.workers.lock().take_all());
        drop(self.result_tx.lock().take());
        self.enrich_limiter.stop();
        self.score_limiter.stop();
    }
}

/// Join workers, then the result handler, on a helper thread so a wedged
/// worker cannot hang the caller past `timeout`.
fn join_within(
    workers: DrainingWorkers,
    handler: Option<JoinHandle<()>>,
    timeout: Duration,
) -> Result<(), EngineError> {
    let (done_tx, done_rx) = bounded::<()>(1);
    let joiner = thread::Builder::new()
        .name("venue-engine-stop".into())
        .spawn(move || {
            workers.join();
            if let Some(handler) = handler {
                if handler.join().is_err() {
                    warn!("Result handler thread panicked");
                }
            }
            let _ = done_tx.send(());
        })
        .map_err(|e| EngineError::InvalidConfig(format!("failed to spawn stop joiner: {e}")))?;

    match done_rx.recv_timeout(timeout) {
        Ok(()) => {
            let _ = joiner.join();
            Ok(())
        }
        Err(RecvTimeoutError::Timeout) => Err(EngineError::StopTimeout(timeout)),
        Err(RecvTimeoutError::Disconnected) => {
            let _ = joiner.join();
            Ok(())
        }
    }
}
