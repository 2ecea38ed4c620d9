//! The worker thread loop.

use std::sync::atomic::Ordering;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{select, Receiver, SendTimeoutError};
use tracing::{debug, error};

use super::WorkerContext;
use crate::core::{EngineError, JobResult};

/// How long a blocked result send waits before re-checking for shutdown.
const RESULT_SEND_SLICE: Duration = Duration::from_millis(100);

/// Spawn worker `worker_id`. It exits when `stop` is signalled or dropped,
/// or when the job queue closes.
pub(crate) fn spawn_worker(
    worker_id: usize,
    stop: Receiver<()>,
    ctx: WorkerContext,
) -> Result<JoinHandle<()>, EngineError> {
    thread::Builder::new()
        .name(format!("venue-worker-{worker_id}"))
        .stack_size(ctx.stack_size)
        .spawn(move || run(worker_id, &stop, &ctx))
        .map_err(|e| EngineError::InvalidConfig(format!("failed to spawn worker {worker_id}: {e}")))
}

fn run(worker_id: usize, stop: &Receiver<()>, ctx: &WorkerContext) {
    debug!(worker_id, "Worker thread started");

    let rt = match tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
    {
        Ok(rt) => rt,
        Err(e) => {
            error!(worker_id, error = %e, "Failed to create worker runtime");
            return;
        }
    };

    loop {
        let job = select! {
            recv(stop) -> _ => {
                debug!(worker_id, "Worker stop signalled, exiting");
                break;
            }
            recv(ctx.jobs) -> msg => match msg {
                Ok(job) => job,
                Err(_) => {
                    debug!(worker_id, "Job queue closed, exiting");
                    break;
                }
            },
        };
        ctx.counters.queued.fetch_sub(1, Ordering::Relaxed);

        if ctx.shutting_down.load(Ordering::Acquire) {
            ctx.counters.discarded.fetch_add(1, Ordering::Relaxed);
            ctx.job_pool.release(job);
            continue;
        }

        ctx.counters.active.fetch_add(1, Ordering::Relaxed);
        let mut result = ctx.result_pool.acquire();
        rt.block_on(ctx.pipeline.process_into(&job, &ctx.cancel, &mut result));
        ctx.counters.active.fetch_sub(1, Ordering::Relaxed);
        ctx.job_pool.release(job);

        if ctx.shutting_down.load(Ordering::Acquire) || result.was_cancelled() {
            debug!(worker_id, venue_id = result.venue_id, "Discarding result of interrupted job");
            ctx.counters.discarded.fetch_add(1, Ordering::Relaxed);
            ctx.result_pool.release(result);
            continue;
        }

        ctx.counters.record(&result);
        debug!(
            worker_id,
            venue_id = result.venue_id,
            success = result.success,
            "Worker completed job"
        );

        deliver(worker_id, ctx, result);
    }

    debug!(worker_id, "Worker thread exiting");
}

/// Push a result to the handler, giving up once shutdown begins so a full
/// result channel can never wedge the worker.
fn deliver(worker_id: usize, ctx: &WorkerContext, mut result: JobResult) {
    loop {
        match ctx.results.send_timeout(result, RESULT_SEND_SLICE) {
            Ok(()) => return,
            Err(SendTimeoutError::Timeout(back)) => {
                if ctx.shutting_down.load(Ordering::Acquire) {
                    debug!(worker_id, venue_id = back.venue_id, "Discarding result during shutdown");
                    ctx.counters.discarded.fetch_add(1, Ordering::Relaxed);
                    ctx.result_pool.release(back);
                    return;
                }
                result = back;
            }
            Err(SendTimeoutError::Disconnected(back)) => {
                error!(worker_id, venue_id = back.venue_id, "Result channel closed, dropping result");
                ctx.counters.discarded.fetch_add(1, Ordering::Relaxed);
                ctx.result_pool.release(back);
                return;
            }
        }
    }
}
