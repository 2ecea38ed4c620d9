//! Token-bucket admission gate for one external dependency.
//!
//! Tokens are semaphore permits. A dedicated refill thread adds one permit per
//! interval unless the bucket is already full, so a stalled consumer can never
//! cause tokens to accumulate past capacity.

use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{bounded, select, tick, Sender};
use parking_lot::Mutex;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::core::EngineError;

/// Token bucket with lossy periodic refill.
pub struct RateLimiter {
    name: String,
    capacity: usize,
    interval: Duration,
    tokens: Arc<Semaphore>,
    refill: Mutex<Option<(Sender<()>, JoinHandle<()>)>>,
}

impl RateLimiter {
    /// Create a limiter allowing `rate` admissions per `per`, with bursts up
    /// to `burst`. Both are coerced to at least 1. The bucket starts full.
    #[must_use]
    pub fn new(name: impl Into<String>, rate: u32, per: Duration, burst: u32) -> Self {
        let rate = rate.max(1);
        let capacity = burst.max(1) as usize;
        let interval = (per / rate).max(Duration::from_millis(1));
        Self {
            name: name.into(),
            capacity,
            interval,
            tokens: Arc::new(Semaphore::new(capacity)),
            refill: Mutex::new(None),
        }
    }

    /// Limiter name used in logs.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Maximum burst size.
    #[must_use]
    pub const fn capacity(&self) -> usize {
        self.capacity
    }

    /// Time between refill ticks.
    #[must_use]
    pub const fn interval(&self) -> Duration {
        self.interval
    }

    /// Tokens currently available.
    #[must_use]
    pub fn available(&self) -> usize {
        self.tokens.available_permits()
    }

    /// Start the refill ticker. Calling it on a running limiter is a no-op.
    ///
    /// # Errors
    ///
    /// Returns `EngineError::InvalidConfig` if the refill thread cannot be spawned.
    pub fn start(&self) -> Result<(), EngineError> {
        let mut refill = self.refill.lock();
        if refill.is_some() {
            return Ok(());
        }

        let (stop_tx, stop_rx) = bounded::<()>(0);
        let tokens = Arc::clone(&self.tokens);
        let capacity = self.capacity;
        let ticker = tick(self.interval);

        let handle = thread::Builder::new()
            .name(format!("rl-{}", self.name))
            .spawn(move || loop {
                select! {
                    recv(ticker) -> _ => {
                        // Only this thread adds permits, so check-then-add cannot overfill.
                        if tokens.available_permits() < capacity {
                            tokens.add_permits(1);
                        }
                    }
                    recv(stop_rx) -> _ => break,
                }
            })
            .map_err(|e| EngineError::InvalidConfig(format!("spawn refill thread: {e}")))?;

        debug!(limiter = %self.name, interval_ms = self.interval.as_millis(), capacity, "Rate limiter started");
        *refill = Some((stop_tx, handle));
        Ok(())
    }

    /// Stop refilling. Idempotent.
    pub fn stop(&self) {
        let Some((stop_tx, handle)) = self.refill.lock().take() else {
            return;
        };
        // Dropping the sender disconnects `stop_rx` and ends the loop.
        drop(stop_tx);
        if handle.join().is_err() {
            warn!(limiter = %self.name, "Refill thread panicked");
        }
        debug!(limiter = %self.name, "Rate limiter stopped");
    }

    /// Wait for a token or until `cancel` fires.
    ///
    /// # Errors
    ///
    /// Returns `EngineError::Cancelled` if cancelled first.
    pub async fn wait(&self, cancel: &CancellationToken) -> Result<(), EngineError> {
        tokio::select! {
            biased;
            () = cancel.cancelled() => Err(EngineError::Cancelled),
            permit = self.tokens.acquire() => match permit {
                Ok(permit) => {
                    permit.forget();
                    Ok(())
                }
                Err(_) => Err(EngineError::Cancelled),
            },
        }
    }

    /// Take a token without waiting. Returns false if the bucket is empty.
    pub fn try_acquire(&self) -> bool {
        match self.tokens.try_acquire() {
            Ok(permit) => {
                permit.forget();
                true
            }
            Err(_) => false,
        }
    }
}

impl Drop for RateLimiter {
    fn drop(&mut self) {
        self.stop();
    }
}
