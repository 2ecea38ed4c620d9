//! Engine-owned object recycling for jobs and results.
//!
//! Pure allocation amortization: with recycling disabled the pool hands out
//! fresh defaults and drops released objects, and the engine behaves the same.

use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;

use crate::core::{Job, JobResult};

/// Types that can be reset to a reusable blank state.
pub trait Recycle: Default + Send {
    /// Return to the blank `Default` state so no per-use data leaks into
    /// the next acquisition.
    fn reset(&mut self);
}

impl Recycle for Job {
    fn reset(&mut self) {
        *self = Self::default();
    }
}

impl Recycle for JobResult {
    fn reset(&mut self) {
        *self = Self::default();
    }
}

/// Bounded free-list of reusable objects.
pub struct ObjectPool<T: Recycle> {
    enabled: bool,
    max_idle: usize,
    idle: Mutex<Vec<T>>,
    reused: AtomicU64,
}

impl<T: Recycle> ObjectPool<T> {
    /// Create a pool. A disabled pool always allocates.
    #[must_use]
    pub fn new(enabled: bool, max_idle: usize) -> Self {
        Self {
            enabled,
            max_idle,
            idle: Mutex::new(Vec::new()),
            reused: AtomicU64::new(0),
        }
    }

    /// Take a blank object.
    pub fn acquire(&self) -> T {
        if self.enabled {
            if let Some(obj) = self.idle.lock().pop() {
                self.reused.fetch_add(1, Ordering::Relaxed);
                return obj;
            }
        }
        T::default()
    }

    /// Return an object for reuse.
    pub fn release(&self, mut obj: T) {
        if !self.enabled {
            return;
        }
        obj.reset();
        let mut idle = self.idle.lock();
        if idle.len() < self.max_idle {
            idle.push(obj);
        }
    }

    /// Number of acquisitions served from the free list.
    pub fn reused(&self) -> u64 {
        self.reused.load(Ordering::Relaxed)
    }

    /// Objects currently idle.
    pub fn idle(&self) -> usize {
        self.idle.lock().len()
    }
}
