//! Engine, retry and rate-limit configuration structures.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Retry behavior for the enrichment + scoring step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Additional attempts after the first one.
    pub max_retries: u32,
    /// Base backoff delay in milliseconds; attempt `n` waits `n² × base`.
    pub base_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay_ms: 1_000,
        }
    }
}

impl RetryConfig {
    /// Base delay as a `Duration`.
    #[must_use]
    pub const fn base_delay(&self) -> Duration {
        Duration::from_millis(self.base_delay_ms)
    }
}

/// Token-bucket settings for one external dependency.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitConfig {
    /// Admissions allowed per `per_ms`.
    pub rate: u32,
    /// Window in milliseconds.
    pub per_ms: u64,
    /// Burst capacity.
    pub burst: u32,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            rate: 10,
            per_ms: 1_000,
            burst: 10,
        }
    }
}

impl RateLimitConfig {
    /// Create a limit of `rate` per `per` with the given burst.
    #[must_use]
    pub fn new(rate: u32, per: Duration, burst: u32) -> Self {
        Self {
            rate,
            per_ms: u64::try_from(per.as_millis()).unwrap_or(u64::MAX),
            burst,
        }
    }

    /// Window as a `Duration`.
    #[must_use]
    pub const fn per(&self) -> Duration {
        Duration::from_millis(self.per_ms)
    }
}

/// Settings that can be changed while the engine runs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuntimeSettings {
    /// Number of workers.
    pub worker_count: usize,
    /// Minimum score for an approval to stick.
    pub approval_threshold: i32,
    /// Minimum ambassador points; 0 disables the check.
    pub min_points: u32,
    /// Only ambassadors and venue admins/owners get automated review.
    pub ambassador_only: bool,
}

/// Engine configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Initial worker count.
    pub worker_count: usize,
    /// Bounded job queue capacity.
    pub queue_capacity: usize,
    /// Bounded result channel capacity.
    pub result_capacity: usize,
    /// Per-job timeout in milliseconds.
    pub job_timeout_ms: u64,
    /// Retry behavior.
    pub retry: RetryConfig,
    /// Enrichment dependency rate limit.
    pub enrichment_limit: RateLimitConfig,
    /// Scoring dependency rate limit.
    pub scoring_limit: RateLimitConfig,
    /// Minimum ambassador points; 0 disables the check.
    pub min_points: u32,
    /// Only ambassadors and venue admins/owners get automated review.
    pub ambassador_only: bool,
    /// Minimum score for an approval to stick.
    pub approval_threshold: i32,
    /// Persist validation history only, never touch venue status.
    pub score_only: bool,
    /// Countries that always require a human.
    pub restricted_regions: Vec<String>,
    /// Radius for duplicate detection, in meters.
    pub duplicate_radius_m: f64,
    /// Name similarity at or above which a nearby venue is a duplicate.
    pub duplicate_similarity: f64,
    /// Recycle job/result objects instead of allocating per job.
    pub object_pooling: bool,
    /// Stack size for worker threads, in bytes.
    pub thread_stack_size: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            worker_count: num_cpus::get(),
            queue_capacity: 1_000,
            result_capacity: 100,
            job_timeout_ms: 120_000,
            retry: RetryConfig::default(),
            enrichment_limit: RateLimitConfig::default(),
            scoring_limit: RateLimitConfig::new(5, Duration::from_secs(1), 5),
            min_points: 0,
            ambassador_only: false,
            approval_threshold: 75,
            score_only: false,
            restricted_regions: Vec::new(),
            duplicate_radius_m: 500.0,
            duplicate_similarity: 0.70,
            object_pooling: false,
            thread_stack_size: 2 * 1024 * 1024,
        }
    }
}

impl EngineConfig {
    /// Create a configuration with defaults.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the worker count.
    #[must_use]
    pub fn with_worker_count(mut self, worker_count: usize) -> Self {
        self.worker_count = worker_count;
        self
    }

    /// Set the job queue capacity.
    #[must_use]
    pub fn with_queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = capacity;
        self
    }

    /// Set the result channel capacity.
    #[must_use]
    pub fn with_result_capacity(mut self, capacity: usize) -> Self {
        self.result_capacity = capacity;
        self
    }

    /// Set the per-job timeout.
    #[must_use]
    pub fn with_job_timeout(mut self, timeout: Duration) -> Self {
        self.job_timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
        self
    }

    /// Set retry count and base delay.
    #[must_use]
    pub fn with_retry(mut self, max_retries: u32, base_delay: Duration) -> Self {
        self.retry = RetryConfig {
            max_retries,
            base_delay_ms: u64::try_from(base_delay.as_millis()).unwrap_or(u64::MAX),
        };
        self
    }

    /// Set the enrichment rate limit.
    #[must_use]
    pub fn with_enrichment_limit(mut self, limit: RateLimitConfig) -> Self {
        self.enrichment_limit = limit;
        self
    }

    /// Set the scoring rate limit.
    #[must_use]
    pub fn with_scoring_limit(mut self, limit: RateLimitConfig) -> Self {
        self.scoring_limit = limit;
        self
    }

    /// Set the minimum ambassador points.
    #[must_use]
    pub fn with_min_points(mut self, min_points: u32) -> Self {
        self.min_points = min_points;
        self
    }

    /// Enable or disable ambassador-only mode.
    #[must_use]
    pub fn with_ambassador_only(mut self, enabled: bool) -> Self {
        self.ambassador_only = enabled;
        self
    }

    /// Set the approval threshold.
    #[must_use]
    pub fn with_approval_threshold(mut self, threshold: i32) -> Self {
        self.approval_threshold = threshold;
        self
    }

    /// Enable or disable score-only mode.
    #[must_use]
    pub fn with_score_only(mut self, enabled: bool) -> Self {
        self.score_only = enabled;
        self
    }

    /// Set the restricted regions.
    #[must_use]
    pub fn with_restricted_regions<I, S>(mut self, regions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.restricted_regions = regions.into_iter().map(Into::into).collect();
        self
    }

    /// Enable or disable job/result recycling.
    #[must_use]
    pub fn with_object_pooling(mut self, enabled: bool) -> Self {
        self.object_pooling = enabled;
        self
    }

    /// Per-job timeout as a `Duration`.
    #[must_use]
    pub const fn job_timeout(&self) -> Duration {
        Duration::from_millis(self.job_timeout_ms)
    }

    /// The runtime-mutable subset.
    #[must_use]
    pub const fn runtime_settings(&self) -> RuntimeSettings {
        RuntimeSettings {
            worker_count: self.worker_count,
            approval_threshold: self.approval_threshold,
            min_points: self.min_points,
            ambassador_only: self.ambassador_only,
        }
    }

    /// Validate configuration values.
    ///
    /// # Errors
    ///
    /// Returns a description of the first invalid field.
    pub fn validate(&self) -> Result<(), String> {
        if self.worker_count == 0 {
            return Err("worker_count must be greater than 0".into());
        }
        if self.queue_capacity == 0 {
            return Err("queue_capacity must be greater than 0".into());
        }
        if self.result_capacity == 0 {
            return Err("result_capacity must be greater than 0".into());
        }
        if self.job_timeout_ms == 0 {
            return Err("job_timeout_ms must be greater than 0".into());
        }
        if !(0..=100).contains(&self.approval_threshold) {
            return Err("approval_threshold must be within 0..=100".into());
        }
        if !(self.duplicate_radius_m > 0.0) {
            return Err("duplicate_radius_m must be greater than 0".into());
        }
        if !(0.0..=1.0).contains(&self.duplicate_similarity) {
            return Err("duplicate_similarity must be within 0.0..=1.0".into());
        }
        Ok(())
    }

    /// Parse configuration from a JSON string and validate.
    ///
    /// # Errors
    ///
    /// Returns a description of the parse or validation failure.
    pub fn from_json_str(input: &str) -> Result<Self, String> {
        let cfg: Self = serde_json::from_str(input).map_err(|e| format!("parse error: {e}"))?;
        cfg.validate()?;
        Ok(cfg)
    }
}
