//! Configuration models for the engine, retries and rate limits.

pub mod engine;

pub use engine::{EngineConfig, RateLimitConfig, RetryConfig, RuntimeSettings};
