//! # Venue Moderation
//!
//! A concurrent engine that decides whether crowd-submitted venue listings
//! are auto-approved, auto-rejected, or routed to a human moderator.
//!
//! Submissions are queued onto a bounded job queue and processed by a pool
//! of dedicated worker threads. Each job passes cheap local gate checks and
//! an admission policy before spending any budget on the two paid external
//! dependencies (enrichment, then scoring), each behind its own token-bucket
//! rate limiter. Decisions are persisted by a single result-handler thread
//! through a unit of work, so history and status commit or roll back
//! together.
//!
//! ## Key Features
//!
//! - **Early exit**: first-failing-predicate admission control (points,
//!   trust, venue type, ambassador mode) plus duplicate detection
//! - **Token buckets**: non-accumulating refill, cancellable waits
//! - **Bounded retries**: transient-only, `attempt² × base` backoff
//! - **Elastic workers**: live resize without interrupting in-flight jobs
//! - **Atomic persistence**: history first, then status, in one unit of work
//!
//! ## Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use std::time::Duration;
//! use venue_moderation::builders::EngineBuilder;
//! use venue_moderation::config::EngineConfig;
//! use venue_moderation::infra::InMemoryVenueStore;
//!
//! let engine = EngineBuilder::new(EngineConfig::new().with_worker_count(4))
//!     .enricher(Arc::new(my_enricher))
//!     .scorer(Arc::new(my_scorer))
//!     .trust_assessor(Arc::new(my_trust))
//!     .repository(Arc::new(InMemoryVenueStore::new()))
//!     .build()?;
//!
//! engine.start()?;
//! engine.enqueue(submissions)?;
//! println!("{:?}", engine.stats());
//! engine.stop(Duration::from_secs(30))?;
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

/// Core pipeline, workers and the engine facade.
pub mod core;
/// Engine configuration.
pub mod config;
/// Builders to assemble an engine.
pub mod builders;
/// Infrastructure adapters.
pub mod infra;
/// Shared utilities.
pub mod util;

pub use builders::EngineBuilder;
pub use config::EngineConfig;
pub use crate::core::{Engine, EngineError, EngineStats};
