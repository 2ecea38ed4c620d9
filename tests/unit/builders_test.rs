//! Tests for builder modules

use std::sync::Arc;

use async_trait::async_trait;
use venue_moderation::builders::EngineBuilder;
use venue_moderation::config::EngineConfig;
use venue_moderation::core::{
    AppResult, Decision, DecisionStatus, EngineError, EnrichedVenue, Enricher, Scorer,
    ScorerUsage, Submitter, TrustAssessment, TrustAssessor, Venue,
};
use venue_moderation::infra::InMemoryVenueStore;

struct Echo;

#[async_trait]
impl Enricher for Echo {
    async fn enrich(&self, venue: &Venue) -> AppResult<EnrichedVenue> {
        Ok(EnrichedVenue {
            venue: venue.clone(),
            payload: None,
        })
    }
}

#[async_trait]
impl Scorer for Echo {
    async fn score(&self, _venue: &EnrichedVenue, _user: &Submitter) -> AppResult<Decision> {
        Ok(Decision::new(DecisionStatus::ManualReview, 50, "neutral"))
    }

    fn usage(&self) -> ScorerUsage {
        ScorerUsage::default()
    }
}

#[async_trait]
impl TrustAssessor for Echo {
    async fn assess(&self, _user: &Submitter, _location: &str) -> Option<TrustAssessment> {
        None
    }
}

#[test]
fn test_engine_builder_requires_collaborators() {
    let err = EngineBuilder::new(EngineConfig::new()).build().err().unwrap();
    assert!(matches!(err, EngineError::InvalidConfig(msg) if msg.contains("enricher")));

    let err = EngineBuilder::new(EngineConfig::new())
        .enricher(Arc::new(Echo))
        .scorer(Arc::new(Echo))
        .trust_assessor(Arc::new(Echo))
        .build()
        .err()
        .unwrap();
    assert!(matches!(err, EngineError::InvalidConfig(msg) if msg.contains("repository")));
}

#[test]
fn test_engine_builder_rejects_invalid_config() {
    let err = EngineBuilder::new(EngineConfig::new().with_worker_count(0))
        .enricher(Arc::new(Echo))
        .scorer(Arc::new(Echo))
        .trust_assessor(Arc::new(Echo))
        .repository(Arc::new(InMemoryVenueStore::new()))
        .build()
        .err()
        .unwrap();
    assert!(matches!(err, EngineError::InvalidConfig(_)));
}

#[test]
fn test_engine_builder_defaults() {
    let builder = EngineBuilder::new(EngineConfig::new().with_worker_count(3));
    assert_eq!(builder.config().worker_count, 3);

    let engine = builder
        .enricher(Arc::new(Echo))
        .scorer(Arc::new(Echo))
        .trust_assessor(Arc::new(Echo))
        .repository(Arc::new(InMemoryVenueStore::new()))
        .build()
        .unwrap();
    assert!(!engine.is_running());
    assert_eq!(engine.stats().worker_count, 0);
    assert_eq!(engine.runtime_settings().worker_count, 3);
}
