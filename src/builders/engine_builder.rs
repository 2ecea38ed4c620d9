//! Builder for [`Engine`].

use std::sync::Arc;

use crate::config::EngineConfig;
use crate::core::audit::EventSink;
use crate::core::engine::Engine;
use crate::core::pipeline::Collaborators;
use crate::core::providers::{
    DecisionPolicy, Enricher, QualityReviewer, Scorer, ThresholdDecisionPolicy, TrustAssessor,
};
use crate::core::EngineError;
use crate::infra::store::VenueRepository;

/// Scores strictly below this are rejected by the default policy.
pub const DEFAULT_REJECT_BELOW: i32 = 30;

/// Assembles an [`Engine`].
///
/// Enricher, scorer, trust assessor and repository are required. The
/// decision policy defaults to [`ThresholdDecisionPolicy`] at the configured
/// approval threshold; the quality reviewer and event sink are optional.
pub struct EngineBuilder {
    config: EngineConfig,
    enricher: Option<Arc<dyn Enricher>>,
    scorer: Option<Arc<dyn Scorer>>,
    quality: Option<Arc<dyn QualityReviewer>>,
    policy: Option<Arc<dyn DecisionPolicy>>,
    trust: Option<Arc<dyn TrustAssessor>>,
    repository: Option<Arc<dyn VenueRepository>>,
    events: Option<Arc<dyn EventSink>>,
}

impl EngineBuilder {
    /// Start from a configuration.
    #[must_use]
    pub fn new(config: EngineConfig) -> Self {
        Self {
            config,
            enricher: None,
            scorer: None,
            quality: None,
            policy: None,
            trust: None,
            repository: None,
            events: None,
        }
    }

    /// The configuration being built.
    #[must_use]
    pub const fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Set the enrichment provider.
    #[must_use]
    pub fn enricher(mut self, enricher: Arc<dyn Enricher>) -> Self {
        self.enricher = Some(enricher);
        self
    }

    /// Set the scoring provider.
    #[must_use]
    pub fn scorer(mut self, scorer: Arc<dyn Scorer>) -> Self {
        self.scorer = Some(scorer);
        self
    }

    /// Set the optional quality reviewer.
    #[must_use]
    pub fn quality_reviewer(mut self, reviewer: Arc<dyn QualityReviewer>) -> Self {
        self.quality = Some(reviewer);
        self
    }

    /// Override the decision policy.
    #[must_use]
    pub fn decision_policy(mut self, policy: Arc<dyn DecisionPolicy>) -> Self {
        self.policy = Some(policy);
        self
    }

    /// Set the trust assessor.
    #[must_use]
    pub fn trust_assessor(mut self, trust: Arc<dyn TrustAssessor>) -> Self {
        self.trust = Some(trust);
        self
    }

    /// Set the venue repository.
    #[must_use]
    pub fn repository(mut self, repository: Arc<dyn VenueRepository>) -> Self {
        self.repository = Some(repository);
        self
    }

    /// Set the optional event sink.
    #[must_use]
    pub fn event_sink(mut self, events: Arc<dyn EventSink>) -> Self {
        self.events = Some(events);
        self
    }

    /// Build the engine.
    ///
    /// # Errors
    ///
    /// Returns `EngineError::InvalidConfig` if a required collaborator is
    /// missing or the configuration is invalid.
    pub fn build(self) -> Result<Engine, EngineError> {
        let policy: Arc<dyn DecisionPolicy> = match self.policy {
            Some(policy) => policy,
            None => Arc::new(ThresholdDecisionPolicy::new(
                self.config.approval_threshold,
                DEFAULT_REJECT_BELOW,
            )),
        };
        let collaborators = Collaborators {
            enricher: self.enricher.ok_or_else(|| missing("enricher"))?,
            scorer: self.scorer.ok_or_else(|| missing("scorer"))?,
            quality: self.quality,
            policy,
            trust: self.trust.ok_or_else(|| missing("trust assessor"))?,
            repository: self.repository.ok_or_else(|| missing("repository"))?,
            events: self.events,
        };
        Engine::new(self.config, collaborators)
    }
}

fn missing(what: &str) -> EngineError {
    EngineError::InvalidConfig(format!("{what} is required"))
}
