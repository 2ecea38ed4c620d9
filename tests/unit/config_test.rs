//! Tests for configuration validation

use std::time::Duration;

use venue_moderation::config::{EngineConfig, RateLimitConfig};

#[test]
fn test_engine_config_defaults() {
    let cfg = EngineConfig::default();
    assert!(cfg.validate().is_ok());
    assert_eq!(cfg.approval_threshold, 75);
    assert!(!cfg.object_pooling);
    assert!(!cfg.score_only);
    assert!((cfg.duplicate_radius_m - 500.0).abs() < f64::EPSILON);
    assert!((cfg.duplicate_similarity - 0.70).abs() < f64::EPSILON);
}

#[test]
fn test_engine_config_invalid_queue_capacity() {
    let invalid = EngineConfig::new().with_queue_capacity(0);
    assert!(invalid.validate().is_err());
}

#[test]
fn test_engine_config_invalid_threshold() {
    let invalid = EngineConfig::new().with_approval_threshold(101);
    assert!(invalid.validate().is_err());
}

#[test]
fn test_rate_limit_config() {
    let limit = RateLimitConfig::new(20, Duration::from_secs(60), 4);
    assert_eq!(limit.rate, 20);
    assert_eq!(limit.burst, 4);
    assert_eq!(limit.per(), Duration::from_secs(60));
}

#[test]
fn test_runtime_settings_subset() {
    let cfg = EngineConfig::new()
        .with_worker_count(6)
        .with_approval_threshold(80)
        .with_min_points(10)
        .with_ambassador_only(true);
    let settings = cfg.runtime_settings();
    assert_eq!(settings.worker_count, 6);
    assert_eq!(settings.approval_threshold, 80);
    assert_eq!(settings.min_points, 10);
    assert!(settings.ambassador_only);
}

#[test]
fn test_config_json_round_trip() {
    let cfg = EngineConfig::new()
        .with_worker_count(3)
        .with_restricted_regions(["Atlantis"]);
    let json = serde_json::to_string(&cfg).unwrap();
    let parsed = EngineConfig::from_json_str(&json).unwrap();
    assert_eq!(parsed, cfg);
}
