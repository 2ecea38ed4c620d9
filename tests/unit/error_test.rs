//! Tests for error types

use std::time::Duration;

use venue_moderation::core::EngineError;

#[test]
fn test_queue_full_error() {
    let err = EngineError::QueueFull { accepted: 3 };
    assert_eq!(format!("{}", err), "queue full (3 accepted before rejection)");
}

#[test]
fn test_shutting_down_error() {
    let err = EngineError::ShuttingDown;
    assert_eq!(format!("{}", err), "engine is shutting down");
}

#[test]
fn test_stop_timeout_error() {
    let err = EngineError::StopTimeout(Duration::from_secs(5));
    assert_eq!(format!("{}", err), "workers did not stop within 5s");
}

#[test]
fn test_external_error() {
    let err = EngineError::External {
        message: "connection refused".to_string(),
        transient: true,
    };
    assert_eq!(format!("{}", err), "external call failed: connection refused");
    assert!(!err.is_cancellation());
}

#[test]
fn test_cancellation_is_distinguishable() {
    assert!(EngineError::Cancelled.is_cancellation());
    assert!(EngineError::JobTimeout.is_cancellation());
    assert!(!EngineError::Persistence("disk full".into()).is_cancellation());
}
