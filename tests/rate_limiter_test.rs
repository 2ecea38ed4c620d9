//! Timing tests for the token-bucket rate limiter

use std::time::{Duration, Instant};

use tokio_util::sync::CancellationToken;
use venue_moderation::core::{EngineError, RateLimiter};

#[tokio::test]
async fn test_burst_then_block_until_refill() {
    let limiter = RateLimiter::new("enrichment", 1, Duration::from_millis(300), 3);
    limiter.start().unwrap();
    let cancel = CancellationToken::new();

    let start = Instant::now();
    for _ in 0..3 {
        limiter.wait(&cancel).await.unwrap();
    }
    assert!(start.elapsed() < Duration::from_millis(100), "burst should not block");

    let blocked = Instant::now();
    limiter.wait(&cancel).await.unwrap();
    let waited = blocked.elapsed();
    assert!(waited >= Duration::from_millis(150), "4th wait returned after {waited:?}");
    assert!(waited < Duration::from_secs(3));

    limiter.stop();
}

#[tokio::test]
async fn test_no_refill_without_start() {
    let limiter = RateLimiter::new("scoring", 100, Duration::from_secs(1), 1);
    let cancel = CancellationToken::new();

    limiter.wait(&cancel).await.unwrap();
    let res = tokio::time::timeout(Duration::from_millis(100), limiter.wait(&cancel)).await;
    assert!(res.is_err(), "empty bucket must block when not refilling");
}

#[tokio::test]
async fn test_cancel_unblocks_waiter() {
    let limiter = RateLimiter::new("scoring", 1, Duration::from_secs(60), 1);
    limiter.start().unwrap();
    assert!(limiter.try_acquire());

    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        trigger.cancel();
    });

    let start = Instant::now();
    assert_eq!(limiter.wait(&cancel).await, Err(EngineError::Cancelled));
    assert!(start.elapsed() < Duration::from_secs(1));
    limiter.stop();
}

#[tokio::test]
async fn test_limiters_are_independent() {
    let enrich = RateLimiter::new("enrichment", 1, Duration::from_secs(60), 1);
    let score = RateLimiter::new("scoring", 1, Duration::from_secs(60), 2);
    let cancel = CancellationToken::new();

    enrich.wait(&cancel).await.unwrap();
    assert_eq!(enrich.available(), 0);

    // Draining one bucket never starves the other.
    score.wait(&cancel).await.unwrap();
    score.wait(&cancel).await.unwrap();
    assert_eq!(score.available(), 0);
}

#[test]
fn test_refill_stops_at_capacity() {
    let limiter = RateLimiter::new("enrichment", 1_000, Duration::from_secs(1), 2);
    limiter.start().unwrap();
    std::thread::sleep(Duration::from_millis(50));
    assert_eq!(limiter.available(), 2);
    limiter.stop();
    limiter.stop();
}
