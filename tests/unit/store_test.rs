//! Tests for the unit-of-work contract

use std::collections::BTreeMap;

use venue_moderation::core::{DecisionStatus, ValidationRecord, Venue, VenueStatus};
use venue_moderation::infra::{InMemoryVenueStore, UnitOfWorkGuard, VenueRepository};

fn record(venue_id: u64, score: i32) -> ValidationRecord {
    ValidationRecord {
        venue_id,
        user_id: 9,
        status: DecisionStatus::Approved,
        score,
        reason: "scored".to_string(),
        breakdown: BTreeMap::new(),
        enrichment: None,
        created_at_ms: 1,
    }
}

fn store() -> InMemoryVenueStore {
    let store = InMemoryVenueStore::new();
    store.insert_venue(
        Venue {
            id: 1,
            name: "Sprout".to_string(),
            ..Venue::default()
        },
        VenueStatus::Pending,
    );
    store
}

#[tokio::test]
async fn test_dropped_unit_of_work_rolls_back() {
    let store = store();
    {
        let mut uow = UnitOfWorkGuard::begin(&store).await.unwrap();
        uow.save_validation(record(1, 95)).await.unwrap();
        uow.update_venue_status(1, VenueStatus::Approved, 75).await.unwrap();
    }
    assert_eq!(store.status_of(1), Some(VenueStatus::Pending));
    assert!(store.history_for(1).is_empty());
    assert_eq!(store.rollbacks(), 1);
    assert_eq!(store.commits(), 0);
}

#[tokio::test]
async fn test_history_failure_prevents_status_change() {
    let store = store();
    store.fail_history_writes(true);
    let mut uow = UnitOfWorkGuard::begin(&store).await.unwrap();
    assert!(uow.save_validation(record(1, 95)).await.is_err());
    uow.rollback().unwrap();
    assert_eq!(store.status_of(1), Some(VenueStatus::Pending));
}

#[tokio::test]
async fn test_approval_without_history_is_downgraded() {
    let store = store();
    let mut uow = UnitOfWorkGuard::begin(&store).await.unwrap();
    let applied = uow.update_venue_status(1, VenueStatus::Approved, 75).await.unwrap();
    assert_eq!(applied, VenueStatus::ManualReview);
    uow.commit().await.unwrap();
    assert_eq!(store.status_of(1), Some(VenueStatus::ManualReview));
}

#[tokio::test]
async fn test_unknown_venue_status_update_fails() {
    let store = store();
    let mut uow = UnitOfWorkGuard::begin(&store).await.unwrap();
    assert!(uow.update_venue_status(404, VenueStatus::Rejected, 75).await.is_err());
}

#[tokio::test]
async fn test_rejected_venues_not_nearby() {
    let store = InMemoryVenueStore::new();
    store.insert_venue(
        Venue {
            id: 2,
            name: "Closed Cafe".to_string(),
            latitude: Some(48.8566),
            longitude: Some(2.3522),
            ..Venue::default()
        },
        VenueStatus::Rejected,
    );
    let nearby = store.find_nearby(48.8566, 2.3522, 500.0).await.unwrap();
    assert!(nearby.is_empty());
}
