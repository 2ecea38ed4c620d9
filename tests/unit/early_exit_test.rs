//! Tests for admission control and duplicate detection

use venue_moderation::core::early_exit::{check_duplicate, check_path, name_similarity};
use venue_moderation::core::{
    AuthorityLevel, EarlyExitPolicy, EarlyExitReason, Submission, Submitter, TrustAssessment,
    Venue, VenueStatus,
};
use venue_moderation::infra::InMemoryVenueStore;

fn venue(id: u64, name: &str, lat: f64, lng: f64) -> Venue {
    Venue {
        id,
        name: name.to_string(),
        latitude: Some(lat),
        longitude: Some(lng),
        vegan: true,
        ..Venue::default()
    }
}

#[test]
fn test_points_reason_wins_over_trust_and_type() {
    let policy = EarlyExitPolicy {
        min_points: 10,
        ambassador_only: true,
    };
    let mut sub = Submission::new(venue(1, "Plain Diner", 1.0, 1.0), Submitter::default());
    sub.venue.vegan = false;
    sub.user.ambassador_points = Some(3);

    let reason = policy.evaluate(&sub, None);
    assert_eq!(
        reason,
        Some(EarlyExitReason::InsufficientPoints {
            points: 3,
            required: 10
        })
    );
}

#[test]
fn test_zero_trust_with_elevated_authority_passes() {
    let policy = EarlyExitPolicy {
        min_points: 0,
        ambassador_only: false,
    };
    let sub = Submission::new(venue(1, "Vegan Hub", 1.0, 1.0), Submitter::default());
    let elevated = TrustAssessment {
        trust: 0.0,
        authority: AuthorityLevel::Ambassador,
    };
    assert_eq!(policy.evaluate(&sub, Some(&elevated)), None);

    let lowest = TrustAssessment {
        trust: 0.0,
        authority: AuthorityLevel::Basic,
    };
    assert_eq!(policy.evaluate(&sub, Some(&lowest)), Some(EarlyExitReason::LowTrust));
}

#[tokio::test]
async fn test_duplicate_cafe_flagged() {
    let store = InMemoryVenueStore::new();
    store.insert_venue(venue(1, "Green Garden Cafe", 52.5200, 13.4050), VenueStatus::Approved);

    // ~50 m north
    let candidate = venue(2, "Green Garden Café", 52.52045, 13.4050);
    let reason = check_duplicate(&store, &candidate, 500.0, 0.70).await;
    match reason {
        Some(EarlyExitReason::PossibleDuplicate {
            existing_id,
            distance_m,
            similarity,
        }) => {
            assert_eq!(existing_id, 1);
            assert!(distance_m < 100.0);
            assert!(similarity >= 0.70);
        }
        other => panic!("expected duplicate, got {other:?}"),
    }
}

#[tokio::test]
async fn test_distant_short_name_not_flagged() {
    let store = InMemoryVenueStore::new();
    store.insert_venue(venue(1, "Zzz", 52.52, 13.405), VenueStatus::Approved);

    // ~10 km east
    let candidate = venue(2, "Zzz", 52.52, 13.552);
    assert_eq!(check_duplicate(&store, &candidate, 500.0, 0.70).await, None);
}

#[test]
fn test_name_similarity_bounds() {
    assert!((name_similarity("Green Garden", "green garden") - 1.0).abs() < f64::EPSILON);
    assert!(name_similarity("abc", "xyz") < f64::EPSILON);
    assert!(name_similarity("", "") < f64::EPSILON);
}

#[tokio::test]
async fn test_path_checks() {
    let store = InMemoryVenueStore::new();
    let mut existing = venue(1, "Anchor", 52.52, 13.405);
    existing.path = Some("europe|germany|berlin".to_string());
    store.insert_venue(existing, VenueStatus::Approved);

    let mut malformed = venue(2, "New", 52.52, 13.405);
    malformed.path = Some("europe||berlin".to_string());
    assert!(matches!(
        check_path(&store, &malformed).await,
        Some(EarlyExitReason::MalformedPath { .. })
    ));

    let mut unused = venue(3, "New", 52.52, 13.405);
    unused.path = Some("europe|germany|hamburg".to_string());
    assert!(matches!(
        check_path(&store, &unused).await,
        Some(EarlyExitReason::UnusedPath { .. })
    ));

    let mut shared = venue(4, "New", 52.52, 13.405);
    shared.path = Some("europe|germany|berlin".to_string());
    assert_eq!(check_path(&store, &shared).await, None);
}
