//! Early-exit policy: zero-cost checks that route a submission to manual
//! review before any paid external call is made.
//!
//! The admission predicates run in a fixed order and the first one that
//! fires wins. Reordering them changes the reason codes callers observe.

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::config::RuntimeSettings;
use crate::core::providers::TrustAssessment;
use crate::core::{Submission, Submitter, Venue, VenueId};
use crate::infra::store::VenueRepository;

/// Mean Earth radius in meters.
const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// Shortest trimmed name that duplicate detection considers.
const MIN_DUPLICATE_NAME_CHARS: usize = 3;

/// Why a submission bypassed automated review.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "code", rename_all = "snake_case")]
pub enum EarlyExitReason {
    /// Minimum points required but the submitter has no points data.
    NoPointsData {
        /// Configured minimum.
        required: u32,
    },
    /// Submitter has fewer points than required.
    InsufficientPoints {
        /// Points held.
        points: u32,
        /// Configured minimum.
        required: u32,
    },
    /// No trust assessment available.
    NoTrustData,
    /// Zero trust and lowest authority tier.
    LowTrust,
    /// Venue is neither fully vegan nor vegetarian-only.
    UnsupportedVenueType,
    /// Ambassador-only mode and the submitter is not eligible.
    NotAmbassador,
    /// A similarly named venue exists nearby.
    PossibleDuplicate {
        /// The existing venue.
        existing_id: VenueId,
        /// Distance in meters.
        distance_m: f64,
        /// Name similarity in `0.0..=1.0`.
        similarity: f64,
    },
    /// Administrative hold on the listing.
    AdminHold,
    /// Venue lies in a region that always needs a human.
    RestrictedRegion {
        /// Matched country.
        country: String,
    },
    /// Hierarchical path is malformed.
    MalformedPath {
        /// Offending path.
        path: String,
    },
    /// No other active venue uses this path.
    UnusedPath {
        /// Offending path.
        path: String,
    },
    /// Enrichment found no usable location.
    NoLocation,
}

impl EarlyExitReason {
    /// Stable reason code.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::NoPointsData { .. } => "no_points_data",
            Self::InsufficientPoints { .. } => "insufficient_points",
            Self::NoTrustData => "no_trust_data",
            Self::LowTrust => "low_trust",
            Self::UnsupportedVenueType => "unsupported_venue_type",
            Self::NotAmbassador => "not_ambassador",
            Self::PossibleDuplicate { .. } => "possible_duplicate",
            Self::AdminHold => "admin_hold",
            Self::RestrictedRegion { .. } => "restricted_region",
            Self::MalformedPath { .. } => "malformed_path",
            Self::UnusedPath { .. } => "unused_path",
            Self::NoLocation => "no_location",
        }
    }

    /// Human-readable description.
    #[must_use]
    pub fn description(&self) -> String {
        match self {
            Self::NoPointsData { required } => {
                format!("submitter has no points data ({required} required)")
            }
            Self::InsufficientPoints { points, required } => {
                format!("submitter has {points} points, {required} required")
            }
            Self::NoTrustData => "no trust assessment available".into(),
            Self::LowTrust => "submitter has no trust and no authority".into(),
            Self::UnsupportedVenueType => "venue is neither fully vegan nor vegetarian".into(),
            Self::NotAmbassador => "ambassador-only mode and submitter is not an ambassador".into(),
            Self::PossibleDuplicate {
                existing_id,
                distance_m,
                similarity,
            } => format!(
                "possible duplicate of venue {existing_id} ({distance_m:.0} m away, {:.0}% similar)",
                similarity * 100.0
            ),
            Self::AdminHold => "listing is on administrative hold".into(),
            Self::RestrictedRegion { country } => format!("region {country} requires manual review"),
            Self::MalformedPath { path } => format!("malformed region path {path:?}"),
            Self::UnusedPath { path } => format!("no active venue uses region path {path:?}"),
            Self::NoLocation => "enrichment found no usable location".into(),
        }
    }
}

impl fmt::Display for EarlyExitReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code(), self.description())
    }
}

/// Requires a minimum number of ambassador points when `required > 0`.
#[must_use]
pub fn check_min_points(user: &Submitter, required: u32) -> Option<EarlyExitReason> {
    if required == 0 {
        return None;
    }
    match user.ambassador_points {
        None => Some(EarlyExitReason::NoPointsData { required }),
        Some(points) if points < required => {
            Some(EarlyExitReason::InsufficientPoints { points, required })
        }
        Some(_) => None,
    }
}

/// Requires a trust assessment, and rejects zero trust at the lowest tier.
#[must_use]
pub fn check_trust(trust: Option<&TrustAssessment>) -> Option<EarlyExitReason> {
    match trust {
        None => Some(EarlyExitReason::NoTrustData),
        Some(t) if lacks_trust(t.trust) && t.authority.is_lowest() => Some(EarlyExitReason::LowTrust),
        Some(_) => None,
    }
}

/// Non-positive and NaN trust both count as no trust.
fn lacks_trust(trust: f64) -> bool {
    trust.is_nan() || trust <= 0.0
}

/// Only fully vegan or vegetarian-only venues proceed.
#[must_use]
pub const fn check_venue_type(venue: &Venue) -> Option<EarlyExitReason> {
    if venue.vegan || venue.vegetarian_only {
        None
    } else {
        Some(EarlyExitReason::UnsupportedVenueType)
    }
}

/// In ambassador-only mode, requires ambassador status or venue privilege.
#[must_use]
pub fn check_ambassador_mode(user: &Submitter, ambassador_only: bool) -> Option<EarlyExitReason> {
    if !ambassador_only || user.is_ambassador() || user.has_venue_privilege() {
        None
    } else {
        Some(EarlyExitReason::NotAmbassador)
    }
}

/// The ordered admission predicates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EarlyExitPolicy {
    /// Minimum ambassador points; 0 disables the check.
    pub min_points: u32,
    /// Ambassador-only mode.
    pub ambassador_only: bool,
}

impl EarlyExitPolicy {
    /// Policy from the current runtime settings.
    #[must_use]
    pub const fn from_settings(settings: &RuntimeSettings) -> Self {
        Self {
            min_points: settings.min_points,
            ambassador_only: settings.ambassador_only,
        }
    }

    /// Evaluate the predicates in order; the first that fires wins.
    #[must_use]
    pub fn evaluate(
        &self,
        submission: &Submission,
        trust: Option<&TrustAssessment>,
    ) -> Option<EarlyExitReason> {
        let reason = check_min_points(&submission.user, self.min_points)
            .or_else(|| check_trust(trust))
            .or_else(|| check_venue_type(&submission.venue))
            .or_else(|| check_ambassador_mode(&submission.user, self.ambassador_only));
        if let Some(reason) = &reason {
            debug!(venue_id = submission.venue.id, code = reason.code(), "Early exit");
        }
        reason
    }
}

/// Great-circle distance in meters between two `(lat, lng)` points.
#[must_use]
pub fn haversine_m(a: (f64, f64), b: (f64, f64)) -> f64 {
    let (lat1, lng1) = (a.0.to_radians(), a.1.to_radians());
    let (lat2, lng2) = (b.0.to_radians(), b.1.to_radians());
    let dlat = lat2 - lat1;
    let dlng = lng2 - lng1;
    let h = (dlat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (dlng / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS_M * h.sqrt().asin()
}

fn normalized_chars(name: &str) -> Vec<char> {
    name.chars()
        .filter(|c| !c.is_whitespace())
        .flat_map(char::to_lowercase)
        .collect()
}

/// Character-overlap similarity: shared characters (as a multiset) over the
/// length of the longer name, ignoring case and whitespace.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn name_similarity(a: &str, b: &str) -> f64 {
    let a = normalized_chars(a);
    let b = normalized_chars(b);
    let longer = a.len().max(b.len());
    if longer == 0 {
        return 0.0;
    }
    if a == b {
        return 1.0;
    }

    let mut counts: HashMap<char, usize> = HashMap::new();
    for c in &a {
        *counts.entry(*c).or_default() += 1;
    }
    let mut shared = 0usize;
    for c in &b {
        if let Some(n) = counts.get_mut(c) {
            if *n > 0 {
                *n -= 1;
                shared += 1;
            }
        }
    }
    shared as f64 / longer as f64
}

/// Flag the venue as a possible duplicate of a nearby, similarly named one.
///
/// Only runs with non-zero coordinates and a name of at least three
/// characters. A query error skips the check.
pub async fn check_duplicate(
    repository: &dyn VenueRepository,
    venue: &Venue,
    radius_m: f64,
    min_similarity: f64,
) -> Option<EarlyExitReason> {
    let origin = venue.coordinates()?;
    if venue.name.trim().chars().count() < MIN_DUPLICATE_NAME_CHARS {
        return None;
    }

    let nearby = match repository.find_nearby(origin.0, origin.1, radius_m).await {
        Ok(nearby) => nearby,
        Err(e) => {
            warn!(venue_id = venue.id, error = %e, "Duplicate check skipped: proximity query failed");
            return None;
        }
    };

    nearby
        .into_iter()
        .filter(|candidate| candidate.id != venue.id)
        .find_map(|candidate| {
            let distance_m = haversine_m(origin, (candidate.latitude, candidate.longitude));
            let similarity = name_similarity(&venue.name, &candidate.name);
            (distance_m <= radius_m && similarity >= min_similarity).then_some(
                EarlyExitReason::PossibleDuplicate {
                    existing_id: candidate.id,
                    distance_m,
                    similarity,
                },
            )
        })
}

/// Domain-level hold checks: administrative hold and restricted regions.
#[must_use]
pub fn requires_manual_review(venue: &Venue, restricted_regions: &[String]) -> Option<EarlyExitReason> {
    if venue.admin_hold {
        return Some(EarlyExitReason::AdminHold);
    }
    let country = venue.country.as_deref()?.trim();
    restricted_regions
        .iter()
        .find(|r| r.trim().eq_ignore_ascii_case(country))
        .map(|_| EarlyExitReason::RestrictedRegion {
            country: country.to_string(),
        })
}

/// True when every `|`-separated segment of `path` is non-empty.
#[must_use]
pub fn is_well_formed_path(path: &str) -> bool {
    !path.trim().is_empty() && path.split('|').all(|segment| !segment.trim().is_empty())
}

/// Structural path check: malformed paths, and paths no other active venue
/// uses. Venues without a path are not checked; a query error skips the
/// usage check.
pub async fn check_path(repository: &dyn VenueRepository, venue: &Venue) -> Option<EarlyExitReason> {
    let path = venue.path.as_deref()?;
    if !is_well_formed_path(path) {
        return Some(EarlyExitReason::MalformedPath {
            path: path.to_string(),
        });
    }
    match repository.count_active_with_path(path, venue.id).await {
        Ok(0) => Some(EarlyExitReason::UnusedPath {
            path: path.to_string(),
        }),
        Ok(_) => None,
        Err(e) => {
            warn!(venue_id = venue.id, error = %e, "Path usage check skipped: query failed");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::providers::AuthorityLevel;
    use crate::core::VenueStatus;
    use crate::infra::store::InMemoryVenueStore;

    fn trust(value: f64, authority: AuthorityLevel) -> TrustAssessment {
        TrustAssessment {
            trust: value,
            authority,
        }
    }

    fn eligible() -> Submission {
        Submission::new(
            Venue {
                id: 10,
                name: "Green Garden Café".into(),
                vegan: true,
                ..Venue::default()
            },
            Submitter {
                id: 1,
                ambassador_points: Some(100),
                ..Submitter::default()
            },
        )
    }

    #[test]
    fn test_all_predicates_pass() {
        let policy = EarlyExitPolicy {
            min_points: 50,
            ambassador_only: true,
        };
        let t = trust(0.8, AuthorityLevel::Ambassador);
        assert_eq!(policy.evaluate(&eligible(), Some(&t)), None);
    }

    #[test]
    fn test_min_points_distinguishes_missing_and_insufficient() {
        let mut user = Submitter::default();
        assert_eq!(check_min_points(&user, 0), None);
        assert_eq!(
            check_min_points(&user, 10).map(|r| r.code()),
            Some("no_points_data")
        );
        user.ambassador_points = Some(3);
        assert_eq!(
            check_min_points(&user, 10).map(|r| r.code()),
            Some("insufficient_points")
        );
        user.ambassador_points = Some(10);
        assert_eq!(check_min_points(&user, 10), None);
    }

    #[test]
    fn test_trust_check() {
        assert_eq!(check_trust(None), Some(EarlyExitReason::NoTrustData));
        assert_eq!(
            check_trust(Some(&trust(0.0, AuthorityLevel::Basic))),
            Some(EarlyExitReason::LowTrust)
        );
        assert_eq!(check_trust(Some(&trust(0.0, AuthorityLevel::Ambassador))), None);
        assert_eq!(check_trust(Some(&trust(0.1, AuthorityLevel::Basic))), None);
    }

    #[test]
    fn test_nan_and_negative_trust_count_as_zero() {
        assert_eq!(
            check_trust(Some(&trust(f64::NAN, AuthorityLevel::Basic))),
            Some(EarlyExitReason::LowTrust)
        );
        assert_eq!(
            check_trust(Some(&trust(-0.5, AuthorityLevel::Basic))),
            Some(EarlyExitReason::LowTrust)
        );
        assert_eq!(check_trust(Some(&trust(f64::NAN, AuthorityLevel::Ambassador))), None);
    }

    #[test]
    fn test_first_failing_predicate_wins() {
        let mut sub = eligible();
        sub.user.ambassador_points = None;
        sub.venue.vegan = false;
        let policy = EarlyExitPolicy {
            min_points: 10,
            ambassador_only: false,
        };
        // Points, trust and venue type all fail; points is checked first.
        let reason = policy.evaluate(&sub, None).unwrap();
        assert_eq!(reason.code(), "no_points_data");

        let policy = EarlyExitPolicy {
            min_points: 0,
            ambassador_only: false,
        };
        assert_eq!(policy.evaluate(&sub, None).unwrap().code(), "no_trust_data");

        let t = trust(0.5, AuthorityLevel::Basic);
        assert_eq!(
            policy.evaluate(&sub, Some(&t)).unwrap().code(),
            "unsupported_venue_type"
        );
    }

    #[test]
    fn test_ambassador_mode() {
        let mut user = Submitter::default();
        assert_eq!(check_ambassador_mode(&user, false), None);
        assert_eq!(
            check_ambassador_mode(&user, true),
            Some(EarlyExitReason::NotAmbassador)
        );
        user.is_venue_admin = true;
        assert_eq!(check_ambassador_mode(&user, true), None);
        user.is_venue_admin = false;
        user.ambassador_level = Some(1);
        assert_eq!(check_ambassador_mode(&user, true), None);
    }

    #[test]
    fn test_haversine_known_distance() {
        // Berlin to Munich is roughly 504 km.
        let d = haversine_m((52.5200, 13.4050), (48.1351, 11.5820));
        assert!((d - 504_000.0).abs() < 5_000.0, "got {d}");
        assert!(haversine_m((52.52, 13.405), (52.52, 13.405)).abs() < f64::EPSILON);
    }

    #[test]
    fn test_name_similarity() {
        assert!((name_similarity("Green Garden", "green  garden") - 1.0).abs() < f64::EPSILON);
        assert!(name_similarity("Green Garden Cafe", "Green Garden Café") >= 0.70);
        assert!(name_similarity("Zzz", "Green Garden Cafe") < 0.70);
        assert!(name_similarity("", "").abs() < f64::EPSILON);
    }

    #[test]
    fn test_requires_manual_review() {
        let mut venue = Venue::default();
        let restricted = vec!["North Korea".to_string()];
        assert_eq!(requires_manual_review(&venue, &restricted), None);

        venue.country = Some("north korea".into());
        assert_eq!(
            requires_manual_review(&venue, &restricted).map(|r| r.code()),
            Some("restricted_region")
        );

        venue.admin_hold = true;
        assert_eq!(
            requires_manual_review(&venue, &restricted),
            Some(EarlyExitReason::AdminHold)
        );
    }

    #[test]
    fn test_path_well_formed() {
        assert!(is_well_formed_path("europe|germany|berlin"));
        assert!(!is_well_formed_path("europe||berlin"));
        assert!(!is_well_formed_path("europe|germany|"));
        assert!(!is_well_formed_path("  "));
    }

    fn store_with(venue: Venue) -> InMemoryVenueStore {
        let store = InMemoryVenueStore::new();
        store.insert_venue(venue, VenueStatus::Approved);
        store
    }

    #[tokio::test]
    async fn test_duplicate_detected_nearby() {
        let store = store_with(Venue {
            id: 1,
            name: "Green Garden Cafe".into(),
            latitude: Some(52.5200),
            longitude: Some(13.4050),
            ..Venue::default()
        });
        // ~50 m north
        let candidate = Venue {
            id: 2,
            name: "Green Garden Café".into(),
            latitude: Some(52.52045),
            longitude: Some(13.4050),
            ..Venue::default()
        };
        let reason = check_duplicate(&store, &candidate, 500.0, 0.70).await;
        assert!(matches!(
            reason,
            Some(EarlyExitReason::PossibleDuplicate { existing_id: 1, .. })
        ));
    }

    #[tokio::test]
    async fn test_duplicate_not_flagged_far_away() {
        let store = store_with(Venue {
            id: 1,
            name: "Green Garden Cafe".into(),
            latitude: Some(52.5200),
            longitude: Some(13.4050),
            ..Venue::default()
        });
        // ~10 km north
        let candidate = Venue {
            id: 2,
            name: "Zzz".into(),
            latitude: Some(52.6100),
            longitude: Some(13.4050),
            ..Venue::default()
        };
        assert_eq!(check_duplicate(&store, &candidate, 500.0, 0.70).await, None);
    }

    #[tokio::test]
    async fn test_duplicate_query_error_is_not_fatal() {
        let store = store_with(Venue {
            id: 1,
            name: "Green Garden Cafe".into(),
            latitude: Some(52.5200),
            longitude: Some(13.4050),
            ..Venue::default()
        });
        store.fail_queries(true);
        let candidate = Venue {
            id: 2,
            name: "Green Garden Cafe".into(),
            latitude: Some(52.5200),
            longitude: Some(13.4050),
            ..Venue::default()
        };
        assert_eq!(check_duplicate(&store, &candidate, 500.0, 0.70).await, None);
    }

    #[tokio::test]
    async fn test_check_path_unused() {
        let store = InMemoryVenueStore::new();
        let venue = Venue {
            id: 5,
            path: Some("europe|germany|berlin".into()),
            ..Venue::default()
        };
        assert_eq!(
            check_path(&store, &venue).await.map(|r| r.code()),
            Some("unused_path")
        );

        store.insert_venue(
            Venue {
                id: 6,
                path: Some("europe|germany|berlin".into()),
                ..Venue::default()
            },
            VenueStatus::Approved,
        );
        assert_eq!(check_path(&store, &venue).await, None);
    }
}
