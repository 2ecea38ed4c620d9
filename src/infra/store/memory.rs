//! In-memory transactional venue store for development and testing.
//!
//! Writes are staged on the unit of work and applied under a single lock on
//! commit, so readers never observe a partially applied unit.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::{anyhow, bail};
use async_trait::async_trait;
use parking_lot::Mutex;

use super::{NearbyVenue, UnitOfWork, VenueRepository};
use crate::core::early_exit::haversine_m;
use crate::core::{AppResult, ValidationRecord, Venue, VenueId, VenueStatus};

#[derive(Debug, Clone)]
struct StoredVenue {
    venue: Venue,
    status: VenueStatus,
}

#[derive(Debug, Default)]
struct StoreState {
    venues: HashMap<VenueId, StoredVenue>,
    history: Vec<ValidationRecord>,
    commits: u64,
    rollbacks: u64,
}

#[derive(Debug, Default)]
struct Faults {
    status_updates: AtomicBool,
    history_writes: AtomicBool,
    queries: AtomicBool,
}

/// Simple in-memory venue store.
#[derive(Clone, Default)]
pub struct InMemoryVenueStore {
    state: Arc<Mutex<StoreState>>,
    faults: Arc<Faults>,
}

impl InMemoryVenueStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a venue.
    pub fn insert_venue(&self, venue: Venue, status: VenueStatus) {
        self.state
            .lock()
            .venues
            .insert(venue.id, StoredVenue { venue, status });
    }

    /// Committed status of a venue.
    pub fn status_of(&self, venue_id: VenueId) -> Option<VenueStatus> {
        self.state.lock().venues.get(&venue_id).map(|v| v.status)
    }

    /// Committed validation history of a venue, oldest first.
    pub fn history_for(&self, venue_id: VenueId) -> Vec<ValidationRecord> {
        self.state
            .lock()
            .history
            .iter()
            .filter(|r| r.venue_id == venue_id)
            .cloned()
            .collect()
    }

    /// Committed units of work.
    pub fn commits(&self) -> u64 {
        self.state.lock().commits
    }

    /// Rolled back units of work.
    pub fn rollbacks(&self) -> u64 {
        self.state.lock().rollbacks
    }

    /// Make every status update fail.
    pub fn fail_status_updates(&self, fail: bool) {
        self.faults.status_updates.store(fail, Ordering::SeqCst);
    }

    /// Make every history write fail.
    pub fn fail_history_writes(&self, fail: bool) {
        self.faults.history_writes.store(fail, Ordering::SeqCst);
    }

    /// Make proximity and path queries fail.
    pub fn fail_queries(&self, fail: bool) {
        self.faults.queries.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl VenueRepository for InMemoryVenueStore {
    async fn begin(&self) -> AppResult<Box<dyn UnitOfWork>> {
        Ok(Box::new(InMemoryUnitOfWork {
            state: Arc::clone(&self.state),
            faults: Arc::clone(&self.faults),
            staged: Vec::new(),
            finished: false,
        }))
    }

    async fn find_nearby(
        &self,
        latitude: f64,
        longitude: f64,
        radius_m: f64,
    ) -> AppResult<Vec<NearbyVenue>> {
        if self.faults.queries.load(Ordering::SeqCst) {
            bail!("proximity query failed");
        }
        let state = self.state.lock();
        Ok(state
            .venues
            .values()
            .filter(|v| v.status != VenueStatus::Rejected)
            .filter_map(|v| {
                let (lat, lng) = v.venue.coordinates()?;
                (haversine_m((latitude, longitude), (lat, lng)) <= radius_m).then(|| NearbyVenue {
                    id: v.venue.id,
                    name: v.venue.name.clone(),
                    latitude: lat,
                    longitude: lng,
                })
            })
            .collect())
    }

    async fn count_active_with_path(&self, path: &str, exclude: VenueId) -> AppResult<u64> {
        if self.faults.queries.load(Ordering::SeqCst) {
            bail!("path query failed");
        }
        let state = self.state.lock();
        let count = state
            .venues
            .values()
            .filter(|v| {
                v.venue.id != exclude
                    && v.status == VenueStatus::Approved
                    && v.venue.path.as_deref() == Some(path)
            })
            .count();
        Ok(count as u64)
    }
}

#[derive(Debug)]
enum StagedWrite {
    History(ValidationRecord),
    Status(VenueId, VenueStatus),
}

struct InMemoryUnitOfWork {
    state: Arc<Mutex<StoreState>>,
    faults: Arc<Faults>,
    staged: Vec<StagedWrite>,
    finished: bool,
}

impl InMemoryUnitOfWork {
    fn latest_score(&self, venue_id: VenueId) -> Option<i32> {
        let staged = self.staged.iter().rev().find_map(|w| match w {
            StagedWrite::History(r) if r.venue_id == venue_id => Some(r.score),
            _ => None,
        });
        staged.or_else(|| {
            self.state
                .lock()
                .history
                .iter()
                .rev()
                .find(|r| r.venue_id == venue_id)
                .map(|r| r.score)
        })
    }

    fn ensure_open(&self) -> AppResult<()> {
        if self.finished {
            bail!("unit of work already finished");
        }
        Ok(())
    }
}

#[async_trait]
impl UnitOfWork for InMemoryUnitOfWork {
    async fn save_validation(&mut self, record: ValidationRecord) -> AppResult<()> {
        self.ensure_open()?;
        if self.faults.history_writes.load(Ordering::SeqCst) {
            bail!("validation history write failed");
        }
        self.staged.push(StagedWrite::History(record));
        Ok(())
    }

    async fn update_venue_status(
        &mut self,
        venue_id: VenueId,
        status: VenueStatus,
        approval_threshold: i32,
    ) -> AppResult<VenueStatus> {
        self.ensure_open()?;
        if self.faults.status_updates.load(Ordering::SeqCst) {
            bail!("venue status update failed");
        }
        if !self.state.lock().venues.contains_key(&venue_id) {
            return Err(anyhow!("venue {venue_id} not found"));
        }
        let applied = match status {
            VenueStatus::Approved
                if self
                    .latest_score(venue_id)
                    .is_none_or(|score| score < approval_threshold) =>
            {
                VenueStatus::ManualReview
            }
            other => other,
        };
        self.staged.push(StagedWrite::Status(venue_id, applied));
        Ok(applied)
    }

    async fn commit(&mut self) -> AppResult<()> {
        self.ensure_open()?;
        let mut state = self.state.lock();
        for write in self.staged.drain(..) {
            match write {
                StagedWrite::History(record) => state.history.push(record),
                StagedWrite::Status(venue_id, status) => {
                    if let Some(v) = state.venues.get_mut(&venue_id) {
                        v.status = status;
                    }
                }
            }
        }
        state.commits += 1;
        self.finished = true;
        Ok(())
    }

    fn rollback(&mut self) -> AppResult<()> {
        if self.finished {
            return Ok(());
        }
        self.staged.clear();
        self.finished = true;
        self.state.lock().rollbacks += 1;
        Ok(())
    }
}
