//! Venue persistence: repository queries and the unit-of-work contract.

pub mod memory;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::core::{AppResult, ValidationRecord, VenueId, VenueStatus};

pub use memory::InMemoryVenueStore;

/// A venue returned by a proximity query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NearbyVenue {
    /// Venue identifier.
    pub id: VenueId,
    /// Display name.
    pub name: String,
    /// Latitude.
    pub latitude: f64,
    /// Longitude.
    pub longitude: f64,
}

/// Transaction boundary around one or more writes.
///
/// Either every write commits or none do. Rollback after commit is a no-op.
#[async_trait]
pub trait UnitOfWork: Send {
    /// Append a validation history record.
    async fn save_validation(&mut self, record: ValidationRecord) -> AppResult<()>;

    /// Request a status transition and return the status actually applied.
    ///
    /// An approval is downgraded to manual review when the venue's latest
    /// validation record (including ones written earlier in this unit of
    /// work) scored below `approval_threshold`.
    async fn update_venue_status(
        &mut self,
        venue_id: VenueId,
        status: VenueStatus,
        approval_threshold: i32,
    ) -> AppResult<VenueStatus>;

    /// Commit all writes.
    async fn commit(&mut self) -> AppResult<()>;

    /// Discard all writes.
    fn rollback(&mut self) -> AppResult<()>;
}

/// Venue repository and unit-of-work factory.
#[async_trait]
pub trait VenueRepository: Send + Sync {
    /// Open a unit of work.
    async fn begin(&self) -> AppResult<Box<dyn UnitOfWork>>;

    /// Venues within `radius_m` meters of a point.
    async fn find_nearby(&self, latitude: f64, longitude: f64, radius_m: f64)
        -> AppResult<Vec<NearbyVenue>>;

    /// Number of active venues other than `exclude` using `path`.
    async fn count_active_with_path(&self, path: &str, exclude: VenueId) -> AppResult<u64>;
}

/// Unit of work that rolls back on drop unless committed.
///
/// Covers early returns via `?` and unwinding alike.
pub struct UnitOfWorkGuard {
    inner: Box<dyn UnitOfWork>,
    finished: bool,
}

impl UnitOfWorkGuard {
    /// Begin a unit of work on `repository`.
    ///
    /// # Errors
    ///
    /// Propagates the repository's error.
    pub async fn begin(repository: &dyn VenueRepository) -> AppResult<Self> {
        Ok(Self {
            inner: repository.begin().await?,
            finished: false,
        })
    }

    /// Append a validation history record.
    ///
    /// # Errors
    ///
    /// Propagates the write error.
    pub async fn save_validation(&mut self, record: ValidationRecord) -> AppResult<()> {
        self.inner.save_validation(record).await
    }

    /// Request a status transition; see [`UnitOfWork::update_venue_status`].
    ///
    /// # Errors
    ///
    /// Propagates the write error.
    pub async fn update_venue_status(
        &mut self,
        venue_id: VenueId,
        status: VenueStatus,
        approval_threshold: i32,
    ) -> AppResult<VenueStatus> {
        self.inner
            .update_venue_status(venue_id, status, approval_threshold)
            .await
    }

    /// Commit. On error the drop guard still rolls back.
    ///
    /// # Errors
    ///
    /// Propagates the commit error.
    pub async fn commit(mut self) -> AppResult<()> {
        self.inner.commit().await?;
        self.finished = true;
        Ok(())
    }

    /// Roll back explicitly.
    ///
    /// # Errors
    ///
    /// Propagates the rollback error.
    pub fn rollback(mut self) -> AppResult<()> {
        self.finished = true;
        self.inner.rollback()
    }
}

impl Drop for UnitOfWorkGuard {
    fn drop(&mut self) {
        if self.finished {
            return;
        }
        if let Err(e) = self.inner.rollback() {
            warn!(error = %e, "Rollback of abandoned unit of work failed");
        }
    }
}
