//! Infrastructure adapters: venue storage.

pub mod store;

pub use store::{InMemoryVenueStore, NearbyVenue, UnitOfWork, UnitOfWorkGuard, VenueRepository};
