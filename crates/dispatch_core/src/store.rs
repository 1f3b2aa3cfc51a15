//! Trip store: persistence contract and the in-memory implementation.
//!
//! The store is the single source of truth for trip state. Mutations run
//! inside [`TripStore::update`], whose closure either commits atomically or
//! leaves the stored trip untouched — the reliability contract the polling
//! clients depend on.

use std::collections::HashMap;
use std::sync::RwLock;
use std::time::Duration;

use thiserror::Error;

use crate::error::{DispatchError, Result};
use crate::trip::{Trip, TripId};

/// Transient infrastructure failure inside a store backend.
#[derive(Debug, Clone, Error)]
#[error("trip store unavailable: {0}")]
pub struct StoreUnavailable(pub String);

/// Outcome of [`TripStore::update`]: `None` if the trip id is unknown,
/// otherwise the domain-level result of the guarded mutation.
pub type UpdateOutcome = Option<Result<Trip>>;

/// Persistence contract for trip records.
///
/// `update` must serialize mutations per trip: of N concurrent guarded
/// closures for the same trip, each observes the committed effects of those
/// that ran before it. This is the critical section that makes
/// select-driver assign exactly one driver.
pub trait TripStore: Send + Sync {
    fn insert(&self, trip: Trip) -> std::result::Result<(), StoreUnavailable>;

    fn get(&self, id: TripId) -> std::result::Result<Option<Trip>, StoreUnavailable>;

    /// Run a guarded mutation under the per-trip critical section.
    ///
    /// If the closure returns `Err`, the stored trip is unchanged and the
    /// error is passed through; on `Ok` the mutated trip is committed and a
    /// copy returned.
    fn update(
        &self,
        id: TripId,
        mutation: &mut dyn FnMut(&mut Trip) -> Result<()>,
    ) -> std::result::Result<UpdateOutcome, StoreUnavailable>;

    /// A point-in-time copy of all trips, for the read views.
    fn snapshot(&self) -> std::result::Result<Vec<Trip>, StoreUnavailable>;
}

/// In-memory store backed by a single `RwLock`'d map.
///
/// The map-wide write lock subsumes the per-trip critical section the trait
/// requires. Mutations are applied to a copy and committed only on success,
/// so a rejected closure leaves no partial write.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    trips: RwLock<HashMap<TripId, Trip>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl TripStore for InMemoryStore {
    fn insert(&self, trip: Trip) -> std::result::Result<(), StoreUnavailable> {
        let mut trips = self.trips.write().expect("trip store lock");
        trips.insert(trip.id, trip);
        Ok(())
    }

    fn get(&self, id: TripId) -> std::result::Result<Option<Trip>, StoreUnavailable> {
        let trips = self.trips.read().expect("trip store lock");
        Ok(trips.get(&id).cloned())
    }

    fn update(
        &self,
        id: TripId,
        mutation: &mut dyn FnMut(&mut Trip) -> Result<()>,
    ) -> std::result::Result<UpdateOutcome, StoreUnavailable> {
        let mut trips = self.trips.write().expect("trip store lock");
        let Some(stored) = trips.get(&id) else {
            return Ok(None);
        };
        let mut candidate = stored.clone();
        match mutation(&mut candidate) {
            Ok(()) => {
                trips.insert(id, candidate.clone());
                Ok(Some(Ok(candidate)))
            }
            Err(e) => Ok(Some(Err(e))),
        }
    }

    fn snapshot(&self) -> std::result::Result<Vec<Trip>, StoreUnavailable> {
        let trips = self.trips.read().expect("trip store lock");
        Ok(trips.values().cloned().collect())
    }
}

const RETRY_ATTEMPTS: u32 = 3;
const RETRY_BACKOFF_BASE_MS: u64 = 25;

/// Retry a store call with bounded backoff, surfacing
/// [`DispatchError::ServiceUnavailable`] once attempts are exhausted.
///
/// Internal failure detail stays in the logs; callers only ever see the
/// generic taxonomy error.
pub fn with_retries<T>(
    op: &'static str,
    mut call: impl FnMut() -> std::result::Result<T, StoreUnavailable>,
) -> Result<T> {
    for attempt in 0..RETRY_ATTEMPTS {
        match call() {
            Ok(value) => return Ok(value),
            Err(e) => {
                tracing::warn!(op, attempt, error = %e, "trip store call failed");
                if attempt + 1 < RETRY_ATTEMPTS {
                    std::thread::sleep(Duration::from_millis(RETRY_BACKOFF_BASE_MS << attempt));
                }
            }
        }
    }
    Err(DispatchError::ServiceUnavailable)
}
