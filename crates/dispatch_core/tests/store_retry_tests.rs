mod support;

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;

use chrono::{Duration, TimeZone, Utc};
use dispatch_core::clock::{Clock, ManualClock};
use dispatch_core::error::{DispatchError, Result};
use dispatch_core::matching::{MatchingConfig, MatchingEngine};
use dispatch_core::pricing::PricingConfig;
use dispatch_core::spatial::{GeoIndex, GeoIndexConfig};
use dispatch_core::store::{InMemoryStore, StoreUnavailable, TripStore, UpdateOutcome};
use dispatch_core::trip::{DriverId, OwnerId, Trip, TripId, TripStatus, VehicleType};
use support::TestDispatchBuilder;

/// Store that fails its first `failures` calls, then delegates.
struct FlakyStore {
    inner: InMemoryStore,
    failures: AtomicU32,
}

impl FlakyStore {
    fn new(failures: u32) -> Self {
        Self {
            inner: InMemoryStore::new(),
            failures: AtomicU32::new(failures),
        }
    }

    fn maybe_outage(&self) -> std::result::Result<(), StoreUnavailable> {
        let remaining = self.failures.load(Ordering::SeqCst);
        if remaining > 0 {
            self.failures.store(remaining - 1, Ordering::SeqCst);
            return Err(StoreUnavailable("simulated outage".into()));
        }
        Ok(())
    }
}

impl TripStore for FlakyStore {
    fn insert(&self, trip: Trip) -> std::result::Result<(), StoreUnavailable> {
        self.maybe_outage()?;
        self.inner.insert(trip)
    }

    fn get(&self, id: TripId) -> std::result::Result<Option<Trip>, StoreUnavailable> {
        self.maybe_outage()?;
        self.inner.get(id)
    }

    fn update(
        &self,
        id: TripId,
        mutation: &mut dyn FnMut(&mut Trip) -> Result<()>,
    ) -> std::result::Result<UpdateOutcome, StoreUnavailable> {
        self.maybe_outage()?;
        self.inner.update(id, mutation)
    }

    fn snapshot(&self) -> std::result::Result<Vec<Trip>, StoreUnavailable> {
        self.maybe_outage()?;
        self.inner.snapshot()
    }
}

fn flaky_engine(failures: u32) -> (MatchingEngine<FlakyStore>, TestDispatchBuilder) {
    let builder = TestDispatchBuilder::new();
    let store = Arc::new(FlakyStore::new(failures));
    let geo = Arc::new(GeoIndex::new(GeoIndexConfig::default()));
    let clock = Arc::new(ManualClock::new(
        Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).single().expect("start"),
    ));
    let engine = MatchingEngine::new(
        store,
        geo,
        clock as Arc<dyn Clock>,
        MatchingConfig::default(),
        PricingConfig::default(),
    );
    (engine, builder)
}

/// Store that completes the trip right before the next mutation runs,
/// reproducing a lifecycle event landing between a reader's snapshot scan
/// and its guarded write.
struct FinalizeOnUpdate {
    inner: InMemoryStore,
    armed: AtomicBool,
}

impl FinalizeOnUpdate {
    fn new() -> Self {
        Self {
            inner: InMemoryStore::new(),
            armed: AtomicBool::new(false),
        }
    }

    fn arm(&self) {
        self.armed.store(true, Ordering::SeqCst);
    }
}

impl TripStore for FinalizeOnUpdate {
    fn insert(&self, trip: Trip) -> std::result::Result<(), StoreUnavailable> {
        self.inner.insert(trip)
    }

    fn get(&self, id: TripId) -> std::result::Result<Option<Trip>, StoreUnavailable> {
        self.inner.get(id)
    }

    fn update(
        &self,
        id: TripId,
        mutation: &mut dyn FnMut(&mut Trip) -> Result<()>,
    ) -> std::result::Result<UpdateOutcome, StoreUnavailable> {
        if self.armed.swap(false, Ordering::SeqCst) {
            self.inner.update(id, &mut |trip| {
                trip.status = TripStatus::Completed;
                Ok(())
            })?;
        }
        self.inner.update(id, mutation)
    }

    fn snapshot(&self) -> std::result::Result<Vec<Trip>, StoreUnavailable> {
        self.inner.snapshot()
    }
}

#[test]
fn transient_store_failures_are_retried_through() {
    // Two failures fit inside the retry budget; the caller never notices.
    let (engine, builder) = flaky_engine(2);
    let dispatch = builder.build();
    let trip = engine
        .create_trip(dispatch.standard_request("owner-1"))
        .expect("create survives a flaky store");
    assert_eq!(trip.owner_id.as_str(), "owner-1");
}

#[test]
fn exhausted_retries_surface_service_unavailable() {
    let (engine, builder) = flaky_engine(100);
    let dispatch = builder.build();
    assert_eq!(
        engine
            .create_trip(dispatch.standard_request("owner-1"))
            .expect_err("must fail"),
        DispatchError::ServiceUnavailable
    );
}

#[test]
fn location_push_racing_a_completion_never_touches_the_finalized_trip() {
    let dispatch = TestDispatchBuilder::new().build();
    let store = Arc::new(FinalizeOnUpdate::new());
    let geo = Arc::new(GeoIndex::new(GeoIndexConfig::default()));
    let clock = Arc::new(ManualClock::new(
        Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).single().expect("start"),
    ));
    let engine = MatchingEngine::new(
        store.clone(),
        geo,
        clock.clone() as Arc<dyn Clock>,
        MatchingConfig::default(),
        PricingConfig::default(),
    );

    let owner = OwnerId::new("owner-1");
    let driver = DriverId::new("d1");
    engine.set_driver_availability(&driver, true, Some(VehicleType::Sedan));
    engine
        .update_driver_location(&driver, 20.931, 77.751, None)
        .expect("initial fix");

    let trip = engine
        .create_trip(dispatch.standard_request("owner-1"))
        .expect("create");
    engine.express_interest(trip.id, &driver).expect("interest");
    engine.select_driver(trip.id, &owner, &driver).expect("select");
    engine.start_trip(trip.id, &driver).expect("start");

    clock.advance(Duration::seconds(5));
    engine
        .update_driver_location(&driver, 20.935, 77.755, None)
        .expect("in-progress push");
    let before = store
        .get(trip.id)
        .expect("get")
        .expect("trip")
        .driver_location
        .expect("snapshot");

    // The completion lands after the push's active-trip scan but before its
    // guarded write; the push must not mutate the finalized record.
    clock.advance(Duration::seconds(5));
    store.arm();
    engine
        .update_driver_location(&driver, 20.999, 77.799, None)
        .expect("push is still acknowledged");

    let raced = store.get(trip.id).expect("get").expect("trip");
    assert_eq!(raced.status, TripStatus::Completed);
    let snapshot = raced.driver_location.expect("snapshot kept");
    assert_eq!(snapshot.latitude, before.latitude);
    assert_eq!(snapshot.updated_at, before.updated_at);
}
