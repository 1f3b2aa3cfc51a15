#![allow(dead_code)]

use std::sync::Arc;

use chrono::{DateTime, TimeZone, Utc};
use dispatch_core::clock::{Clock, ManualClock};
use dispatch_core::matching::{CreateTrip, MatchingConfig, MatchingEngine};
use dispatch_core::pricing::PricingConfig;
use dispatch_core::spatial::{GeoIndex, GeoIndexConfig};
use dispatch_core::store::InMemoryStore;
use dispatch_core::trip::{DriverId, GeoPoint, OwnerId, Place, TripType, VehicleType};
use dispatch_core::views::{FeedConfig, SyncGateway};

/// Builder for a fully wired in-memory dispatch core with a pinned clock.
#[derive(Debug, Clone)]
pub struct TestDispatchBuilder {
    pub matching: MatchingConfig,
    pub pricing: PricingConfig,
    pub feed: FeedConfig,
    pub geo: GeoIndexConfig,
    pub start: DateTime<Utc>,
}

impl Default for TestDispatchBuilder {
    fn default() -> Self {
        Self {
            matching: MatchingConfig::default(),
            pricing: PricingConfig::default(),
            feed: FeedConfig::default(),
            geo: GeoIndexConfig::default(),
            start: Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).single().expect("start time"),
        }
    }
}

impl TestDispatchBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_feed_radius_km(mut self, radius: f64) -> Self {
        self.feed.service_radius_km = radius;
        self
    }

    pub fn build(self) -> TestDispatch {
        let store = Arc::new(InMemoryStore::new());
        let geo = Arc::new(GeoIndex::new(self.geo));
        let clock = Arc::new(ManualClock::new(self.start));
        let engine = MatchingEngine::new(
            store.clone(),
            geo.clone(),
            clock.clone() as Arc<dyn Clock>,
            self.matching,
            self.pricing,
        );
        let gateway = SyncGateway::new(
            store.clone(),
            geo.clone(),
            clock.clone() as Arc<dyn Clock>,
            self.feed,
        );
        TestDispatch {
            store,
            geo,
            clock,
            engine,
            gateway,
        }
    }
}

pub struct TestDispatch {
    pub store: Arc<InMemoryStore>,
    pub geo: Arc<GeoIndex>,
    pub clock: Arc<ManualClock>,
    pub engine: MatchingEngine<InMemoryStore>,
    pub gateway: SyncGateway<InMemoryStore>,
}

impl TestDispatch {
    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    /// Bring a driver online near the given point and report a fresh fix.
    pub fn online_driver(
        &self,
        id: &str,
        lat: f64,
        lng: f64,
        vehicle: VehicleType,
    ) -> DriverId {
        let driver = DriverId::new(id);
        self.engine
            .set_driver_availability(&driver, true, Some(vehicle));
        self.engine
            .update_driver_location(&driver, lat, lng, Some(0.0))
            .expect("location update");
        driver
    }

    /// A creation request for the standard Amravati pickup/dropoff pair.
    pub fn standard_request(&self, owner: &str) -> CreateTrip {
        CreateTrip {
            owner_id: OwnerId::new(owner),
            pickup: place("Rajkamal Square", 20.93, 77.75),
            dropoff: place("Railway Station", 20.94, 77.76),
            vehicle_type: VehicleType::Sedan,
            trip_type: TripType::OneWay,
            scheduled_start_time: self.now(),
        }
    }
}

pub fn place(name: &str, lat: f64, lng: f64) -> Place {
    Place {
        name: name.into(),
        address: format!("{name}, Amravati"),
        point: GeoPoint::new(lat, lng),
    }
}
