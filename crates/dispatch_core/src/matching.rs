//! Matching engine: the write side of the dispatch core.
//!
//! Owns trip creation, driver interest, the atomic assign operation and the
//! lifecycle events. Feed membership is deliberately not snapshotted at
//! creation: drivers move and toggle availability continuously, so the feed
//! query recomputes eligibility on every poll and creation only sizes the
//! initial candidate pool for logging and radius tuning.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};

use crate::clock::Clock;
use crate::error::{DispatchError, Result};
use crate::lifecycle::{self, Caller, TripEvent};
use crate::pricing::PricingConfig;
use crate::spatial::{self, GeoIndex};
use crate::store::{with_retries, TripStore};
use crate::trip::{
    DriverFix, DriverId, Interest, OwnerId, Place, Trip, TripId, TripStatus, TripType, VehicleType,
};

#[derive(Debug, Clone, Copy)]
pub struct MatchingConfig {
    /// Initial candidate search radius around the pickup (km).
    pub default_radius_km: f64,
    /// Hard cap for the expanding candidate search (km).
    pub max_radius_km: f64,
    /// Stop expanding once at least this many candidates are found.
    pub min_candidates: usize,
    /// Maximum drivers returned per candidate query.
    pub candidate_limit: usize,
    /// Scheduled start times may lag `now` by up to this much at creation.
    pub schedule_grace: Duration,
}

impl Default for MatchingConfig {
    fn default() -> Self {
        Self {
            default_radius_km: 5.0,
            max_radius_km: 20.0,
            min_candidates: 3,
            candidate_limit: 25,
            schedule_grace: Duration::minutes(5),
        }
    }
}

/// Parameters for creating a trip. `estimated_price` is absent on purpose:
/// the engine computes and stores its own estimate.
#[derive(Debug, Clone)]
pub struct CreateTrip {
    pub owner_id: OwnerId,
    pub pickup: Place,
    pub dropoff: Place,
    pub vehicle_type: VehicleType,
    pub trip_type: TripType,
    pub scheduled_start_time: DateTime<Utc>,
}

pub struct MatchingEngine<S: TripStore> {
    store: Arc<S>,
    geo: Arc<GeoIndex>,
    clock: Arc<dyn Clock>,
    config: MatchingConfig,
    pricing: PricingConfig,
}

impl<S: TripStore> MatchingEngine<S> {
    pub fn new(
        store: Arc<S>,
        geo: Arc<GeoIndex>,
        clock: Arc<dyn Clock>,
        config: MatchingConfig,
        pricing: PricingConfig,
    ) -> Self {
        Self {
            store,
            geo,
            clock,
            config,
            pricing,
        }
    }

    /// Validate, price and persist a new trip, then size the candidate pool.
    pub fn create_trip(&self, request: CreateTrip) -> Result<Trip> {
        let now = self.clock.now();
        validate_place(&request.pickup, "pickup")?;
        validate_place(&request.dropoff, "dropoff")?;
        if request.pickup.point == request.dropoff.point {
            return Err(DispatchError::Validation(
                "pickup and dropoff must be different locations".into(),
            ));
        }
        if request.scheduled_start_time < now - self.config.schedule_grace {
            return Err(DispatchError::Validation(
                "scheduled start time is in the past".into(),
            ));
        }

        let distance_km = spatial::distance_km_between(
            request.pickup.point,
            request.dropoff.point,
            self.geo.resolution(),
        )?;
        let estimated_price =
            self.pricing
                .estimate(distance_km, request.vehicle_type, request.trip_type);

        let trip = Trip {
            id: uuid::Uuid::new_v4(),
            owner_id: request.owner_id,
            pickup: request.pickup,
            dropoff: request.dropoff,
            vehicle_type: request.vehicle_type,
            trip_type: request.trip_type,
            scheduled_start_time: request.scheduled_start_time,
            estimated_price,
            status: TripStatus::Open,
            interested_drivers: Vec::new(),
            assigned_driver_id: None,
            driver_location: None,
            created_at: now,
        };
        with_retries("insert_trip", || self.store.insert(trip.clone()))?;

        let (candidates, radius_km) =
            self.candidate_pool(trip.pickup.point, trip.vehicle_type, now)?;
        tracing::info!(
            trip_id = %trip.id,
            distance_km,
            estimated_price,
            candidates = candidates.len(),
            radius_km,
            "trip opened"
        );
        Ok(trip)
    }

    /// Query the geo index around `pickup`, doubling the radius until the
    /// pool is large enough or the cap is reached.
    fn candidate_pool(
        &self,
        pickup: crate::trip::GeoPoint,
        vehicle: VehicleType,
        now: DateTime<Utc>,
    ) -> Result<(Vec<(DriverId, f64)>, f64)> {
        let mut radius_km = self.config.default_radius_km;
        loop {
            let found = self.geo.nearby_drivers(
                pickup,
                radius_km,
                Some(vehicle),
                self.config.candidate_limit,
                now,
            )?;
            if found.len() >= self.config.min_candidates
                || radius_km >= self.config.max_radius_km
            {
                return Ok((found, radius_km));
            }
            radius_km = (radius_km * 2.0).min(self.config.max_radius_km);
        }
    }

    /// Record a driver's non-binding interest in an open trip.
    ///
    /// Idempotent per driver: a repeated call is a no-op, never a duplicate
    /// entry (mobile clients retry on timeouts).
    pub fn express_interest(&self, trip_id: TripId, driver: &DriverId) -> Result<Trip> {
        let responded_at = self.clock.now();
        let outcome = with_retries("express_interest", || {
            self.store.update(trip_id, &mut |trip| {
                if trip.status != TripStatus::Open {
                    return Err(DispatchError::InvalidState);
                }
                if !trip.is_interested(driver) {
                    trip.interested_drivers.push(Interest {
                        driver_id: driver.clone(),
                        responded_at,
                    });
                }
                Ok(())
            })
        })?;
        let trip = outcome.ok_or(DispatchError::NotFound)??;
        tracing::debug!(trip_id = %trip.id, %driver, "driver interest recorded");
        Ok(trip)
    }

    /// Owner selects one interested driver: the single point where
    /// "assign exactly one driver" must hold. The store's per-trip critical
    /// section guarantees that of N concurrent calls exactly one sees
    /// `Open` and commits; the rest fail with `InvalidState`.
    pub fn select_driver(
        &self,
        trip_id: TripId,
        owner: &OwnerId,
        driver: &DriverId,
    ) -> Result<Trip> {
        self.ensure_driver_not_busy(driver)?;
        let outcome = with_retries("select_driver", || {
            self.store.update(trip_id, &mut |trip| {
                if owner != &trip.owner_id {
                    return Err(DispatchError::Unauthorized);
                }
                if trip.status != TripStatus::Open {
                    return Err(DispatchError::InvalidState);
                }
                if !trip.is_interested(driver) {
                    return Err(DispatchError::NotInterested);
                }
                trip.status = lifecycle::next_status(trip.status, TripEvent::SelectDriver)?;
                trip.assigned_driver_id = Some(driver.clone());
                Ok(())
            })
        })?;
        let trip = outcome.ok_or(DispatchError::NotFound)??;
        tracing::info!(trip_id = %trip.id, %driver, "driver assigned");
        Ok(trip)
    }

    /// Legacy direct accept: the driver self-assigns an open trip.
    ///
    /// Collapses to the same assign path as [`Self::select_driver`] —
    /// interest is recorded implicitly, and the status check under the
    /// critical section keeps exactly-one-assignment intact across a mixed
    /// select/accept race.
    pub fn accept_trip(&self, trip_id: TripId, driver: &DriverId) -> Result<Trip> {
        self.ensure_driver_not_busy(driver)?;
        let responded_at = self.clock.now();
        let outcome = with_retries("accept_trip", || {
            self.store.update(trip_id, &mut |trip| {
                if trip.status != TripStatus::Open {
                    return Err(DispatchError::InvalidState);
                }
                if !trip.is_interested(driver) {
                    trip.interested_drivers.push(Interest {
                        driver_id: driver.clone(),
                        responded_at,
                    });
                }
                trip.status = lifecycle::next_status(trip.status, TripEvent::SelectDriver)?;
                trip.assigned_driver_id = Some(driver.clone());
                Ok(())
            })
        })?;
        let trip = outcome.ok_or(DispatchError::NotFound)??;
        tracing::info!(trip_id = %trip.id, %driver, "driver self-accepted");
        Ok(trip)
    }

    pub fn start_trip(&self, trip_id: TripId, driver: &DriverId) -> Result<Trip> {
        self.apply_event("start_trip", trip_id, TripEvent::StartTrip, Caller::Driver(driver))
    }

    pub fn complete_trip(&self, trip_id: TripId, driver: &DriverId) -> Result<Trip> {
        self.apply_event(
            "complete_trip",
            trip_id,
            TripEvent::CompleteTrip,
            Caller::Driver(driver),
        )
    }

    pub fn cancel_trip(&self, trip_id: TripId, caller: Caller<'_>) -> Result<Trip> {
        self.apply_event("cancel_trip", trip_id, TripEvent::Cancel, caller)
    }

    /// Map a requested target status to a lifecycle event and apply it.
    /// `ACCEPTED` is not reachable this way; assignment goes through
    /// [`Self::select_driver`].
    pub fn request_status(
        &self,
        trip_id: TripId,
        target: TripStatus,
        caller: Caller<'_>,
    ) -> Result<Trip> {
        let event = match target {
            TripStatus::InProgress => TripEvent::StartTrip,
            TripStatus::Completed => TripEvent::CompleteTrip,
            TripStatus::Cancelled => TripEvent::Cancel,
            TripStatus::Open | TripStatus::Accepted => {
                return Err(DispatchError::Validation(format!(
                    "status {target:?} cannot be requested directly"
                )));
            }
        };
        self.apply_event("request_status", trip_id, event, caller)
    }

    fn apply_event(
        &self,
        op: &'static str,
        trip_id: TripId,
        event: TripEvent,
        caller: Caller<'_>,
    ) -> Result<Trip> {
        let outcome = with_retries(op, || {
            self.store.update(trip_id, &mut |trip| {
                let next = lifecycle::next_status(trip.status, event)?;
                lifecycle::authorize(trip, event, caller)?;
                trip.status = next;
                Ok(())
            })
        })?;
        let trip = outcome.ok_or(DispatchError::NotFound)??;
        tracing::info!(trip_id = %trip.id, status = ?trip.status, "trip status changed");
        Ok(trip)
    }

    /// Record a position report. The geo index applies last-writer-wins; the
    /// assigned trip's location snapshot (what the owner's map shows) is
    /// refreshed under the same rule.
    pub fn update_driver_location(
        &self,
        driver: &DriverId,
        latitude: f64,
        longitude: f64,
        heading: Option<f64>,
    ) -> Result<DriverFix> {
        let fix = DriverFix {
            latitude,
            longitude,
            heading,
            updated_at: self.clock.now(),
        };
        self.geo.update_location(driver, fix)?;

        if let Some(active) = self.active_trip_for(driver)? {
            let outcome = with_retries("update_trip_location", || {
                self.store.update(active.id, &mut |trip| {
                    let newer = trip
                        .driver_location
                        .map_or(true, |current| current.updated_at <= fix.updated_at);
                    // Re-check under the trip lock: the trip may have been
                    // completed or cancelled since the snapshot scan above.
                    if newer && trip.status.is_active_assignment() && trip.is_assigned_to(driver) {
                        trip.driver_location = Some(fix);
                    }
                    Ok(())
                })
            })?;
            outcome.ok_or(DispatchError::NotFound)??;
        }
        Ok(fix)
    }

    /// Idempotent availability toggle; returns the authoritative value.
    /// `vehicle_type`, when provided, refreshes the driver's match category.
    pub fn set_driver_availability(
        &self,
        driver: &DriverId,
        is_available: bool,
        vehicle_type: Option<VehicleType>,
    ) -> bool {
        if let Some(vehicle) = vehicle_type {
            self.geo.set_vehicle_type(driver, vehicle);
        }
        let authoritative = self.geo.set_availability(driver, is_available);
        tracing::info!(%driver, is_available = authoritative, "driver availability updated");
        authoritative
    }

    /// The trip currently binding this driver, if any.
    pub fn active_trip_for(&self, driver: &DriverId) -> Result<Option<Trip>> {
        let trips = with_retries("scan_trips", || self.store.snapshot())?;
        // Checked outside any per-trip critical section: one driver on two
        // trips is prevented best-effort, exactly-one-per-trip is exact.
        Ok(trips
            .into_iter()
            .find(|t| t.status.is_active_assignment() && t.is_assigned_to(driver)))
    }

    fn ensure_driver_not_busy(&self, driver: &DriverId) -> Result<()> {
        if self.active_trip_for(driver)?.is_some() {
            return Err(DispatchError::DriverBusy);
        }
        Ok(())
    }
}

fn validate_place(place: &Place, label: &str) -> Result<()> {
    if place.name.trim().is_empty() {
        return Err(DispatchError::Validation(format!("{label} name is required")));
    }
    if place.address.trim().is_empty() {
        return Err(DispatchError::Validation(format!(
            "{label} address is required"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;
    use crate::clock::SystemClock;
    use crate::spatial::GeoIndexConfig;
    use crate::store::InMemoryStore;
    use crate::trip::GeoPoint;

    fn engine() -> MatchingEngine<InMemoryStore> {
        MatchingEngine::new(
            Arc::new(InMemoryStore::new()),
            Arc::new(GeoIndex::new(GeoIndexConfig::default())),
            Arc::new(SystemClock),
            MatchingConfig::default(),
            PricingConfig::default(),
        )
    }

    fn online(engine: &MatchingEngine<InMemoryStore>, id: &str, lat: f64, lng: f64) -> DriverId {
        let driver = DriverId::new(id);
        engine.set_driver_availability(&driver, true, Some(VehicleType::Sedan));
        engine
            .update_driver_location(&driver, lat, lng, None)
            .expect("location");
        driver
    }

    #[test]
    fn pool_radius_expands_until_enough_candidates() {
        let engine = engine();
        let pickup = GeoPoint::new(20.93, 77.75);

        // One driver inside the default 5 km radius, one ~12 km out.
        online(&engine, "near", 20.935, 77.755);
        online(&engine, "far", 21.04, 77.75);

        let (pool, radius_km) = engine
            .candidate_pool(pickup, VehicleType::Sedan, Utc::now())
            .expect("pool");
        assert_eq!(pool.len(), 2, "expansion must reach the far driver");
        assert!(radius_km > engine.config.default_radius_km);
        assert!(radius_km <= engine.config.max_radius_km);
    }

    #[test]
    fn pool_expansion_stops_at_the_cap() {
        let engine = engine();
        let pickup = GeoPoint::new(20.93, 77.75);

        let (pool, radius_km) = engine
            .candidate_pool(pickup, VehicleType::Sedan, Utc::now())
            .expect("pool");
        assert!(pool.is_empty());
        assert_eq!(radius_km, engine.config.max_radius_km);
    }

    #[test]
    fn pool_stops_early_when_enough_nearby() {
        let engine = engine();
        let pickup = GeoPoint::new(20.93, 77.75);

        for i in 0..3 {
            online(&engine, &format!("d{i}"), 20.931 + i as f64 * 0.001, 77.751);
        }

        let (pool, radius_km) = engine
            .candidate_pool(pickup, VehicleType::Sedan, Utc::now())
            .expect("pool");
        assert_eq!(pool.len(), 3);
        assert_eq!(radius_km, engine.config.default_radius_km);
    }

    #[test]
    fn place_validation_rejects_blanks() {
        let bad = Place {
            name: "".into(),
            address: "somewhere".into(),
            point: GeoPoint::new(20.93, 77.75),
        };
        assert!(matches!(
            validate_place(&bad, "pickup").expect_err("must fail"),
            DispatchError::Validation(_)
        ));
    }
}
