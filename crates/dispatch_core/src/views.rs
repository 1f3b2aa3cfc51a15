//! Polling read model: the views the owner and driver apps refresh every few
//! seconds. Pure reads over the trip store and geo index — no side effects,
//! so heavy polling creates no write contention.

use std::sync::Arc;

use serde::Serialize;

use crate::clock::Clock;
use crate::error::{DispatchError, Result};
use crate::spatial::{cell_for_point, distance_km_between_cells, GeoIndex};
use crate::store::{with_retries, TripStore};
use crate::trip::{DriverId, Trip, TripId, TripStatus};

#[derive(Debug, Clone, Copy)]
pub struct FeedConfig {
    /// How far from the driver's current position open trips are offered (km).
    pub service_radius_km: f64,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            service_radius_km: 10.0,
        }
    }
}

/// One open trip offered to a driver, with the distance that ranked it.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedEntry {
    #[serde(flatten)]
    pub trip: Trip,
    pub pickup_distance_km: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum ViewerRole {
    Owner,
    AssignedDriver,
}

/// A trip as seen by one caller. The interest list is owner-only; the
/// assigned driver gets the trip with that list stripped.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TripDetails {
    #[serde(flatten)]
    pub trip: Trip,
    pub viewer_role: ViewerRole,
}

pub struct SyncGateway<S: TripStore> {
    store: Arc<S>,
    geo: Arc<GeoIndex>,
    clock: Arc<dyn Clock>,
    config: FeedConfig,
}

impl<S: TripStore> SyncGateway<S> {
    pub fn new(
        store: Arc<S>,
        geo: Arc<GeoIndex>,
        clock: Arc<dyn Clock>,
        config: FeedConfig,
    ) -> Self {
        Self {
            store,
            geo,
            clock,
            config,
        }
    }

    /// Open trips this driver may take, nearest pickup first.
    ///
    /// Empty when the driver is offline, has a stale position, or is already
    /// bound to an active trip. Trips the driver has expressed interest in
    /// are omitted (the client tracks its own pending interests).
    pub fn available_feed(&self, driver: &DriverId) -> Result<Vec<FeedEntry>> {
        let now = self.clock.now();
        let Some(fix) = self.geo.fresh_fix(driver, now) else {
            return Ok(Vec::new());
        };
        let trips = with_retries("scan_trips", || self.store.snapshot())?;
        let busy = trips
            .iter()
            .any(|t| t.status.is_active_assignment() && t.is_assigned_to(driver));
        if busy {
            return Ok(Vec::new());
        }

        let resolution = self.geo.resolution();
        let origin = cell_for_point(fix.point(), resolution)?;
        let vehicle = self.geo.vehicle_type(driver);

        let mut entries: Vec<FeedEntry> = trips
            .into_iter()
            .filter_map(|trip| {
                if trip.status != TripStatus::Open || trip.is_interested(driver) {
                    return None;
                }
                if let Some(wanted) = vehicle {
                    if trip.vehicle_type != wanted {
                        return None;
                    }
                }
                let pickup = cell_for_point(trip.pickup.point, resolution).ok()?;
                let pickup_distance_km = distance_km_between_cells(origin, pickup);
                (pickup_distance_km <= self.config.service_radius_km).then_some(FeedEntry {
                    trip,
                    pickup_distance_km,
                })
            })
            .collect();
        entries.sort_by(|a, b| a.pickup_distance_km.total_cmp(&b.pickup_distance_km));
        Ok(entries)
    }

    /// Full trip record, scoped by the caller's role.
    ///
    /// Only the owner and the assigned driver may read a trip; prospective
    /// drivers act on feed entries instead.
    pub fn trip_details(&self, trip_id: TripId, caller: &str) -> Result<TripDetails> {
        let trip = with_retries("get_trip", || self.store.get(trip_id))?
            .ok_or(DispatchError::NotFound)?;

        if trip.owner_id.as_str() == caller {
            return Ok(TripDetails {
                trip,
                viewer_role: ViewerRole::Owner,
            });
        }
        if trip
            .assigned_driver_id
            .as_ref()
            .is_some_and(|d| d.as_str() == caller)
        {
            let mut trip = trip;
            trip.interested_drivers.clear();
            return Ok(TripDetails {
                trip,
                viewer_role: ViewerRole::AssignedDriver,
            });
        }
        Err(DispatchError::Unauthorized)
    }

    /// The trip this driver has been hired for, if any — how the driver app
    /// detects assignment without a push channel.
    pub fn my_accepted_trip(&self, driver: &DriverId) -> Result<Option<Trip>> {
        let trips = with_retries("scan_trips", || self.store.snapshot())?;
        Ok(trips
            .into_iter()
            .filter(|t| t.status.is_active_assignment() && t.is_assigned_to(driver))
            .min_by_key(|t| t.created_at))
    }
}
