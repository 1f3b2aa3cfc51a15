//! Trip data model: ids, places, statuses and the trip record itself.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub type TripId = Uuid;

/// Identity of a driver, supplied by the auth/session layer.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DriverId(pub String);

impl DriverId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DriverId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Identity of a trip owner (the requester).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OwnerId(pub String);

impl OwnerId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for OwnerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A WGS84 coordinate pair in degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub latitude: f64,
    pub longitude: f64,
}

impl GeoPoint {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }
}

/// A named location: what the owner typed plus resolved coordinates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Place {
    pub name: String,
    pub address: String,
    #[serde(flatten)]
    pub point: GeoPoint,
}

/// Vehicle category used for pricing and matching.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VehicleType {
    Hatchback,
    Sedan,
    Suv,
    Luxury,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TripType {
    OneWay,
    RoundTrip,
}

/// Trip lifecycle status. Transitions are enforced by [`crate::lifecycle`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TripStatus {
    Open,
    Accepted,
    InProgress,
    Completed,
    Cancelled,
}

impl TripStatus {
    /// Terminal statuses reject all further transitions.
    pub fn is_terminal(self) -> bool {
        matches!(self, TripStatus::Completed | TripStatus::Cancelled)
    }

    /// A driver on an Accepted or InProgress trip is considered busy.
    pub fn is_active_assignment(self) -> bool {
        matches!(self, TripStatus::Accepted | TripStatus::InProgress)
    }
}

/// A driver's non-binding signal of willingness to take an open trip.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Interest {
    pub driver_id: DriverId,
    pub responded_at: DateTime<Utc>,
}

/// Last known position report for a driver.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DriverFix {
    pub latitude: f64,
    pub longitude: f64,
    /// Compass heading in degrees, if the device reported one.
    pub heading: Option<f64>,
    pub updated_at: DateTime<Utc>,
}

impl DriverFix {
    pub fn point(&self) -> GeoPoint {
        GeoPoint::new(self.latitude, self.longitude)
    }
}

/// A single requested transport job.
///
/// `pickup`, `dropoff`, `vehicle_type`, `trip_type` and `estimated_price` are
/// set at creation and never rewritten; route changes mean a new trip. The
/// store only mutates trips through guarded closures, which keeps the
/// append-only / set-once invariants on `interested_drivers` and
/// `assigned_driver` enforceable in one place.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Trip {
    pub id: TripId,
    pub owner_id: OwnerId,
    pub pickup: Place,
    pub dropoff: Place,
    pub vehicle_type: VehicleType,
    pub trip_type: TripType,
    pub scheduled_start_time: DateTime<Utc>,
    /// Computed once at creation; never recomputed (price integrity).
    pub estimated_price: f64,
    pub status: TripStatus,
    /// Append-only while the trip is Open; frozen afterwards.
    pub interested_drivers: Vec<Interest>,
    /// Set exactly once, on the Open -> Accepted transition.
    pub assigned_driver_id: Option<DriverId>,
    /// Last known position of the assigned driver, for the owner's map.
    pub driver_location: Option<DriverFix>,
    pub created_at: DateTime<Utc>,
}

impl Trip {
    pub fn is_interested(&self, driver: &DriverId) -> bool {
        self.interested_drivers
            .iter()
            .any(|i| &i.driver_id == driver)
    }

    pub fn is_assigned_to(&self, driver: &DriverId) -> bool {
        self.assigned_driver_id.as_ref() == Some(driver)
    }
}
