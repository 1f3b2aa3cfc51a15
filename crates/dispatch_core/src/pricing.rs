//! Trip fare estimation.
//!
//! The estimate is computed once, at trip creation, from cell-quantized
//! haversine distance, and stored on the trip. It is never recomputed, so the
//! price the owner saw when requesting is the price that sticks.

use serde::{Deserialize, Serialize};

use crate::trip::{TripType, VehicleType};

/// Per-kilometer rates and the fare floor, in currency units.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PricingConfig {
    pub hatchback_per_km: f64,
    pub sedan_per_km: f64,
    pub suv_per_km: f64,
    pub luxury_per_km: f64,
    /// Applied to round trips (the return leg is discounted below 2x).
    pub round_trip_multiplier: f64,
    /// No trip is priced below this, however short.
    pub minimum_fare: f64,
}

impl Default for PricingConfig {
    fn default() -> Self {
        Self {
            hatchback_per_km: 12.0,
            sedan_per_km: 15.0,
            suv_per_km: 18.0,
            luxury_per_km: 25.0,
            round_trip_multiplier: 1.8,
            minimum_fare: 150.0,
        }
    }
}

impl PricingConfig {
    pub fn per_km(&self, vehicle: VehicleType) -> f64 {
        match vehicle {
            VehicleType::Hatchback => self.hatchback_per_km,
            VehicleType::Sedan => self.sedan_per_km,
            VehicleType::Suv => self.suv_per_km,
            VehicleType::Luxury => self.luxury_per_km,
        }
    }

    pub fn multiplier(&self, trip_type: TripType) -> f64 {
        match trip_type {
            TripType::OneWay => 1.0,
            TripType::RoundTrip => self.round_trip_multiplier,
        }
    }

    /// `max(minimum_fare, distance_km * per_km * multiplier)`, rounded to
    /// whole currency units.
    pub fn estimate(&self, distance_km: f64, vehicle: VehicleType, trip_type: TripType) -> f64 {
        let raw = distance_km * self.per_km(vehicle) * self.multiplier(trip_type);
        raw.max(self.minimum_fare).round()
    }
}
