//! Geo index: driver availability, last-known locations and proximity queries.
//!
//! Positions are quantized to H3 cells (default resolution 9, ~240m cells)
//! before distance calculations, which makes the haversine LRU cache
//! effective: drivers polling from the same block hit the same cell pair.

use std::collections::HashMap;
use std::num::NonZeroUsize;
use std::sync::{Mutex, OnceLock, RwLock};

use chrono::{DateTime, Duration, Utc};
use h3o::{CellIndex, LatLng, Resolution};
use lru::LruCache;

use crate::error::{DispatchError, Result};
use crate::trip::{DriverFix, DriverId, GeoPoint, VehicleType};

/// Uncached haversine distance between two cell centers.
fn distance_km_between_cells_uncached(a: CellIndex, b: CellIndex) -> f64 {
    let a: LatLng = a.into();
    let b: LatLng = b.into();
    let (lat1, lon1) = (a.lat().to_radians(), a.lng().to_radians());
    let (lat2, lon2) = (b.lat().to_radians(), b.lng().to_radians());
    let dlat = lat2 - lat1;
    let dlon = lon2 - lon1;
    let sin_dlat = (dlat * 0.5).sin();
    let sin_dlon = (dlon * 0.5).sin();
    let h = sin_dlat * sin_dlat + lat1.cos() * lat2.cos() * sin_dlon * sin_dlon;
    let c = 2.0 * h.sqrt().atan2((1.0 - h).sqrt());
    6371.0 * c
}

/// Global distance cache (50,000 entries).
fn get_distance_cache() -> &'static Mutex<LruCache<(CellIndex, CellIndex), f64>> {
    static CACHE: OnceLock<Mutex<LruCache<(CellIndex, CellIndex), f64>>> = OnceLock::new();
    CACHE.get_or_init(|| {
        Mutex::new(LruCache::new(
            NonZeroUsize::new(50_000).expect("cache size must be non-zero"),
        ))
    })
}

/// Distance between two H3 cells with LRU caching.
pub fn distance_km_between_cells(a: CellIndex, b: CellIndex) -> f64 {
    // Symmetric key (smaller cell first) to maximize cache hits.
    let key = if a < b { (a, b) } else { (b, a) };

    let mut cache = match get_distance_cache().lock() {
        Ok(guard) => guard,
        Err(_) => return distance_km_between_cells_uncached(key.0, key.1),
    };
    *cache.get_or_insert(key, || distance_km_between_cells_uncached(key.0, key.1))
}

/// Quantize a coordinate pair to a cell at `resolution`.
pub fn cell_for_point(point: GeoPoint, resolution: Resolution) -> Result<CellIndex> {
    let latlng = LatLng::new(point.latitude, point.longitude)
        .map_err(|e| DispatchError::Validation(format!("invalid coordinates: {e}")))?;
    Ok(latlng.to_cell(resolution))
}

/// Cell-quantized distance between two coordinate pairs.
pub fn distance_km_between(a: GeoPoint, b: GeoPoint, resolution: Resolution) -> Result<f64> {
    Ok(distance_km_between_cells(
        cell_for_point(a, resolution)?,
        cell_for_point(b, resolution)?,
    ))
}

#[derive(Debug, Clone, Copy)]
pub struct GeoIndexConfig {
    pub resolution: Resolution,
    /// Location fixes older than this are invisible to proximity queries.
    pub location_staleness: Duration,
}

impl Default for GeoIndexConfig {
    fn default() -> Self {
        Self {
            resolution: Resolution::Nine,
            location_staleness: Duration::minutes(2),
        }
    }
}

#[derive(Debug, Clone, Default)]
struct DriverRecord {
    is_available: bool,
    vehicle_type: Option<VehicleType>,
    last_fix: Option<DriverFix>,
    cell: Option<CellIndex>,
}

/// Authoritative driver availability + last-known-location state.
///
/// Written only by drivers (status toggles and periodic location pushes);
/// read by the matching engine and the feed. All writes are idempotent
/// upserts.
#[derive(Debug, Default)]
pub struct GeoIndex {
    config: GeoIndexConfig,
    records: RwLock<HashMap<DriverId, DriverRecord>>,
}

impl GeoIndex {
    pub fn new(config: GeoIndexConfig) -> Self {
        Self {
            config,
            records: RwLock::new(HashMap::new()),
        }
    }

    pub fn resolution(&self) -> Resolution {
        self.config.resolution
    }

    /// Upsert a driver's position. Last writer wins by `updated_at`: an
    /// update older than the stored fix is discarded (out-of-order delivery
    /// is expected from mobile clients).
    pub fn update_location(&self, driver: &DriverId, fix: DriverFix) -> Result<()> {
        let cell = cell_for_point(fix.point(), self.config.resolution)?;
        let mut records = self.records.write().expect("geo index lock");
        let record = records.entry(driver.clone()).or_default();
        if let Some(existing) = &record.last_fix {
            if existing.updated_at > fix.updated_at {
                tracing::debug!(%driver, "discarding out-of-order location update");
                return Ok(());
            }
        }
        record.last_fix = Some(fix);
        record.cell = Some(cell);
        Ok(())
    }

    /// Idempotent availability toggle. Returns the authoritative value so the
    /// caller can reconcile optimistic client state.
    pub fn set_availability(&self, driver: &DriverId, is_available: bool) -> bool {
        let mut records = self.records.write().expect("geo index lock");
        let record = records.entry(driver.clone()).or_default();
        record.is_available = is_available;
        record.is_available
    }

    /// Record the driver's vehicle category (from onboarding) for match filters.
    pub fn set_vehicle_type(&self, driver: &DriverId, vehicle_type: VehicleType) {
        let mut records = self.records.write().expect("geo index lock");
        records.entry(driver.clone()).or_default().vehicle_type = Some(vehicle_type);
    }

    pub fn last_fix(&self, driver: &DriverId) -> Option<DriverFix> {
        let records = self.records.read().expect("geo index lock");
        records.get(driver).and_then(|r| r.last_fix)
    }

    pub fn vehicle_type(&self, driver: &DriverId) -> Option<VehicleType> {
        let records = self.records.read().expect("geo index lock");
        records.get(driver).and_then(|r| r.vehicle_type)
    }

    pub fn is_available(&self, driver: &DriverId) -> bool {
        let records = self.records.read().expect("geo index lock");
        records.get(driver).is_some_and(|r| r.is_available)
    }

    /// The driver's fix, only if they are available and the fix is fresh.
    pub fn fresh_fix(&self, driver: &DriverId, now: DateTime<Utc>) -> Option<DriverFix> {
        let records = self.records.read().expect("geo index lock");
        let record = records.get(driver)?;
        if !record.is_available {
            return None;
        }
        let fix = record.last_fix?;
        if now - fix.updated_at > self.config.location_staleness {
            return None;
        }
        Some(fix)
    }

    /// Available drivers within `radius_km` of `point`, distance ascending.
    ///
    /// Drivers that are offline, have never reported a position, or whose fix
    /// is older than the staleness threshold are excluded. An empty result is
    /// a normal outcome, not an error.
    pub fn nearby_drivers(
        &self,
        point: GeoPoint,
        radius_km: f64,
        vehicle_filter: Option<VehicleType>,
        limit: usize,
        now: DateTime<Utc>,
    ) -> Result<Vec<(DriverId, f64)>> {
        let origin = cell_for_point(point, self.config.resolution)?;
        let records = self.records.read().expect("geo index lock");

        let mut found: Vec<(DriverId, f64)> = records
            .iter()
            .filter_map(|(driver, record)| {
                if !record.is_available {
                    return None;
                }
                if let Some(wanted) = vehicle_filter {
                    if record.vehicle_type != Some(wanted) {
                        return None;
                    }
                }
                let fix = record.last_fix?;
                if now - fix.updated_at > self.config.location_staleness {
                    return None;
                }
                let cell = record.cell?;
                let distance = distance_km_between_cells(origin, cell);
                (distance <= radius_km).then(|| (driver.clone(), distance))
            })
            .collect();

        found.sort_by(|a, b| a.1.total_cmp(&b.1));
        found.truncate(limit);
        Ok(found)
    }
}
