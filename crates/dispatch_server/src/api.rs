//! Axum REST API handlers.
//!
//! Handlers are thin translations between the wire and `dispatch_core`; all
//! rules live in the engine and the read views. Identity arrives in the
//! `x-user-id` header — the auth/session layer in front of this service is
//! expected to have verified it.

use std::sync::Arc;

use axum::extract::{FromRequestParts, Path, State};
use axum::http::request::Parts;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::{async_trait, Json};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use dispatch_core::error::DispatchError;
use dispatch_core::lifecycle::Caller;
use dispatch_core::matching::{CreateTrip, MatchingEngine};
use dispatch_core::store::InMemoryStore;
use dispatch_core::trip::{
    DriverFix, DriverId, OwnerId, Place, Trip, TripStatus, TripType, VehicleType,
};
use dispatch_core::views::{FeedEntry, SyncGateway, TripDetails};

use crate::errors::ApiError;

pub struct AppState {
    pub engine: MatchingEngine<InMemoryStore>,
    pub gateway: SyncGateway<InMemoryStore>,
}

/// Caller identity from the `x-user-id` header.
pub struct Identity(pub String);

#[async_trait]
impl<S> FromRequestParts<S> for Identity
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .headers
            .get("x-user-id")
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .map(|id| Identity(id.to_string()))
            .ok_or(ApiError::MissingIdentity)
    }
}

// ─────────────────────────────────────────────────────────
// Request / response shapes
// ─────────────────────────────────────────────────────────

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateTripRequest {
    pub pickup: Place,
    pub dropoff: Place,
    pub vehicle_type: VehicleType,
    pub trip_type: TripType,
    pub scheduled_start_time: DateTime<Utc>,
    /// Clients send their locally displayed estimate; the server's computed
    /// price is authoritative and this field is ignored.
    #[serde(default)]
    pub estimated_price: Option<f64>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SelectDriverRequest {
    pub driver_id: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateStatusRequest {
    pub status: TripStatus,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LocationUpdateRequest {
    pub latitude: f64,
    pub longitude: f64,
    #[serde(default)]
    pub heading: Option<f64>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AvailabilityRequest {
    pub is_available: bool,
    /// Optionally refreshes the driver's vehicle category for match filters.
    #[serde(default)]
    pub vehicle_type: Option<VehicleType>,
}

#[derive(Serialize)]
pub struct TripResponse {
    pub trip: Trip,
}

#[derive(Serialize)]
pub struct TripDetailsResponse {
    pub trip: TripDetails,
}

#[derive(Serialize)]
pub struct FeedResponse {
    pub count: usize,
    pub trips: Vec<FeedEntry>,
}

#[derive(Serialize)]
pub struct MyAcceptedTripResponse {
    pub trip: Option<Trip>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LocationAck {
    pub location: DriverFix,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AvailabilityResponse {
    pub is_available: bool,
}

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
}

// ─────────────────────────────────────────────────────────
// Handlers
// ─────────────────────────────────────────────────────────

/// `GET /health`
pub async fn health() -> impl IntoResponse {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

/// `POST /trips` — owner opens a new trip request.
pub async fn create_trip(
    State(state): State<Arc<AppState>>,
    Identity(caller): Identity,
    Json(body): Json<CreateTripRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let trip = state.engine.create_trip(CreateTrip {
        owner_id: OwnerId::new(caller),
        pickup: body.pickup,
        dropoff: body.dropoff,
        vehicle_type: body.vehicle_type,
        trip_type: body.trip_type,
        scheduled_start_time: body.scheduled_start_time,
    })?;
    Ok((StatusCode::CREATED, Json(TripResponse { trip })))
}

/// `GET /trips/feed` — open trips near the calling driver.
pub async fn available_feed(
    State(state): State<Arc<AppState>>,
    Identity(caller): Identity,
) -> Result<impl IntoResponse, ApiError> {
    let trips = state.gateway.available_feed(&DriverId::new(caller))?;
    Ok(Json(FeedResponse {
        count: trips.len(),
        trips,
    }))
}

/// `POST /trips/:id/interest` — driver signals willingness.
pub async fn express_interest(
    State(state): State<Arc<AppState>>,
    Identity(caller): Identity,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let trip = state.engine.express_interest(id, &DriverId::new(caller))?;
    Ok(Json(TripResponse { trip }))
}

/// `POST /trips/:id/select-driver` — owner picks one interested driver.
pub async fn select_driver(
    State(state): State<Arc<AppState>>,
    Identity(caller): Identity,
    Path(id): Path<Uuid>,
    Json(body): Json<SelectDriverRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let owner = OwnerId::new(caller);
    let driver = DriverId::new(body.driver_id);
    let trip = state.engine.select_driver(id, &owner, &driver)?;
    Ok(Json(TripResponse { trip }))
}

/// `POST /trips/:id/accept` — legacy alias: the driver self-assigns.
pub async fn accept_trip(
    State(state): State<Arc<AppState>>,
    Identity(caller): Identity,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let trip = state.engine.accept_trip(id, &DriverId::new(caller))?;
    Ok(Json(TripResponse { trip }))
}

/// `PATCH /trips/:id/status` (and `PATCH /trips/:id`) — lifecycle events.
///
/// Cancellation may come from the owner or the assigned driver; start and
/// complete only from the assigned driver. The owner interpretation is tried
/// first for cancels, falling back to the driver role.
pub async fn update_status(
    State(state): State<Arc<AppState>>,
    Identity(caller): Identity,
    Path(id): Path<Uuid>,
    Json(body): Json<UpdateStatusRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let driver = DriverId::new(caller.clone());
    let trip = if body.status == TripStatus::Cancelled {
        let owner = OwnerId::new(caller);
        match state
            .engine
            .request_status(id, body.status, Caller::Owner(&owner))
        {
            Err(DispatchError::Unauthorized) => {
                state
                    .engine
                    .request_status(id, body.status, Caller::Driver(&driver))?
            }
            other => other?,
        }
    } else {
        state
            .engine
            .request_status(id, body.status, Caller::Driver(&driver))?
    };
    Ok(Json(TripResponse { trip }))
}

/// `GET /trips/:id` — role-scoped trip record.
pub async fn trip_details(
    State(state): State<Arc<AppState>>,
    Identity(caller): Identity,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let trip = state.gateway.trip_details(id, &caller)?;
    Ok(Json(TripDetailsResponse { trip }))
}

/// `GET /drivers/my-accepted-trip` — how a driver discovers they were hired.
pub async fn my_accepted_trip(
    State(state): State<Arc<AppState>>,
    Identity(caller): Identity,
) -> Result<impl IntoResponse, ApiError> {
    let trip = state.gateway.my_accepted_trip(&DriverId::new(caller))?;
    Ok(Json(MyAcceptedTripResponse { trip }))
}

/// `PATCH /drivers/location` — periodic position push while online.
pub async fn update_location(
    State(state): State<Arc<AppState>>,
    Identity(caller): Identity,
    Json(body): Json<LocationUpdateRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let location = state.engine.update_driver_location(
        &DriverId::new(caller),
        body.latitude,
        body.longitude,
        body.heading,
    )?;
    Ok(Json(LocationAck { location }))
}

/// `PATCH /drivers/status` — availability toggle; the response carries the
/// authoritative value for optimistic clients to reconcile against.
pub async fn update_availability(
    State(state): State<Arc<AppState>>,
    Identity(caller): Identity,
    Json(body): Json<AvailabilityRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let is_available = state.engine.set_driver_availability(
        &DriverId::new(caller),
        body.is_available,
        body.vehicle_type,
    );
    Ok(Json(AvailabilityResponse { is_available }))
}
