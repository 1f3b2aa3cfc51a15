//! Dispatch backend — entry point.
//!
//! Wires the in-memory dispatch core (trip store, geo index, matching engine
//! and polling read views) behind a small Axum REST API. The mobile clients
//! poll the read endpoints every few seconds; all writes go through the
//! narrow mutation set in `dispatch_core::matching`.

mod api;
mod config;
mod errors;

use std::sync::Arc;

use axum::routing::{get, patch, post};
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;
use tracing_subscriber::EnvFilter;

use dispatch_core::clock::{Clock, SystemClock};
use dispatch_core::matching::MatchingEngine;
use dispatch_core::pricing::PricingConfig;
use dispatch_core::spatial::GeoIndex;
use dispatch_core::store::InMemoryStore;
use dispatch_core::views::SyncGateway;

use api::AppState;
use config::Config;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialise structured logging (RUST_LOG controls verbosity).
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    // Load optional .env file (ignored if missing).
    let _ = dotenvy::dotenv();

    let config = Config::from_env()?;

    let store = Arc::new(InMemoryStore::new());
    let geo = Arc::new(GeoIndex::new(config.geo_config()));
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);

    let engine = MatchingEngine::new(
        store.clone(),
        geo.clone(),
        clock.clone(),
        config.matching_config(),
        PricingConfig::default(),
    );
    let gateway = SyncGateway::new(store, geo, clock, config.feed_config());

    let state = Arc::new(AppState { engine, gateway });

    let app = Router::new()
        .route("/health", get(api::health))
        .route("/trips", post(api::create_trip))
        .route("/trips/feed", get(api::available_feed))
        .route(
            "/trips/:id",
            get(api::trip_details).patch(api::update_status),
        )
        .route("/trips/:id/interest", post(api::express_interest))
        .route("/trips/:id/select-driver", post(api::select_driver))
        .route("/trips/:id/accept", post(api::accept_trip))
        .route("/trips/:id/status", patch(api::update_status))
        .route("/drivers/my-accepted-trip", get(api::my_accepted_trip))
        .route("/drivers/location", patch(api::update_location))
        .route("/drivers/status", patch(api::update_availability))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    let addr = format!("0.0.0.0:{}", config.api_port);
    info!("dispatch API listening on http://{addr}");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
