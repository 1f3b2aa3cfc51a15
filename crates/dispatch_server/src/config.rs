//! Server configuration loaded from environment variables.

use anyhow::{anyhow, Context, Result};
use chrono::Duration;
use dispatch_core::matching::MatchingConfig;
use dispatch_core::spatial::GeoIndexConfig;
use dispatch_core::views::FeedConfig;

#[derive(Debug, Clone)]
pub struct Config {
    /// Port for the REST API server.
    pub api_port: u16,
    /// How far from a driver open trips are offered (km).
    pub feed_radius_km: f64,
    /// Initial candidate search radius at trip creation (km).
    pub match_radius_km: f64,
    /// Cap for the expanding candidate search (km).
    pub match_max_radius_km: f64,
    /// Driver fixes older than this are invisible to matching (seconds).
    pub location_staleness_secs: i64,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Ok(Config {
            api_port: parse_env("API_PORT", "8080")?,
            feed_radius_km: parse_env("FEED_RADIUS_KM", "10.0")?,
            match_radius_km: parse_env("MATCH_RADIUS_KM", "5.0")?,
            match_max_radius_km: parse_env("MATCH_MAX_RADIUS_KM", "20.0")?,
            location_staleness_secs: parse_env("LOCATION_STALENESS_SECS", "120")?,
        })
    }

    pub fn matching_config(&self) -> MatchingConfig {
        MatchingConfig {
            default_radius_km: self.match_radius_km,
            max_radius_km: self.match_max_radius_km,
            ..MatchingConfig::default()
        }
    }

    pub fn feed_config(&self) -> FeedConfig {
        FeedConfig {
            service_radius_km: self.feed_radius_km,
        }
    }

    pub fn geo_config(&self) -> GeoIndexConfig {
        GeoIndexConfig {
            location_staleness: Duration::seconds(self.location_staleness_secs),
            ..GeoIndexConfig::default()
        }
    }
}

fn parse_env<T>(key: &str, default: &str) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    let raw = std::env::var(key).unwrap_or_else(|_| default.to_string());
    raw.parse()
        .map_err(|e| anyhow!("invalid {key}={raw}: {e}"))
        .with_context(|| format!("parsing {key}"))
}
