//! Engine configuration.
//!
//! All values have working defaults; hosts typically deserialize an
//! `EngineConfig` from their own settings file and override a few fields.

use std::time::Duration;

use serde::Deserialize;

use crate::error::ConfigError;

/// Radius around a stop that counts as "at the stop".
pub const DEFAULT_GEOFENCE_RADIUS_M: f64 = 100.0;

/// Maximum age of a cached ETA.
pub const DEFAULT_ETA_CACHE_TTL_SECS: u64 = 60;

/// Movement since the cached sample that invalidates a cached ETA.
pub const DEFAULT_ETA_CACHE_MOVEMENT_M: f64 = 50.0;

/// Assumed bus speed when no usable speed is reported.
pub const DEFAULT_SPEED_KMH: f64 = 25.0;

/// Inflation applied to straight-line distance to approximate road distance.
pub const DEFAULT_ROAD_FACTOR: f64 = 1.4;

/// Below this distance the bus is considered to have arrived.
pub const DEFAULT_ARRIVED_THRESHOLD_M: f64 = 10.0;

/// Reported speeds below this are treated as "stopped" and ignored for ETAs.
pub const DEFAULT_MIN_REPORTED_SPEED_KMH: f64 = 5.0;

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub geofence_radius_m: f64,
    pub eta_cache_ttl_secs: u64,
    pub eta_cache_movement_threshold_m: f64,
    pub default_speed_kmh: f64,
    pub road_factor: f64,
    pub arrived_threshold_m: f64,
    pub min_reported_speed_kmh: f64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            geofence_radius_m: DEFAULT_GEOFENCE_RADIUS_M,
            eta_cache_ttl_secs: DEFAULT_ETA_CACHE_TTL_SECS,
            eta_cache_movement_threshold_m: DEFAULT_ETA_CACHE_MOVEMENT_M,
            default_speed_kmh: DEFAULT_SPEED_KMH,
            road_factor: DEFAULT_ROAD_FACTOR,
            arrived_threshold_m: DEFAULT_ARRIVED_THRESHOLD_M,
            min_reported_speed_kmh: DEFAULT_MIN_REPORTED_SPEED_KMH,
        }
    }
}

impl EngineConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        let checks = [
            ("geofence_radius_m", self.geofence_radius_m),
            ("eta_cache_ttl_secs", self.eta_cache_ttl_secs as f64),
            (
                "eta_cache_movement_threshold_m",
                self.eta_cache_movement_threshold_m,
            ),
            ("default_speed_kmh", self.default_speed_kmh),
            ("road_factor", self.road_factor),
        ];
        for (field, value) in checks {
            if !value.is_finite() || value <= 0.0 {
                return Err(ConfigError::NotPositive { field, value });
            }
        }

        // Zero is allowed for these two: no arrival snapping, trust any speed.
        for (field, value) in [
            ("arrived_threshold_m", self.arrived_threshold_m),
            ("min_reported_speed_kmh", self.min_reported_speed_kmh),
        ] {
            if !value.is_finite() || value < 0.0 {
                return Err(ConfigError::NotPositive { field, value });
            }
        }

        Ok(())
    }

    pub fn eta_cache_ttl(&self) -> Duration {
        Duration::from_secs(self.eta_cache_ttl_secs)
    }

    pub fn fallback_params(&self) -> FallbackParams {
        FallbackParams {
            default_speed_kmh: self.default_speed_kmh,
            road_factor: self.road_factor,
            arrived_threshold_m: self.arrived_threshold_m,
        }
    }
}

/// Parameters of the local (no routing service) travel-time model.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FallbackParams {
    pub default_speed_kmh: f64,
    pub road_factor: f64,
    pub arrived_threshold_m: f64,
}

impl Default for FallbackParams {
    fn default() -> Self {
        EngineConfig::default().fallback_params()
    }
}
