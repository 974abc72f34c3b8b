//! trip-tracker core
//!
//! Geofence detection and arrival-time estimation for vehicles serving a
//! list of waiting riders.

pub mod config;
pub mod engine;
pub mod error;
pub mod eta_cache;
pub mod geofence;
pub mod haversine;
pub mod model;
pub mod osrm;
pub mod polyline;
pub mod route_eta;
pub mod traits;
