//! Error types for the tracker, the routing adapters and configuration.

use thiserror::Error;

use crate::model::{RiderId, TripId};

/// Failure reported by a routing provider.
///
/// Callers are expected to fall back to a local estimate on any variant.
#[derive(Debug, Error)]
pub enum RoutingError {
    #[error("invalid waypoints: {0}")]
    InvalidWaypoints(String),

    #[error("routing transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("routing provider returned {code}: {message}")]
    Provider { code: String, message: String },

    #[error("malformed routing response: {0}")]
    MalformedResponse(String),
}

/// Failure delivering an entry/exit notification to the attendance service.
#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("attendance service unavailable: {0}")]
    Unavailable(String),

    #[error("attendance service rejected the update: {0}")]
    Rejected(String),
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum EngineError {
    #[error("trip {0} is already active")]
    TripAlreadyActive(TripId),

    #[error("trip {0} is not active")]
    TripNotActive(TripId),

    #[error("rider {rider_id} is not part of trip {trip_id}")]
    UnknownRider { trip_id: TripId, rider_id: RiderId },
}

#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("{field} must be a positive finite number, got {value}")]
    NotPositive { field: &'static str, value: f64 },
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PolylineError {
    #[error("polyline truncated at byte {0}")]
    Truncated(usize),

    #[error("invalid polyline character {character:?} at byte {index}")]
    InvalidCharacter { character: char, index: usize },
}

/// Failure constructing a [`crate::engine::GeofenceEngine`].
#[derive(Debug, Error)]
pub enum EngineBuildError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("failed to start notification dispatcher: {0}")]
    Dispatcher(#[from] rayon::ThreadPoolBuildError),
}
