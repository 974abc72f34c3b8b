//! Seams to the external collaborators of the engine.
//!
//! The engine never talks to a concrete backend directly. Hosts implement
//! these traits for their directions service and attendance backend.

use crate::error::{NotifyError, RoutingError};
use crate::model::{Position, RiderId, TripId};
use crate::polyline::Polyline;

/// One leg between two consecutive waypoints.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RouteLeg {
    pub distance_meters: f64,
    pub duration_seconds: f64,
}

/// Result of a directions query over an ordered waypoint list.
#[derive(Debug, Clone, PartialEq)]
pub struct RouteResult {
    pub distance_meters: f64,
    pub duration_seconds: f64,
    /// One leg per consecutive waypoint pair, in visiting order.
    pub legs: Vec<RouteLeg>,
    /// Visiting order chosen by the provider for the intermediate waypoints
    /// (indices are 0-based over the intermediates only). Present only when
    /// order optimization was requested.
    pub waypoint_order: Option<Vec<usize>>,
    pub geometry: Option<Polyline>,
}

impl RouteResult {
    /// Builds a result whose totals are the sums of the legs.
    pub fn from_legs(legs: Vec<RouteLeg>) -> Self {
        Self {
            distance_meters: legs.iter().map(|leg| leg.distance_meters).sum(),
            duration_seconds: legs.iter().map(|leg| leg.duration_seconds).sum(),
            legs,
            waypoint_order: None,
            geometry: None,
        }
    }
}

/// Provides leg-by-leg travel estimates for an ordered waypoint list.
///
/// Implementations must return `Err` rather than panic for any transport or
/// provider problem; callers treat failure as an expected outcome.
pub trait RoutingProvider: Send + Sync {
    fn route(&self, waypoints: &[Position], optimize_order: bool)
    -> Result<RouteResult, RoutingError>;
}

/// Receives zone entry/exit notifications for riders.
///
/// Calls are fire-and-forget from the engine's point of view: errors are
/// logged and never retried or rolled back.
pub trait AttendanceNotifier: Send + Sync {
    fn on_zone_entry(&self, trip_id: &TripId, rider_id: &RiderId) -> Result<(), NotifyError>;

    fn on_zone_exit(&self, trip_id: &TripId, rider_id: &RiderId) -> Result<(), NotifyError>;
}

/// Rejects waypoint lists no provider can route.
pub fn validate_waypoints(waypoints: &[Position]) -> Result<(), RoutingError> {
    if waypoints.len() < 2 {
        return Err(RoutingError::InvalidWaypoints(format!(
            "at least 2 waypoints required, got {}",
            waypoints.len()
        )));
    }

    if let Some(index) = waypoints.iter().position(|waypoint| !waypoint.is_valid()) {
        return Err(RoutingError::InvalidWaypoints(format!(
            "waypoint {} has invalid coordinates ({}, {})",
            index, waypoints[index].latitude, waypoints[index].longitude
        )));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejects_single_waypoint() {
        let err = validate_waypoints(&[Position::new(0.0, 0.0)]).unwrap_err();
        assert!(matches!(err, RoutingError::InvalidWaypoints(_)));
    }

    #[test]
    fn test_rejects_nan_waypoint() {
        let waypoints = [Position::new(0.0, 0.0), Position::new(f64::NAN, 1.0)];
        let err = validate_waypoints(&waypoints).unwrap_err();
        assert!(err.to_string().contains("waypoint 1"));
    }

    #[test]
    fn test_accepts_two_valid_waypoints() {
        let waypoints = [Position::new(0.0, 0.0), Position::new(0.0, 0.01)];
        assert!(validate_waypoints(&waypoints).is_ok());
    }

    #[test]
    fn test_from_legs_sums_totals() {
        let result = RouteResult::from_legs(vec![
            RouteLeg {
                distance_meters: 100.0,
                duration_seconds: 10.0,
            },
            RouteLeg {
                distance_meters: 50.0,
                duration_seconds: 5.0,
            },
        ]);
        assert_eq!(result.distance_meters, 150.0);
        assert_eq!(result.duration_seconds, 15.0);
        assert!(result.waypoint_order.is_none());
    }
}
