//! Synthetic school route laid out due east along the equator.
//!
//! On the equator the haversine distance between two points is exactly the
//! arc length of the longitude difference, so fixtures can be expressed in
//! meters east of the origin.

use trip_tracker::model::{PendingRider, Position, Stop, TripId};

/// Meters per degree of longitude on the equator (R = 6 371 000 m).
pub const METERS_PER_DEGREE: f64 = 6_371_000.0 * std::f64::consts::PI / 180.0;

/// Bus position `meters` east of the origin.
pub fn bus_at(meters: f64) -> Position {
    Position::new(0.0, meters / METERS_PER_DEGREE)
}

pub fn stop_at(id: &str, meters: f64) -> Stop {
    Stop::new(id, 0.0, meters / METERS_PER_DEGREE)
}

pub fn rider_at(id: &str, meters: f64) -> PendingRider {
    PendingRider::new(id, format!("Student {}", id), stop_at(&format!("stop-{}", id), meters))
}

pub fn trip(id: &str) -> TripId {
    TripId::new(id)
}

/// Three riders 1 km apart, school 1 km past the last stop.
pub fn morning_run() -> (Vec<PendingRider>, Stop) {
    let riders = vec![
        rider_at("ana", 1_000.0),
        rider_at("ben", 2_000.0),
        rider_at("caro", 3_000.0),
    ];
    (riders, stop_at("school", 4_000.0))
}
