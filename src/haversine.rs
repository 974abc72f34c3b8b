//! Haversine distance kernel and local routing fallback.
//!
//! Uses great-circle distance to estimate travel time.
//! Less accurate than a road router but always available.

use crate::config::FallbackParams;
use crate::error::RoutingError;
use crate::model::Position;
use crate::traits::{validate_waypoints, RouteLeg, RouteResult, RoutingProvider};

/// Earth radius in meters.
const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// Great-circle distance between two positions in meters.
pub fn distance_meters(a: &Position, b: &Position) -> f64 {
    haversine_m(a.coords(), b.coords())
}

/// Calculate haversine distance between two (lat, lng) points in meters.
fn haversine_m(from: (f64, f64), to: (f64, f64)) -> f64 {
    let (lat1, lng1) = from;
    let (lat2, lng2) = to;

    let lat1_rad = lat1.to_radians();
    let lat2_rad = lat2.to_radians();
    let delta_lat = (lat2 - lat1).to_radians();
    let delta_lng = (lng2 - lng1).to_radians();

    let a = (delta_lat / 2.0).sin().powi(2)
        + lat1_rad.cos() * lat2_rad.cos() * (delta_lng / 2.0).sin().powi(2);
    // Rounding can push `a` a hair above 1 for antipodal points.
    let c = 2.0 * a.min(1.0).sqrt().asin();

    EARTH_RADIUS_M * c
}

/// Estimated travel time in seconds over the inflated straight-line distance.
///
/// Returns 0 once the distance is under the arrival threshold. A missing or
/// non-positive `speed_kmh` uses the default speed.
pub fn fallback_eta_seconds(
    from: &Position,
    to: &Position,
    speed_kmh: Option<f64>,
    params: &FallbackParams,
) -> f64 {
    let meters = distance_meters(from, to);
    if meters < params.arrived_threshold_m {
        return 0.0;
    }
    travel_seconds(meters, speed_kmh, params)
}

/// Estimated travel time in whole minutes, never less than 1.
pub fn fallback_eta_minutes(
    from: &Position,
    to: &Position,
    speed_kmh: Option<f64>,
    params: &FallbackParams,
) -> u32 {
    if distance_meters(from, to) < params.arrived_threshold_m {
        return 1;
    }
    let seconds = fallback_eta_seconds(from, to, speed_kmh, params);
    seconds_to_minutes(seconds).max(1)
}

/// Local leg-by-leg estimate for an ordered waypoint list.
pub fn fallback_legs(
    waypoints: &[Position],
    speed_kmh: Option<f64>,
    params: &FallbackParams,
) -> Vec<RouteLeg> {
    waypoints
        .windows(2)
        .map(|pair| RouteLeg {
            distance_meters: distance_meters(&pair[0], &pair[1]) * params.road_factor,
            duration_seconds: fallback_eta_seconds(&pair[0], &pair[1], speed_kmh, params),
        })
        .collect()
}

/// Greedy nearest-neighbour visiting order starting from `origin`.
///
/// Returns indices into `points`. Ties keep the earlier point.
pub fn nearest_neighbour_order(origin: &Position, points: &[Position]) -> Vec<usize> {
    let mut remaining: Vec<usize> = (0..points.len()).collect();
    let mut order = Vec::with_capacity(points.len());
    let mut current = *origin;

    while !remaining.is_empty() {
        let mut best = 0;
        let mut best_distance = f64::INFINITY;
        for (slot, &index) in remaining.iter().enumerate() {
            let distance = distance_meters(&current, &points[index]);
            if distance < best_distance {
                best_distance = distance;
                best = slot;
            }
        }
        let index = remaining.remove(best);
        current = points[index];
        order.push(index);
    }

    order
}

/// Whole minutes, rounded up.
pub(crate) fn seconds_to_minutes(seconds: f64) -> u32 {
    if seconds <= 0.0 || !seconds.is_finite() {
        return 0;
    }
    (seconds / 60.0).ceil() as u32
}

fn travel_seconds(meters: f64, speed_kmh: Option<f64>, params: &FallbackParams) -> f64 {
    let speed_kmh = speed_kmh
        .filter(|speed| speed.is_finite() && *speed > 0.0)
        .unwrap_or(params.default_speed_kmh);
    let road_km = meters * params.road_factor / 1000.0;
    road_km / speed_kmh * 3600.0
}

/// Haversine-based routing provider.
///
/// Never reaches the network; useful as the primary provider when no
/// directions service is configured.
#[derive(Debug, Clone, Default)]
pub struct HaversineRouter {
    pub params: FallbackParams,
}

impl HaversineRouter {
    pub fn new(params: FallbackParams) -> Self {
        Self { params }
    }
}

impl RoutingProvider for HaversineRouter {
    fn route(
        &self,
        waypoints: &[Position],
        optimize_order: bool,
    ) -> Result<RouteResult, RoutingError> {
        validate_waypoints(waypoints)?;

        if !optimize_order {
            return Ok(RouteResult::from_legs(fallback_legs(waypoints, None, &self.params)));
        }

        let last = waypoints.len() - 1;
        let intermediates = &waypoints[1..last];
        let order = nearest_neighbour_order(&waypoints[0], intermediates);

        let mut ordered = Vec::with_capacity(waypoints.len());
        ordered.push(waypoints[0]);
        ordered.extend(order.iter().map(|&index| intermediates[index]));
        ordered.push(waypoints[last]);

        let mut result = RouteResult::from_legs(fallback_legs(&ordered, None, &self.params));
        result.waypoint_order = Some(order);
        Ok(result)
    }
}
