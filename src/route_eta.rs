//! Cumulative arrival estimates for a stop sequence.
//!
//! The whole sequence `[bus, stops.., destination]` is routed in a single
//! provider call so every stop's ETA is the previous stop's ETA plus the leg
//! between them. Estimating stops independently could make a later stop look
//! closer than an earlier one.

use std::time::Duration;

use tracing::{debug, warn};

use crate::config::{EngineConfig, FallbackParams};
use crate::eta_cache::EtaCache;
use crate::haversine::{fallback_legs, nearest_neighbour_order, seconds_to_minutes};
use crate::model::{Position, Stop, StopId};
use crate::traits::{RouteLeg, RoutingProvider};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EtaSource {
    Routed,
    Fallback,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StopEta {
    pub stop_id: StopId,
    /// Minutes from now, cumulative along the sequence.
    pub minutes: u32,
    /// Travel distance from the bus, cumulative along the sequence.
    pub distance_meters: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RouteEta {
    pub per_stop: Vec<StopEta>,
    pub final_destination: Option<u32>,
    pub source: EtaSource,
}

impl RouteEta {
    fn empty() -> Self {
        Self {
            per_stop: Vec::new(),
            final_destination: None,
            source: EtaSource::Fallback,
        }
    }

    pub fn minutes_for(&self, stop_id: &StopId) -> Option<u32> {
        self.per_stop
            .iter()
            .find(|eta| &eta.stop_id == stop_id)
            .map(|eta| eta.minutes)
    }
}

pub struct RouteEtaCalculator<R> {
    router: R,
    params: FallbackParams,
    min_reported_speed_kmh: f64,
    cache: EtaCache<RouteEta>,
}

impl<R: RoutingProvider> RouteEtaCalculator<R> {
    pub fn new(router: R, config: &EngineConfig) -> Self {
        Self {
            router,
            params: config.fallback_params(),
            min_reported_speed_kmh: config.min_reported_speed_kmh,
            cache: EtaCache::new(config.eta_cache_ttl(), config.eta_cache_movement_threshold_m),
        }
    }

    /// Replaces the result cache with one using the given limits.
    pub fn with_cache(mut self, ttl: Duration, movement_threshold_m: f64) -> Self {
        self.cache = EtaCache::new(ttl, movement_threshold_m);
        self
    }

    pub fn cache(&self) -> &EtaCache<RouteEta> {
        &self.cache
    }

    pub fn router(&self) -> &R {
        &self.router
    }

    /// ETAs for `stops` visited in the given order, then `destination`.
    ///
    /// Never fails: a routing failure falls back to the local estimate.
    pub fn eta_for_route(
        &self,
        cache_key: &str,
        current: &Position,
        stops: &[Stop],
        destination: Option<&Stop>,
    ) -> RouteEta {
        if let Some(cached) = self.cache.get(cache_key, current) {
            debug!(cache_key, "route ETA cache hit");
            return cached;
        }

        let mut waypoints = Vec::with_capacity(stops.len() + 2);
        waypoints.push(*current);
        waypoints.extend(stops.iter().map(Stop::position));
        if let Some(destination) = destination {
            waypoints.push(destination.position());
        }
        if waypoints.len() < 2 {
            return RouteEta::empty();
        }

        let expected_legs = waypoints.len() - 1;
        let (legs, source) = match self.router.route(&waypoints, false) {
            Ok(result) if result.legs.len() == expected_legs => (result.legs, EtaSource::Routed),
            Ok(result) => {
                warn!(
                    cache_key,
                    expected = expected_legs,
                    actual = result.legs.len(),
                    "routing returned wrong leg count, using local estimate"
                );
                (self.local_legs(current, &waypoints), EtaSource::Fallback)
            }
            Err(err) => {
                warn!(cache_key, error = %err, "routing failed, using local estimate");
                (self.local_legs(current, &waypoints), EtaSource::Fallback)
            }
        };

        let eta = accumulate(stops, destination.is_some(), &legs, source);
        self.cache.put(cache_key, eta.clone(), *current);
        eta
    }

    /// Minutes until the bus reaches a single stop.
    pub fn eta_to_stop(&self, cache_key: &str, current: &Position, stop: &Stop) -> u32 {
        self.eta_for_route(cache_key, current, &[], Some(stop))
            .final_destination
            .unwrap_or(0)
    }

    /// Visiting order for `stops`, as chosen by the provider when possible.
    pub fn plan_visit_order(
        &self,
        current: &Position,
        stops: &[Stop],
        destination: Option<&Stop>,
    ) -> Vec<Stop> {
        if stops.len() < 2 {
            return stops.to_vec();
        }

        let mut waypoints = Vec::with_capacity(stops.len() + 2);
        waypoints.push(*current);
        waypoints.extend(stops.iter().map(Stop::position));
        // The provider needs a fixed end; without a destination the last
        // stop doubles as one and is excluded from the optimized set.
        let (optimized, fixed_last) = match destination {
            Some(destination) => {
                waypoints.push(destination.position());
                (stops, None)
            }
            None => (&stops[..stops.len() - 1], stops.last()),
        };

        let order = match self.router.route(&waypoints, true) {
            Ok(result) => match result.waypoint_order {
                Some(order) if is_permutation(&order, optimized.len()) => Some(order),
                _ => {
                    warn!("routing returned no usable visiting order, using nearest neighbour");
                    None
                }
            },
            Err(err) => {
                warn!(error = %err, "order optimization failed, using nearest neighbour");
                None
            }
        };

        let order = order.unwrap_or_else(|| {
            let points: Vec<Position> = optimized.iter().map(Stop::position).collect();
            nearest_neighbour_order(current, &points)
        });

        let mut planned: Vec<Stop> = order.into_iter().map(|index| optimized[index].clone()).collect();
        planned.extend(fixed_last.cloned());
        planned
    }

    fn local_legs(&self, current: &Position, waypoints: &[Position]) -> Vec<RouteLeg> {
        let speed = current
            .speed_kmh()
            .filter(|speed| *speed >= self.min_reported_speed_kmh);
        fallback_legs(waypoints, speed, &self.params)
    }
}

fn accumulate(stops: &[Stop], has_destination: bool, legs: &[RouteLeg], source: EtaSource) -> RouteEta {
    let mut seconds = 0.0;
    let mut meters = 0.0;
    let mut per_stop = Vec::with_capacity(stops.len());

    for (stop, leg) in stops.iter().zip(legs) {
        // Negative or NaN legs from a provider must not break monotonicity.
        seconds += sanitize(leg.duration_seconds);
        meters += sanitize(leg.distance_meters);
        per_stop.push(StopEta {
            stop_id: stop.id.clone(),
            minutes: seconds_to_minutes(seconds),
            distance_meters: meters,
        });
    }

    let final_destination = if has_destination {
        legs.get(stops.len())
            .map(|leg| seconds_to_minutes(seconds + sanitize(leg.duration_seconds)))
    } else {
        None
    };

    RouteEta {
        per_stop,
        final_destination,
        source,
    }
}

fn sanitize(value: f64) -> f64 {
    if value.is_finite() && value > 0.0 { value } else { 0.0 }
}

fn is_permutation(order: &[usize], len: usize) -> bool {
    if order.len() != len {
        return false;
    }
    let mut seen = vec![false; len];
    for &index in order {
        if index >= len || seen[index] {
            return false;
        }
        seen[index] = true;
    }
    true
}
