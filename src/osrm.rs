//! OSRM HTTP adapter for route legs.
//!
//! Plain sequences go through the `route` service; order optimization uses
//! the `trip` service with the first and last waypoints pinned.

use serde::Deserialize;
use tracing::{debug, warn};

use crate::error::RoutingError;
use crate::model::Position;
use crate::polyline::Polyline;
use crate::traits::{validate_waypoints, RouteLeg, RouteResult, RoutingProvider};

#[derive(Debug, Clone)]
pub struct OsrmConfig {
    pub base_url: String,
    pub profile: String,
    pub timeout_secs: u64,
}

impl Default for OsrmConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:5000".to_string(),
            profile: "car".to_string(),
            // Short on purpose: a slow provider should turn into a fallback.
            timeout_secs: 5,
        }
    }
}

#[derive(Debug, Clone)]
pub struct OsrmClient {
    config: OsrmConfig,
    client: reqwest::blocking::Client,
}

impl OsrmClient {
    pub fn new(config: OsrmConfig) -> Result<Self, reqwest::Error> {
        let client = reqwest::blocking::Client::builder()
            .timeout(std::time::Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self { config, client })
    }

    pub fn config(&self) -> &OsrmConfig {
        &self.config
    }

    fn url_for(&self, waypoints: &[Position], optimize_order: bool) -> String {
        let coords = waypoints
            .iter()
            .map(|position| format!("{:.6},{:.6}", position.longitude, position.latitude))
            .collect::<Vec<_>>()
            .join(";");
        let base_url = self.config.base_url.trim_end_matches('/');

        if optimize_order {
            format!(
                "{}/trip/v1/{}/{}?roundtrip=false&source=first&destination=last&overview=full&geometries=polyline",
                base_url, self.config.profile, coords
            )
        } else {
            format!(
                "{}/route/v1/{}/{}?overview=full&geometries=polyline&steps=false",
                base_url, self.config.profile, coords
            )
        }
    }
}

impl RoutingProvider for OsrmClient {
    fn route(
        &self,
        waypoints: &[Position],
        optimize_order: bool,
    ) -> Result<RouteResult, RoutingError> {
        validate_waypoints(waypoints)?;

        let url = self.url_for(waypoints, optimize_order);
        debug!(%url, "requesting OSRM route");

        let response = self.client.get(url).send()?;
        let status = response.status();
        // OSRM reports NoRoute and friends as JSON bodies on 4xx responses.
        let body = response.json::<OsrmResponse>().map_err(|err| {
            RoutingError::MalformedResponse(format!("HTTP {}: {}", status, err))
        })?;

        if body.code != "Ok" {
            return Err(RoutingError::Provider {
                message: body.message.unwrap_or_default(),
                code: body.code,
            });
        }

        let mut routes = if optimize_order { body.trips } else { body.routes };
        if routes.is_empty() {
            return Err(RoutingError::MalformedResponse("no routes in response".to_string()));
        }
        let route = routes.swap_remove(0);

        if route.legs.len() != waypoints.len() - 1 {
            return Err(RoutingError::MalformedResponse(format!(
                "expected {} legs, got {}",
                waypoints.len() - 1,
                route.legs.len()
            )));
        }

        let waypoint_order = if optimize_order {
            Some(intermediate_order(&body.waypoints, waypoints.len())?)
        } else {
            None
        };

        let geometry = route.geometry.as_deref().and_then(|encoded| {
            Polyline::decode(encoded)
                .map_err(|err| warn!(error = %err, "discarding undecodable route geometry"))
                .ok()
        });

        Ok(RouteResult {
            distance_meters: route.distance,
            duration_seconds: route.duration,
            legs: route
                .legs
                .into_iter()
                .map(|leg| RouteLeg {
                    distance_meters: leg.distance,
                    duration_seconds: leg.duration,
                })
                .collect(),
            waypoint_order,
            geometry,
        })
    }
}

/// Visiting order of the intermediate waypoints from a `trip` response.
///
/// OSRM lists waypoints in input order, each tagged with its position in
/// the optimized trip.
fn intermediate_order(
    waypoints: &[OsrmWaypoint],
    expected: usize,
) -> Result<Vec<usize>, RoutingError> {
    if waypoints.len() != expected {
        return Err(RoutingError::MalformedResponse(format!(
            "expected {} waypoints, got {}",
            expected,
            waypoints.len()
        )));
    }

    let mut intermediates = Vec::with_capacity(expected.saturating_sub(2));
    for (input_index, waypoint) in waypoints.iter().enumerate().take(expected - 1).skip(1) {
        let trip_index = waypoint.waypoint_index.ok_or_else(|| {
            RoutingError::MalformedResponse(format!("waypoint {} has no trip index", input_index))
        })?;
        intermediates.push((trip_index, input_index - 1));
    }
    intermediates.sort_by_key(|(trip_index, _)| *trip_index);

    Ok(intermediates.into_iter().map(|(_, index)| index).collect())
}

#[derive(Debug, Deserialize)]
struct OsrmResponse {
    code: String,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    routes: Vec<OsrmRoute>,
    #[serde(default)]
    trips: Vec<OsrmRoute>,
    #[serde(default)]
    waypoints: Vec<OsrmWaypoint>,
}

#[derive(Debug, Deserialize)]
struct OsrmRoute {
    distance: f64,
    duration: f64,
    #[serde(default)]
    geometry: Option<String>,
    #[serde(default)]
    legs: Vec<OsrmLeg>,
}

#[derive(Debug, Deserialize)]
struct OsrmLeg {
    distance: f64,
    duration: f64,
}

#[derive(Debug, Deserialize)]
struct OsrmWaypoint {
    #[serde(default)]
    waypoint_index: Option<usize>,
}
