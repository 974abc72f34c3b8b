//! Per-trip geofence state machine.
//!
//! # State Machine
//!
//! ```text
//! Pending --[nearest pending rider, bus within radius]--> InZone
//! InZone  --[bus leaves radius / another rider takes over]--> Completed
//! InZone  --[manual override]--> Completed
//! Pending --[manual override]--> Skipped
//! ```
//!
//! At most one rider is `InZone` per session, and a finalized rider is never
//! selected again for the rest of the trip. The session is pure: it performs
//! no I/O and reports transitions as [`GeofenceEvent`]s for the caller to
//! dispatch.

use std::collections::HashMap;

use tracing::{debug, info};

use crate::haversine::distance_meters;
use crate::model::{PendingRider, Position, RiderId, RiderState, TripId};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GeofenceEventKind {
    ZoneEntry,
    ZoneExit,
}

/// A zone transition produced by [`GeofenceSession::evaluate`].
#[derive(Debug, Clone, PartialEq)]
pub struct GeofenceEvent {
    pub trip_id: TripId,
    pub rider_id: RiderId,
    pub kind: GeofenceEventKind,
    /// Distance from the bus to the rider's stop when the event fired, if the
    /// rider was still a candidate.
    pub distance_meters: Option<f64>,
}

#[derive(Debug, Clone)]
pub struct GeofenceSession {
    trip_id: TripId,
    radius_m: f64,
    tracked: Option<RiderId>,
    finalized: HashMap<RiderId, RiderState>,
    last_nearest_distance_m: Option<f64>,
}

impl GeofenceSession {
    pub fn new(trip_id: TripId, radius_m: f64) -> Self {
        Self {
            trip_id,
            radius_m,
            tracked: None,
            finalized: HashMap::new(),
            last_nearest_distance_m: None,
        }
    }

    pub fn trip_id(&self) -> &TripId {
        &self.trip_id
    }

    pub fn radius_m(&self) -> f64 {
        self.radius_m
    }

    /// Re-evaluates the session for a new bus position or rider list.
    pub fn evaluate(&mut self, position: &Position, riders: &[PendingRider]) -> Vec<GeofenceEvent> {
        let mut events = Vec::new();

        let nearest = riders
            .iter()
            .filter(|rider| !rider.state.is_terminal() && !self.finalized.contains_key(&rider.rider_id))
            .map(|rider| (rider, distance_meters(position, &rider.stop.position())))
            .fold(None::<(&PendingRider, f64)>, |best, (rider, distance)| match best {
                // Strictly closer only, so the first of equals wins.
                Some((_, best_distance)) if distance >= best_distance => best,
                _ => Some((rider, distance)),
            });

        let Some((nearest, distance)) = nearest else {
            self.last_nearest_distance_m = None;
            if let Some(rider_id) = self.tracked.take() {
                debug!(trip_id = %self.trip_id, rider_id = %rider_id, "no candidates left, clearing tracked rider");
            }
            return events;
        };

        self.last_nearest_distance_m = Some(distance);
        let inside = distance <= self.radius_m;

        match self.tracked.clone() {
            Some(tracked) if tracked == nearest.rider_id && inside => {}
            Some(tracked) => {
                let tracked_distance = riders
                    .iter()
                    .find(|rider| rider.rider_id == tracked)
                    .map(|rider| distance_meters(position, &rider.stop.position()));
                events.push(self.exit(tracked, tracked_distance));
                if inside {
                    events.push(self.enter(nearest.rider_id.clone(), distance));
                }
            }
            None if inside => events.push(self.enter(nearest.rider_id.clone(), distance)),
            None => {
                debug!(
                    trip_id = %self.trip_id,
                    rider_id = %nearest.rider_id,
                    distance_m = distance,
                    "nearest rider outside geofence"
                );
            }
        }

        events
    }

    /// Finalizes a rider handled out of band, without emitting an event.
    ///
    /// A tracked rider becomes `Completed`; any other rider becomes `Skipped`.
    pub fn manual_override(&mut self, rider_id: &RiderId) -> RiderState {
        let outcome = if self.tracked.as_ref() == Some(rider_id) {
            self.tracked = None;
            RiderState::Completed
        } else {
            RiderState::Skipped
        };

        let state = *self.finalized.entry(rider_id.clone()).or_insert(outcome);
        info!(trip_id = %self.trip_id, rider_id = %rider_id, ?state, "manual override");
        state
    }

    pub fn reset(&mut self) {
        self.tracked = None;
        self.finalized.clear();
        self.last_nearest_distance_m = None;
    }

    pub fn state_of(&self, rider_id: &RiderId) -> RiderState {
        if let Some(state) = self.finalized.get(rider_id) {
            return *state;
        }
        if self.tracked.as_ref() == Some(rider_id) {
            RiderState::InZone
        } else {
            RiderState::Pending
        }
    }

    pub fn tracked_rider(&self) -> Option<&RiderId> {
        self.tracked.as_ref()
    }

    pub fn is_finalized(&self, rider_id: &RiderId) -> bool {
        self.finalized.contains_key(rider_id)
    }

    pub fn finalized_count(&self) -> usize {
        self.finalized.len()
    }

    pub fn in_zone_count(&self) -> usize {
        usize::from(self.tracked.is_some())
    }

    pub fn last_nearest_distance(&self) -> Option<f64> {
        self.last_nearest_distance_m
    }

    fn enter(&mut self, rider_id: RiderId, distance: f64) -> GeofenceEvent {
        info!(trip_id = %self.trip_id, rider_id = %rider_id, distance_m = distance, "zone entry");
        self.tracked = Some(rider_id.clone());
        GeofenceEvent {
            trip_id: self.trip_id.clone(),
            rider_id,
            kind: GeofenceEventKind::ZoneEntry,
            distance_meters: Some(distance),
        }
    }

    fn exit(&mut self, rider_id: RiderId, distance: Option<f64>) -> GeofenceEvent {
        info!(trip_id = %self.trip_id, rider_id = %rider_id, distance_m = ?distance, "zone exit");
        self.tracked = None;
        self.finalized.insert(rider_id.clone(), RiderState::Completed);
        GeofenceEvent {
            trip_id: self.trip_id.clone(),
            rider_id,
            kind: GeofenceEventKind::ZoneExit,
            distance_meters: distance,
        }
    }
}
