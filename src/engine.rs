//! Trip registry driving the geofence sessions and ETA refreshes.
//!
//! Each active trip owns one [`GeofenceSession`] behind its own mutex, so
//! ticks of one trip are serialized while different trips proceed in
//! parallel. Routing calls run on rayon workers and never under a trip lock.
//! Entry/exit notifications are queued on a single-threaded FIFO pool, which
//! keeps them ordered without blocking evaluation. Both pools log a panicking
//! collaborator instead of aborting.

use std::any::Any;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use parking_lot::Mutex;
use tracing::{debug, error, info, warn};

use crate::config::EngineConfig;
use crate::error::{EngineBuildError, EngineError};
use crate::geofence::{GeofenceEvent, GeofenceEventKind, GeofenceSession};
use crate::model::{PendingRider, Position, RiderId, RiderState, Stop, TripId};
use crate::route_eta::{RouteEta, RouteEtaCalculator};
use crate::traits::{AttendanceNotifier, RoutingProvider};

struct TripState {
    session: GeofenceSession,
    riders: Vec<PendingRider>,
    destination: Option<Stop>,
    position: Option<Position>,
    active: bool,
    /// Distinct per `start_trip`, so a restarted trip never sees cache
    /// entries of an earlier run with the same id.
    epoch: u64,
    /// Bumped whenever the set of pending stops changes.
    generation: u64,
    eta_in_flight: Arc<AtomicBool>,
}

impl TripState {
    /// Distinct stops still to visit, ordered by sequence hint.
    fn pending_stops(&self) -> Vec<Stop> {
        let mut stops: Vec<Stop> = Vec::new();
        for rider in &self.riders {
            if rider.state.is_terminal() || self.session.is_finalized(&rider.rider_id) {
                continue;
            }
            if !stops.iter().any(|stop| stop.id == rider.stop.id) {
                stops.push(rider.stop.clone());
            }
        }
        // Stable: stops without a hint keep list order, after hinted ones.
        stops.sort_by_key(|stop| (stop.sequence_hint.is_none(), stop.sequence_hint));
        stops
    }
}

/// Inputs for one ETA calculation, captured under the trip lock.
struct EtaRequest {
    cache_key: String,
    position: Position,
    stops: Vec<Stop>,
    destination: Option<Stop>,
    generation: u64,
}

/// Clears a trip's in-flight flag when the refresh job ends, panics included.
struct InFlightGuard(Arc<AtomicBool>);

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

pub struct GeofenceEngine<R, N> {
    config: EngineConfig,
    trips: Arc<DashMap<TripId, Arc<Mutex<TripState>>>>,
    latest_eta: Arc<DashMap<TripId, RouteEta>>,
    calculator: Arc<RouteEtaCalculator<R>>,
    notifier: Arc<N>,
    dispatcher: rayon::ThreadPool,
    eta_workers: rayon::ThreadPool,
    next_epoch: AtomicU64,
}

impl<R, N> GeofenceEngine<R, N>
where
    R: RoutingProvider + 'static,
    N: AttendanceNotifier + 'static,
{
    pub fn new(config: EngineConfig, router: R, notifier: N) -> Result<Self, EngineBuildError> {
        config.validate()?;
        let dispatcher = rayon::ThreadPoolBuilder::new()
            .num_threads(1)
            .thread_name(|_| "geofence-notify".to_string())
            .panic_handler(|payload| {
                error!(panic = panic_message(&*payload), "attendance notifier panicked");
            })
            .build()?;
        let eta_workers = rayon::ThreadPoolBuilder::new()
            .thread_name(|index| format!("eta-refresh-{}", index))
            .panic_handler(|payload| {
                error!(panic = panic_message(&*payload), "ETA refresh panicked");
            })
            .build()?;

        Ok(Self {
            calculator: Arc::new(RouteEtaCalculator::new(router, &config)),
            config,
            trips: Arc::new(DashMap::new()),
            latest_eta: Arc::new(DashMap::new()),
            notifier: Arc::new(notifier),
            dispatcher,
            eta_workers,
            next_epoch: AtomicU64::new(0),
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn calculator(&self) -> &RouteEtaCalculator<R> {
        &self.calculator
    }

    pub fn start_trip(
        &self,
        trip_id: TripId,
        riders: Vec<PendingRider>,
        destination: Option<Stop>,
    ) -> Result<(), EngineError> {
        match self.trips.entry(trip_id.clone()) {
            Entry::Occupied(_) => Err(EngineError::TripAlreadyActive(trip_id)),
            Entry::Vacant(vacant) => {
                info!(trip_id = %trip_id, riders = riders.len(), "trip started");
                vacant.insert(Arc::new(Mutex::new(TripState {
                    session: GeofenceSession::new(trip_id.clone(), self.config.geofence_radius_m),
                    riders,
                    destination,
                    position: None,
                    active: true,
                    epoch: self.next_epoch.fetch_add(1, Ordering::Relaxed),
                    generation: 0,
                    eta_in_flight: Arc::new(AtomicBool::new(false)),
                })));
                Ok(())
            }
        }
    }

    /// Feeds a new GPS fix for a trip and returns the transitions it caused.
    ///
    /// Fixes for unknown or ended trips, invalid fixes and fixes captured
    /// before the stored one are ignored.
    pub fn on_position(&self, trip_id: &TripId, position: Position) -> Vec<GeofenceEvent> {
        if !position.is_valid() {
            warn!(trip_id = %trip_id, ?position, "dropping invalid position");
            return Vec::new();
        }
        let Some(trip) = self.trip(trip_id) else {
            debug!(trip_id = %trip_id, "position for inactive trip ignored");
            return Vec::new();
        };

        let mut state = trip.lock();
        if !state.active {
            return Vec::new();
        }
        if let Some(latest) = state.position {
            if position.captured_at < latest.captured_at {
                debug!(
                    trip_id = %trip_id,
                    captured_at = position.captured_at,
                    latest = latest.captured_at,
                    "dropping out-of-order position"
                );
                return Vec::new();
            }
        }
        state.position = Some(position);
        self.evaluate_locked(&mut state)
    }

    /// Replaces the rider list of a trip and re-evaluates against the last
    /// known position.
    pub fn on_riders_changed(&self, trip_id: &TripId, riders: Vec<PendingRider>) -> Vec<GeofenceEvent> {
        let Some(trip) = self.trip(trip_id) else {
            debug!(trip_id = %trip_id, "rider update for inactive trip ignored");
            return Vec::new();
        };

        let mut state = trip.lock();
        if !state.active {
            return Vec::new();
        }
        debug!(trip_id = %trip_id, riders = riders.len(), "rider list changed");
        state.riders = riders;
        self.invalidate_eta_locked(&mut state);
        self.evaluate_locked(&mut state)
    }

    /// Finalizes a rider handled by an operator (picked up by hand, no-show).
    pub fn on_manual_override(&self, trip_id: &TripId, rider_id: &RiderId) -> Result<RiderState, EngineError> {
        let trip = self
            .trip(trip_id)
            .ok_or_else(|| EngineError::TripNotActive(trip_id.clone()))?;

        let mut state = trip.lock();
        if !state.active {
            return Err(EngineError::TripNotActive(trip_id.clone()));
        }
        if !state.riders.iter().any(|rider| &rider.rider_id == rider_id) {
            return Err(EngineError::UnknownRider {
                trip_id: trip_id.clone(),
                rider_id: rider_id.clone(),
            });
        }

        let outcome = state.session.manual_override(rider_id);
        self.invalidate_eta_locked(&mut state);
        Ok(outcome)
    }

    /// Ends a trip. Later input for the same id is ignored and ETA results
    /// still in flight are discarded.
    pub fn end_trip(&self, trip_id: &TripId) -> bool {
        let Some((_, trip)) = self.trips.remove(trip_id) else {
            return false;
        };

        let epoch = {
            let mut state = trip.lock();
            state.active = false;
            state.session.reset();
            state.riders.clear();
            state.epoch
        };
        self.latest_eta.remove(trip_id);
        let cache = self.calculator.cache();
        cache.remove_prefix(&run_prefix(epoch));
        cache.purge_stale(Instant::now());
        info!(trip_id = %trip_id, "trip ended");
        true
    }

    /// Starts an ETA refresh on the ETA worker pool.
    ///
    /// Returns `false` when the trip is inactive, has no position yet, or a
    /// refresh for it is already running.
    pub fn refresh_eta(&self, trip_id: &TripId) -> bool {
        let Some(trip) = self.trip(trip_id) else {
            return false;
        };
        let Some((request, in_flight)) = Self::eta_request(&trip) else {
            return false;
        };
        if in_flight.swap(true, Ordering::AcqRel) {
            debug!(trip_id = %trip_id, "ETA refresh already in flight");
            return false;
        }

        let calculator = Arc::clone(&self.calculator);
        let latest_eta = Arc::clone(&self.latest_eta);
        let trip_id = trip_id.clone();
        self.eta_workers.spawn(move || {
            let _in_flight = InFlightGuard(in_flight);
            let eta = Self::compute(&calculator, &request);
            Self::publish(&calculator, &trip, &latest_eta, &trip_id, &request, eta);
        });
        true
    }

    /// Computes the trip's ETAs on the calling thread.
    ///
    /// Must not be called from the position-processing path: it may block
    /// on the routing provider.
    pub fn refresh_eta_blocking(&self, trip_id: &TripId) -> Option<RouteEta> {
        let trip = self.trip(trip_id)?;
        let (request, _) = Self::eta_request(&trip)?;
        let eta = Self::compute(&self.calculator, &request);
        Self::publish(&self.calculator, &trip, &self.latest_eta, trip_id, &request, eta.clone());
        Some(eta)
    }

    pub fn latest_eta(&self, trip_id: &TripId) -> Option<RouteEta> {
        self.latest_eta.get(trip_id).map(|eta| eta.value().clone())
    }

    pub fn rider_state(&self, trip_id: &TripId, rider_id: &RiderId) -> Option<RiderState> {
        let trip = self.trip(trip_id)?;
        let state = trip.lock();
        Some(state.session.state_of(rider_id))
    }

    pub fn tracked_rider(&self, trip_id: &TripId) -> Option<RiderId> {
        let trip = self.trip(trip_id)?;
        let state = trip.lock();
        state.session.tracked_rider().cloned()
    }

    pub fn is_active(&self, trip_id: &TripId) -> bool {
        self.trips.contains_key(trip_id)
    }

    pub fn active_trips(&self) -> Vec<TripId> {
        self.trips.iter().map(|entry| entry.key().clone()).collect()
    }

    /// Blocks until every notification queued so far has been delivered.
    pub fn flush_notifications(&self) {
        let (tx, rx) = std::sync::mpsc::channel();
        self.dispatcher.spawn_fifo(move || {
            let _ = tx.send(());
        });
        let _ = rx.recv();
    }

    fn trip(&self, trip_id: &TripId) -> Option<Arc<Mutex<TripState>>> {
        // Clone out so the map shard is not held while the trip is locked.
        self.trips.get(trip_id).map(|entry| Arc::clone(entry.value()))
    }

    fn evaluate_locked(&self, state: &mut TripState) -> Vec<GeofenceEvent> {
        let Some(position) = state.position else {
            return Vec::new();
        };
        let events = state.session.evaluate(&position, &state.riders);
        if events.iter().any(|event| event.kind == GeofenceEventKind::ZoneExit) {
            // The finalized stop drops out of the route; only the newest
            // generation's entry is ever read again.
            self.calculator
                .cache()
                .remove(&route_key(state.epoch, state.generation));
            state.generation += 1;
        }
        // Queued under the trip lock so notifications keep tick order.
        for event in &events {
            self.dispatch(event.clone());
        }
        events
    }

    fn invalidate_eta_locked(&self, state: &mut TripState) {
        state.generation += 1;
        self.calculator.cache().remove_prefix(&run_prefix(state.epoch));
    }

    fn dispatch(&self, event: GeofenceEvent) {
        let notifier = Arc::clone(&self.notifier);
        self.dispatcher.spawn_fifo(move || {
            let result = match event.kind {
                GeofenceEventKind::ZoneEntry => notifier.on_zone_entry(&event.trip_id, &event.rider_id),
                GeofenceEventKind::ZoneExit => notifier.on_zone_exit(&event.trip_id, &event.rider_id),
            };
            if let Err(err) = result {
                warn!(
                    trip_id = %event.trip_id,
                    rider_id = %event.rider_id,
                    kind = ?event.kind,
                    error = %err,
                    "attendance notification failed"
                );
            }
        });
    }

    fn eta_request(trip: &Mutex<TripState>) -> Option<(EtaRequest, Arc<AtomicBool>)> {
        let state = trip.lock();
        if !state.active {
            return None;
        }
        let position = state.position?;
        let request = EtaRequest {
            cache_key: route_key(state.epoch, state.generation),
            position,
            stops: state.pending_stops(),
            destination: state.destination.clone(),
            generation: state.generation,
        };
        Some((request, Arc::clone(&state.eta_in_flight)))
    }

    fn compute(calculator: &RouteEtaCalculator<R>, request: &EtaRequest) -> RouteEta {
        calculator.eta_for_route(
            &request.cache_key,
            &request.position,
            &request.stops,
            request.destination.as_ref(),
        )
    }

    fn publish(
        calculator: &RouteEtaCalculator<R>,
        trip: &Mutex<TripState>,
        latest_eta: &DashMap<TripId, RouteEta>,
        trip_id: &TripId,
        request: &EtaRequest,
        eta: RouteEta,
    ) {
        let state = trip.lock();
        if state.active && state.generation == request.generation {
            latest_eta.insert(trip_id.clone(), eta);
        } else {
            debug!(trip_id = %trip_id, "discarding outdated ETA result");
            calculator.cache().remove(&request.cache_key);
        }
    }
}

/// Cache key prefix shared by every ETA entry of one trip run.
fn run_prefix(epoch: u64) -> String {
    format!("run:{}:", epoch)
}

fn route_key(epoch: u64, generation: u64) -> String {
    format!("{}route:{}", run_prefix(epoch), generation)
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    payload
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("non-string panic payload")
}
