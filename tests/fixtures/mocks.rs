//! Hand-written collaborators for the engine traits.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::{Condvar, Mutex};

use trip_tracker::error::{NotifyError, RoutingError};
use trip_tracker::model::{Position, RiderId, TripId};
use trip_tracker::traits::{AttendanceNotifier, RouteLeg, RouteResult, RoutingProvider};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Notified {
    Entry,
    Exit,
}

/// Records every notification it receives. Clones share the log.
#[derive(Clone, Default)]
pub struct RecordingNotifier {
    log: Arc<Mutex<Vec<(Notified, String, String)>>>,
    fail: bool,
}

impl RecordingNotifier {
    /// Records calls but reports every one of them as failed.
    pub fn failing() -> Self {
        Self {
            log: Arc::default(),
            fail: true,
        }
    }

    pub fn calls(&self) -> Vec<(Notified, String, String)> {
        self.log.lock().clone()
    }

    pub fn count(&self, kind: Notified, rider: &str) -> usize {
        self.log
            .lock()
            .iter()
            .filter(|(k, _, r)| *k == kind && r == rider)
            .count()
    }

    fn record(&self, kind: Notified, trip_id: &TripId, rider_id: &RiderId) -> Result<(), NotifyError> {
        self.log
            .lock()
            .push((kind, trip_id.to_string(), rider_id.to_string()));
        if self.fail {
            Err(NotifyError::Unavailable("backend offline".to_string()))
        } else {
            Ok(())
        }
    }
}

impl AttendanceNotifier for RecordingNotifier {
    fn on_zone_entry(&self, trip_id: &TripId, rider_id: &RiderId) -> Result<(), NotifyError> {
        self.record(Notified::Entry, trip_id, rider_id)
    }

    fn on_zone_exit(&self, trip_id: &TripId, rider_id: &RiderId) -> Result<(), NotifyError> {
        self.record(Notified::Exit, trip_id, rider_id)
    }
}

/// Router returning a fixed duration per leg, counting its calls.
#[derive(Clone)]
pub struct FixedLegRouter {
    pub seconds_per_leg: f64,
    pub order: Option<Vec<usize>>,
    calls: Arc<AtomicUsize>,
}

impl FixedLegRouter {
    pub fn new(seconds_per_leg: f64) -> Self {
        Self {
            seconds_per_leg,
            order: None,
            calls: Arc::default(),
        }
    }

    pub fn with_order(mut self, order: Vec<usize>) -> Self {
        self.order = Some(order);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl RoutingProvider for FixedLegRouter {
    fn route(&self, waypoints: &[Position], optimize_order: bool) -> Result<RouteResult, RoutingError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let legs = (1..waypoints.len())
            .map(|_| RouteLeg {
                distance_meters: self.seconds_per_leg * 10.0,
                duration_seconds: self.seconds_per_leg,
            })
            .collect();
        let mut result = RouteResult::from_legs(legs);
        if optimize_order {
            result.waypoint_order = self.order.clone();
        }
        Ok(result)
    }
}

/// Router that is always down.
#[derive(Clone, Default)]
pub struct FailingRouter {
    calls: Arc<AtomicUsize>,
}

impl FailingRouter {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl RoutingProvider for FailingRouter {
    fn route(&self, _waypoints: &[Position], _optimize_order: bool) -> Result<RouteResult, RoutingError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(RoutingError::Provider {
            code: "NoRoute".to_string(),
            message: "simulated outage".to_string(),
        })
    }
}

/// Router answering with fewer legs than requested.
#[derive(Clone, Default)]
pub struct ShortLegRouter;

impl RoutingProvider for ShortLegRouter {
    fn route(&self, _waypoints: &[Position], _optimize_order: bool) -> Result<RouteResult, RoutingError> {
        Ok(RouteResult::from_legs(vec![RouteLeg {
            distance_meters: 10.0,
            duration_seconds: 1.0,
        }]))
    }
}

/// Notifier whose every call panics after being counted.
#[derive(Clone, Default)]
pub struct PanickingNotifier {
    calls: Arc<AtomicUsize>,
}

impl PanickingNotifier {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl AttendanceNotifier for PanickingNotifier {
    fn on_zone_entry(&self, _trip_id: &TripId, _rider_id: &RiderId) -> Result<(), NotifyError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        panic!("notifier bug on entry");
    }

    fn on_zone_exit(&self, _trip_id: &TripId, _rider_id: &RiderId) -> Result<(), NotifyError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        panic!("notifier bug on exit");
    }
}

/// Router that panics on every call.
#[derive(Clone, Default)]
pub struct PanickingRouter {
    calls: Arc<AtomicUsize>,
}

impl PanickingRouter {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl RoutingProvider for PanickingRouter {
    fn route(&self, _waypoints: &[Position], _optimize_order: bool) -> Result<RouteResult, RoutingError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        panic!("router bug");
    }
}

/// Router that holds every call until [`GatedRouter::open`], then answers
/// 60 s per leg.
#[derive(Clone, Default)]
pub struct GatedRouter {
    gate: Arc<(Mutex<bool>, Condvar)>,
    started: Arc<AtomicUsize>,
    finished: Arc<AtomicUsize>,
}

impl GatedRouter {
    pub fn open(&self) {
        let (open, opened) = &*self.gate;
        *open.lock() = true;
        opened.notify_all();
    }

    pub fn started(&self) -> usize {
        self.started.load(Ordering::SeqCst)
    }

    pub fn finished(&self) -> usize {
        self.finished.load(Ordering::SeqCst)
    }
}

impl RoutingProvider for GatedRouter {
    fn route(&self, waypoints: &[Position], _optimize_order: bool) -> Result<RouteResult, RoutingError> {
        self.started.fetch_add(1, Ordering::SeqCst);
        {
            let (open, opened) = &*self.gate;
            let mut open = open.lock();
            while !*open {
                opened.wait(&mut open);
            }
        }
        let legs = (1..waypoints.len())
            .map(|_| RouteLeg {
                distance_meters: 600.0,
                duration_seconds: 60.0,
            })
            .collect();
        self.finished.fetch_add(1, Ordering::SeqCst);
        Ok(RouteResult::from_legs(legs))
    }
}
