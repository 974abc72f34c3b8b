//! Data model shared by the tracker, the ETA calculator and the routing
//! adapters.

use std::fmt;

use serde::{Deserialize, Serialize};

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl $name {
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self(value.to_string())
            }
        }
    };
}

string_id!(
    /// Identifier of one scheduled run of a vehicle.
    TripId
);
string_id!(
    /// Identifier of a rider (student) on a trip.
    RiderId
);
string_id!(
    /// Identifier of a physical pickup/drop-off point.
    StopId
);

/// A GPS fix for a vehicle.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub latitude: f64,
    pub longitude: f64,
    /// Ground speed in meters per second, when the device reports one.
    pub speed: Option<f64>,
    /// Capture time (unix timestamp, seconds).
    pub captured_at: i64,
}

impl Position {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
            speed: None,
            captured_at: 0,
        }
    }

    pub fn with_speed(mut self, meters_per_second: f64) -> Self {
        self.speed = Some(meters_per_second);
        self
    }

    pub fn captured_at(mut self, timestamp: i64) -> Self {
        self.captured_at = timestamp;
        self
    }

    /// Location coordinates (lat, lng).
    pub fn coords(&self) -> (f64, f64) {
        (self.latitude, self.longitude)
    }

    /// Reported speed converted to km/h.
    pub fn speed_kmh(&self) -> Option<f64> {
        self.speed
            .filter(|speed| speed.is_finite() && *speed >= 0.0)
            .map(|speed| speed * 3.6)
    }

    /// Finite coordinates inside the WGS84 latitude/longitude ranges.
    pub fn is_valid(&self) -> bool {
        self.latitude.is_finite()
            && self.longitude.is_finite()
            && (-90.0..=90.0).contains(&self.latitude)
            && (-180.0..=180.0).contains(&self.longitude)
    }
}

/// A physical pickup point. Immutable for the duration of a trip.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Stop {
    pub id: StopId,
    pub latitude: f64,
    pub longitude: f64,
    pub sequence_hint: Option<i32>,
}

impl Stop {
    pub fn new(id: impl Into<String>, latitude: f64, longitude: f64) -> Self {
        Self {
            id: StopId::new(id),
            latitude,
            longitude,
            sequence_hint: None,
        }
    }

    pub fn with_sequence(mut self, sequence: i32) -> Self {
        self.sequence_hint = Some(sequence);
        self
    }

    pub fn position(&self) -> Position {
        Position::new(self.latitude, self.longitude)
    }
}

/// Processing state of a rider within a trip.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiderState {
    Pending,
    InZone,
    Completed,
    Skipped,
}

impl RiderState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, RiderState::Completed | RiderState::Skipped)
    }
}

/// A rider still awaiting pickup or drop-off on the current trip.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingRider {
    pub rider_id: RiderId,
    pub name: String,
    pub stop: Stop,
    pub state: RiderState,
}

impl PendingRider {
    pub fn new(rider_id: impl Into<String>, name: impl Into<String>, stop: Stop) -> Self {
        Self {
            rider_id: RiderId::new(rider_id),
            name: name.into(),
            stop,
            state: RiderState::Pending,
        }
    }
}
