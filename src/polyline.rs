//! Polyline representation for route geometries.
//!
//! This module provides a type for working with polylines as decoded
//! coordinate sequences. Decoding from the compact encoded format happens
//! at the boundary, when a routing provider hands back a geometry.

use serde::{Deserialize, Serialize};

use crate::error::PolylineError;

/// Coordinate precision of the encoded format (5 decimal places).
const PRECISION: f64 = 1e5;

/// A polyline representing a route geometry as decoded coordinates.
///
/// Stores latitude/longitude points directly for internal processing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Polyline {
    points: Vec<(f64, f64)>,
}

impl Polyline {
    /// Creates a new Polyline from decoded coordinate points.
    ///
    /// Each point is a (latitude, longitude) tuple.
    pub fn new(points: Vec<(f64, f64)>) -> Self {
        Self { points }
    }

    /// Decodes an encoded polyline (precision 5, latitude first).
    pub fn decode(encoded: &str) -> Result<Self, PolylineError> {
        let bytes = encoded.as_bytes();
        let mut index = 0;
        let mut lat: i64 = 0;
        let mut lng: i64 = 0;
        let mut points = Vec::new();

        while index < bytes.len() {
            lat += decode_value(bytes, &mut index)?;
            lng += decode_value(bytes, &mut index)?;
            points.push((lat as f64 / PRECISION, lng as f64 / PRECISION));
        }

        Ok(Self { points })
    }

    /// Returns a reference to the coordinate points.
    pub fn points(&self) -> &[(f64, f64)] {
        &self.points
    }

    /// Consumes the polyline and returns the owned coordinate points.
    pub fn into_points(self) -> Vec<(f64, f64)> {
        self.points
    }
}

fn decode_value(bytes: &[u8], index: &mut usize) -> Result<i64, PolylineError> {
    let mut result: i64 = 0;
    let mut shift = 0;

    loop {
        let byte = *bytes.get(*index).ok_or(PolylineError::Truncated(*index))?;
        if !(63..=126).contains(&byte) || shift > 60 {
            return Err(PolylineError::InvalidCharacter {
                character: byte as char,
                index: *index,
            });
        }
        *index += 1;

        let chunk = i64::from(byte - 63);
        result |= (chunk & 0x1f) << shift;
        shift += 5;
        if chunk < 0x20 {
            break;
        }
    }

    Ok(if result & 1 != 0 {
        !(result >> 1)
    } else {
        result >> 1
    })
}
