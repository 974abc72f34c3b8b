//! Test fixtures for trip-tracker.
//!
//! Provides:
//! - Riders and stops laid out along the equator, so distances are exact
//! - Mock routing providers and attendance notifiers

#![allow(dead_code)]

pub mod mocks;
pub mod school_route;

pub use mocks::*;
pub use school_route::*;
