//! Test fixtures for pickup-planner.
//!
//! Provides realistic test data:
//! - Real New York City / Hudson County locations (from OpenStreetMap)
//! - Helpers for building geocoded addresses and matrices

pub mod new_york_locations;

pub use new_york_locations::*;
