//! Collaborator interfaces consumed by the planner.
//!
//! These are intentionally narrow. The core only needs coordinates, a
//! duration matrix and an optimal visiting order; how a deployment obtains
//! them (self-hosted OSRM, Mapbox, a great-circle estimate) is up to the
//! implementation.

use crate::address::{Address, Coordinates};
use crate::error::ExternalServiceError;
use crate::matrix::TravelTimeMatrix;
use crate::store::StoreSnapshot;

/// Resolves a postal address to coordinates.
pub trait Geocoder {
    fn resolve_coordinates(&self, address: &Address) -> Result<Coordinates, ExternalServiceError>;
}

/// Provides a travel-time matrix for a set of locations.
///
/// The matrix is indexed by the provided location order and must be fully
/// populated; a partial answer is an error.
pub trait TravelTimeMatrixProvider {
    fn travel_time_matrix(
        &self,
        locations: &[Coordinates],
    ) -> Result<TravelTimeMatrix, ExternalServiceError>;
}

/// Computes a minimum-time visiting order.
///
/// The first and last locations are fixed. The result is a permutation of
/// `0..locations.len()` giving the visiting order.
pub trait RouteOptimizer {
    fn optimal_order(
        &self,
        locations: &[Coordinates],
        roundtrip: bool,
    ) -> Result<Vec<usize>, ExternalServiceError>;
}

/// Read access to food banks and pickup locations.
///
/// Routing takes one snapshot at the start of a request and never observes
/// mutations made afterwards.
pub trait StopRepository {
    fn snapshot(&self) -> StoreSnapshot;
}

impl<T: Geocoder + ?Sized> Geocoder for &T {
    fn resolve_coordinates(&self, address: &Address) -> Result<Coordinates, ExternalServiceError> {
        (**self).resolve_coordinates(address)
    }
}

impl<T: TravelTimeMatrixProvider + ?Sized> TravelTimeMatrixProvider for &T {
    fn travel_time_matrix(
        &self,
        locations: &[Coordinates],
    ) -> Result<TravelTimeMatrix, ExternalServiceError> {
        (**self).travel_time_matrix(locations)
    }
}

impl<T: RouteOptimizer + ?Sized> RouteOptimizer for &T {
    fn optimal_order(
        &self,
        locations: &[Coordinates],
        roundtrip: bool,
    ) -> Result<Vec<usize>, ExternalServiceError> {
        (**self).optimal_order(locations, roundtrip)
    }
}
