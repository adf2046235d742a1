//! Great-circle travel-time estimate (fallback when no routing service is
//! reachable).
//!
//! Ignores the road network, so durations are optimistic, but it never fails
//! and needs no network access.

use crate::address::Coordinates;
use crate::error::ExternalServiceError;
use crate::matrix::TravelTimeMatrix;
use crate::traits::TravelTimeMatrixProvider;

/// Average city driving speed assumption.
const DEFAULT_SPEED_KMH: f64 = 25.0;

/// Earth radius in kilometers.
const EARTH_RADIUS_KM: f64 = 6371.0;

/// Haversine-based travel-time matrix provider.
#[derive(Debug, Clone)]
pub struct HaversineMatrix {
    /// Assumed average driving speed in km/h.
    pub speed_kmh: f64,
}

impl Default for HaversineMatrix {
    fn default() -> Self {
        Self {
            speed_kmh: DEFAULT_SPEED_KMH,
        }
    }
}

impl HaversineMatrix {
    pub fn new(speed_kmh: f64) -> Self {
        Self { speed_kmh }
    }

    /// Great-circle distance between two points in kilometers.
    pub fn haversine_km(from: Coordinates, to: Coordinates) -> f64 {
        let lat1 = from.lat.to_radians();
        let lat2 = to.lat.to_radians();
        let delta_lat = (to.lat - from.lat).to_radians();
        let delta_lon = (to.lon - from.lon).to_radians();

        let a = (delta_lat / 2.0).sin().powi(2)
            + lat1.cos() * lat2.cos() * (delta_lon / 2.0).sin().powi(2);
        let c = 2.0 * a.sqrt().asin();

        EARTH_RADIUS_KM * c
    }

    fn km_to_seconds(&self, km: f64) -> f64 {
        (km / self.speed_kmh * 3600.0).round()
    }
}

impl TravelTimeMatrixProvider for HaversineMatrix {
    fn travel_time_matrix(
        &self,
        locations: &[Coordinates],
    ) -> Result<TravelTimeMatrix, ExternalServiceError> {
        if !(self.speed_kmh.is_finite() && self.speed_kmh > 0.0) {
            return Err(ExternalServiceError::MalformedPayload(format!(
                "speed must be positive, got {}",
                self.speed_kmh
            )));
        }

        let rows = locations
            .iter()
            .map(|&from| {
                locations
                    .iter()
                    .map(|&to| self.km_to_seconds(Self::haversine_km(from, to)))
                    .collect()
            })
            .collect();

        TravelTimeMatrix::from_rows(rows)
            .map_err(|err| ExternalServiceError::MalformedPayload(err.to_string()))
    }
}
