//! HTTP adapter for OSRM-compatible routing services.
//!
//! Talks either to a self-hosted OSRM backend (`table` and `trip` services)
//! or to Mapbox, whose matrix and optimization APIs share OSRM's response
//! shape.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::address::Coordinates;
use crate::error::ExternalServiceError;
use crate::matrix::TravelTimeMatrix;
use crate::retry::RetryPolicy;
use crate::traits::{RouteOptimizer, TravelTimeMatrixProvider};

pub const MAPBOX_BASE_URL: &str = "https://api.mapbox.com";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OsrmFlavor {
    SelfHosted,
    Mapbox,
}

#[derive(Debug, Clone)]
pub struct OsrmConfig {
    pub base_url: String,
    pub profile: String,
    pub flavor: OsrmFlavor,
    /// Required for Mapbox, ignored by self-hosted OSRM.
    pub access_token: Option<String>,
    pub timeout_secs: u64,
    pub retry: RetryPolicy,
}

impl Default for OsrmConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:5000".to_string(),
            profile: "car".to_string(),
            flavor: OsrmFlavor::SelfHosted,
            access_token: None,
            timeout_secs: 10,
            retry: RetryPolicy::default(),
        }
    }
}

impl OsrmConfig {
    /// Mapbox with live traffic, as the service has always used.
    pub fn mapbox(access_token: impl Into<String>) -> Self {
        Self {
            base_url: MAPBOX_BASE_URL.to_string(),
            profile: "driving-traffic".to_string(),
            flavor: OsrmFlavor::Mapbox,
            access_token: Some(access_token.into()),
            ..Self::default()
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

    fn service_url(&self, service: Service, locations: &[Coordinates]) -> String {
        let coords = locations
            .iter()
            .map(Coordinates::lon_lat)
            .collect::<Vec<_>>()
            .join(";");
        let base = self.config.base_url.trim_end_matches('/');
        let profile = &self.config.profile;

        match (self.config.flavor, service) {
            (OsrmFlavor::SelfHosted, Service::Table) => {
                format!("{base}/table/v1/{profile}/{coords}")
            }
            (OsrmFlavor::SelfHosted, Service::Trip) => {
                format!("{base}/trip/v1/{profile}/{coords}")
            }
            (OsrmFlavor::Mapbox, Service::Table) => {
                format!("{base}/directions-matrix/v1/mapbox/{profile}/{coords}")
            }
            (OsrmFlavor::Mapbox, Service::Trip) => {
                format!("{base}/optimized-trips/v1/mapbox/{profile}/{coords}")
            }
        }
    }

    fn fetch<T>(&self, url: &str, mut query: Vec<(&'static str, String)>) -> Result<T, ExternalServiceError>
    where
        T: DeserializeOwned + HasCode,
    {
        if let Some(token) = &self.config.access_token {
            query.push(("access_token", token.clone()));
        }

        let body: T = self.config.retry.run(|attempt| {
            debug!(url, attempt, "calling routing service");
            let response = self.client.get(url).query(&query).send()?;
            let status = response.status();
            if !status.is_success() {
                let message = response
                    .json::<ErrorBody>()
                    .ok()
                    .and_then(|body| body.message)
                    .unwrap_or_else(|| status.to_string());
                return Err(ExternalServiceError::Status {
                    status: status.as_u16(),
                    message,
                });
            }
            Ok(response.json::<T>()?)
        })?;

        match body.code() {
            "Ok" => Ok(body),
            code => Err(ExternalServiceError::Provider {
                code: code.to_string(),
                message: body.message().unwrap_or_default().to_string(),
            }),
        }
    }
}

impl TravelTimeMatrixProvider for OsrmClient {
    fn travel_time_matrix(
        &self,
        locations: &[Coordinates],
    ) -> Result<TravelTimeMatrix, ExternalServiceError> {
        if locations.is_empty() {
            return TravelTimeMatrix::from_rows(Vec::new())
                .map_err(|err| ExternalServiceError::MalformedPayload(err.to_string()));
        }

        let url = self.service_url(Service::Table, locations);
        let body: TableResponse =
            self.fetch(&url, vec![("annotations", "duration".to_string())])?;
        table_to_matrix(body, locations.len())
    }
}

impl RouteOptimizer for OsrmClient {
    fn optimal_order(
        &self,
        locations: &[Coordinates],
        roundtrip: bool,
    ) -> Result<Vec<usize>, ExternalServiceError> {
        if locations.len() <= 3 {
            return Ok((0..locations.len()).collect());
        }

        let url = self.service_url(Service::Trip, locations);
        let body: TripResponse = self.fetch(
            &url,
            vec![
                ("source", "first".to_string()),
                ("destination", "last".to_string()),
                ("roundtrip", roundtrip.to_string()),
                ("overview", "false".to_string()),
            ],
        )?;
        trip_to_order(body, locations.len())
    }
}

#[derive(Debug, Clone, Copy)]
enum Service {
    Table,
    Trip,
}

trait HasCode {
    fn code(&self) -> &str;
    fn message(&self) -> Option<&str>;
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TableResponse {
    code: String,
    message: Option<String>,
    durations: Option<Vec<Vec<Option<f64>>>>,
}

impl HasCode for TableResponse {
    fn code(&self) -> &str {
        &self.code
    }

    fn message(&self) -> Option<&str> {
        self.message.as_deref()
    }
}

#[derive(Debug, Deserialize)]
struct TripResponse {
    code: String,
    message: Option<String>,
    #[serde(default)]
    waypoints: Vec<TripWaypoint>,
}

impl HasCode for TripResponse {
    fn code(&self) -> &str {
        &self.code
    }

    fn message(&self) -> Option<&str> {
        self.message.as_deref()
    }
}

/// Waypoints come back in input order; `waypoint_index` is the position
/// of that input within the optimized trip.
#[derive(Debug, Deserialize)]
struct TripWaypoint {
    waypoint_index: usize,
}

/// Unreachable pairs come back as `null`; any gap fails the whole matrix.
fn table_to_matrix(body: TableResponse, expected: usize) -> Result<TravelTimeMatrix, ExternalServiceError> {
    let durations = body
        .durations
        .ok_or_else(|| ExternalServiceError::MalformedPayload("response has no durations".to_string()))?;
    if durations.len() != expected {
        return Err(ExternalServiceError::MalformedPayload(format!(
            "expected {expected} rows, got {}",
            durations.len()
        )));
    }

    let rows = durations
        .into_iter()
        .enumerate()
        .map(|(from, row)| {
            row.into_iter()
                .enumerate()
                .map(|(to, value)| {
                    value.ok_or_else(|| {
                        ExternalServiceError::MalformedPayload(format!(
                            "no duration from {from} to {to}"
                        ))
                    })
                })
                .collect::<Result<Vec<_>, _>>()
        })
        .collect::<Result<Vec<_>, _>>()?;

    TravelTimeMatrix::from_rows(rows)
        .map_err(|err| ExternalServiceError::MalformedPayload(err.to_string()))
}

fn trip_to_order(body: TripResponse, expected: usize) -> Result<Vec<usize>, ExternalServiceError> {
    if body.waypoints.len() != expected {
        return Err(ExternalServiceError::MalformedPayload(format!(
            "expected {expected} waypoints, got {}",
            body.waypoints.len()
        )));
    }

    let mut order = vec![usize::MAX; expected];
    for (input, waypoint) in body.waypoints.iter().enumerate() {
        match order.get_mut(waypoint.waypoint_index) {
            Some(slot) if *slot == usize::MAX => *slot = input,
            _ => {
                return Err(ExternalServiceError::MalformedPayload(format!(
                    "invalid waypoint_index {}",
                    waypoint.waypoint_index
                )));
            }
        }
    }
    Ok(order)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client(flavor: OsrmFlavor) -> OsrmClient {
        let config = match flavor {
            OsrmFlavor::SelfHosted => OsrmConfig::default(),
            OsrmFlavor::Mapbox => OsrmConfig::mapbox("token"),
        };
        OsrmClient::new(config).unwrap()
    }

    #[test]
    fn test_service_urls() {
        let locations = [
            Coordinates::new(40.75, -73.99).unwrap(),
            Coordinates::new(40.7, -74.0).unwrap(),
        ];
        assert_eq!(
            client(OsrmFlavor::SelfHosted).service_url(Service::Table, &locations),
            "http://localhost:5000/table/v1/car/-73.990000,40.750000;-74.000000,40.700000"
        );
        assert_eq!(
            client(OsrmFlavor::Mapbox).service_url(Service::Trip, &locations),
            "https://api.mapbox.com/optimized-trips/v1/mapbox/driving-traffic/-73.990000,40.750000;-74.000000,40.700000"
        );
    }

    #[test]
    fn test_table_with_null_fails() {
        let body: TableResponse = serde_json::from_str(
            r#"{"code":"Ok","durations":[[0.0,12.5],[null,0.0]]}"#,
        )
        .unwrap();
        assert!(matches!(
            table_to_matrix(body, 2),
            Err(ExternalServiceError::MalformedPayload(_))
        ));
    }

    #[test]
    fn test_table_parses() {
        let body: TableResponse = serde_json::from_str(
            r#"{"code":"Ok","durations":[[0.0,12.5],[11.0,0.0]]}"#,
        )
        .unwrap();
        let matrix = table_to_matrix(body, 2).unwrap();
        assert_eq!(matrix.get(0, 1), 12.5);
        assert_eq!(matrix.get(1, 0), 11.0);
    }

    #[test]
    fn test_trip_order_inverts_waypoint_index() {
        // Inputs 0..4; trip visits 0, 2, 1, 3.
        let body: TripResponse = serde_json::from_str(
            r#"{"code":"Ok","waypoints":[
                {"waypoint_index":0,"trips_index":0},
                {"waypoint_index":2,"trips_index":0},
                {"waypoint_index":1,"trips_index":0},
                {"waypoint_index":3,"trips_index":0}]}"#,
        )
        .unwrap();
        assert_eq!(trip_to_order(body, 4).unwrap(), vec![0, 2, 1, 3]);
    }

    #[test]
    fn test_trip_rejects_duplicate_index() {
        let body: TripResponse = serde_json::from_str(
            r#"{"code":"Ok","waypoints":[{"waypoint_index":0},{"waypoint_index":0}]}"#,
        )
        .unwrap();
        assert!(trip_to_order(body, 2).is_err());
    }
}
