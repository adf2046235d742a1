//! Forward geocoding through the Mapbox places API.

use serde::Deserialize;
use tracing::debug;
use url::Url;

use crate::address::{Address, Coordinates};
use crate::error::ExternalServiceError;
use crate::osrm::MAPBOX_BASE_URL;
use crate::retry::RetryPolicy;
use crate::traits::Geocoder;

#[derive(Debug, Clone)]
pub struct MapboxGeocoder {
    base_url: String,
    access_token: String,
    retry: RetryPolicy,
    client: reqwest::blocking::Client,
}

impl MapboxGeocoder {
    pub fn new(access_token: impl Into<String>, timeout_secs: u64) -> Result<Self, reqwest::Error> {
        let client = reqwest::blocking::Client::builder()
            .timeout(std::time::Duration::from_secs(timeout_secs))
            .build()?;

        Ok(Self {
            base_url: MAPBOX_BASE_URL.to_string(),
            access_token: access_token.into(),
            retry: RetryPolicy::default(),
            client,
        })
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    fn request_url(&self, address: &Address) -> Result<Url, ExternalServiceError> {
        let place = format!("{address}.json");
        let mut url = Url::parse(&self.base_url)
            .map_err(|err| ExternalServiceError::MalformedPayload(format!("base url: {err}")))?;
        url.path_segments_mut()
            .map_err(|_| ExternalServiceError::MalformedPayload("base url cannot have a path".to_string()))?
            .pop_if_empty()
            .extend(["geocoding", "v5", "mapbox.places", place.as_str()]);
        url.query_pairs_mut()
            .append_pair("limit", "1")
            .append_pair("country", "us")
            .append_pair("types", "address,poi")
            .append_pair("access_token", &self.access_token);
        Ok(url)
    }
}

impl Geocoder for MapboxGeocoder {
    fn resolve_coordinates(&self, address: &Address) -> Result<Coordinates, ExternalServiceError> {
        let url = self.request_url(address)?;

        let body: PlacesResponse = self.retry.run(|attempt| {
            debug!(%address, attempt, "geocoding address");
            let response = self.client.get(url.clone()).send()?;
            let status = response.status();
            if !status.is_success() {
                let message = response
                    .json::<PlacesResponse>()
                    .ok()
                    .and_then(|body| body.message)
                    .unwrap_or_else(|| status.to_string());
                return Err(ExternalServiceError::Status {
                    status: status.as_u16(),
                    message,
                });
            }
            Ok(response.json::<PlacesResponse>()?)
        })?;

        let [lon, lat] = body
            .features
            .first()
            .map(|feature| feature.center)
            .ok_or_else(|| ExternalServiceError::NotFound(address.to_string()))?;

        Coordinates::new(lat, lon).map_err(|err| ExternalServiceError::MalformedPayload(err.to_string()))
    }
}

#[derive(Debug, Deserialize)]
struct PlacesResponse {
    #[serde(default)]
    features: Vec<Feature>,
    message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Feature {
    /// `[lon, lat]`
    center: [f64; 2],
}
