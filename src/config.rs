//! Planner configuration.
//!
//! Loaded from a JSON file named by `PLANNER_CONFIG`; `MAPBOX_API_KEY` and
//! `OSRM_BASE_URL` override the routing section when set.

use std::path::Path;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use crate::address::Address;
use crate::error::ConfigError;
use crate::geocode::MapboxGeocoder;
use crate::osrm::{MAPBOX_BASE_URL, OsrmConfig, OsrmFlavor};
use crate::retry::RetryPolicy;
use crate::selector::{
    DEFAULT_MAX_CANDIDATES, DEFAULT_MAX_EXPANSIONS, HARD_MAX_CANDIDATES, SearchOrder, SelectOptions,
};

pub const CONFIG_PATH_VAR: &str = "PLANNER_CONFIG";
pub const MAPBOX_TOKEN_VAR: &str = "MAPBOX_API_KEY";
pub const OSRM_URL_VAR: &str = "OSRM_BASE_URL";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlannerConfig {
    /// Where drivers begin. Must be geocoded.
    pub start: Address,
    /// Budget used when a request does not name one.
    #[serde(default = "default_budget_minutes")]
    pub default_budget_minutes: f64,
    /// Whether sequencing should account for the drive back to the start.
    #[serde(default)]
    pub roundtrip: bool,
    #[serde(default)]
    pub search: SearchConfig,
    #[serde(default)]
    pub routing: RoutingConfig,
}

fn default_budget_minutes() -> f64 {
    30.0
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    pub order: SearchOrder,
    pub max_candidates: usize,
    pub max_expansions: Option<usize>,
    /// Wall-clock limit for one selection, in milliseconds.
    pub timeout_ms: Option<u64>,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            order: SearchOrder::default(),
            max_candidates: DEFAULT_MAX_CANDIDATES,
            max_expansions: Some(DEFAULT_MAX_EXPANSIONS),
            timeout_ms: Some(5_000),
        }
    }
}

impl SearchConfig {
    /// Selector options for a request starting now.
    pub fn select_options(&self) -> SelectOptions {
        SelectOptions {
            order: self.order,
            max_candidates: self.max_candidates,
            max_expansions: self.max_expansions,
            deadline: self
                .timeout_ms
                .map(|ms| Instant::now() + Duration::from_millis(ms)),
            cancel: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RoutingConfig {
    pub flavor: OsrmFlavor,
    pub base_url: String,
    pub profile: String,
    pub access_token: Option<String>,
    pub timeout_secs: u64,
    pub retry_attempts: u32,
    pub retry_base_delay_ms: u64,
}

impl Default for RoutingConfig {
    fn default() -> Self {
        Self {
            flavor: OsrmFlavor::Mapbox,
            base_url: MAPBOX_BASE_URL.to_string(),
            profile: "driving-traffic".to_string(),
            access_token: None,
            timeout_secs: 10,
            retry_attempts: 3,
            retry_base_delay_ms: 250,
        }
    }
}

impl RoutingConfig {
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            base_delay: Duration::from_millis(self.retry_base_delay_ms),
            max_attempts: self.retry_attempts,
            ..RetryPolicy::default()
        }
    }

    pub fn osrm_config(&self) -> OsrmConfig {
        OsrmConfig {
            base_url: self.base_url.clone(),
            profile: self.profile.clone(),
            flavor: self.flavor,
            access_token: self.access_token.clone(),
            timeout_secs: self.timeout_secs,
            retry: self.retry_policy(),
        }
    }

    /// Mapbox geocoder sharing this section's token, timeout and retries.
    ///
    /// Self-hosted OSRM has no geocoding endpoint, so that flavor still
    /// geocodes against the public Mapbox API.
    pub fn geocoder(&self) -> Result<MapboxGeocoder, ConfigError> {
        let token = self.access_token.as_deref().ok_or_else(|| ConfigError::Invalid {
            key: "routing.access_token",
            message: format!("geocoding requires a Mapbox token (set {MAPBOX_TOKEN_VAR})"),
        })?;
        let base_url = match self.flavor {
            OsrmFlavor::Mapbox => self.base_url.as_str(),
            OsrmFlavor::SelfHosted => MAPBOX_BASE_URL,
        };
        Ok(MapboxGeocoder::new(token, self.timeout_secs)?
            .with_base_url(base_url)
            .with_retry(self.retry_policy()))
    }
}

impl PlannerConfig {
    pub fn new(start: Address) -> Self {
        Self {
            start,
            default_budget_minutes: default_budget_minutes(),
            roundtrip: false,
            search: SearchConfig::default(),
            routing: RoutingConfig::default(),
        }
    }

    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json_str(&json)
    }

    /// Reads the file named by `PLANNER_CONFIG` and applies environment
    /// overrides.
    pub fn from_env() -> Result<Self, ConfigError> {
        let path = std::env::var(CONFIG_PATH_VAR).map_err(|_| ConfigError::MissingVar(CONFIG_PATH_VAR))?;
        let mut config: Self = serde_json::from_str(&std::fs::read_to_string(path)?)?;
        config.apply_overrides(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    /// Applies `MAPBOX_API_KEY` and `OSRM_BASE_URL` from `lookup`.
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(token) = lookup(MAPBOX_TOKEN_VAR).filter(|t| !t.is_empty()) {
            self.routing.access_token = Some(token);
        }
        if let Some(url) = lookup(OSRM_URL_VAR).filter(|u| !u.is_empty()) {
            self.routing.base_url = url;
            self.routing.flavor = OsrmFlavor::SelfHosted;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.start.routable().map_err(|err| ConfigError::Invalid {
            key: "start",
            message: err.to_string(),
        })?;
        if !(self.default_budget_minutes.is_finite() && self.default_budget_minutes >= 0.0) {
            return Err(ConfigError::Invalid {
                key: "default_budget_minutes",
                message: self.default_budget_minutes.to_string(),
            });
        }
        if self.search.max_candidates > HARD_MAX_CANDIDATES {
            return Err(ConfigError::Invalid {
                key: "search.max_candidates",
                message: format!(
                    "{} exceeds the maximum of {HARD_MAX_CANDIDATES}",
                    self.search.max_candidates
                ),
            });
        }
        if self.routing.flavor == OsrmFlavor::Mapbox && self.routing.access_token.is_none() {
            return Err(ConfigError::Invalid {
                key: "routing.access_token",
                message: format!("Mapbox requires a token (set {MAPBOX_TOKEN_VAR})"),
            });
        }
        Ok(())
    }
}
