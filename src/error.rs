//! Error taxonomy shared by the planner.
//!
//! "No route" is not an error: the selector and planner report it through
//! their outcome enums so callers can branch on it separately from failures.

use thiserror::Error;

/// Malformed address, stop or matrix data. Never retried.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    #[error("{0} cannot be empty")]
    EmptyField(&'static str),

    #[error("{0} is not a supported state")]
    UnknownState(String),

    #[error("address has no coordinates")]
    MissingCoordinates,

    #[error("coordinates ({lat}, {lon}) are out of range")]
    InvalidCoordinates { lat: f64, lon: f64 },

    #[error("matrix must be square: row {row} has {len} entries, expected {expected}")]
    NotSquare { row: usize, len: usize, expected: usize },

    #[error("matrix needs at least {min} nodes, got {got}")]
    TooFewNodes { min: usize, got: usize },

    #[error("duration from {from} to {to} is invalid: {value}")]
    InvalidDuration { from: usize, to: usize, value: f64 },

    #[error("weight vector has {got} entries, expected {expected}")]
    WeightCount { got: usize, expected: usize },

    #[error("weight at node {index} is invalid: {value}")]
    InvalidWeight { index: usize, value: f64 },

    #[error("budget is invalid: {0}")]
    InvalidBudget(f64),

    #[error("duplicate stop name: {0}")]
    DuplicateStop(String),
}

/// A geocoding, matrix or optimization provider failed.
///
/// Retry policy belongs to the adapter; the core surfaces these unchanged.
#[derive(Debug, Error)]
pub enum ExternalServiceError {
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("provider returned HTTP {status}: {message}")]
    Status { status: u16, message: String },

    #[error("provider returned code {code}: {message}")]
    Provider { code: String, message: String },

    #[error("malformed provider payload: {0}")]
    MalformedPayload(String),

    #[error("no result for {0}")]
    NotFound(String),
}

/// Failures of a routing computation.
#[derive(Debug, Error)]
pub enum PlanError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    External(#[from] ExternalServiceError),

    #[error("{candidates} candidate stops exceed the search ceiling of {limit}")]
    SearchLimit { candidates: usize, limit: usize },

    #[error("search interrupted: {0}")]
    Interrupted(&'static str),

    #[error("sequencing failed: {0}")]
    Sequencing(String),

    #[error("unknown location: {0}")]
    UnknownLocation(String),
}

/// Failures of the CSV-backed store.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("store record is malformed: {0}")]
    Csv(#[from] csv::Error),

    #[error(transparent)]
    Validation(#[from] ValidationError),
}

/// Failures loading [`crate::config::PlannerConfig`].
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config file could not be read: {0}")]
    Io(#[from] std::io::Error),

    #[error("config is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("environment variable {0} is not set")]
    MissingVar(&'static str),

    #[error("config value {key} is invalid: {message}")]
    Invalid { key: &'static str, message: String },

    #[error("HTTP client could not be built: {0}")]
    Client(#[from] reqwest::Error),
}
