//! pickup-planner
//!
//! Routes food-donation drivers: picks which pending pickups fit in a
//! driver's time budget on the way to a food bank, and the order to visit
//! them in.

pub mod address;
pub mod config;
pub mod error;
pub mod geocode;
pub mod haversine;
pub mod link;
pub mod matrix;
pub mod osrm;
pub mod planner;
pub mod retry;
pub mod selector;
pub mod sequencer;
pub mod store;
pub mod traits;

pub use address::{Address, Coordinates, State};
pub use error::{ExternalServiceError, PlanError, StoreError, ValidationError};
pub use matrix::TravelTimeMatrix;
pub use planner::{PickupPlanner, PlanOutcome, RoutePlan};
pub use selector::{Selection, SelectedRoute, select_stops};
pub use sequencer::sequence_route;
