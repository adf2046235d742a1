//! Driver pickup planning: store snapshot in, [`RoutePlan`] out.
//!
//! The planner never writes to the store. Once a plan is dispatched the
//! caller claims its stops with [`crate::store::Store::claim`]; if that
//! fails the plan is still valid.

use std::collections::HashSet;

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::address::{Address, Coordinates};
use crate::config::PlannerConfig;
use crate::error::{ExternalServiceError, PlanError, ValidationError};
use crate::link::google_maps_link;
use crate::matrix::TravelTimeMatrix;
use crate::selector::{HARD_MAX_CANDIDATES, SelectOptions, Selection, select_stops};
use crate::sequencer::sequence_route;
use crate::store::StoreSnapshot;
use crate::traits::{Geocoder, RouteOptimizer, TravelTimeMatrixProvider};

/// A decided visiting order for one driver.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoutePlan {
    pub start: Address,
    pub stops: Vec<(String, Address)>,
    pub destination_name: String,
    pub destination: Address,
    /// Weight collected over all stops.
    pub total_weight: f64,
    /// Travel time from start through every stop to the destination, in seconds.
    pub total_time: f64,
}

impl RoutePlan {
    pub fn stop_names(&self) -> Vec<&str> {
        self.stops.iter().map(|(name, _)| name.as_str()).collect()
    }

    pub fn total_minutes(&self) -> f64 {
        self.total_time / 60.0
    }

    pub fn google_maps_link(&self) -> String {
        google_maps_link(&self.start, &self.stops, &self.destination)
    }
}

/// Result of a pickup planning request.
#[derive(Debug, Clone, PartialEq)]
pub enum PlanOutcome {
    Planned(RoutePlan),
    /// The budget does not even cover driving straight to the destination.
    NoRoute,
}

impl PlanOutcome {
    pub fn plan(&self) -> Option<&RoutePlan> {
        match self {
            PlanOutcome::Planned(plan) => Some(plan),
            PlanOutcome::NoRoute => None,
        }
    }
}

/// One driver's request: which food bank, and how many minutes they have.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PickupRequest {
    pub destination: String,
    /// Falls back to the configured default when absent.
    pub budget_minutes: Option<f64>,
}

pub struct PickupPlanner<M, O> {
    config: PlannerConfig,
    matrix_provider: M,
    optimizer: O,
}

impl<M, O> PickupPlanner<M, O>
where
    M: TravelTimeMatrixProvider,
    O: RouteOptimizer,
{
    pub fn new(config: PlannerConfig, matrix_provider: M, optimizer: O) -> Self {
        Self {
            config,
            matrix_provider,
            optimizer,
        }
    }

    pub fn config(&self) -> &PlannerConfig {
        &self.config
    }

    /// Chooses which pickups a driver heading to `destination` can collect
    /// within the budget, then orders them.
    pub fn plan_pickups(
        &self,
        snapshot: &StoreSnapshot,
        destination: &str,
        budget_minutes: Option<f64>,
    ) -> Result<PlanOutcome, PlanError> {
        let options = self.config.search.select_options();
        self.plan_pickups_with(snapshot, destination, budget_minutes, &options)
    }

    /// [`Self::plan_pickups`] with explicit search options, e.g. to pass a
    /// cancel token.
    pub fn plan_pickups_with(
        &self,
        snapshot: &StoreSnapshot,
        destination: &str,
        budget_minutes: Option<f64>,
        options: &SelectOptions,
    ) -> Result<PlanOutcome, PlanError> {
        let budget_minutes = budget_minutes.unwrap_or(self.config.default_budget_minutes);
        if !(budget_minutes.is_finite() && budget_minutes >= 0.0) {
            return Err(ValidationError::InvalidBudget(budget_minutes).into());
        }
        let destination_address = snapshot
            .food_bank(destination)
            .ok_or_else(|| PlanError::UnknownLocation(destination.to_string()))?;

        let candidates = self.candidates(snapshot, options.max_candidates.min(HARD_MAX_CANDIDATES));

        let mut locations = Vec::with_capacity(candidates.len() + 2);
        locations.push(self.config.start.routable()?);
        for (_, address, _) in &candidates {
            locations.push(address.routable()?);
        }
        locations.push(destination_address.routable()?);

        let matrix = self.fetch_matrix(&locations)?;

        let mut weights = Vec::with_capacity(locations.len());
        weights.push(0.0);
        weights.extend(candidates.iter().map(|(_, _, weight)| *weight));
        weights.push(0.0);

        let route = match select_stops(&matrix, &weights, budget_minutes * 60.0, options)? {
            Selection::Route(route) => route,
            Selection::NoRoute => {
                info!(destination, budget_minutes, "no feasible pickup route");
                return Ok(PlanOutcome::NoRoute);
            }
        };

        let selected = route
            .stops()
            .iter()
            .map(|&node| (candidates[node - 1].0.clone(), candidates[node - 1].1.clone()))
            .collect::<Vec<_>>();

        let sequenced = sequence_route(
            &self.config.start,
            &selected,
            destination_address,
            &self.optimizer,
            self.config.roundtrip,
        )?;

        // The optimizer may see different durations than the matrix; never
        // let its order push the plan over budget.
        let sequenced_nodes = nodes_for(&sequenced, &candidates, matrix.size())?;
        let sequenced_time = matrix.path_duration(&sequenced_nodes);
        let (stops, total_time) = if sequenced_time <= route.distance {
            (sequenced, sequenced_time)
        } else {
            debug!(sequenced_time, selected_time = route.distance, "keeping selector order");
            (selected, route.distance)
        };

        let plan = RoutePlan {
            start: self.config.start.clone(),
            stops,
            destination_name: destination.to_string(),
            destination: destination_address.clone(),
            total_weight: route.profit,
            total_time,
        };
        info!(
            destination,
            stops = plan.stops.len(),
            total_weight = plan.total_weight,
            total_minutes = plan.total_minutes(),
            "pickup route planned"
        );
        Ok(PlanOutcome::Planned(plan))
    }

    /// Orders a fixed set of pickups on the way to `destination`.
    pub fn plan_route<S: AsRef<str>>(
        &self,
        snapshot: &StoreSnapshot,
        destination: &str,
        stop_names: &[S],
    ) -> Result<RoutePlan, PlanError> {
        let destination_address = snapshot
            .food_bank(destination)
            .ok_or_else(|| PlanError::UnknownLocation(destination.to_string()))?;

        let mut seen = HashSet::new();
        let mut stops = Vec::with_capacity(stop_names.len());
        let mut total_weight = 0.0;
        for name in stop_names {
            let name = name.as_ref();
            if !seen.insert(name) {
                return Err(ValidationError::DuplicateStop(name.to_string()).into());
            }
            let pickup = snapshot
                .pickup(name)
                .ok_or_else(|| PlanError::UnknownLocation(name.to_string()))?;
            stops.push((name.to_string(), pickup.address.clone()));
            total_weight += pickup.weight;
        }

        let stops = sequence_route(
            &self.config.start,
            &stops,
            destination_address,
            &self.optimizer,
            self.config.roundtrip,
        )?;

        let mut locations = Vec::with_capacity(stops.len() + 2);
        locations.push(self.config.start.routable()?);
        for (_, address) in &stops {
            locations.push(address.routable()?);
        }
        locations.push(destination_address.routable()?);
        let matrix = self.fetch_matrix(&locations)?;
        let order = (0..locations.len()).collect::<Vec<_>>();

        Ok(RoutePlan {
            start: self.config.start.clone(),
            stops,
            destination_name: destination.to_string(),
            destination: destination_address.clone(),
            total_weight,
            total_time: matrix.path_duration(&order),
        })
    }

    /// Plans independent requests in parallel against one snapshot.
    ///
    /// Requests are not coordinated: two drivers may be offered the same
    /// pickup, and whoever claims it first wins.
    pub fn plan_batch(
        &self,
        snapshot: &StoreSnapshot,
        requests: &[PickupRequest],
    ) -> Vec<Result<PlanOutcome, PlanError>>
    where
        M: Sync,
        O: Sync,
    {
        requests
            .par_iter()
            .map(|request| self.plan_pickups(snapshot, &request.destination, request.budget_minutes))
            .collect()
    }

    /// Routable pickups ordered by name, cut down to the heaviest
    /// `max_candidates` when there are too many to search.
    fn candidates(&self, snapshot: &StoreSnapshot, max_candidates: usize) -> Vec<(String, Address, f64)> {
        let mut candidates = snapshot
            .pickups()
            .filter(|(name, pickup)| {
                let routable = pickup.address.coordinates().is_some();
                if !routable {
                    warn!(name, "pickup has no coordinates, skipping");
                }
                routable
            })
            .map(|(name, pickup)| (name.to_string(), pickup.address.clone(), pickup.weight))
            .collect::<Vec<_>>();

        if candidates.len() > max_candidates {
            warn!(
                available = candidates.len(),
                max_candidates, "too many pickups, keeping the heaviest"
            );
            candidates.sort_by(|a, b| b.2.total_cmp(&a.2).then_with(|| a.0.cmp(&b.0)));
            candidates.truncate(max_candidates);
            candidates.sort_by(|a, b| a.0.cmp(&b.0));
        }
        candidates
    }

    fn fetch_matrix(&self, locations: &[Coordinates]) -> Result<TravelTimeMatrix, PlanError> {
        let matrix = self.matrix_provider.travel_time_matrix(locations)?;
        if matrix.size() != locations.len() {
            return Err(ExternalServiceError::MalformedPayload(format!(
                "matrix has {} nodes for {} locations",
                matrix.size(),
                locations.len()
            ))
            .into());
        }
        Ok(matrix)
    }
}

/// Matrix node indices for a named stop order, start and destination included.
fn nodes_for(
    stops: &[(String, Address)],
    candidates: &[(String, Address, f64)],
    size: usize,
) -> Result<Vec<usize>, PlanError> {
    let mut nodes = Vec::with_capacity(stops.len() + 2);
    nodes.push(0);
    for (name, _) in stops {
        let index = candidates
            .iter()
            .position(|(candidate, _, _)| candidate == name)
            .ok_or_else(|| PlanError::Sequencing(format!("stop {name} is not a candidate")))?;
        nodes.push(index + 1);
    }
    nodes.push(size - 1);
    Ok(nodes)
}

/// Geocodes every address that has no coordinates yet, in parallel.
///
/// Returns how many addresses were resolved.
pub fn resolve_coordinates<G>(geocoder: &G, addresses: &mut [Address]) -> Result<usize, ExternalServiceError>
where
    G: Geocoder + Sync,
{
    let resolved = addresses
        .par_iter_mut()
        .filter(|address| address.coordinates().is_none())
        .map(|address| {
            let coordinates = geocoder.resolve_coordinates(address)?;
            address.set_coordinates(coordinates);
            Ok(())
        })
        .collect::<Result<Vec<()>, ExternalServiceError>>()?;
    Ok(resolved.len())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stop(name: &str) -> (String, Address) {
        let address = Address::new("1 Main St", None, "New York", "NY", "10001").unwrap();
        (name.to_string(), address)
    }

    fn candidates(names: &[&str]) -> Vec<(String, Address, f64)> {
        names
            .iter()
            .map(|name| {
                let (name, address) = stop(name);
                (name, address, 1.0)
            })
            .collect()
    }

    #[test]
    fn test_nodes_for_maps_names_to_matrix_nodes() {
        let candidates = candidates(&["Bakery", "Deli", "Grocer"]);
        let nodes = nodes_for(&[stop("Grocer"), stop("Bakery")], &candidates, 5).unwrap();
        assert_eq!(nodes, vec![0, 3, 1, 4]);
    }

    #[test]
    fn test_nodes_for_rejects_unknown_stop() {
        let candidates = candidates(&["Bakery", "Deli"]);
        let err = nodes_for(&[stop("Deli"), stop("Florist")], &candidates, 4).unwrap_err();
        match err {
            PlanError::Sequencing(message) => assert!(message.contains("Florist")),
            other => panic!("expected a sequencing error, got {other:?}"),
        }
    }
}
