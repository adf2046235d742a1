//! Visiting-order optimization with a fixed start and destination.
//!
//! [`sequence_route`] asks a [`RouteOptimizer`] for the order and maps the
//! answer back onto named stops. [`optimal_order`] is the local solver used
//! by [`MatrixOptimizer`]:
//!
//! - up to [`EXACT_LIMIT`] interior stops: Held-Karp dynamic programming,
//!   exact, `O(n^2 * 2^n)` time and `O(n * 2^n)` memory;
//! - beyond that: nearest-neighbour construction improved by 2-opt and
//!   relocate moves until no move helps or the iteration cap is hit. Each
//!   move is scored by recomputing the whole path, so asymmetric matrices are
//!   handled correctly at `O(n)` per candidate.

use tracing::debug;

use crate::address::{Address, Coordinates};
use crate::error::{ExternalServiceError, PlanError};
use crate::matrix::TravelTimeMatrix;
use crate::traits::{RouteOptimizer, TravelTimeMatrixProvider};

/// Largest interior stop count solved exactly.
pub const EXACT_LIMIT: usize = 12;

/// Iteration cap for the local search phase.
const LOCAL_SEARCH_ITERATIONS: usize = 100;

/// Order `stops` to minimize travel time from `start` to `destination`.
///
/// Zero or one stop comes back unchanged without consulting `optimizer`.
/// The optimizer's answer must be a permutation that keeps `start` first and
/// `destination` last; anything else is a [`PlanError::Sequencing`] error.
pub fn sequence_route<O>(
    start: &Address,
    stops: &[(String, Address)],
    destination: &Address,
    optimizer: &O,
    roundtrip: bool,
) -> Result<Vec<(String, Address)>, PlanError>
where
    O: RouteOptimizer + ?Sized,
{
    let mut locations = Vec::with_capacity(stops.len() + 2);
    locations.push(start.routable()?);
    for (_, address) in stops {
        locations.push(address.routable()?);
    }
    locations.push(destination.routable()?);

    if stops.len() < 2 {
        return Ok(stops.to_vec());
    }

    let order = optimizer.optimal_order(&locations, roundtrip)?;
    validate_permutation(&order, locations.len())?;

    let sequenced = order[1..order.len() - 1]
        .iter()
        .map(|&waypoint| stops[waypoint - 1].clone())
        .collect::<Vec<_>>();

    debug!(stops = stops.len(), ?order, "route sequenced");
    Ok(sequenced)
}

/// Checks that `order` visits each of `n` waypoints once, start first and
/// destination last.
pub fn validate_permutation(order: &[usize], n: usize) -> Result<(), PlanError> {
    if order.len() != n {
        return Err(PlanError::Sequencing(format!(
            "expected {n} waypoints, optimizer returned {}",
            order.len()
        )));
    }
    let mut seen = vec![false; n];
    for &waypoint in order {
        if waypoint >= n || seen[waypoint] {
            return Err(PlanError::Sequencing(format!(
                "waypoint {waypoint} is out of range or repeated"
            )));
        }
        seen[waypoint] = true;
    }
    if order.first() != Some(&0) || order.last() != Some(&(n - 1)) {
        return Err(PlanError::Sequencing(
            "start and destination must stay first and last".to_string(),
        ));
    }
    Ok(())
}

/// Total travel time of visiting `order`, plus the leg back to the first
/// waypoint when `roundtrip` is set.
pub fn path_duration(matrix: &TravelTimeMatrix, order: &[usize], roundtrip: bool) -> f64 {
    let open = matrix.path_duration(order);
    match (roundtrip, order.first(), order.last()) {
        (true, Some(&first), Some(&last)) if order.len() > 1 => open + matrix.get(last, first),
        _ => open,
    }
}

/// Minimum-time order over all nodes of `matrix`, node 0 first and the last
/// node last.
pub fn optimal_order(matrix: &TravelTimeMatrix, roundtrip: bool) -> Vec<usize> {
    let n = matrix.size();
    if n <= 3 {
        return (0..n).collect();
    }

    let interior = n - 2;
    let order = if interior <= EXACT_LIMIT {
        held_karp(matrix)
    } else {
        let mut order = nearest_neighbour(matrix);
        local_search(matrix, &mut order);
        order
    };

    debug!(
        nodes = n,
        exact = interior <= EXACT_LIMIT,
        duration = path_duration(matrix, &order, roundtrip),
        "computed visiting order"
    );
    order
}

/// Exact open-path solver. The roundtrip leg from destination back to start
/// is the same for every order, so it does not enter the recursion.
fn held_karp(matrix: &TravelTimeMatrix) -> Vec<usize> {
    let n = matrix.size();
    let k = n - 2;
    let destination = n - 1;
    let full = (1usize << k) - 1;

    let mut cost = vec![f64::INFINITY; (full + 1) * k];
    let mut parent = vec![usize::MAX; (full + 1) * k];
    let at = |mask: usize, j: usize| mask * k + j;

    for j in 0..k {
        cost[at(1 << j, j)] = matrix.get(0, j + 1);
    }

    for mask in 1..=full {
        for j in 0..k {
            if mask & (1 << j) == 0 {
                continue;
            }
            let current = cost[at(mask, j)];
            if !current.is_finite() {
                continue;
            }
            for next in 0..k {
                if mask & (1 << next) != 0 {
                    continue;
                }
                let next_mask = mask | (1 << next);
                let candidate = current + matrix.get(j + 1, next + 1);
                if candidate < cost[at(next_mask, next)] {
                    cost[at(next_mask, next)] = candidate;
                    parent[at(next_mask, next)] = j;
                }
            }
        }
    }

    let mut last = 0;
    let mut best = f64::INFINITY;
    for j in 0..k {
        let total = cost[at(full, j)] + matrix.get(j + 1, destination);
        if total < best {
            best = total;
            last = j;
        }
    }

    let mut interior = Vec::with_capacity(k);
    let mut mask = full;
    let mut j = last;
    loop {
        interior.push(j + 1);
        let prev = parent[at(mask, j)];
        mask &= !(1 << j);
        if prev == usize::MAX {
            break;
        }
        j = prev;
    }
    interior.reverse();

    let mut order = Vec::with_capacity(n);
    order.push(0);
    order.extend(interior);
    order.push(destination);
    order
}

fn nearest_neighbour(matrix: &TravelTimeMatrix) -> Vec<usize> {
    let n = matrix.size();
    let destination = n - 1;
    let mut remaining: Vec<usize> = (1..destination).collect();
    let mut order = Vec::with_capacity(n);
    order.push(0);

    let mut current = 0;
    while !remaining.is_empty() {
        let mut best_index = 0;
        for (index, &candidate) in remaining.iter().enumerate() {
            if matrix.get(current, candidate) < matrix.get(current, remaining[best_index]) {
                best_index = index;
            }
        }
        current = remaining.remove(best_index);
        order.push(current);
    }

    order.push(destination);
    order
}

/// First-improvement local search over the interior of `order`.
fn local_search(matrix: &TravelTimeMatrix, order: &mut Vec<usize>) {
    for _ in 0..LOCAL_SEARCH_ITERATIONS {
        let improved = two_opt_improve(matrix, order) || relocate_improve(matrix, order);
        if !improved {
            break;
        }
    }
}

/// 2-opt: reverse an interior segment. Returns true if an improvement was made.
fn two_opt_improve(matrix: &TravelTimeMatrix, order: &mut [usize]) -> bool {
    let last_interior = order.len() - 2;
    let current = matrix.path_duration(order);

    for i in 1..last_interior {
        for j in i + 1..=last_interior {
            order[i..=j].reverse();
            if matrix.path_duration(order) < current {
                return true;
            }
            order[i..=j].reverse();
        }
    }
    false
}

/// Relocate: move one interior stop elsewhere in the interior.
/// Returns true if an improvement was made.
fn relocate_improve(matrix: &TravelTimeMatrix, order: &mut Vec<usize>) -> bool {
    let last_interior = order.len() - 2;
    let current = matrix.path_duration(order);

    for from in 1..=last_interior {
        for to in 1..=last_interior {
            if from == to {
                continue;
            }
            let mut candidate = order.clone();
            let stop = candidate.remove(from);
            candidate.insert(to, stop);
            if matrix.path_duration(&candidate) < current {
                *order = candidate;
                return true;
            }
        }
    }
    false
}

/// [`RouteOptimizer`] that fetches a matrix and solves the order locally.
#[derive(Debug, Clone)]
pub struct MatrixOptimizer<M> {
    provider: M,
}

impl<M: TravelTimeMatrixProvider> MatrixOptimizer<M> {
    pub fn new(provider: M) -> Self {
        Self { provider }
    }
}

impl<M: TravelTimeMatrixProvider> RouteOptimizer for MatrixOptimizer<M> {
    fn optimal_order(
        &self,
        locations: &[Coordinates],
        roundtrip: bool,
    ) -> Result<Vec<usize>, ExternalServiceError> {
        if locations.len() <= 3 {
            return Ok((0..locations.len()).collect());
        }
        let matrix = self.provider.travel_time_matrix(locations)?;
        if matrix.size() != locations.len() {
            return Err(ExternalServiceError::MalformedPayload(format!(
                "matrix has {} nodes for {} locations",
                matrix.size(),
                locations.len()
            )));
        }
        Ok(optimal_order(&matrix, roundtrip))
    }
}
