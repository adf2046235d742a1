//! Budget-constrained stop selection.
//!
//! Given a travel-time matrix over `[start, stop_1..stop_n, destination]`,
//! per-node weights and a time budget, find the walk from start to
//! destination that collects the most weight without exceeding the budget.
//! Ties on weight go to the shorter walk.
//!
//! The search is best-first over partial walks, seeded with a greedy route.
//! Three prunes keep it exact:
//!
//! - reachability: shortest travel times between every pair of nodes (which
//!   may be shorter than the direct entry when the matrix is not metric)
//!   give a lower bound on finishing from any node. A branch that cannot
//!   reach the destination in time is dropped;
//! - an optimistic bound: a branch survives only if its weight plus the
//!   weight of every unvisited stop it could still fit in before the
//!   destination could beat the best route found so far, or tie with it on
//!   a shorter walk. A tying branch must still enter each of those stops,
//!   so the cheapest way into each one bounds its finishing time;
//! - dominance: two partial walks that end at the same node having visited the
//!   same set of stops collect the same weight, so only the shorter one is
//!   kept.
//!
//! The state space is still up to `n * 2^n`. [`SelectOptions::max_candidates`]
//! rejects larger inputs up front and the expansion limit, deadline and
//! cancel token bound the loop itself.

use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering as AtomicOrdering};
use std::time::Instant;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{PlanError, ValidationError};
use crate::matrix::TravelTimeMatrix;

/// Default ceiling on candidate stops per request.
///
/// Shortest-first search expands each (visited set, node) state at most
/// once, so 14 candidates stay under 900k expansions whatever the budget,
/// well inside [`DEFAULT_MAX_EXPANSIONS`].
pub const DEFAULT_MAX_CANDIDATES: usize = 14;

/// Default ceiling on popped search states per request.
pub const DEFAULT_MAX_EXPANSIONS: usize = 2_000_000;

/// Visited sets are 64-bit masks over all nodes, start and destination included.
pub const HARD_MAX_CANDIDATES: usize = 62;

/// Order in which the frontier is explored.
///
/// The prunes are admissible, so both orders find a route with the same
/// weight and duration. The order only changes how early good routes are
/// found and therefore how much of the frontier gets pruned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchOrder {
    /// Shortest accumulated time first, then lower weight, then lower node.
    #[default]
    ShortestFirst,
    /// Highest accumulated weight first, then shorter time, then lower node.
    MostProfitableFirst,
}

/// Cooperative cancellation flag shared with the search loop.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, AtomicOrdering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(AtomicOrdering::Relaxed)
    }
}

#[derive(Debug, Clone)]
pub struct SelectOptions {
    pub order: SearchOrder,
    /// Requests with more candidate stops than this are rejected.
    pub max_candidates: usize,
    /// Abort after popping this many states.
    pub max_expansions: Option<usize>,
    pub deadline: Option<Instant>,
    pub cancel: Option<CancelToken>,
}

impl Default for SelectOptions {
    fn default() -> Self {
        Self {
            order: SearchOrder::default(),
            max_candidates: DEFAULT_MAX_CANDIDATES,
            max_expansions: Some(DEFAULT_MAX_EXPANSIONS),
            deadline: None,
            cancel: None,
        }
    }
}

/// A feasible walk from start to destination.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SelectedRoute {
    /// Node indices from start to destination, inclusive.
    pub path: Vec<usize>,
    /// Accumulated travel time along `path`.
    pub distance: f64,
    /// Total weight of the visited stops.
    pub profit: f64,
}

impl SelectedRoute {
    /// Interior node indices, i.e. the selected stops in walk order.
    pub fn stops(&self) -> &[usize] {
        match self.path.len() {
            0..=2 => &[],
            len => &self.path[1..len - 1],
        }
    }
}

/// Outcome of [`select_stops`].
#[derive(Debug, Clone, PartialEq)]
pub enum Selection {
    Route(SelectedRoute),
    /// Not even the direct start to destination leg fits the budget.
    NoRoute,
}

impl Selection {
    pub fn route(&self) -> Option<&SelectedRoute> {
        match self {
            Selection::Route(route) => Some(route),
            Selection::NoRoute => None,
        }
    }

    pub fn into_route(self) -> Option<SelectedRoute> {
        match self {
            Selection::Route(route) => Some(route),
            Selection::NoRoute => None,
        }
    }

    pub fn is_no_route(&self) -> bool {
        matches!(self, Selection::NoRoute)
    }
}

/// Select the stops that maximize collected weight within `budget`.
///
/// Node 0 is the start and node `n - 1` the destination; their weights are
/// treated as zero whatever `weights` says. `budget` uses the matrix's time
/// unit.
pub fn select_stops(
    matrix: &TravelTimeMatrix,
    weights: &[f64],
    budget: f64,
    options: &SelectOptions,
) -> Result<Selection, PlanError> {
    let n = matrix.size();
    if n < 2 {
        return Err(ValidationError::TooFewNodes { min: 2, got: n }.into());
    }
    if weights.len() != n {
        return Err(ValidationError::WeightCount {
            got: weights.len(),
            expected: n,
        }
        .into());
    }
    if let Some((index, &value)) = weights
        .iter()
        .enumerate()
        .find(|(_, w)| !w.is_finite() || **w < 0.0)
    {
        return Err(ValidationError::InvalidWeight { index, value }.into());
    }
    if !budget.is_finite() || budget < 0.0 {
        return Err(ValidationError::InvalidBudget(budget).into());
    }

    let candidates = n - 2;
    let limit = options.max_candidates.min(HARD_MAX_CANDIDATES);
    if candidates > limit {
        return Err(PlanError::SearchLimit { candidates, limit });
    }

    let destination = n - 1;
    let mut weights = weights.to_vec();
    weights[0] = 0.0;
    weights[destination] = 0.0;

    let reach = shortest_times(matrix);
    let slack = tolerance(budget);
    // Longest detour from each node through one stop and on to the destination.
    let detour: Vec<f64> = (0..n)
        .map(|from| {
            (1..destination)
                .filter(|&stop| stop != from)
                .map(|stop| reach[from][stop] + reach[stop][destination])
                .fold(0.0, f64::max)
        })
        .collect();
    // Cheapest way into each node. A branch that can only tie the best route
    // has to enter every stop whose weight it counts, and the destination.
    let entry: Vec<f64> = (0..n)
        .map(|to| {
            (0..n)
                .filter(|&from| from != to)
                .map(|from| reach[from][to])
                .fold(f64::INFINITY, f64::min)
        })
        .collect();
    let required = 2.0 * tolerance(weights.iter().sum());
    let must_enter: Vec<f64> = (0..n)
        .map(|node| if weights[node] > required { entry[node] } else { 0.0 })
        .collect();

    let mut frontier = BinaryHeap::new();
    let mut shortest_at: HashMap<(u64, usize), f64> = HashMap::new();
    // (parent, node) links; each queued state points at its last entry.
    let mut trails: Vec<(usize, usize)> = vec![(0, 0)];
    let mut best = greedy_route(matrix, &weights, budget);
    let mut sequence = 0u64;
    let mut expansions = 0usize;

    frontier.push(Frontier {
        distance: 0.0,
        profit: 0.0,
        node: 0,
        visited: 1,
        trail: 0,
        sequence,
        order: options.order,
    });

    while let Some(state) = frontier.pop() {
        check_interrupt(options, expansions)?;
        expansions += 1;

        if state.node == destination {
            if state.distance <= budget && improves(best.as_ref(), state.profit, state.distance) {
                best = Some(SelectedRoute {
                    path: unwind(&trails, state.trail),
                    distance: state.distance,
                    profit: state.profit,
                });
            }
            continue;
        }

        // A shorter walk over the same stops reached this node after we queued.
        if shortest_at
            .get(&(state.visited, state.node))
            .is_some_and(|&d| d < state.distance)
        {
            continue;
        }

        let (unvisited_weight, unvisited_entry) = (1..destination)
            .filter(|&i| state.visited & (1 << i) == 0)
            .fold((0.0, 0.0), |(weight, entering), i| {
                (weight + weights[i], entering + must_enter[i])
            });

        for child in 1..n {
            let bit = 1u64 << child;
            if state.visited & bit != 0 {
                continue;
            }

            let child_distance = state.distance + matrix.get(state.node, child);
            let to_finish = if child == destination { 0.0 } else { reach[child][destination] };
            if child_distance > budget || child_distance + to_finish > budget + slack {
                continue;
            }

            let visited = state.visited | bit;
            let child_profit = state.profit + weights[child];
            // Weight still collectable past `child`, and the least time spent
            // entering the stops that weight comes from plus the destination.
            let (optimistic, entering) = if child == destination {
                (child_profit, 0.0)
            } else if child_distance + detour[child] <= budget + slack {
                (
                    state.profit + unvisited_weight,
                    unvisited_entry - must_enter[child] + entry[destination],
                )
            } else {
                (1..destination)
                    .filter(|&stop| visited & (1 << stop) == 0)
                    .filter(|&stop| {
                        child_distance + (reach[child][stop] + reach[stop][destination]) <= budget + slack
                    })
                    .fold((child_profit, entry[destination]), |(weight, entering), stop| {
                        (weight + weights[stop], entering + must_enter[stop])
                    })
            };
            let shortest_finish = match &best {
                Some(best) if optimistic <= best.profit + tolerance(best.profit) => {
                    (child_distance + to_finish).max(child_distance + entering)
                }
                _ => child_distance + to_finish,
            };
            if !could_improve(best.as_ref(), optimistic, shortest_finish - slack) {
                continue;
            }

            if child != destination {
                match shortest_at.get(&(visited, child)) {
                    Some(&d) if d <= child_distance => continue,
                    _ => {
                        shortest_at.insert((visited, child), child_distance);
                    }
                }
            }

            trails.push((state.trail, child));
            sequence += 1;
            frontier.push(Frontier {
                distance: child_distance,
                profit: child_profit,
                node: child,
                visited,
                trail: trails.len() - 1,
                sequence,
                order: options.order,
            });
        }
    }

    debug!(
        candidates,
        expansions,
        budget,
        found = best.is_some(),
        "stop selection finished"
    );

    Ok(match best {
        Some(route) => Selection::Route(route),
        None => Selection::NoRoute,
    })
}

/// All-pairs shortest travel times (Floyd-Warshall).
fn shortest_times(matrix: &TravelTimeMatrix) -> Vec<Vec<f64>> {
    let n = matrix.size();
    let mut reach = matrix.to_rows();
    for via in 0..n {
        for from in 0..n {
            for to in 0..n {
                let through = reach[from][via] + reach[via][to];
                if through < reach[from][to] {
                    reach[from][to] = through;
                }
            }
        }
    }
    reach
}

/// Appends the stop with the most weight per unit of travel time while the
/// destination stays within budget. `None` when the direct leg does not fit.
fn greedy_route(matrix: &TravelTimeMatrix, weights: &[f64], budget: f64) -> Option<SelectedRoute> {
    let destination = matrix.size() - 1;
    if matrix.get(0, destination) > budget {
        return None;
    }

    let mut path = vec![0];
    let mut visited = 1u64;
    let mut distance = 0.0;
    let mut profit = 0.0;
    let mut node = 0;
    loop {
        let rate = |stop: usize| weights[stop] / matrix.get(node, stop).max(f64::MIN_POSITIVE);
        let next = (1..destination)
            .filter(|&stop| visited & (1 << stop) == 0 && weights[stop] > 0.0)
            .filter(|&stop| distance + matrix.get(node, stop) + matrix.get(stop, destination) <= budget)
            .max_by(|&a, &b| rate(a).total_cmp(&rate(b)).then_with(|| b.cmp(&a)));
        let Some(stop) = next else { break };

        distance += matrix.get(node, stop);
        profit += weights[stop];
        visited |= 1 << stop;
        path.push(stop);
        node = stop;
    }

    path.push(destination);
    Some(SelectedRoute {
        path,
        distance: distance + matrix.get(node, destination),
        profit,
    })
}

fn unwind(trails: &[(usize, usize)], mut at: usize) -> Vec<usize> {
    let mut path = Vec::new();
    loop {
        let (parent, node) = trails[at];
        path.push(node);
        if at == 0 {
            break;
        }
        at = parent;
    }
    path.reverse();
    path
}

fn check_interrupt(options: &SelectOptions, expansions: usize) -> Result<(), PlanError> {
    if options.max_expansions.is_some_and(|max| expansions >= max) {
        return Err(PlanError::Interrupted("expansion limit reached"));
    }
    if options.cancel.as_ref().is_some_and(CancelToken::is_cancelled) {
        return Err(PlanError::Interrupted("cancelled"));
    }
    if options.deadline.is_some_and(|deadline| Instant::now() >= deadline) {
        return Err(PlanError::Interrupted("deadline exceeded"));
    }
    Ok(())
}

fn tolerance(profit: f64) -> f64 {
    1e-9 * profit.abs().max(1.0)
}

/// A finished walk replaces the best one when it collects strictly more,
/// or the same in strictly less time.
fn improves(best: Option<&SelectedRoute>, profit: f64, distance: f64) -> bool {
    match best {
        None => true,
        Some(best) => {
            let tol = tolerance(best.profit);
            profit > best.profit + tol
                || ((profit - best.profit).abs() <= tol && distance < best.distance)
        }
    }
}

/// Whether a branch whose weight is bounded by `optimistic` and whose
/// finished duration is at least `distance` can still win.
fn could_improve(best: Option<&SelectedRoute>, optimistic: f64, distance: f64) -> bool {
    match best {
        None => true,
        Some(best) => {
            let tol = tolerance(best.profit);
            optimistic > best.profit + tol
                || (optimistic >= best.profit - tol && distance < best.distance)
        }
    }
}

#[derive(Debug)]
struct Frontier {
    distance: f64,
    profit: f64,
    node: usize,
    visited: u64,
    trail: usize,
    sequence: u64,
    order: SearchOrder,
}

impl Frontier {
    /// `Greater` means "pop first".
    fn priority(&self, other: &Self) -> Ordering {
        let key = match self.order {
            SearchOrder::ShortestFirst => other
                .distance
                .total_cmp(&self.distance)
                .then_with(|| other.profit.total_cmp(&self.profit)),
            SearchOrder::MostProfitableFirst => self
                .profit
                .total_cmp(&other.profit)
                .then_with(|| other.distance.total_cmp(&self.distance)),
        };
        key.then_with(|| other.node.cmp(&self.node))
            .then_with(|| other.sequence.cmp(&self.sequence))
    }
}

impl PartialEq for Frontier {
    fn eq(&self, other: &Self) -> bool {
        self.priority(other) == Ordering::Equal
    }
}

impl Eq for Frontier {}

impl PartialOrd for Frontier {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Frontier {
    fn cmp(&self, other: &Self) -> Ordering {
        self.priority(other)
    }
}
