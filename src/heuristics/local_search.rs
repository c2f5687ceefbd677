//! Local search improvement heuristics for the delivery tour.
//!
//! This module implements:
//! - 2-opt segment reversal (first improvement, full re-evaluation)
//! - Lin-Kernighan style variable-depth search with candidate lists and don't-look bits
//! - Variable Neighborhood Descent chaining the two

use super::CancellationToken;
use crate::distance::Distance;
use crate::network::NodeId;
use crate::solution::{tour_length, Tour};
use ordered_float::OrderedFloat;

/// Trait for local search improvement methods
pub trait LocalSearch {
    /// Improve `tour` in place; returns true if its length went down
    fn improve(&self, depot: &str, distance: &dyn Distance, tour: &mut Tour, cancel: &CancellationToken) -> bool;
    fn name(&self) -> &str;
}

/// Improve a visiting order with 2-opt. The result is never longer than the input.
pub fn two_opt(initial: &[NodeId], distance: &dyn Distance, depot: &str) -> Vec<NodeId> {
    let mut tour = Tour::from_sequence(initial.to_vec(), depot, distance, "input");
    TwoOptSearch::new().improve(depot, distance, &mut tour, &CancellationToken::default());
    tour.sequence
}

/// Improve a visiting order with the Lin-Kernighan style search.
pub fn improve_tour(initial: &[NodeId], depot: &str, distance: &dyn Distance) -> Vec<NodeId> {
    let mut tour = Tour::from_sequence(initial.to_vec(), depot, distance, "input");
    LinKernighanSearch::new().improve(depot, distance, &mut tour, &CancellationToken::default());
    tour.sequence
}

/// 2-Opt Local Search
///
/// Reverses segments of the tour while that strictly shortens it. The first
/// improving reversal is adopted and the scan starts over.
pub struct TwoOptSearch {
    /// Upper bound on adopted moves
    pub max_moves: usize,
}

impl TwoOptSearch {
    pub fn new() -> Self {
        TwoOptSearch { max_moves: usize::MAX }
    }
}

impl Default for TwoOptSearch {
    fn default() -> Self {
        Self::new()
    }
}

impl LocalSearch for TwoOptSearch {
    fn improve(&self, depot: &str, distance: &dyn Distance, tour: &mut Tour, cancel: &CancellationToken) -> bool {
        let n = tour.sequence.len();
        tour.evaluate(depot, distance);
        if n < 2 {
            return false;
        }

        let initial_length = tour.length;
        let mut best_length = tour.length;
        let mut moves = 0;
        let mut candidate = tour.sequence.clone();

        'sweep: while moves < self.max_moves && !cancel.is_cancelled() {
            for i in 0..n - 1 {
                for k in i + 1..n {
                    candidate[i..=k].reverse();
                    let length = tour_length(&candidate, depot, distance);
                    if length < best_length {
                        log::debug!("2-opt reversed [{}..={}]: {:.3} -> {:.3}", i, k, best_length, length);
                        best_length = length;
                        tour.sequence.clone_from_slice(&candidate);
                        moves += 1;
                        continue 'sweep;
                    }
                    candidate[i..=k].reverse();
                }
            }
            break;
        }

        tour.length = best_length;
        tour.iterations = Some(moves);
        best_length < initial_length
    }

    fn name(&self) -> &str {
        "2-Opt"
    }
}

/// Dense distance table over the depot and the tour's addresses
struct DistanceTable {
    size: usize,
    data: Vec<f64>,
}

impl DistanceTable {
    fn build(nodes: &[&str], distance: &dyn Distance) -> Self {
        let size = nodes.len();
        let mut data = vec![0.0; size * size];
        for i in 0..size {
            for j in 0..size {
                if i != j {
                    data[i * size + j] = distance.distance(nodes[i], nodes[j]);
                }
            }
        }
        DistanceTable { size, data }
    }

    #[inline]
    fn get(&self, i: usize, j: usize) -> f64 {
        self.data[i * self.size + j]
    }

    /// The `k` nearest other nodes of every node, nearest first
    fn nearest_neighbors(&self, k: usize) -> Vec<Vec<usize>> {
        (0..self.size)
            .map(|i| {
                let mut others: Vec<usize> = (0..self.size).filter(|&j| j != i).collect();
                others.sort_by_key(|&j| OrderedFloat(self.get(i, j)));
                others.truncate(k);
                others
            })
            .collect()
    }
}

/// Lin-Kernighan style variable-depth search
///
/// Works on the closed cycle depot -> addresses -> depot. From each node `t1`
/// not marked don't-look it breaks the edge to its successor `t2` and tries
/// the candidate neighbors `t3` of `t1` as the new partner:
///
/// - 2-opt closure: break `t3`-`succ(t3)`, reconnect `t2`-`succ(t3)`.
/// - 3-opt extension: break `pred(t3)`-`t3`, join `pred(t3)` to a candidate
///   `t5` of `t3` lying further along the cycle, break `pred(t5)`-`t5` and
///   close with `pred(t5)`-`t2`. This moves the segment `t3..pred(t5)` between
///   `t1` and `t2` without reversing anything.
///
/// The first move whose gain exceeds `epsilon` is applied, every don't-look
/// bit is cleared and the scan restarts. At most `max_iterations` moves are
/// applied.
pub struct LinKernighanSearch {
    /// Hard cap on applied moves
    pub max_iterations: usize,
    /// Size of each node's nearest-neighbor candidate list
    pub candidates: usize,
    /// Minimum gain for a move to count as an improvement
    pub epsilon: f64,
}

impl LinKernighanSearch {
    pub fn new() -> Self {
        LinKernighanSearch {
            max_iterations: 100,
            candidates: 10,
            epsilon: 0.001,
        }
    }

    pub fn with_params(max_iterations: usize, candidates: usize, epsilon: f64) -> Self {
        LinKernighanSearch { max_iterations, candidates, epsilon }
    }

    /// Look for an improving move starting at `t1`; returns the new cycle.
    fn try_move(
        &self,
        cycle: &[usize],
        pos: &[usize],
        t1: usize,
        table: &DistanceTable,
        neighbors: &[Vec<usize>],
    ) -> Option<Vec<usize>> {
        let m = cycle.len();
        let d = |a: usize, b: usize| table.get(a, b);
        let i = pos[t1];
        let t2 = cycle[(i + 1) % m];
        let pred = cycle[(i + m - 1) % m];
        let removed = d(t1, t2);
        // Offset along the cycle, counted from t1
        let rel = |node: usize| (pos[node] + m - i) % m;

        for &t3 in &neighbors[t1] {
            if t3 == t2 || t3 == pred {
                continue;
            }
            let g1 = removed - d(t1, t3);
            if g1 <= 0.0 {
                continue;
            }
            let j = pos[t3];
            let t4 = cycle[(j + 1) % m];
            let gain = g1 + d(t3, t4) - d(t2, t4);
            if gain > self.epsilon {
                log::debug!("2-opt move at {} (gain {:.4})", t1, gain);
                return Some(reverse_between(cycle, i, j));
            }
        }

        for &t3 in &neighbors[t1] {
            if t3 == t2 || t3 == pred {
                continue;
            }
            let g1 = removed - d(t1, t3);
            if g1 <= 0.0 {
                continue;
            }
            let b = rel(t3);
            let t4 = cycle[(pos[t3] + m - 1) % m];
            for &t5 in &neighbors[t3] {
                let r = rel(t5);
                if r <= b {
                    continue;
                }
                let g2 = g1 + d(t4, t3) - d(t4, t5);
                if g2 <= 0.0 {
                    continue;
                }
                let t6 = cycle[(pos[t5] + m - 1) % m];
                let gain = g2 + d(t6, t5) - d(t6, t2);
                if gain > self.epsilon {
                    log::debug!("3-opt move at {} (gain {:.4})", t1, gain);
                    return Some(move_segment(cycle, i, b, r - 1));
                }
            }
        }

        None
    }
}

impl Default for LinKernighanSearch {
    fn default() -> Self {
        Self::new()
    }
}

/// Reconnect t1-t3 / t2-t4 where t1 = cycle[i], t3 = cycle[j]
fn reverse_between(cycle: &[usize], i: usize, j: usize) -> Vec<usize> {
    let mut next = cycle.to_vec();
    if i < j {
        next[i + 1..=j].reverse();
    } else {
        next[j + 1..=i].reverse();
    }
    next
}

/// Rotate so `start` comes first, then move the block `[b..=r]` right after it
fn move_segment(cycle: &[usize], start: usize, b: usize, r: usize) -> Vec<usize> {
    let m = cycle.len();
    let rotated: Vec<usize> = (0..m).map(|k| cycle[(start + k) % m]).collect();
    let mut next = Vec::with_capacity(m);
    next.push(rotated[0]);
    next.extend_from_slice(&rotated[b..=r]);
    next.extend_from_slice(&rotated[1..b]);
    next.extend_from_slice(&rotated[r + 1..]);
    next
}

impl LocalSearch for LinKernighanSearch {
    fn improve(&self, depot: &str, distance: &dyn Distance, tour: &mut Tour, cancel: &CancellationToken) -> bool {
        tour.evaluate(depot, distance);
        if tour.sequence.len() < 3 {
            tour.iterations = Some(0);
            return false;
        }

        let initial_length = tour.length;
        let nodes: Vec<&str> = std::iter::once(depot)
            .chain(tour.sequence.iter().map(String::as_str))
            .collect();
        let m = nodes.len();
        let table = DistanceTable::build(&nodes, distance);
        let neighbors = table.nearest_neighbors(self.candidates);

        // Node 0 is the depot
        let mut cycle: Vec<usize> = (0..m).collect();
        let mut pos: Vec<usize> = (0..m).collect();
        let mut dont_look = vec![false; m];
        let mut moves = 0;

        for _ in 0..self.max_iterations {
            if cancel.is_cancelled() {
                break;
            }

            let mut applied = None;
            for idx in 0..m {
                let t1 = cycle[idx];
                if dont_look[t1] {
                    continue;
                }
                applied = self.try_move(&cycle, &pos, t1, &table, &neighbors);
                if applied.is_some() {
                    break;
                }
                dont_look[t1] = true;
            }

            let Some(next) = applied else {
                break;
            };
            cycle = next;
            for (p, &node) in cycle.iter().enumerate() {
                pos[node] = p;
            }
            dont_look.fill(false);
            moves += 1;
        }

        let start = pos[0];
        let sequence: Vec<NodeId> = (1..m)
            .map(|k| nodes[cycle[(start + k) % m]].to_string())
            .collect();
        let length = tour_length(&sequence, depot, distance);

        tour.iterations = Some(moves);
        if length < initial_length {
            tour.sequence = sequence;
            tour.length = length;
            true
        } else {
            false
        }
    }

    fn name(&self) -> &str {
        "Lin-Kernighan"
    }
}

/// Variable Neighborhood Descent (VND)
///
/// Applies multiple local search operators in a systematic way.
pub struct VariableNeighborhoodDescent {
    /// List of local search operators
    operators: Vec<Box<dyn LocalSearch + Send + Sync>>,
}

impl VariableNeighborhoodDescent {
    pub fn new() -> Self {
        VariableNeighborhoodDescent { operators: Vec::new() }
    }

    pub fn with_standard_operators() -> Self {
        let operators: Vec<Box<dyn LocalSearch + Send + Sync>> = vec![
            Box::new(LinKernighanSearch::new()),
            Box::new(TwoOptSearch::new()),
        ];
        VariableNeighborhoodDescent { operators }
    }

    pub fn add_operator<L: LocalSearch + Send + Sync + 'static>(&mut self, op: L) {
        self.operators.push(Box::new(op));
    }
}

impl Default for VariableNeighborhoodDescent {
    fn default() -> Self {
        Self::with_standard_operators()
    }
}

impl LocalSearch for VariableNeighborhoodDescent {
    fn improve(&self, depot: &str, distance: &dyn Distance, tour: &mut Tour, cancel: &CancellationToken) -> bool {
        let mut total_improved = false;
        let mut k = 0;
        let mut total_iterations = 0;
        let max_total_iterations = 100;

        while k < self.operators.len() && total_iterations < max_total_iterations && !cancel.is_cancelled() {
            if self.operators[k].improve(depot, distance, tour, cancel) {
                total_improved = true;
                k = 0;
            } else {
                k += 1;
            }
            total_iterations += 1;
        }

        tour.iterations = Some(total_iterations);
        total_improved
    }

    fn name(&self) -> &str {
        "VND"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::distance::NetworkDistance;
    use crate::heuristics::construction::nearest_insertion;
    use crate::network::tests::{grid, triangle};
    use rand::prelude::*;
    use rand_chacha::ChaCha8Rng;
    use std::collections::HashMap;

    fn ids(names: &[&str]) -> Vec<NodeId> {
        names.iter().map(|s| s.to_string()).collect()
    }

    /// Euclidean distances over named random points
    struct Points(HashMap<String, (f64, f64)>);

    impl Points {
        fn random(n: usize, seed: u64) -> (Self, Vec<NodeId>) {
            let mut rng = ChaCha8Rng::seed_from_u64(seed);
            let mut map = HashMap::new();
            map.insert("depot".to_string(), (50.0, 50.0));
            let mut names = Vec::new();
            for i in 0..n {
                let name = format!("p{}", i);
                map.insert(name.clone(), (rng.gen_range(0.0..100.0), rng.gen_range(0.0..100.0)));
                names.push(name);
            }
            (Points(map), names)
        }
    }

    impl Distance for Points {
        fn distance(&self, from: &str, to: &str) -> f64 {
            match (self.0.get(from), self.0.get(to)) {
                (Some(a), Some(b)) => ((a.0 - b.0).powi(2) + (a.1 - b.1).powi(2)).sqrt(),
                _ => f64::INFINITY,
            }
        }
    }

    fn same_set(a: &[NodeId], b: &[NodeId]) -> bool {
        let mut a = a.to_vec();
        let mut b = b.to_vec();
        a.sort();
        b.sort();
        a == b
    }

    #[test]
    fn test_two_opt_keeps_optimal_pair() {
        let network = triangle(false);
        let service = NetworkDistance::new(&network);
        assert_eq!(two_opt(&ids(&["A", "B"]), &service, "Depot"), ids(&["A", "B"]));
    }

    #[test]
    fn test_two_opt_untangles_crossing() {
        // Square corners visited in crossing order
        let (mut points, _) = Points::random(0, 1);
        for (name, xy) in [("a", (0.0, 0.0)), ("b", (10.0, 0.0)), ("c", (0.0, 10.0)), ("d", (10.0, 10.0))] {
            points.0.insert(name.to_string(), xy);
        }
        points.0.insert("depot".to_string(), (-5.0, 0.0));
        let crossing = ids(&["a", "d", "b", "c"]);
        let improved = two_opt(&crossing, &points, "depot");
        assert!(same_set(&improved, &crossing));
        assert!(tour_length(&improved, "depot", &points) < tour_length(&crossing, "depot", &points));
    }

    #[test]
    fn test_two_opt_monotonicity_on_random_tours() {
        for seed in 0..20 {
            let (points, mut names) = Points::random(12, seed);
            names.shuffle(&mut ChaCha8Rng::seed_from_u64(seed + 100));
            let before = tour_length(&names, "depot", &points);
            let after = two_opt(&names, &points, "depot");
            assert!(same_set(&after, &names));
            assert!(tour_length(&after, "depot", &points) <= before);
        }
    }

    #[test]
    fn test_two_opt_is_a_local_optimum() {
        let (points, names) = Points::random(10, 7);
        let first = two_opt(&names, &points, "depot");
        let second = two_opt(&first, &points, "depot");
        assert_eq!(first, second);
    }

    #[test]
    fn test_lin_kernighan_never_worsens() {
        for seed in 0..20 {
            let (points, mut names) = Points::random(15, seed);
            names.shuffle(&mut ChaCha8Rng::seed_from_u64(seed + 7));
            let before = tour_length(&names, "depot", &points);
            let after = improve_tour(&names, "depot", &points);
            assert!(same_set(&after, &names));
            assert!(tour_length(&after, "depot", &points) <= before + 1e-9);
        }
    }

    #[test]
    fn test_lin_kernighan_improves_random_start() {
        let (points, mut names) = Points::random(15, 3);
        names.shuffle(&mut ChaCha8Rng::seed_from_u64(11));
        let mut tour = Tour::from_sequence(names.clone(), "depot", &points, "random");
        let before = tour.length;
        let improved = LinKernighanSearch::new().improve("depot", &points, &mut tour, &CancellationToken::new());
        assert!(improved);
        assert!(tour.length < before);
        assert!(tour.iterations.unwrap_or(0) >= 1);
        assert!(tour.iterations.unwrap_or(0) <= 100);
    }

    #[test]
    fn test_iteration_cap_bounds_moves() {
        let (points, mut names) = Points::random(15, 5);
        names.shuffle(&mut ChaCha8Rng::seed_from_u64(5));
        let mut tour = Tour::from_sequence(names, "depot", &points, "random");
        let search = LinKernighanSearch::with_params(1, 10, 0.001);
        search.improve("depot", &points, &mut tour, &CancellationToken::new());
        assert!(tour.iterations.unwrap_or(0) <= 1);
    }

    #[test]
    fn test_segment_move_is_a_valid_reconnection() {
        // Cycle 0 1 2 3 4 5: t1 = 0, segment [3..=4] moves between 0 and 1
        let next = move_segment(&[0, 1, 2, 3, 4, 5], 0, 3, 4);
        assert_eq!(next, vec![0, 3, 4, 1, 2, 5]);
        // Rotation when t1 is not first
        let next = move_segment(&[4, 5, 0, 1, 2, 3], 2, 3, 4);
        assert_eq!(next, vec![0, 3, 4, 1, 2, 5]);
    }

    #[test]
    fn test_segment_move_found_where_two_opt_is_stuck() {
        // Identity order is 2-opt optimal; moving q2..q5 between depot and q1 saves ~0.459
        let coords = [
            ("depot", (7.0, 6.0)),
            ("q1", (9.0, 10.0)),
            ("q2", (9.0, 4.0)),
            ("q3", (2.0, 0.0)),
            ("q4", (1.0, 8.0)),
            ("q5", (3.0, 10.0)),
            ("q6", (5.0, 6.0)),
        ];
        let points = Points(coords.iter().map(|(name, xy)| (name.to_string(), *xy)).collect());
        let nodes: Vec<&str> = coords.iter().map(|(name, _)| *name).collect();
        let table = DistanceTable::build(&nodes, &points);
        let neighbors = table.nearest_neighbors(10);
        let identity: Vec<usize> = (0..nodes.len()).collect();

        let search = LinKernighanSearch::new();
        let next = search.try_move(&identity, &identity, 0, &table, &neighbors);
        assert_eq!(next, Some(vec![0, 2, 3, 4, 5, 1, 6]));

        let cycle_length = |c: &[usize]| (0..c.len()).map(|k| table.get(c[k], c[(k + 1) % c.len()])).sum::<f64>();
        let moved = [0, 2, 3, 4, 5, 1, 6];
        let gain = cycle_length(&identity[..]) - cycle_length(&moved[..]);
        assert!((gain - 0.459).abs() < 1e-3);

        let sequence = ids(&["q1", "q2", "q3", "q4", "q5", "q6"]);
        let start = tour_length(&sequence, "depot", &points);
        let by_two_opt = tour_length(&two_opt(&sequence, &points, "depot"), "depot", &points);
        assert!(by_two_opt > start - 1e-9);

        let improved = improve_tour(&sequence, "depot", &points);
        assert!(same_set(&improved, &sequence));
        assert!(tour_length(&improved, "depot", &points) < by_two_opt - 0.4);
    }

    #[test]
    fn test_reverse_between_both_orders() {
        assert_eq!(reverse_between(&[0, 1, 2, 3, 4], 0, 3), vec![0, 3, 2, 1, 4]);
        assert_eq!(reverse_between(&[0, 1, 2, 3, 4], 3, 0), vec![0, 3, 2, 1, 4]);
    }

    #[test]
    fn test_cancelled_search_returns_input() {
        let (points, names) = Points::random(12, 2);
        let token = CancellationToken::new();
        token.cancel();
        let mut tour = Tour::from_sequence(names.clone(), "depot", &points, "random");
        assert!(!LinKernighanSearch::new().improve("depot", &points, &mut tour, &token));
        assert!(!TwoOptSearch::new().improve("depot", &points, &mut tour, &token));
        assert_eq!(tour.sequence, names);
    }

    #[test]
    fn test_small_tours_are_untouched() {
        let network = triangle(false);
        let service = NetworkDistance::new(&network);
        assert_eq!(improve_tour(&ids(&["A", "B"]), "Depot", &service), ids(&["A", "B"]));
        assert!(improve_tour(&[], "Depot", &service).is_empty());
        assert!(two_opt(&[], &service, "Depot").is_empty());
    }

    #[test]
    fn test_vnd_on_network() {
        let network = grid();
        let service = NetworkDistance::new(&network);
        let addresses = network.addresses();
        let start = nearest_insertion(&addresses, "Depot", &service);
        let mut tour = Tour::from_sequence(start, "Depot", &service, "NearestInsertion");
        let before = tour.length;
        VariableNeighborhoodDescent::with_standard_operators().improve("Depot", &service, &mut tour, &CancellationToken::new());
        assert!(tour.is_complete(&addresses));
        assert!(tour.length <= before);
    }
}
