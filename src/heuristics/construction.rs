use crate::distance::Distance;
use crate::network::NodeId;
use crate::solution::Tour;
use ordered_float::OrderedFloat;

pub trait ConstructionHeuristic {
    fn construct(&self, addresses: &[NodeId], depot: &str, distance: &dyn Distance) -> Tour;
    fn name(&self) -> &str;
}

/// Build a visiting order by cheapest insertion, in input order.
///
/// Seeds the route with the first address, then inserts every other address
/// at the position adding the least length. Positions before the first and
/// after the last stop are measured against the depot. Ties keep the earliest
/// position.
pub fn nearest_insertion(addresses: &[NodeId], depot: &str, distance: &dyn Distance) -> Vec<NodeId> {
    let Some((first, rest)) = addresses.split_first() else {
        return Vec::new();
    };

    let mut route = Vec::with_capacity(addresses.len());
    route.push(first.clone());

    for node in rest {
        let mut best_pos = 0;
        let mut best_cost = f64::INFINITY;

        for pos in 0..=route.len() {
            let prev = if pos == 0 { depot } else { route[pos - 1].as_str() };
            let next = if pos == route.len() { depot } else { route[pos].as_str() };
            let cost = distance.distance(prev, node) + distance.distance(node, next)
                - distance.distance(prev, next);
            if cost < best_cost {
                best_cost = cost;
                best_pos = pos;
            }
        }

        route.insert(best_pos, node.clone());
    }

    route
}

/// Build a visiting order with the Clarke-Wright savings algorithm.
///
/// Every address starts on its own depot round trip; routes are then joined
/// end to end in decreasing order of `d(depot,i) + d(depot,j) - d(i,j)`.
pub fn clarke_wright_savings(addresses: &[NodeId], depot: &str, distance: &dyn Distance) -> Vec<NodeId> {
    let n = addresses.len();
    if n <= 1 {
        return addresses.to_vec();
    }

    let from_depot: Vec<f64> = addresses.iter().map(|a| distance.distance(depot, a)).collect();

    let mut savings: Vec<(usize, usize, f64)> = Vec::with_capacity(n * (n - 1) / 2);
    for i in 0..n {
        for j in i + 1..n {
            let s = from_depot[i] + from_depot[j] - distance.distance(&addresses[i], &addresses[j]);
            savings.push((i, j, s));
        }
    }

    // Stable sort: equal savings keep pair generation order
    savings.sort_by(|a, b| OrderedFloat(b.2).cmp(&OrderedFloat(a.2)));

    let mut route_of: Vec<usize> = (0..n).collect();
    let mut routes: Vec<Vec<usize>> = (0..n).map(|i| vec![i]).collect();

    for &(i, j, _) in &savings {
        let ri = route_of[i];
        let rj = route_of[j];
        if ri == rj {
            continue;
        }

        let i_head = routes[ri].first() == Some(&i);
        let i_tail = routes[ri].last() == Some(&i);
        let j_head = routes[rj].first() == Some(&j);
        let j_tail = routes[rj].last() == Some(&j);

        let left = std::mem::take(&mut routes[ri]);
        let right = std::mem::take(&mut routes[rj]);

        let merged: Vec<usize> = if i_tail && j_head {
            left.into_iter().chain(right).collect()
        } else if i_head && j_tail {
            right.into_iter().chain(left).collect()
        } else if i_tail && j_tail {
            left.into_iter().chain(right.into_iter().rev()).collect()
        } else if i_head && j_head {
            left.into_iter().rev().chain(right).collect()
        } else {
            // One of them is interior: put both routes back untouched
            routes[ri] = left;
            routes[rj] = right;
            continue;
        };

        for &member in &merged {
            route_of[member] = ri;
        }
        routes[ri] = merged;
    }

    let remaining: Vec<&Vec<usize>> = routes.iter().filter(|r| !r.is_empty()).collect();
    if remaining.len() != 1 {
        log::warn!(
            "savings merge left {} fragments, returning them concatenated",
            remaining.len()
        );
    }

    remaining
        .into_iter()
        .flatten()
        .map(|&i| addresses[i].clone())
        .collect()
}

/// Cheapest-insertion construction
pub struct NearestInsertionHeuristic;

impl NearestInsertionHeuristic {
    pub fn new() -> Self {
        NearestInsertionHeuristic
    }
}

impl Default for NearestInsertionHeuristic {
    fn default() -> Self {
        Self::new()
    }
}

impl ConstructionHeuristic for NearestInsertionHeuristic {
    fn construct(&self, addresses: &[NodeId], depot: &str, distance: &dyn Distance) -> Tour {
        let start = std::time::Instant::now();
        let sequence = nearest_insertion(addresses, depot, distance);
        let mut tour = Tour::from_sequence(sequence, depot, distance, self.name());
        tour.computation_time = start.elapsed().as_secs_f64();
        tour
    }

    fn name(&self) -> &str {
        "NearestInsertion"
    }
}

/// Clarke-Wright Savings construction
pub struct SavingsHeuristic;

impl SavingsHeuristic {
    pub fn new() -> Self {
        SavingsHeuristic
    }
}

impl Default for SavingsHeuristic {
    fn default() -> Self {
        Self::new()
    }
}

impl ConstructionHeuristic for SavingsHeuristic {
    fn construct(&self, addresses: &[NodeId], depot: &str, distance: &dyn Distance) -> Tour {
        let start = std::time::Instant::now();
        let sequence = clarke_wright_savings(addresses, depot, distance);
        let mut tour = Tour::from_sequence(sequence, depot, distance, self.name());
        tour.computation_time = start.elapsed().as_secs_f64();
        tour
    }

    fn name(&self) -> &str {
        "Savings-ClarkeWright"
    }
}

/// Multi-Start Construction
///
/// Runs multiple construction heuristics and returns the shortest tour.
pub struct MultiStartConstruction {
    heuristics: Vec<Box<dyn ConstructionHeuristic + Send + Sync>>,
}

impl MultiStartConstruction {
    pub fn new() -> Self {
        MultiStartConstruction { heuristics: Vec::new() }
    }

    pub fn with_all_heuristics() -> Self {
        let heuristics: Vec<Box<dyn ConstructionHeuristic + Send + Sync>> = vec![
            Box::new(NearestInsertionHeuristic::new()),
            Box::new(SavingsHeuristic::new()),
        ];
        MultiStartConstruction { heuristics }
    }

    pub fn add_heuristic<H: ConstructionHeuristic + Send + Sync + 'static>(&mut self, h: H) {
        self.heuristics.push(Box::new(h));
    }
}

impl Default for MultiStartConstruction {
    fn default() -> Self {
        Self::with_all_heuristics()
    }
}

impl ConstructionHeuristic for MultiStartConstruction {
    fn construct(&self, addresses: &[NodeId], depot: &str, distance: &dyn Distance) -> Tour {
        let start = std::time::Instant::now();

        let mut best: Option<Tour> = None;
        for heuristic in &self.heuristics {
            let tour = heuristic.construct(addresses, depot, distance);
            log::debug!("{}: {:.3} km", heuristic.name(), tour.length);
            if best.as_ref().map_or(true, |b| tour.length < b.length) {
                best = Some(tour);
            }
        }

        // No heuristic registered: keep the input order
        let mut best = best.unwrap_or_else(|| {
            Tour::from_sequence(addresses.to_vec(), depot, distance, "InputOrder")
        });
        let picked = best.algorithm.clone();

        log::info!("multi-start kept {} ({:.3} km)", picked, best.length);
        best.algorithm = self.name().to_string();
        best.computation_time = start.elapsed().as_secs_f64();
        best
    }

    fn name(&self) -> &str {
        "MultiStart"
    }
}
