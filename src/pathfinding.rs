//! Shortest-path search over the road network.
//!
//! Dijkstra restricted to usable edges: blocked edges are always skipped, and
//! callers may exclude further edges for a single query (the edge being
//! detoured around, for instance).

use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashSet};

use ordered_float::OrderedFloat;

use crate::network::{Edge, EdgeId, RoadNetwork};

/// Find the shortest legal path from `start` to `end`.
///
/// Returns the edges in travel order, or `None` when `end` cannot be reached
/// without a blocked or excluded edge (or when either node is unknown).
/// Ties between equally distant frontier nodes are broken by load order, so
/// the same query always yields the same path.
pub fn find_detour(
    network: &RoadNetwork,
    start: &str,
    end: &str,
    excluded: &HashSet<EdgeId>,
) -> Option<Vec<Edge>> {
    let source = network.node_position(start)?;
    let target = network.node_position(end)?;
    if source == target {
        return Some(Vec::new());
    }

    let nodes = network.nodes();
    let n = nodes.len();
    let mut dist = vec![f64::INFINITY; n];
    let mut prev: Vec<Option<(usize, &Edge)>> = vec![None; n];
    let mut done = vec![false; n];

    dist[source] = 0.0;
    let mut heap = BinaryHeap::new();
    heap.push(Reverse((OrderedFloat(0.0), source)));

    while let Some(Reverse((OrderedFloat(cost), current))) = heap.pop() {
        if done[current] {
            continue;
        }
        done[current] = true;
        if current == target {
            break;
        }

        let here = &nodes[current].id;
        for edge in network.edges_at(here) {
            if edge.blocked || excluded.contains(&edge.id) {
                continue;
            }
            let Some(next) = edge.other_end(here).and_then(|id| network.node_position(id)) else {
                continue;
            };
            if done[next] {
                continue;
            }
            let candidate = cost + edge.length();
            if candidate < dist[next] {
                dist[next] = candidate;
                prev[next] = Some((current, edge));
                heap.push(Reverse((OrderedFloat(candidate), next)));
            }
        }
    }

    if !done[target] {
        return None;
    }

    let mut path = Vec::new();
    let mut at = target;
    while let Some((from, edge)) = prev[at] {
        path.push(edge.clone());
        at = from;
    }
    path.reverse();
    Some(path)
}

/// Total length of a path in kilometers
pub fn path_length(edges: &[Edge]) -> f64 {
    edges.iter().map(Edge::length).sum()
}
