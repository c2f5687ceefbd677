//! Network distances between nodes, memoized.
//!
//! The `Distance` trait is the seam every tour heuristic is written against.
//! `NetworkDistance` implements it over the road graph: direct edge first, then
//! Dijkstra between junction representatives, then a straight-line estimate.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard};

use serde::Serialize;

use crate::network::{NodeId, RoadNetwork};
use crate::pathfinding::{find_detour, path_length};

/// Distance between two nodes, in kilometers
pub trait Distance {
    fn distance(&self, from: &str, to: &str) -> f64;
}

impl<F> Distance for F
where
    F: Fn(&str, &str) -> f64,
{
    fn distance(&self, from: &str, to: &str) -> f64 {
        self(from, to)
    }
}

/// Cache occupancy and hit counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    /// Number of stored entries (each pair is stored under both orderings)
    pub size: usize,
    pub hits: usize,
    pub misses: usize,
}

/// Symmetric, append-only memo of computed distances
#[derive(Debug, Default)]
pub struct DistanceCache {
    entries: Mutex<HashMap<(NodeId, NodeId), f64>>,
    hits: AtomicUsize,
    misses: AtomicUsize,
}

impl DistanceCache {
    pub fn new() -> Self {
        Self::default()
    }

    fn entries(&self) -> MutexGuard<'_, HashMap<(NodeId, NodeId), f64>> {
        // A panic while holding the lock cannot leave a half-written entry.
        self.entries.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Look up `(from, to)`; either ordering matches
    pub fn get(&self, from: &str, to: &str) -> Option<f64> {
        let entries = self.entries();
        let found = entries
            .get(&(from.to_string(), to.to_string()))
            .or_else(|| entries.get(&(to.to_string(), from.to_string())))
            .copied();
        match found {
            Some(_) => self.hits.fetch_add(1, Ordering::Relaxed),
            None => self.misses.fetch_add(1, Ordering::Relaxed),
        };
        found
    }

    /// Store a value under both orderings
    pub fn insert(&self, from: &str, to: &str, value: f64) {
        let mut entries = self.entries();
        entries.insert((from.to_string(), to.to_string()), value);
        entries.insert((to.to_string(), from.to_string()), value);
    }

    pub fn clear(&self) {
        self.entries().clear();
        self.hits.store(0, Ordering::Relaxed);
        self.misses.store(0, Ordering::Relaxed);
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            size: self.entries().len(),
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
        }
    }
}

/// Distance service over a road network with its own cache
#[derive(Debug)]
pub struct NetworkDistance<'a> {
    network: &'a RoadNetwork,
    cache: DistanceCache,
}

impl<'a> NetworkDistance<'a> {
    pub fn new(network: &'a RoadNetwork) -> Self {
        NetworkDistance { network, cache: DistanceCache::new() }
    }

    pub fn network(&self) -> &'a RoadNetwork {
        self.network
    }

    /// Network distance in kilometers, `f64::INFINITY` if nothing is known
    /// about one of the nodes.
    pub fn calculate(&self, from: &str, to: &str) -> f64 {
        if let Some(cached) = self.cache.get(from, to) {
            return cached;
        }

        let value = self.compute(from, to);
        log::debug!("distance {} -> {} = {:.3} km", from, to, value);
        self.cache.insert(from, to, value);
        value
    }

    fn compute(&self, from: &str, to: &str) -> f64 {
        let from_group = self.network.coincident(from);
        let to_group = self.network.coincident(to);

        for u in &from_group {
            for v in &to_group {
                let direct = self
                    .network
                    .edges_at(u)
                    .find(|e| !e.blocked && e.connects(u, v));
                if let Some(edge) = direct {
                    return edge.length();
                }
            }
        }

        let source = self.representative(&from_group);
        let target = self.representative(&to_group);
        if let Some(path) = find_detour(self.network, source, target, &HashSet::new()) {
            return path_length(&path);
        }

        self.network.euclidean_km(from, to).unwrap_or(f64::INFINITY)
    }

    /// Junction member of a group, or its first member
    fn representative<'g>(&self, group: &'g [NodeId]) -> &'g str {
        group
            .iter()
            .find(|id| self.network.node(id).map_or(false, |n| n.is_junction()))
            .or_else(|| group.first())
            .map(String::as_str)
            .unwrap_or_default()
    }

    pub fn clear_cache(&self) {
        self.cache.clear();
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }
}

impl Distance for NetworkDistance<'_> {
    fn distance(&self, from: &str, to: &str) -> f64 {
        self.calculate(from, to)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::tests::{grid, triangle};
    use crate::network::{Canvas, Edge, Node, NodeKind};

    #[test]
    fn test_direct_edge_short_circuit() {
        let network = triangle(false);
        let service = NetworkDistance::new(&network);
        // e3 is 3.0 km although Depot-A-B is only 2.0 km
        assert_eq!(service.calculate("Depot", "B"), 3.0);
        assert_eq!(service.calculate("A", "B"), 1.0);
    }

    #[test]
    fn test_blocked_direct_edge_is_ignored() {
        let network = triangle(true);
        let service = NetworkDistance::new(&network);
        assert!((service.calculate("A", "B") - 4.0).abs() < 1e-10);
    }

    #[test]
    fn test_symmetry() {
        let network = grid();
        let service = NetworkDistance::new(&network);
        let ids: Vec<String> = network.nodes().iter().map(|n| n.id.clone()).collect();
        for a in &ids {
            for b in &ids {
                assert_eq!(service.calculate(a, b), service.calculate(b, a));
            }
        }
        service.clear_cache();
        for a in &ids {
            for b in &ids {
                let forward = service.calculate(a, b);
                service.clear_cache();
                assert!((forward - service.calculate(b, a)).abs() < 1e-10);
                service.clear_cache();
            }
        }
    }

    #[test]
    fn test_cache_lifecycle() {
        let network = grid();
        let service = NetworkDistance::new(&network);
        service.clear_cache();
        assert_eq!(service.cache_stats().size, 0);

        let first = service.calculate("A1", "A4");
        let stats = service.cache_stats();
        assert!(stats.size >= 1);
        assert_eq!(stats.misses, 1);

        assert_eq!(service.calculate("A4", "A1"), first);
        assert_eq!(service.cache_stats().hits, 1);

        service.clear_cache();
        assert_eq!(service.cache_stats(), CacheStats::default());
    }

    #[test]
    fn test_coincident_address_uses_depot_edges() {
        let network = grid();
        let service = NetworkDistance::new(&network);
        // A0 has no edge of its own; it shares the depot's coordinates.
        assert_eq!(service.calculate("A0", "J1"), 0.5);
        assert_eq!(service.calculate("A0", "Depot"), 0.0);
    }

    #[test]
    fn test_pathfinding_between_representatives() {
        let network = grid();
        let service = NetworkDistance::new(&network);
        // A1 -> J3 -> J6 -> A2
        assert!((service.calculate("A1", "A2") - 2.0).abs() < 1e-10);
        // Depot -> J1 -> J2 -> J3 -> A1
        assert!((service.calculate("Depot", "A1") - 3.0).abs() < 1e-10);
    }

    #[test]
    fn test_euclidean_fallback_and_unknown_nodes() {
        let nodes = vec![
            Node::new("D", 0.0, 0.0, NodeKind::Depot),
            Node::new("island", 300.0, 400.0, NodeKind::Address),
        ];
        let edges: Vec<Edge> = Vec::new();
        let network = RoadNetwork::new(Canvas::default(), nodes, edges).expect("valid");
        let service = NetworkDistance::new(&network);
        assert!((service.calculate("D", "island") - 5.0).abs() < 1e-10);
        assert_eq!(service.calculate("D", "ghost"), f64::INFINITY);
    }

    #[test]
    fn test_closures_are_distances() {
        let manhattan = |a: &str, b: &str| (a.len() as f64 - b.len() as f64).abs();
        assert_eq!(manhattan.distance("abc", "a"), 2.0);
    }
}
