//! Tour representation and evaluation.
//!
//! A tour is the visiting order of the address nodes. The depot is implicit:
//! the vehicle leaves it before the first address and returns after the last.

use crate::distance::Distance;
use crate::network::NodeId;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Length of depot -> sequence... -> depot
pub fn tour_length(sequence: &[NodeId], depot: &str, distance: &dyn Distance) -> f64 {
    let (Some(first), Some(last)) = (sequence.first(), sequence.last()) else {
        return 0.0;
    };

    let mut length = distance.distance(depot, first);
    for pair in sequence.windows(2) {
        length += distance.distance(&pair[0], &pair[1]);
    }
    length + distance.distance(last, depot)
}

/// Represents a visiting order together with its evaluation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Tour {
    /// Address IDs in visiting order (depot excluded)
    pub sequence: Vec<NodeId>,
    /// Total length depot -> ... -> depot, in kilometers
    pub length: f64,
    /// Algorithm that generated this tour
    pub algorithm: String,
    /// Computation time in seconds
    pub computation_time: f64,
    /// Number of improvement iterations (if applicable)
    pub iterations: Option<usize>,
}

impl Tour {
    /// Create an empty, unevaluated tour
    pub fn new() -> Self {
        Tour {
            sequence: Vec::new(),
            length: f64::INFINITY,
            algorithm: String::new(),
            computation_time: 0.0,
            iterations: None,
        }
    }

    /// Create a tour from a visiting order
    pub fn from_sequence(sequence: Vec<NodeId>, depot: &str, distance: &dyn Distance, algorithm: &str) -> Self {
        let length = tour_length(&sequence, depot, distance);
        Tour {
            sequence,
            length,
            algorithm: algorithm.to_string(),
            computation_time: 0.0,
            iterations: None,
        }
    }

    /// Recompute the length after the sequence changed
    pub fn evaluate(&mut self, depot: &str, distance: &dyn Distance) {
        self.length = tour_length(&self.sequence, depot, distance);
    }

    /// Check that every address is visited exactly once and nothing else is
    pub fn is_complete(&self, addresses: &[NodeId]) -> bool {
        if self.sequence.len() != addresses.len() {
            return false;
        }
        let expected: HashSet<&NodeId> = addresses.iter().collect();
        let visited: HashSet<&NodeId> = self.sequence.iter().collect();
        visited.len() == self.sequence.len() && visited == expected
    }

    /// Get the position of a node in the tour
    pub fn position(&self, node: &str) -> Option<usize> {
        self.sequence.iter().position(|n| n == node)
    }

    pub fn len(&self) -> usize {
        self.sequence.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sequence.is_empty()
    }
}

impl Default for Tour {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for Tour {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Tour ({})", self.algorithm)?;
        writeln!(f, "  Length: {:.3} km", self.length)?;
        writeln!(f, "  Time: {:.4}s", self.computation_time)?;
        if let Some(iter) = self.iterations {
            writeln!(f, "  Iterations: {}", iter)?;
        }
        writeln!(f, "  Stops: {}", self.sequence.join(" -> "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(names: &[&str]) -> Vec<NodeId> {
        names.iter().map(|s| s.to_string()).collect()
    }

    fn line(a: &str, b: &str) -> f64 {
        let pos = |s: &str| s.trim_start_matches('P').parse::<f64>().unwrap_or(0.0);
        (pos(a) - pos(b)).abs()
    }

    #[test]
    fn test_tour_creation() {
        let tour = Tour::new();
        assert!(tour.is_empty());
        assert_eq!(tour.length, f64::INFINITY);
    }

    #[test]
    fn test_tour_length_includes_depot_legs() {
        let seq = ids(&["P1", "P3", "P2"]);
        // 0->1, 1->3, 3->2, 2->0
        assert_eq!(tour_length(&seq, "P0", &line), 1.0 + 2.0 + 1.0 + 2.0);
        assert_eq!(tour_length(&[], "P0", &line), 0.0);
        assert_eq!(tour_length(&ids(&["P4"]), "P0", &line), 8.0);
    }

    #[test]
    fn test_completeness() {
        let addresses = ids(&["a", "b", "c"]);
        let ok = Tour { sequence: ids(&["c", "a", "b"]), ..Tour::new() };
        let duplicate = Tour { sequence: ids(&["a", "a", "b"]), ..Tour::new() };
        let foreign = Tour { sequence: ids(&["a", "b", "x"]), ..Tour::new() };
        let short = Tour { sequence: ids(&["a", "b"]), ..Tour::new() };
        assert!(ok.is_complete(&addresses));
        assert!(!duplicate.is_complete(&addresses));
        assert!(!foreign.is_complete(&addresses));
        assert!(!short.is_complete(&addresses));
        assert_eq!(ok.position("a"), Some(1));
    }
}
