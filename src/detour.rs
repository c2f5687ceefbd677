//! Route materialization and blocked-road rerouting.
//!
//! A visiting order only says which addresses come after which. This module
//! turns it into the road edges actually driven, replaces every blocked edge
//! with the shortest legal alternative and repairs planned routes that do not
//! form a connected walk. Lossy repairs are reported, never hidden.

use std::collections::HashSet;

use serde::Serialize;

use crate::network::{Edge, EdgeId, NodeId, RoadNetwork};
use crate::pathfinding::{find_detour, path_length};

/// A blocked edge and the path driven instead.
///
/// `start_node` and `end_node` are the first and last nodes of
/// `detour_edges`; they may be coincident partners of the blocked edge's ends.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DetourRecord {
    pub original_edge: Edge,
    pub detour_edges: Vec<Edge>,
    pub start_node: NodeId,
    pub end_node: NodeId,
}

/// One driven edge of a materialized route
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RouteEdge {
    pub edge: Edge,
    /// True if the edge replaces a blocked one
    pub is_detour: bool,
}

/// Degraded or patched spots of a route
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RouteRepair {
    /// A gap between two planned edges was closed with a shortest path
    Bridged { from: NodeId, to: NodeId, edges: Vec<EdgeId> },
    /// A planned edge could not be reached and was dropped
    SkippedEdge { edge_id: EdgeId },
    /// A blocked edge had no legal alternative and was kept
    UnresolvedBlock { edge_id: EdgeId },
    /// No road joins two consecutive stops
    UnreachableLeg { from: NodeId, to: NodeId },
}

/// Connected edge sequence ready for simulation
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct MaterializedRoute {
    pub edges: Vec<RouteEdge>,
    pub detours: Vec<DetourRecord>,
    pub repairs: Vec<RouteRepair>,
}

impl MaterializedRoute {
    pub fn total_km(&self) -> f64 {
        self.edges.iter().map(|e| e.edge.length()).sum()
    }

    pub fn detour_count(&self) -> usize {
        self.detours.len()
    }

    /// Kilometers driven on detour edges
    pub fn detour_km(&self) -> f64 {
        self.edges
            .iter()
            .filter(|e| e.is_detour)
            .map(|e| e.edge.length())
            .sum()
    }

    /// True if nothing had to be bridged, dropped or left blocked
    pub fn is_clean(&self) -> bool {
        self.repairs.is_empty()
    }

    /// Address nodes touched by the route, in first-visit order.
    /// Addresses sharing coordinates with a touched node count as visited.
    pub fn visited_addresses(&self, network: &RoadNetwork) -> Vec<NodeId> {
        let mut seen = HashSet::new();
        let mut visited = Vec::new();
        for route_edge in &self.edges {
            for end in [&route_edge.edge.a, &route_edge.edge.b] {
                for member in network.coincident(end) {
                    let is_address = network.node(&member).map_or(false, |n| n.is_address());
                    if is_address && seen.insert(member.clone()) {
                        visited.push(member);
                    }
                }
            }
        }
        visited
    }

    /// Node walk of the route, starting where the first edge is entered
    pub fn node_walk(&self, network: &RoadNetwork) -> Vec<NodeId> {
        let Some(first) = self.edges.first() else {
            return Vec::new();
        };
        let second = self.edges.get(1).map(|e| &e.edge);
        let mut current = start_node(&first.edge, second, network);
        let mut walk = vec![current.clone()];
        for route_edge in &self.edges {
            if let Some((_, far)) = entry(&route_edge.edge, &current, network) {
                current = far.to_string();
                walk.push(current.clone());
            }
        }
        walk
    }
}

/// Endpoints of `edge` as (entered at, leaving from), if `edge` touches
/// `current` or a node sharing its coordinates.
fn entry<'e>(edge: &'e Edge, current: &str, network: &RoadNetwork) -> Option<(&'e str, &'e str)> {
    if edge.a == current {
        Some((&edge.a, &edge.b))
    } else if edge.b == current {
        Some((&edge.b, &edge.a))
    } else if network.are_coincident(&edge.a, current) {
        Some((&edge.a, &edge.b))
    } else if network.are_coincident(&edge.b, current) {
        Some((&edge.b, &edge.a))
    } else {
        None
    }
}

/// Where a walk over `first` (then `second`) begins.
///
/// The depot if `first` leaves it. Otherwise the endpoint of `first` that
/// `second` does not touch, so the edge may be driven either way; `first.a`
/// when that is undecidable.
fn start_node(first: &Edge, second: Option<&Edge>, network: &RoadNetwork) -> NodeId {
    let depot = &network.depot().id;
    if let Some((near, _)) = entry(first, depot, network) {
        return near.to_string();
    }

    let touches = |node: &str| second.map_or(false, |e| entry(e, node, network).is_some());
    let start = match (touches(&first.a), touches(&first.b)) {
        (false, true) => &first.a,
        (true, false) => &first.b,
        _ => &first.a,
    };
    log::debug!("route does not leave the depot, starting at {}", start);
    start.clone()
}

/// Shortest legal path between two locations, where any node sharing the
/// coordinates of `from` (or `to`) may serve as the endpoint. Returns the
/// path with the nodes it actually starts and ends at.
fn shortest_between(
    network: &RoadNetwork,
    from: &str,
    to: &str,
    excluded: &HashSet<EdgeId>,
) -> Option<(Vec<Edge>, NodeId, NodeId)> {
    let mut best: Option<(Vec<Edge>, NodeId, NodeId)> = None;
    for u in network.coincident(from) {
        for v in network.coincident(to) {
            let Some(path) = find_detour(network, &u, &v, excluded) else {
                continue;
            };
            if best.as_ref().map_or(true, |(b, _, _)| path_length(&path) < path_length(b)) {
                best = Some((path, u.clone(), v));
            }
        }
    }
    best
}

/// Direct edge between two stops or their coincident partners, unblocked first
fn direct_edge<'n>(network: &'n RoadNetwork, from: &str, to: &str) -> Option<&'n Edge> {
    let targets = network.coincident(to);
    let candidates: Vec<&Edge> = network
        .coincident(from)
        .iter()
        .flat_map(|u| {
            let targets = &targets;
            network
                .edges_at(u)
                .filter(move |e| targets.iter().any(|v| e.connects(u, v)))
        })
        .collect();
    candidates
        .iter()
        .find(|e| !e.blocked)
        .or_else(|| candidates.first())
        .copied()
}

/// Turn a visiting order into the planned road edges.
///
/// Stops are joined depot -> sequence... -> depot. Each leg uses a direct
/// edge if one exists, blocked or not, otherwise the shortest legal path.
/// Legs between coincident nodes need no edge. Legs with no road at all are
/// reported as `UnreachableLeg` and left out.
pub fn materialize_sequence(sequence: &[NodeId], network: &RoadNetwork) -> (Vec<Edge>, Vec<RouteRepair>) {
    let mut edges = Vec::new();
    let mut repairs = Vec::new();
    if sequence.is_empty() {
        return (edges, repairs);
    }

    let depot = network.depot().id.as_str();
    let stops: Vec<&str> = std::iter::once(depot)
        .chain(sequence.iter().map(String::as_str))
        .chain(std::iter::once(depot))
        .collect();

    for leg in stops.windows(2) {
        let (from, to) = (leg[0], leg[1]);
        if network.are_coincident(from, to) {
            continue;
        }
        if let Some(edge) = direct_edge(network, from, to) {
            edges.push(edge.clone());
        } else if let Some((path, _, _)) = shortest_between(network, from, to, &HashSet::new()) {
            edges.extend(path);
        } else {
            log::warn!("no road from {} to {}, leg left out", from, to);
            repairs.push(RouteRepair::UnreachableLeg { from: from.to_string(), to: to.to_string() });
        }
    }

    (edges, repairs)
}

/// Walk the planned edges from the depot and produce the driven route.
///
/// Blocked edges are replaced by the shortest path between their endpoints
/// that avoids them; the replacement edges are flagged as detours and a
/// `DetourRecord` is kept. A planned edge that does not start where the
/// previous one ended is reached through a bridging path to whichever of its
/// endpoints is closer. Nothing here fails: when a repair is impossible the
/// edge is kept (blocked) or dropped (unreachable) and a `RouteRepair` says so.
pub fn replace_blocked_edges(planned: &[Edge], network: &RoadNetwork) -> MaterializedRoute {
    let mut route = MaterializedRoute::default();
    let Some(first) = planned.first() else {
        return route;
    };

    let mut current = start_node(first, planned.get(1), network);

    for edge in planned {
        let (near, far) = match entry(edge, &current, network) {
            Some((near, far)) => (near.to_string(), far.to_string()),
            None => match bridge(network, &current, edge) {
                Some((path, near, far)) => {
                    route.repairs.push(RouteRepair::Bridged {
                        from: current.clone(),
                        to: near.clone(),
                        edges: path.iter().map(|e| e.id.clone()).collect(),
                    });
                    route
                        .edges
                        .extend(path.into_iter().map(|edge| RouteEdge { edge, is_detour: false }));
                    (near, far)
                }
                None => {
                    log::warn!("edge {} cannot be reached from {}, dropped", edge.id, current);
                    route.repairs.push(RouteRepair::SkippedEdge { edge_id: edge.id.clone() });
                    continue;
                }
            },
        };

        if edge.blocked {
            let excluded: HashSet<EdgeId> = [edge.id.clone()].into_iter().collect();
            match shortest_between(network, &near, &far, &excluded) {
                Some((detour, start_node, end_node)) => {
                    log::debug!(
                        "edge {} blocked, detour of {} edges ({:.3} km)",
                        edge.id,
                        detour.len(),
                        path_length(&detour)
                    );
                    route.edges.extend(
                        detour
                            .iter()
                            .cloned()
                            .map(|edge| RouteEdge { edge, is_detour: true }),
                    );
                    route.detours.push(DetourRecord {
                        original_edge: edge.clone(),
                        detour_edges: detour,
                        start_node,
                        end_node,
                    });
                }
                None => {
                    log::warn!("edge {} blocked and no detour exists, kept as planned", edge.id);
                    route.repairs.push(RouteRepair::UnresolvedBlock { edge_id: edge.id.clone() });
                    route.edges.push(RouteEdge { edge: edge.clone(), is_detour: false });
                }
            }
        } else {
            route.edges.push(RouteEdge { edge: edge.clone(), is_detour: false });
        }

        current = far;
    }

    log::info!(
        "materialized {} edges, {:.3} km, {} detours, {} repairs",
        route.edges.len(),
        route.total_km(),
        route.detours.len(),
        route.repairs.len()
    );
    route
}

/// Shortest path from `current` to the closer endpoint of `edge`, together
/// with that endpoint and the opposite one.
fn bridge(network: &RoadNetwork, current: &str, edge: &Edge) -> Option<(Vec<Edge>, NodeId, NodeId)> {
    let no_exclusions = HashSet::new();
    let to_a = shortest_between(network, current, &edge.a, &no_exclusions).map(|(path, _, _)| path);
    let to_b = shortest_between(network, current, &edge.b, &no_exclusions).map(|(path, _, _)| path);
    match (to_a, to_b) {
        (Some(a), Some(b)) if path_length(&b) < path_length(&a) => Some((b, edge.b.clone(), edge.a.clone())),
        (Some(a), _) => Some((a, edge.a.clone(), edge.b.clone())),
        (None, Some(b)) => Some((b, edge.b.clone(), edge.a.clone())),
        (None, None) => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::tests::{grid, triangle};
    use crate::network::{Canvas, Node, NodeKind};

    fn ids(route: &MaterializedRoute) -> Vec<&str> {
        route.edges.iter().map(|e| e.edge.id.as_str()).collect()
    }

    fn planned(network: &RoadNetwork, names: &[&str]) -> Vec<Edge> {
        names
            .iter()
            .filter_map(|id| network.edge(id).cloned())
            .collect()
    }

    /// Every edge must start where the previous one ended
    fn is_connected(route: &MaterializedRoute, network: &RoadNetwork) -> bool {
        route.node_walk(network).len() == route.edges.len() + 1
    }

    #[test]
    fn test_blocked_edge_is_detoured() {
        let network = triangle(true);
        let route = replace_blocked_edges(&planned(&network, &["e1", "e2", "e3"]), &network);

        assert_eq!(route.detour_count(), 1);
        let record = &route.detours[0];
        assert_eq!(record.original_edge.id, "e2");
        assert_eq!(record.start_node, "A");
        assert_eq!(record.end_node, "B");
        let detour_ids: Vec<&str> = record.detour_edges.iter().map(|e| e.id.as_str()).collect();
        assert_eq!(detour_ids, vec!["e1", "e3"]);
        assert!(record.detour_edges.iter().all(|e| !e.blocked && e.id != "e2"));

        assert_eq!(ids(&route), vec!["e1", "e1", "e3", "e3"]);
        let flags: Vec<bool> = route.edges.iter().map(|e| e.is_detour).collect();
        assert_eq!(flags, vec![false, true, true, false]);
        assert!((route.detour_km() - 4.0).abs() < 1e-10);
        assert!((route.total_km() - 8.0).abs() < 1e-10);
        assert!(route.is_clean());
        assert!(is_connected(&route, &network));
    }

    #[test]
    fn test_unblocked_route_passes_through() {
        let network = triangle(false);
        let route = replace_blocked_edges(&planned(&network, &["e1", "e2", "e3"]), &network);
        assert_eq!(ids(&route), vec!["e1", "e2", "e3"]);
        assert!(route.detours.is_empty());
        assert!(route.edges.iter().all(|e| !e.is_detour));
        assert_eq!(route.node_walk(&network), vec!["Depot", "A", "B", "Depot"]);
    }

    #[test]
    fn test_blocked_edge_without_alternative_is_kept() {
        let nodes = vec![
            Node::new("Depot", 0.0, 0.0, NodeKind::Depot),
            Node::new("A", 100.0, 0.0, NodeKind::Address),
            Node::new("B", 100.0, 100.0, NodeKind::Address),
        ];
        let edges = vec![Edge::new("e1", "Depot", "A", 1.0), Edge::new("e2", "A", "B", 1.0).blocked()];
        let network = RoadNetwork::new(Canvas::default(), nodes, edges).expect("valid");

        let route = replace_blocked_edges(&planned(&network, &["e1", "e2"]), &network);
        assert_eq!(ids(&route), vec!["e1", "e2"]);
        assert!(route.detours.is_empty());
        assert_eq!(route.repairs, vec![RouteRepair::UnresolvedBlock { edge_id: "e2".into() }]);
    }

    #[test]
    fn test_gap_is_bridged_to_closer_endpoint() {
        let network = grid();
        let route = replace_blocked_edges(&planned(&network, &["d1", "h2"]), &network);
        assert_eq!(ids(&route), vec!["d1", "h1", "h2"]);
        assert_eq!(
            route.repairs,
            vec![RouteRepair::Bridged { from: "J1".into(), to: "J2".into(), edges: vec!["h1".into()] }]
        );
        assert!(is_connected(&route, &network));
    }

    #[test]
    fn test_unreachable_edge_is_skipped() {
        let nodes = vec![
            Node::new("Depot", 0.0, 0.0, NodeKind::Depot),
            Node::new("A", 100.0, 0.0, NodeKind::Address),
            Node::new("C", 500.0, 500.0, NodeKind::Address),
            Node::new("D", 600.0, 500.0, NodeKind::Junction),
        ];
        let edges = vec![Edge::new("e1", "Depot", "A", 1.0), Edge::new("f1", "C", "D", 1.0)];
        let network = RoadNetwork::new(Canvas::default(), nodes, edges).expect("valid");

        let route = replace_blocked_edges(&planned(&network, &["e1", "f1"]), &network);
        assert_eq!(ids(&route), vec!["e1"]);
        assert_eq!(route.repairs, vec![RouteRepair::SkippedEdge { edge_id: "f1".into() }]);
        assert_eq!(route.visited_addresses(&network), vec!["A".to_string()]);
    }

    #[test]
    fn test_start_inferred_when_route_skips_depot() {
        let network = grid();
        let route = replace_blocked_edges(&planned(&network, &["h1", "h2"]), &network);
        assert_eq!(ids(&route), vec!["h1", "h2"]);
        assert!(route.is_clean());
        assert_eq!(route.node_walk(&network), vec!["J1", "J2", "J3"]);
    }

    #[test]
    fn test_start_inferred_from_reversed_first_edge() {
        // h1 is stored J1 -> J2 but driven J2 -> J1 to continue on v1
        let network = grid();
        let route = replace_blocked_edges(&planned(&network, &["h1", "v1"]), &network);
        assert_eq!(ids(&route), vec!["h1", "v1"]);
        assert!(route.is_clean());
        assert!((route.total_km() - 2.0).abs() < 1e-10);
        assert_eq!(route.node_walk(&network), vec!["J2", "J1", "J4"]);
    }

    #[test]
    fn test_detour_endpoints_follow_coincident_partner() {
        let nodes = vec![
            Node::new("Depot", 0.0, 0.0, NodeKind::Depot),
            Node::new("A", 100.0, 0.0, NodeKind::Address),
            Node::new("A2", 100.0, 0.0, NodeKind::Junction),
            Node::new("B", 200.0, 0.0, NodeKind::Address),
        ];
        let edges = vec![
            Edge::new("e1", "Depot", "A", 1.0),
            Edge::new("e2", "A", "B", 1.0).blocked(),
            Edge::new("f", "A2", "B", 1.5),
        ];
        let network = RoadNetwork::new(Canvas::default(), nodes, edges).expect("valid");

        let route = replace_blocked_edges(&planned(&network, &["e1", "e2"]), &network);
        assert_eq!(route.detour_count(), 1);
        let record = &route.detours[0];
        let detour_ids: Vec<&str> = record.detour_edges.iter().map(|e| e.id.as_str()).collect();
        assert_eq!(detour_ids, vec!["f"]);
        assert_eq!(record.start_node, "A2");
        assert_eq!(record.end_node, "B");
        assert!(record.detour_edges[0].connects(&record.start_node, &record.end_node));
        assert_eq!(route.node_walk(&network), vec!["Depot", "A", "B"]);
    }

    #[test]
    fn test_empty_plan() {
        let network = triangle(true);
        let route = replace_blocked_edges(&[], &network);
        assert_eq!(route, MaterializedRoute::default());
        assert_eq!(route.total_km(), 0.0);
    }

    #[test]
    fn test_materialize_prefers_direct_edges() {
        let network = triangle(true);
        let sequence = vec!["A".to_string(), "B".to_string()];
        let (edges, repairs) = materialize_sequence(&sequence, &network);
        let edge_ids: Vec<&str> = edges.iter().map(|e| e.id.as_str()).collect();
        // e2 is blocked but still the planned road between A and B
        assert_eq!(edge_ids, vec!["e1", "e2", "e3"]);
        assert!(repairs.is_empty());

        let route = replace_blocked_edges(&edges, &network);
        assert_eq!(route.detour_count(), 1);
        assert!(is_connected(&route, &network));
    }

    #[test]
    fn test_materialize_through_junctions() {
        let network = grid();
        let sequence = vec!["A0".to_string(), "A1".to_string(), "A2".to_string()];
        let (edges, repairs) = materialize_sequence(&sequence, &network);
        assert!(repairs.is_empty());

        let route = replace_blocked_edges(&edges, &network);
        assert!(route.is_clean());
        assert!(is_connected(&route, &network));
        // Depot -> A1 is 3.0, A1 -> A2 is 2.0, A2 -> Depot is 4.0
        assert!((route.total_km() - 9.0).abs() < 1e-10);
        let visited = route.visited_addresses(&network);
        assert!(visited.contains(&"A0".to_string()));
        assert!(visited.contains(&"A1".to_string()));
        assert!(visited.contains(&"A2".to_string()));
        let walk = route.node_walk(&network);
        assert_eq!(walk.first(), walk.last());
    }

    #[test]
    fn test_unreachable_leg_is_reported() {
        let nodes = vec![
            Node::new("Depot", 0.0, 0.0, NodeKind::Depot),
            Node::new("A", 100.0, 0.0, NodeKind::Address),
            Node::new("island", 500.0, 500.0, NodeKind::Address),
        ];
        let edges = vec![Edge::new("e1", "Depot", "A", 1.0)];
        let network = RoadNetwork::new(Canvas::default(), nodes, edges).expect("valid");

        let sequence = vec!["A".to_string(), "island".to_string()];
        let (edges, repairs) = materialize_sequence(&sequence, &network);
        assert_eq!(edges.len(), 1);
        assert_eq!(
            repairs,
            vec![
                RouteRepair::UnreachableLeg { from: "A".into(), to: "island".into() },
                RouteRepair::UnreachableLeg { from: "island".into(), to: "Depot".into() },
            ]
        );
    }
}
