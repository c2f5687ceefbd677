//! Module for loading and representing the road network.
//!
//! This module handles the JSON configuration object describing the delivery map:
//! a canvas with its pixel-to-kilometer scale, the nodes (depot, addresses, junctions)
//! and the undirected, optionally blocked edges between them.

use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::Path;

use ordered_float::OrderedFloat;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub type NodeId = String;
pub type EdgeId = String;

/// Errors raised while loading or validating a network
#[derive(Debug, Error)]
pub enum NetworkError {
    #[error("cannot read network file: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid network json: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("duplicate node id: {0}")]
    DuplicateNode(NodeId),
    #[error("duplicate edge id: {0}")]
    DuplicateEdge(EdgeId),
    #[error("edge {edge} has negative length {length}")]
    NegativeLength { edge: EdgeId, length: f64 },
    #[error("canvas scale must be positive, got {0}")]
    InvalidScale(f64),
    #[error("network has no depot")]
    MissingDepot,
    #[error("network has more than one depot: {0:?}")]
    MultipleDepots(Vec<NodeId>),
}

/// Role of a node on the map
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeKind {
    Depot,
    Address,
    Junction,
    Mid,
}

/// Represents a node of the road network
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    /// Unique identifier
    pub id: NodeId,
    /// X coordinate (pixels)
    pub x: f64,
    /// Y coordinate (pixels)
    pub y: f64,
    /// Node role
    #[serde(rename = "type")]
    pub kind: NodeKind,
}

impl Node {
    pub fn new(id: &str, x: f64, y: f64, kind: NodeKind) -> Self {
        Node { id: id.to_string(), x, y, kind }
    }

    pub fn is_depot(&self) -> bool {
        self.kind == NodeKind::Depot
    }

    pub fn is_address(&self) -> bool {
        self.kind == NodeKind::Address
    }

    pub fn is_junction(&self) -> bool {
        self.kind == NodeKind::Junction
    }

    /// Straight-line distance to another node, in pixels
    pub fn pixel_distance(&self, other: &Node) -> f64 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        (dx * dx + dy * dy).sqrt()
    }
}

/// Represents an undirected road segment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Edge {
    pub id: EdgeId,
    pub a: NodeId,
    pub b: NodeId,
    /// Length in kilometers; filled from coordinates at load time when absent
    #[serde(rename = "lengthKm", default, skip_serializing_if = "Option::is_none")]
    pub length_km: Option<f64>,
    /// Road under construction: never travelled directly
    #[serde(default)]
    pub blocked: bool,
}

impl Edge {
    pub fn new(id: &str, a: &str, b: &str, length_km: f64) -> Self {
        Edge {
            id: id.to_string(),
            a: a.to_string(),
            b: b.to_string(),
            length_km: Some(length_km),
            blocked: false,
        }
    }

    pub fn blocked(mut self) -> Self {
        self.blocked = true;
        self
    }

    /// Length in kilometers, 0 when unknown
    #[inline]
    pub fn length(&self) -> f64 {
        self.length_km.unwrap_or(0.0)
    }

    pub fn touches(&self, node: &str) -> bool {
        self.a == node || self.b == node
    }

    /// The endpoint opposite to `node`, if `node` is an endpoint
    pub fn other_end(&self, node: &str) -> Option<&str> {
        if self.a == node {
            Some(&self.b)
        } else if self.b == node {
            Some(&self.a)
        } else {
            None
        }
    }

    /// True if the edge joins the two nodes, in either direction
    pub fn connects(&self, u: &str, v: &str) -> bool {
        (self.a == u && self.b == v) || (self.a == v && self.b == u)
    }
}

/// Drawing surface and scale of the map
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Canvas {
    pub width: f64,
    pub height: f64,
    pub scale_px_per_km: f64,
}

impl Default for Canvas {
    fn default() -> Self {
        Canvas { width: 800.0, height: 600.0, scale_px_per_km: 100.0 }
    }
}

/// Raw configuration object, as found in the JSON map files
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkConfig {
    #[serde(default)]
    pub name: Option<String>,
    pub canvas: Canvas,
    pub nodes: Vec<Node>,
    pub edges: Vec<Edge>,
}

/// Maps each node ID to its position in `nodes`.
pub fn build_node_index(nodes: &[Node]) -> HashMap<NodeId, usize> {
    nodes.iter().enumerate().map(|(i, n)| (n.id.clone(), i)).collect()
}

/// Maps each node ID to the positions of the edges touching it.
/// Every edge is listed under both of its endpoints.
pub fn build_adjacency(edges: &[Edge]) -> HashMap<NodeId, Vec<usize>> {
    let mut adjacency: HashMap<NodeId, Vec<usize>> = HashMap::new();
    for (i, edge) in edges.iter().enumerate() {
        adjacency.entry(edge.a.clone()).or_default().push(i);
        if edge.b != edge.a {
            adjacency.entry(edge.b.clone()).or_default().push(i);
        }
    }
    adjacency
}

/// Groups nodes sitting on the exact same coordinates.
///
/// Every node maps to its whole group (itself included), in load order.
/// No tolerance is applied: `(x, y)` must be bit-for-bit equal.
pub fn build_coincident_groups(nodes: &[Node]) -> HashMap<NodeId, Vec<NodeId>> {
    let mut by_position: HashMap<(OrderedFloat<f64>, OrderedFloat<f64>), Vec<NodeId>> =
        HashMap::new();
    for node in nodes {
        by_position
            .entry((OrderedFloat(node.x), OrderedFloat(node.y)))
            .or_default()
            .push(node.id.clone());
    }

    let mut groups = HashMap::with_capacity(nodes.len());
    for members in by_position.into_values() {
        for id in &members {
            groups.insert(id.clone(), members.clone());
        }
    }
    groups
}

/// A validated road network with its lookup indexes
#[derive(Debug, Clone)]
pub struct RoadNetwork {
    /// Name of the map
    pub name: String,
    canvas: Canvas,
    nodes: Vec<Node>,
    edges: Vec<Edge>,
    node_index: HashMap<NodeId, usize>,
    edge_index: HashMap<EdgeId, usize>,
    adjacency: HashMap<NodeId, Vec<usize>>,
    coincident: HashMap<NodeId, Vec<NodeId>>,
    depot: usize,
}

impl RoadNetwork {
    /// Build a network, filling missing edge lengths and validating the input
    pub fn new(canvas: Canvas, nodes: Vec<Node>, mut edges: Vec<Edge>) -> Result<Self, NetworkError> {
        // Negated so NaN is rejected too
        if !(canvas.scale_px_per_km > 0.0) {
            return Err(NetworkError::InvalidScale(canvas.scale_px_per_km));
        }

        let node_index = build_node_index(&nodes);
        if node_index.len() != nodes.len() {
            let mut seen = HashSet::new();
            if let Some(dup) = nodes.iter().find(|n| !seen.insert(n.id.as_str())) {
                return Err(NetworkError::DuplicateNode(dup.id.clone()));
            }
        }

        let depots: Vec<usize> = nodes
            .iter()
            .enumerate()
            .filter(|(_, n)| n.is_depot())
            .map(|(i, _)| i)
            .collect();
        let depot = match depots.as_slice() {
            [] => return Err(NetworkError::MissingDepot),
            [only] => *only,
            many => {
                return Err(NetworkError::MultipleDepots(
                    many.iter().map(|&i| nodes[i].id.clone()).collect(),
                ))
            }
        };

        let mut edge_index = HashMap::with_capacity(edges.len());
        for (i, edge) in edges.iter_mut().enumerate() {
            if edge_index.insert(edge.id.clone(), i).is_some() {
                return Err(NetworkError::DuplicateEdge(edge.id.clone()));
            }

            match edge.length_km {
                Some(length) if length < 0.0 => {
                    return Err(NetworkError::NegativeLength { edge: edge.id.clone(), length });
                }
                Some(_) => {}
                None => {
                    let ends = (node_index.get(&edge.a), node_index.get(&edge.b));
                    if let (Some(&ia), Some(&ib)) = ends {
                        let px = nodes[ia].pixel_distance(&nodes[ib]);
                        edge.length_km = Some(px / canvas.scale_px_per_km);
                    }
                }
            }

            for end in [&edge.a, &edge.b] {
                if !node_index.contains_key(end) {
                    log::warn!("edge {} references unknown node {}", edge.id, end);
                }
            }
        }

        let adjacency = build_adjacency(&edges);
        let coincident = build_coincident_groups(&nodes);

        Ok(RoadNetwork {
            name: String::new(),
            canvas,
            nodes,
            edges,
            node_index,
            edge_index,
            adjacency,
            coincident,
            depot,
        })
    }

    /// Build a network from a parsed configuration object
    pub fn from_config(config: NetworkConfig) -> Result<Self, NetworkError> {
        let mut network = Self::new(config.canvas, config.nodes, config.edges)?;
        network.name = config.name.unwrap_or_default();
        Ok(network)
    }

    /// Parse a network from a JSON string
    pub fn from_json_str(json: &str) -> Result<Self, NetworkError> {
        let config: NetworkConfig = serde_json::from_str(json)?;
        Self::from_config(config)
    }

    /// Load a network from a JSON map file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, NetworkError> {
        let path = path.as_ref();
        let json = fs::read_to_string(path)?;
        let mut network = Self::from_json_str(&json)?;
        if network.name.is_empty() {
            network.name = path
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_default();
        }
        log::info!(
            "loaded network {} ({} nodes, {} edges)",
            network.name,
            network.nodes.len(),
            network.edges.len()
        );
        Ok(network)
    }

    /// Back to the configuration form, with computed lengths filled in
    pub fn to_config(&self) -> NetworkConfig {
        NetworkConfig {
            name: Some(self.name.clone()).filter(|n| !n.is_empty()),
            canvas: self.canvas,
            nodes: self.nodes.clone(),
            edges: self.edges.clone(),
        }
    }

    pub fn canvas(&self) -> &Canvas {
        &self.canvas
    }

    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    pub fn edges(&self) -> &[Edge] {
        &self.edges
    }

    /// Node lookup; `None` for unknown IDs
    pub fn node(&self, id: &str) -> Option<&Node> {
        self.node_index.get(id).map(|&i| &self.nodes[i])
    }

    /// Position of a node in load order
    pub fn node_position(&self, id: &str) -> Option<usize> {
        self.node_index.get(id).copied()
    }

    pub fn edge(&self, id: &str) -> Option<&Edge> {
        self.edge_index.get(id).map(|&i| &self.edges[i])
    }

    /// Edges touching a node, blocked ones included
    pub fn edges_at<'a>(&'a self, id: &str) -> impl Iterator<Item = &'a Edge> + 'a {
        self.adjacency
            .get(id)
            .into_iter()
            .flatten()
            .map(move |&i| &self.edges[i])
    }

    /// Nodes sharing the coordinates of `id`, itself included.
    /// Unknown IDs form a group of their own.
    pub fn coincident(&self, id: &str) -> Vec<NodeId> {
        self.coincident
            .get(id)
            .cloned()
            .unwrap_or_else(|| vec![id.to_string()])
    }

    /// True if `a` and `b` sit on the same coordinates
    pub fn are_coincident(&self, a: &str, b: &str) -> bool {
        a == b || self.coincident.get(a).map_or(false, |g| g.iter().any(|m| m == b))
    }

    pub fn depot(&self) -> &Node {
        &self.nodes[self.depot]
    }

    /// True if `id` is the depot or shares its coordinates
    pub fn is_depot_group(&self, id: &str) -> bool {
        self.are_coincident(&self.depot().id, id)
    }

    /// Address node IDs in load order
    pub fn addresses(&self) -> Vec<NodeId> {
        self.nodes
            .iter()
            .filter(|n| n.is_address())
            .map(|n| n.id.clone())
            .collect()
    }

    /// Straight-line distance in kilometers, `None` if a node is unknown
    pub fn euclidean_km(&self, a: &str, b: &str) -> Option<f64> {
        let na = self.node(a)?;
        let nb = self.node(b)?;
        Some(na.pixel_distance(nb) / self.canvas.scale_px_per_km)
    }

    /// Get statistics about the network
    pub fn statistics(&self) -> NetworkStatistics {
        let count = |kind: NodeKind| self.nodes.iter().filter(|n| n.kind == kind).count();

        let mut groups: Vec<&Vec<NodeId>> = self.coincident.values().filter(|g| g.len() > 1).collect();
        groups.sort();
        groups.dedup();

        NetworkStatistics {
            name: self.name.clone(),
            num_nodes: self.nodes.len(),
            num_addresses: count(NodeKind::Address),
            num_junctions: count(NodeKind::Junction),
            num_mid: count(NodeKind::Mid),
            num_edges: self.edges.len(),
            num_blocked: self.edges.iter().filter(|e| e.blocked).count(),
            total_length_km: self.edges.iter().map(Edge::length).sum(),
            coincident_groups: groups.len(),
        }
    }
}

/// Statistics about a road network
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkStatistics {
    pub name: String,
    pub num_nodes: usize,
    pub num_addresses: usize,
    pub num_junctions: usize,
    pub num_mid: usize,
    pub num_edges: usize,
    pub num_blocked: usize,
    pub total_length_km: f64,
    pub coincident_groups: usize,
}

impl std::fmt::Display for NetworkStatistics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Network: {}", self.name)?;
        writeln!(f, "  Nodes: {} (1 depot, {} addresses, {} junctions, {} mid)",
            self.num_nodes, self.num_addresses, self.num_junctions, self.num_mid)?;
        writeln!(f, "  Edges: {} ({} blocked)", self.num_edges, self.num_blocked)?;
        writeln!(f, "  Total road length: {:.2} km", self.total_length_km)?;
        writeln!(f, "  Coincident groups: {}", self.coincident_groups)
    }
}
