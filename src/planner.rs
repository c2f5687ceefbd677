//! End-to-end route planning: construct, improve, materialize.

use serde::{Deserialize, Serialize};

use crate::detour::{materialize_sequence, replace_blocked_edges, MaterializedRoute, RouteRepair};
use crate::distance::Distance;
use crate::heuristics::{
    CancellationToken, ConstructionHeuristic, LinKernighanSearch, LocalSearch, MultiStartConstruction,
    NearestInsertionHeuristic, SavingsHeuristic, TwoOptSearch, VariableNeighborhoodDescent,
};
use crate::network::{EdgeId, NodeId, RoadNetwork};
use crate::solution::Tour;

/// Which construction heuristic seeds the tour
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConstructionAlgorithm {
    NearestInsertion,
    Savings,
    MultiStart,
}

impl ConstructionAlgorithm {
    pub fn build(self) -> Box<dyn ConstructionHeuristic + Send + Sync> {
        match self {
            ConstructionAlgorithm::NearestInsertion => Box::new(NearestInsertionHeuristic::new()),
            ConstructionAlgorithm::Savings => Box::new(SavingsHeuristic::new()),
            ConstructionAlgorithm::MultiStart => Box::new(MultiStartConstruction::with_all_heuristics()),
        }
    }
}

/// Which local search polishes the tour, if any
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ImprovementAlgorithm {
    None,
    TwoOpt,
    LinKernighan,
    Vnd,
}

impl ImprovementAlgorithm {
    pub fn build(self) -> Option<Box<dyn LocalSearch + Send + Sync>> {
        match self {
            ImprovementAlgorithm::None => None,
            ImprovementAlgorithm::TwoOpt => Some(Box::new(TwoOptSearch::new())),
            ImprovementAlgorithm::LinKernighan => Some(Box::new(LinKernighanSearch::new())),
            ImprovementAlgorithm::Vnd => Some(Box::new(VariableNeighborhoodDescent::with_standard_operators())),
        }
    }
}

/// A tour and the road edges that drive it
#[derive(Debug, Clone, Serialize)]
pub struct PlannedRoute {
    pub tour: Tour,
    pub route: MaterializedRoute,
}

impl PlannedRoute {
    pub fn summary(&self, network: &RoadNetwork) -> RouteSummary {
        RouteSummary {
            algorithm: self.tour.algorithm.clone(),
            stops: self.tour.len(),
            tour_km: self.tour.length,
            driven_km: self.route.total_km(),
            detours: self.route.detour_count(),
            detour_km: self.route.detour_km(),
            visited_addresses: self.route.visited_addresses(network).len(),
            repairs: self.route.repairs.len(),
            computation_time: self.tour.computation_time,
        }
    }
}

/// Figures handed to the simulation
#[derive(Debug, Clone, Serialize)]
pub struct RouteSummary {
    pub algorithm: String,
    pub stops: usize,
    pub tour_km: f64,
    pub driven_km: f64,
    pub detours: usize,
    pub detour_km: f64,
    pub visited_addresses: usize,
    pub repairs: usize,
    pub computation_time: f64,
}

impl std::fmt::Display for RouteSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Algorithm: {}", self.algorithm)?;
        writeln!(f, "Stops: {}", self.stops)?;
        writeln!(f, "Tour length: {:.3} km", self.tour_km)?;
        writeln!(f, "Driven: {:.3} km ({} detours, {:.3} km)", self.driven_km, self.detours, self.detour_km)?;
        writeln!(f, "Visited addresses: {}", self.visited_addresses)?;
        writeln!(f, "Repairs: {}", self.repairs)?;
        write!(f, "Time: {:.4}s", self.computation_time)
    }
}

/// Route planning pipeline
pub struct RoutePlanner {
    pub construction: ConstructionAlgorithm,
    pub improvement: ImprovementAlgorithm,
    pub cancel: CancellationToken,
}

impl RoutePlanner {
    pub fn new(construction: ConstructionAlgorithm, improvement: ImprovementAlgorithm) -> Self {
        RoutePlanner {
            construction,
            improvement,
            cancel: CancellationToken::default(),
        }
    }

    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Plan a route through every address of the network
    pub fn plan(&self, network: &RoadNetwork, distance: &dyn Distance) -> PlannedRoute {
        self.plan_stops(network, distance, &network.addresses())
    }

    /// Plan a route through the given addresses only
    pub fn plan_stops(&self, network: &RoadNetwork, distance: &dyn Distance, addresses: &[NodeId]) -> PlannedRoute {
        let start = std::time::Instant::now();
        let depot = network.depot().id.as_str();

        let mut tour = self.construction.build().construct(addresses, depot, distance);
        log::info!("{} built a {:.3} km tour", tour.algorithm, tour.length);

        if let Some(search) = self.improvement.build() {
            let before = tour.length;
            search.improve(depot, distance, &mut tour, &self.cancel);
            log::info!("{} improved {:.3} -> {:.3} km", search.name(), before, tour.length);
            tour.algorithm = format!("{} + {}", tour.algorithm, search.name());
        }
        tour.computation_time = start.elapsed().as_secs_f64();

        let (planned, mut repairs) = materialize_sequence(&tour.sequence, network);
        let mut route = replace_blocked_edges(&planned, network);
        repairs.append(&mut route.repairs);
        route.repairs = repairs;

        PlannedRoute { tour, route }
    }
}

impl Default for RoutePlanner {
    fn default() -> Self {
        Self::new(ConstructionAlgorithm::MultiStart, ImprovementAlgorithm::LinKernighan)
    }
}

/// Materialize a player-drawn route given as edge IDs.
///
/// Unknown IDs are dropped and reported as `SkippedEdge`.
pub fn evaluate_manual(edge_ids: &[EdgeId], network: &RoadNetwork) -> MaterializedRoute {
    let mut unknown = Vec::new();
    let planned: Vec<_> = edge_ids
        .iter()
        .filter_map(|id| {
            let edge = network.edge(id).cloned();
            if edge.is_none() {
                log::warn!("unknown edge {} in manual route", id);
                unknown.push(RouteRepair::SkippedEdge { edge_id: id.clone() });
            }
            edge
        })
        .collect();

    let mut route = replace_blocked_edges(&planned, network);
    route.repairs.extend(unknown);
    route
}
