//! Last-Mile Router Library
//!
//! Route optimization core for single-vehicle last-mile delivery over a road
//! network with blocked roads.
//!
//! # Features
//!
//! - Road network model with coincident-node groups and blocked edges
//! - Dijkstra shortest paths with per-query edge exclusion
//! - Memoized network distances
//! - Construction heuristics (Nearest Insertion, Clarke-Wright Savings, multi-start)
//! - Local search methods (2-opt, Lin-Kernighan style search, VND)
//! - Route materialization with blocked-edge detours and repair diagnostics
//! - Benchmarking tools
//!
//! # Example
//!
//! ```no_run
//! use lastmile_router::distance::NetworkDistance;
//! use lastmile_router::network::RoadNetwork;
//! use lastmile_router::planner::RoutePlanner;
//!
//! # fn main() -> Result<(), lastmile_router::network::NetworkError> {
//! // Load network
//! let network = RoadNetwork::from_file("data/town.json")?;
//! let distance = NetworkDistance::new(&network);
//!
//! // Construct, improve and materialize
//! let planned = RoutePlanner::default().plan(&network, &distance);
//!
//! println!("Tour: {:.2} km, {} detours", planned.tour.length, planned.route.detour_count());
//! # Ok(())
//! # }
//! ```

pub mod network;
pub mod pathfinding;
pub mod distance;
pub mod solution;
pub mod heuristics;
pub mod detour;
pub mod planner;
pub mod benchmark;

pub use distance::{Distance, NetworkDistance};
pub use network::RoadNetwork;
pub use planner::RoutePlanner;
pub use solution::Tour;
