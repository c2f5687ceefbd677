//! Benchmarking and experimentation module for route planning.
//!
//! Provides tools for running every construction and improvement combination
//! on a set of road networks, collecting statistics and comparing algorithm
//! performance.

use crate::detour::{materialize_sequence, replace_blocked_edges};
use crate::distance::NetworkDistance;
use crate::heuristics::construction::*;
use crate::heuristics::local_search::*;
use crate::heuristics::CancellationToken;
use crate::network::{NodeId, RoadNetwork};
use crate::solution::Tour;

use rand::prelude::*;
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use statrs::statistics::Statistics;
use std::collections::HashMap;
use std::fs::File;
use std::path::Path;

/// Result of running a single algorithm on a network
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlgorithmResult {
    /// Algorithm name
    pub algorithm: String,
    /// Network name
    pub network: String,
    /// Number of addresses
    pub addresses: usize,
    /// Tour length in kilometers
    pub length: f64,
    /// Kilometers actually driven once blocked edges are detoured
    pub driven_km: f64,
    /// Number of detours taken
    pub detours: usize,
    /// Legs, gaps and blocks the route could not drive as planned
    pub repairs: usize,
    /// Whether every address is visited exactly once
    pub complete: bool,
    /// Computation time in seconds
    pub time: f64,
    /// Number of iterations (if applicable)
    pub iterations: Option<usize>,
    /// Gap to best known (if available)
    pub gap_to_best: Option<f64>,
}

/// Aggregated statistics for an algorithm
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlgorithmStatistics {
    pub algorithm: String,
    /// Number of runs recorded
    pub num_runs: usize,
    /// Number of complete tours
    pub num_complete: usize,
    pub avg_length: f64,
    pub best_length: f64,
    pub worst_length: f64,
    pub std_length: f64,
    pub avg_time: f64,
    pub total_time: f64,
    pub avg_gap: Option<f64>,
}

/// Benchmark configuration
#[derive(Debug, Clone)]
pub struct BenchmarkConfig {
    /// Number of random-start runs per network
    pub num_runs: usize,
    /// Seed of the first random-start run
    pub seed: u64,
    /// Run random starts in parallel
    pub parallel: bool,
    /// Output directory
    pub output_dir: String,
}

impl Default for BenchmarkConfig {
    fn default() -> Self {
        BenchmarkConfig {
            num_runs: 5,
            seed: 42,
            parallel: true,
            output_dir: "results".to_string(),
        }
    }
}

/// Benchmarking engine
pub struct Benchmark {
    config: BenchmarkConfig,
    results: Vec<AlgorithmResult>,
    best_known: HashMap<String, f64>,
}

impl Benchmark {
    pub fn new(config: BenchmarkConfig) -> Self {
        Benchmark {
            config,
            results: Vec::new(),
            best_known: HashMap::new(),
        }
    }

    /// Set best known tour length for a network
    pub fn set_best_known(&mut self, network_name: &str, length: f64) {
        self.best_known.insert(network_name.to_string(), length);
    }

    /// Run all construction heuristics on a network
    pub fn run_construction_heuristics(&mut self, network: &RoadNetwork, distance: &NetworkDistance) {
        let heuristics: Vec<Box<dyn ConstructionHeuristic + Send + Sync>> = vec![
            Box::new(NearestInsertionHeuristic::new()),
            Box::new(SavingsHeuristic::new()),
            Box::new(MultiStartConstruction::with_all_heuristics()),
        ];

        let addresses = network.addresses();
        let depot = &network.depot().id;
        for heuristic in heuristics {
            let tour = heuristic.construct(&addresses, depot, distance);
            self.record_result(network, &tour);
        }
    }

    /// Run all local search methods on an initial tour
    pub fn run_local_search(&mut self, network: &RoadNetwork, distance: &NetworkDistance, initial: Tour) {
        let searches: Vec<Box<dyn LocalSearch + Send + Sync>> = vec![
            Box::new(TwoOptSearch::new()),
            Box::new(LinKernighanSearch::new()),
            Box::new(VariableNeighborhoodDescent::with_standard_operators()),
        ];

        let depot = &network.depot().id;
        let cancel = CancellationToken::default();
        for search in searches {
            let mut tour = initial.clone();
            let start = std::time::Instant::now();
            search.improve(depot, distance, &mut tour, &cancel);
            tour.computation_time = start.elapsed().as_secs_f64();
            tour.algorithm = format!("{} + {}", initial.algorithm, search.name());
            self.record_result(network, &tour);
        }
    }

    /// Shuffle the addresses with a seeded generator and improve each order
    /// with the Lin-Kernighan style search.
    pub fn run_random_starts(&mut self, network: &RoadNetwork, distance: &NetworkDistance) {
        let addresses = network.addresses();
        let depot = network.depot().id.clone();
        let seeds: Vec<u64> = (0..self.config.num_runs as u64).map(|r| self.config.seed + r).collect();

        let run = |seed: u64| -> Tour {
            let mut order: Vec<NodeId> = addresses.clone();
            order.shuffle(&mut ChaCha8Rng::seed_from_u64(seed));
            let start = std::time::Instant::now();
            let mut tour = Tour::from_sequence(order, &depot, distance, "RandomStart");
            LinKernighanSearch::new().improve(&depot, distance, &mut tour, &CancellationToken::default());
            tour.computation_time = start.elapsed().as_secs_f64();
            tour.algorithm = "RandomStart + Lin-Kernighan".to_string();
            tour
        };

        let tours: Vec<Tour> = if self.config.parallel {
            seeds.par_iter().map(|&s| run(s)).collect()
        } else {
            seeds.iter().map(|&s| run(s)).collect()
        };

        for tour in &tours {
            self.record_result(network, tour);
        }
    }

    /// Run full benchmark on a network
    pub fn run_full_benchmark(&mut self, network: &RoadNetwork) {
        log::info!("Running benchmark on network: {}", network.name);
        let distance = NetworkDistance::new(network);

        self.run_construction_heuristics(network, &distance);

        let addresses = network.addresses();
        let best_construction =
            MultiStartConstruction::with_all_heuristics().construct(&addresses, &network.depot().id, &distance);
        self.run_local_search(network, &distance, best_construction);

        self.run_random_starts(network, &distance);

        let stats = distance.cache_stats();
        log::info!(
            "distance cache: {} entries, {} hits, {} misses",
            stats.size,
            stats.hits,
            stats.misses
        );
    }

    /// Run benchmark on multiple networks
    pub fn run_on_networks(&mut self, networks: &[RoadNetwork]) {
        for network in networks {
            self.run_full_benchmark(network);
        }
    }

    /// Record a result
    fn record_result(&mut self, network: &RoadNetwork, tour: &Tour) {
        let (planned, leg_repairs) = materialize_sequence(&tour.sequence, network);
        let route = replace_blocked_edges(&planned, network);
        let repairs = leg_repairs.len() + route.repairs.len();
        if repairs > 0 {
            log::warn!("{} on {}: {} route repairs", tour.algorithm, network.name, repairs);
        }

        let mut result = AlgorithmResult {
            algorithm: tour.algorithm.clone(),
            network: network.name.clone(),
            addresses: tour.len(),
            length: tour.length,
            driven_km: route.total_km(),
            detours: route.detour_count(),
            repairs,
            complete: tour.is_complete(&network.addresses()),
            time: tour.computation_time,
            iterations: tour.iterations,
            gap_to_best: None,
        };

        if let Some(&best) = self.best_known.get(&network.name) {
            if best > 0.0 {
                result.gap_to_best = Some((result.length - best) / best * 100.0);
            }
        }

        self.results.push(result);
    }

    /// Compute statistics for each algorithm
    pub fn compute_statistics(&self) -> Vec<AlgorithmStatistics> {
        let mut stats_map: HashMap<String, Vec<&AlgorithmResult>> = HashMap::new();

        for result in &self.results {
            stats_map.entry(result.algorithm.clone()).or_default().push(result);
        }

        let mut statistics = Vec::new();

        for (algo, results) in stats_map {
            let complete: Vec<_> = results.iter().filter(|r| r.complete).collect();

            if complete.is_empty() {
                continue;
            }

            let lengths: Vec<f64> = complete.iter().map(|r| r.length).collect();
            let times: Vec<f64> = complete.iter().map(|r| r.time).collect();
            let gaps: Vec<f64> = complete.iter().filter_map(|r| r.gap_to_best).collect();

            let avg_gap = if gaps.is_empty() { None } else { Some(gaps.iter().mean()) };

            statistics.push(AlgorithmStatistics {
                algorithm: algo,
                num_runs: results.len(),
                num_complete: complete.len(),
                avg_length: lengths.iter().mean(),
                best_length: lengths.iter().copied().fold(f64::INFINITY, f64::min),
                worst_length: lengths.iter().copied().fold(0.0, f64::max),
                std_length: lengths.iter().population_std_dev(),
                avg_time: times.iter().mean(),
                total_time: times.iter().sum::<f64>(),
                avg_gap,
            });
        }

        statistics.sort_by(|a, b| a.avg_length.total_cmp(&b.avg_length).then_with(|| a.algorithm.cmp(&b.algorithm)));

        statistics
    }

    /// Export results to CSV
    pub fn export_to_csv<P: AsRef<Path>>(&self, path: P) -> std::io::Result<()> {
        let file = File::create(path)?;
        let mut writer = csv::Writer::from_writer(file);

        for result in &self.results {
            writer.serialize(result)?;
        }

        writer.flush()?;
        Ok(())
    }

    /// Export statistics to CSV
    pub fn export_statistics_csv<P: AsRef<Path>>(&self, path: P) -> std::io::Result<()> {
        let file = File::create(path)?;
        let mut writer = csv::Writer::from_writer(file);

        for stat in self.compute_statistics() {
            writer.serialize(stat)?;
        }

        writer.flush()?;
        Ok(())
    }

    /// Generate summary report
    pub fn generate_report(&self) -> String {
        let mut report = String::new();

        report.push_str("========================================\n");
        report.push_str("     Delivery Route Benchmark Report\n");
        report.push_str("========================================\n");
        report.push_str(&format!("Generated: {}\n\n", chrono::Local::now().format("%Y-%m-%d %H:%M:%S")));

        let stats = self.compute_statistics();

        report.push_str("Algorithm Performance Summary:\n");
        report.push_str("-".repeat(90).as_str());
        report.push('\n');
        report.push_str(&format!(
            "{:<35} {:>10} {:>10} {:>10} {:>10} {:>10}\n",
            "Algorithm", "Complete", "Avg km", "Best km", "Avg Gap%", "Avg Time"
        ));
        report.push_str("-".repeat(90).as_str());
        report.push('\n');

        for stat in &stats {
            let gap_str = stat.avg_gap.map(|g| format!("{:.2}%", g)).unwrap_or_else(|| "-".to_string());

            report.push_str(&format!(
                "{:<35} {:>10} {:>10.3} {:>10.3} {:>10} {:>10.4}\n",
                stat.algorithm,
                format!("{}/{}", stat.num_complete, stat.num_runs),
                stat.avg_length,
                stat.best_length,
                gap_str,
                stat.avg_time
            ));
        }

        report.push_str("-".repeat(90).as_str());
        report.push('\n');

        report.push_str("\nBest Tours per Network:\n");

        let mut network_best: HashMap<&str, &AlgorithmResult> = HashMap::new();
        for result in self.results.iter().filter(|r| r.complete) {
            let entry = network_best.entry(result.network.as_str()).or_insert(result);
            if result.length < entry.length {
                *entry = result;
            }
        }

        let mut names: Vec<&&str> = network_best.keys().collect();
        names.sort();
        for name in names {
            let best = network_best[*name];
            report.push_str(&format!(
                "  {}: {:.3} km, {:.3} km driven, {} detours ({})\n",
                name, best.length, best.driven_km, best.detours, best.algorithm
            ));
        }

        report
    }

    /// Get all results
    pub fn results(&self) -> &[AlgorithmResult] {
        &self.results
    }

    /// Get best known values
    pub fn best_known(&self) -> &HashMap<String, f64> {
        &self.best_known
    }

    pub fn config(&self) -> &BenchmarkConfig {
        &self.config
    }
}

/// Load every `.json` network of a directory, smallest first.
/// Files that fail to load are logged and skipped.
pub fn load_networks_from_dir<P: AsRef<Path>>(dir: P) -> Vec<RoadNetwork> {
    let mut networks = Vec::new();

    if let Ok(entries) = std::fs::read_dir(dir) {
        for entry in entries.flatten() {
            let path = entry.path();
            if path.extension().map(|e| e == "json").unwrap_or(false) {
                match RoadNetwork::from_file(&path) {
                    Ok(network) => networks.push(network),
                    Err(e) => log::warn!("skipping {}: {}", path.display(), e),
                }
            }
        }
    }

    networks.sort_by(|a, b| {
        a.addresses()
            .len()
            .cmp(&b.addresses().len())
            .then_with(|| a.name.cmp(&b.name))
    });

    networks
}
