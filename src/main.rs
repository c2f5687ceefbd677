//! Last-Mile Router - Command Line Interface
//!
//! Plans delivery tours over a road network map and reroutes drawn routes
//! around blocked roads.

use clap::{Parser, Subcommand, ValueEnum};
use indicatif::{ProgressBar, ProgressStyle};
use lastmile_router::benchmark::{load_networks_from_dir, Benchmark, BenchmarkConfig};
use lastmile_router::detour::MaterializedRoute;
use lastmile_router::distance::NetworkDistance;
use lastmile_router::heuristics::construction::*;
use lastmile_router::heuristics::local_search::*;
use lastmile_router::network::RoadNetwork;
use lastmile_router::planner::{evaluate_manual, ConstructionAlgorithm, ImprovementAlgorithm, RoutePlanner};

use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(name = "lastmile-router")]
#[command(author = "M2 AI2D Student")]
#[command(version = "1.0")]
#[command(about = "Delivery route planning over a road network with blocked roads")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Plan a tour through every address and materialize it
    Plan {
        /// Path to the network JSON file
        #[arg(short, long)]
        network: PathBuf,

        /// Construction heuristic
        #[arg(short, long, value_enum, default_value = "multi-start")]
        construction: Construction,

        /// Improvement heuristic
        #[arg(short, long, value_enum, default_value = "lk")]
        improvement: Improvement,

        /// Only visit these addresses (comma separated)
        #[arg(long, value_delimiter = ',')]
        stops: Option<Vec<String>>,

        /// Output planned route as JSON
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Verbose output
        #[arg(short, long)]
        verbose: bool,
    },

    /// Replace blocked edges of a drawn route with detours
    Reroute {
        /// Path to the network JSON file
        #[arg(short, long)]
        network: PathBuf,

        /// Edge IDs in driving order (comma separated)
        #[arg(short, long, value_delimiter = ',', required = true)]
        edges: Vec<String>,

        /// Output materialized route as JSON
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Analyze a network
    Analyze {
        /// Path to the network JSON file
        #[arg(short, long)]
        network: PathBuf,
    },

    /// Run benchmarks on a directory of networks
    Benchmark {
        /// Directory containing network JSON files
        #[arg(short, long)]
        dir: PathBuf,

        /// Output directory for results
        #[arg(short, long, default_value = "results")]
        output: PathBuf,

        /// Number of random-start runs per network
        #[arg(short, long, default_value = "5")]
        runs: usize,

        /// Seed of the first random start
        #[arg(short, long, default_value = "42")]
        seed: u64,

        /// Run random starts on a single thread
        #[arg(long)]
        sequential: bool,
    },
}

#[derive(Copy, Clone, PartialEq, Eq, ValueEnum, Debug)]
enum Construction {
    /// Cheapest insertion in input order
    NearestInsertion,
    /// Savings algorithm (Clarke-Wright)
    Savings,
    /// Best of both
    MultiStart,
}

impl From<Construction> for ConstructionAlgorithm {
    fn from(value: Construction) -> Self {
        match value {
            Construction::NearestInsertion => ConstructionAlgorithm::NearestInsertion,
            Construction::Savings => ConstructionAlgorithm::Savings,
            Construction::MultiStart => ConstructionAlgorithm::MultiStart,
        }
    }
}

#[derive(Copy, Clone, PartialEq, Eq, ValueEnum, Debug)]
enum Improvement {
    /// Keep the constructed tour
    None,
    /// 2-Opt local search
    TwoOpt,
    /// Lin-Kernighan style variable-depth search
    Lk,
    /// Variable Neighborhood Descent
    Vnd,
}

impl From<Improvement> for ImprovementAlgorithm {
    fn from(value: Improvement) -> Self {
        match value {
            Improvement::None => ImprovementAlgorithm::None,
            Improvement::TwoOpt => ImprovementAlgorithm::TwoOpt,
            Improvement::Lk => ImprovementAlgorithm::LinKernighan,
            Improvement::Vnd => ImprovementAlgorithm::Vnd,
        }
    }
}

fn main() {
    env_logger::init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Plan { network, construction, improvement, stops, output, verbose } => {
            plan_route(&network, construction, improvement, stops, output, verbose);
        }

        Commands::Reroute { network, edges, output } => {
            reroute(&network, &edges, output);
        }

        Commands::Analyze { network } => {
            analyze_network(&network);
        }

        Commands::Benchmark { dir, output, runs, seed, sequential } => {
            run_benchmark(&dir, &output, runs, seed, !sequential);
        }
    }
}

fn load_network(path: &Path) -> RoadNetwork {
    match RoadNetwork::from_file(path) {
        Ok(network) => network,
        Err(e) => {
            eprintln!("Error loading network: {}", e);
            std::process::exit(1);
        }
    }
}

fn write_json<T: serde::Serialize>(value: &T, path: &Path) {
    let written = serde_json::to_string_pretty(value)
        .map_err(|e| e.to_string())
        .and_then(|json| std::fs::write(path, json).map_err(|e| e.to_string()));
    match written {
        Ok(()) => println!("\nSaved to {:?}", path),
        Err(e) => {
            eprintln!("Error writing {:?}: {}", path, e);
            std::process::exit(1);
        }
    }
}

fn print_route(route: &MaterializedRoute, network: &RoadNetwork) {
    println!("Driven: {:.3} km over {} edges", route.total_km(), route.edges.len());
    println!("Detours: {} ({:.3} km)", route.detour_count(), route.detour_km());
    for detour in &route.detours {
        let ids: Vec<&str> = detour.detour_edges.iter().map(|e| e.id.as_str()).collect();
        println!(
            "  {} blocked: {} -> {} via {}",
            detour.original_edge.id,
            detour.start_node,
            detour.end_node,
            ids.join(", ")
        );
    }
    println!(
        "Visited addresses: {}/{}",
        route.visited_addresses(network).len(),
        network.addresses().len()
    );
    for repair in &route.repairs {
        println!("  repair: {:?}", repair);
    }
}

fn plan_route(
    path: &Path,
    construction: Construction,
    improvement: Improvement,
    stops: Option<Vec<String>>,
    output: Option<PathBuf>,
    verbose: bool,
) {
    println!("Loading network from {:?}...", path);
    let network = load_network(path);

    if verbose {
        println!("{}", network.statistics());
    }

    let distance = NetworkDistance::new(&network);
    let planner = RoutePlanner::new(construction.into(), improvement.into());

    println!("Planning with {:?} + {:?}...", construction, improvement);
    let planned = match stops {
        Some(stops) => {
            if let Some(unknown) = stops.iter().find(|s| network.node(s).is_none()) {
                eprintln!("Unknown address: {}", unknown);
                std::process::exit(1);
            }
            planner.plan_stops(&network, &distance, &stops)
        }
        None => planner.plan(&network, &distance),
    };

    println!("\n========== Results ==========");
    println!("{}", planned.summary(&network));
    println!("Stops: {}", planned.tour.sequence.join(" -> "));
    print_route(&planned.route, &network);

    if verbose {
        let stats = distance.cache_stats();
        println!("\nDistance cache: {} entries, {} hits, {} misses", stats.size, stats.hits, stats.misses);
        let edges: Vec<&str> = planned.route.edges.iter().map(|e| e.edge.id.as_str()).collect();
        println!("Edges: {}", edges.join(" "));
    }

    if let Some(out_path) = output {
        write_json(&planned, &out_path);
    }
}

fn reroute(path: &Path, edges: &[String], output: Option<PathBuf>) {
    let network = load_network(path);
    let route = evaluate_manual(edges, &network);

    println!("========== Rerouted ==========");
    print_route(&route, &network);

    if let Some(out_path) = output {
        write_json(&route, &out_path);
    }
}

fn analyze_network(path: &Path) {
    let network = load_network(path);

    println!("========== Network Analysis ==========\n");
    println!("{}", network.statistics());

    let blocked: Vec<&str> = network
        .edges()
        .iter()
        .filter(|e| e.blocked)
        .map(|e| e.id.as_str())
        .collect();
    if !blocked.is_empty() {
        println!("Blocked roads: {}", blocked.join(", "));
    }

    let distance = NetworkDistance::new(&network);
    let depot = network.depot().id.clone();
    let addresses = network.addresses();

    let mut unreachable = Vec::new();
    let mut from_depot: Vec<f64> = Vec::new();
    for address in &addresses {
        let d = distance.calculate(&depot, address);
        if d.is_finite() {
            from_depot.push(d);
        } else {
            unreachable.push(address.as_str());
        }
    }

    if !from_depot.is_empty() {
        let avg = from_depot.iter().sum::<f64>() / from_depot.len() as f64;
        let min = from_depot.iter().cloned().fold(f64::INFINITY, f64::min);
        let max = from_depot.iter().cloned().fold(0.0, f64::max);
        println!("\nDepot Distance Statistics:");
        println!("  Average: {:.3} km", avg);
        println!("  Min: {:.3} km", min);
        println!("  Max: {:.3} km", max);
    }
    if !unreachable.is_empty() {
        println!("  Unreachable: {}", unreachable.join(", "));
    }

    let ni = NearestInsertionHeuristic::new().construct(&addresses, &depot, &distance);
    let cw = SavingsHeuristic::new().construct(&addresses, &depot, &distance);
    let mut best = MultiStartConstruction::with_all_heuristics().construct(&addresses, &depot, &distance);
    VariableNeighborhoodDescent::with_standard_operators().improve(
        &depot,
        &distance,
        &mut best,
        &lastmile_router::heuristics::CancellationToken::default(),
    );

    println!("\nQuick Tour Estimates:");
    println!("  Nearest Insertion: {:.3} km", ni.length);
    println!("  Clarke-Wright Savings: {:.3} km", cw.length);
    println!("  Multi-Start + VND: {:.3} km", best.length);
}

fn run_benchmark(dir: &Path, output: &Path, runs: usize, seed: u64, parallel: bool) {
    println!("Loading networks from {:?}...", dir);

    let networks = load_networks_from_dir(dir);
    println!("Found {} networks", networks.len());

    if networks.is_empty() {
        eprintln!("No networks found!");
        return;
    }

    if let Err(e) = std::fs::create_dir_all(output) {
        eprintln!("Failed to create output directory: {}", e);
        std::process::exit(1);
    }

    let config = BenchmarkConfig {
        num_runs: runs,
        seed,
        parallel,
        output_dir: output.to_string_lossy().to_string(),
    };

    let mut benchmark = Benchmark::new(config);

    let progress = ProgressBar::new(networks.len() as u64);
    if let Ok(style) = ProgressStyle::with_template("[{elapsed_precise}] {bar:40} {pos}/{len} {msg}") {
        progress.set_style(style);
    }

    for network in &networks {
        progress.set_message(format!("{} (n={})", network.name, network.addresses().len()));
        benchmark.run_full_benchmark(network);
        progress.inc(1);
    }
    progress.finish_with_message("done");

    let results_path = output.join("results.csv");
    if let Err(e) = benchmark.export_to_csv(&results_path) {
        eprintln!("Failed to export results: {}", e);
        std::process::exit(1);
    }
    println!("\nResults exported to {:?}", results_path);

    let stats_path = output.join("statistics.csv");
    if let Err(e) = benchmark.export_statistics_csv(&stats_path) {
        eprintln!("Failed to export statistics: {}", e);
        std::process::exit(1);
    }
    println!("Statistics exported to {:?}", stats_path);

    let report = benchmark.generate_report();
    println!("\n{}", report);

    let report_path = output.join("report.txt");
    match std::fs::write(&report_path, &report) {
        Ok(()) => println!("Report saved to {:?}", report_path),
        Err(e) => eprintln!("Failed to save report: {}", e),
    }
}
