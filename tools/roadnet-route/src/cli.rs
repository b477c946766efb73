//! CLI commands for roadnet-route

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use std::time::Instant;

use crate::assignment::{assign, get_travel_times, write_link_volumes, AssignmentParams};
use crate::batch::{compute_batch, read_trips, write_results};
use crate::compute::compute_route;
use crate::config::PartialConfig;
use crate::graph::Graph;
use crate::matrix::Matrix;
use crate::route::Algorithm;
use crate::validate::validate_paths;
use crate::zones::ZoneSystem;

#[derive(Parser)]
#[command(name = "roadnet-route")]
#[command(about = "Road network shortest paths and static traffic assignment", long_about = None)]
pub struct Cli {
    /// Emit logs as newline-delimited JSON
    #[arg(long, global = true)]
    pub log_json: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Build a network cache from extracted node and link lists
    Build {
        /// nodes.csv with lat,lon per row
        #[arg(long)]
        nodes: PathBuf,

        /// links.csv with from,to,time,road_class per row
        #[arg(long)]
        links: PathBuf,

        /// Output network cache
        #[arg(short, long)]
        output: PathBuf,
    },

    /// Travel time between two coordinates
    Route {
        /// Network cache
        #[arg(short, long)]
        network: PathBuf,

        /// Start coordinate (lat,lon)
        #[arg(long)]
        from: String,

        /// End coordinate (lat,lon)
        #[arg(long)]
        to: String,

        #[arg(long, value_enum, default_value_t = Algorithm::Dijkstra)]
        algorithm: Algorithm,

        /// Print the result as JSON
        #[arg(long)]
        json: bool,
    },

    /// Travel times for every trip in a CSV file
    Batch {
        /// Network cache
        #[arg(short, long)]
        network: PathBuf,

        /// CSV with origin_lat,origin_lon,dest_lat,dest_lon per row
        #[arg(long)]
        trips: PathBuf,

        /// Output CSV
        #[arg(short, long)]
        output: PathBuf,

        #[arg(long, value_enum, default_value_t = Algorithm::Dijkstra)]
        algorithm: Algorithm,
    },

    /// Assign a demand matrix and write congested travel times
    Assign(AssignArgs),

    /// Zone-to-zone travel times on the network as stored
    TravelTimes {
        /// Network cache
        #[arg(short, long)]
        network: PathBuf,

        /// Zone definition CSV (zone,node)
        #[arg(long)]
        zones: PathBuf,

        /// Output matrix CSV
        #[arg(short, long)]
        output: PathBuf,
    },

    /// Compare Dijkstra, A* and cache reuse on random node pairs
    Validate {
        /// Network cache
        #[arg(short, long)]
        network: PathBuf,

        /// Number of random pairs
        #[arg(long, default_value = "10000")]
        pairs: usize,

        /// Random seed for reproducibility
        #[arg(long, default_value = "42")]
        seed: u64,
    },
}

#[derive(Args)]
pub struct AssignArgs {
    /// TOML run configuration; flags below override its values
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Network cache
    #[arg(short, long)]
    network: Option<PathBuf>,

    /// nodes.csv used to build the cache if it does not exist
    #[arg(long)]
    nodes: Option<PathBuf>,

    /// links.csv used to build the cache if it does not exist
    #[arg(long)]
    links: Option<PathBuf>,

    /// Zone definition CSV (zone,node)
    #[arg(long)]
    zones: Option<PathBuf>,

    /// Demand matrix CSV (origin,destination,value)
    #[arg(long)]
    demand: Option<PathBuf>,

    /// Output travel-time matrix CSV
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Output CSV of per-link volumes and congested times
    #[arg(long)]
    link_volumes: Option<PathBuf>,

    /// Output network cache with congested link times
    #[arg(long)]
    congested_network: Option<PathBuf>,

    /// Worker threads (default: all cores)
    #[arg(short, long)]
    threads: Option<usize>,

    #[arg(long)]
    max_iterations: Option<usize>,

    #[arg(long)]
    relative_gap: Option<f64>,
}

fn parse_coord(s: &str) -> Result<(f64, f64)> {
    let parts: Vec<&str> = s.split(',').collect();
    if parts.len() != 2 {
        anyhow::bail!("Coordinate must be in format 'lat,lon'");
    }
    let lat = parts[0].trim().parse::<f64>()?;
    let lon = parts[1].trim().parse::<f64>()?;
    Ok((lat, lon))
}

impl Cli {
    pub fn run(self) -> Result<()> {
        match self.command {
            Commands::Build {
                nodes,
                links,
                output,
            } => {
                let start = Instant::now();
                let list = crate::formats::read_node_list(&nodes, &links)
                    .context("reading node/link lists")?;
                let graph = Graph::build(list)?;
                graph.save(&output)?;

                println!("✓ {} nodes, {} links", graph.node_count(), graph.link_count());
                println!("✓ Saved {} in {:.2}s", output.display(), start.elapsed().as_secs_f64());
                Ok(())
            }
            Commands::Route {
                network,
                from,
                to,
                algorithm,
                json,
            } => {
                let graph = Graph::load(&network)
                    .with_context(|| format!("loading {}", network.display()))?;
                let from_coord = parse_coord(&from)?;
                let to_coord = parse_coord(&to)?;

                let mut cache = graph.new_cache();
                let start = Instant::now();
                let (result, path) = compute_route(&graph, from_coord, to_coord, &mut cache, algorithm);
                let elapsed = start.elapsed();

                if json {
                    println!("{}", serde_json::to_string_pretty(&result)?);
                    return Ok(());
                }
                if !result.is_routable() {
                    println!("No route found between {} and {}", from, to);
                    return Ok(());
                }

                let nodes = path.map(|p| p.nodes.len()).unwrap_or(0);
                println!("\nRoute found in {:.3}ms", elapsed.as_secs_f64() * 1000.0);
                println!("Distance: {:.2} km", result.distance);
                println!("Time: {:.1} minutes", result.time);
                println!("Road classes: {} -> {}", result.origin_class, result.dest_class);
                println!("Nodes in path: {}", nodes);
                Ok(())
            }
            Commands::Batch {
                network,
                trips,
                output,
                algorithm,
            } => {
                let graph = Graph::load(&network)
                    .with_context(|| format!("loading {}", network.display()))?;
                let trips_list = read_trips(&trips)?;
                println!("Computing {} trips...", trips_list.len());

                let start = Instant::now();
                let results = compute_batch(&graph, &trips_list, algorithm);
                write_results(&output, &trips_list, &results)?;

                let unroutable = results.iter().filter(|r| !r.is_routable()).count();
                println!(
                    "✓ {} trips in {:.2}s ({} unroutable)",
                    results.len(),
                    start.elapsed().as_secs_f64(),
                    unroutable
                );
                Ok(())
            }
            Commands::Assign(args) => run_assign(args),
            Commands::TravelTimes {
                network,
                zones,
                output,
            } => {
                let graph = Graph::load(&network)
                    .with_context(|| format!("loading {}", network.display()))?;
                let zones = ZoneSystem::from_csv(&zones)?;
                let matrix = get_travel_times(&graph, &zones)?;
                matrix.save_csv(&output, &zones)?;
                println!("✓ {}x{} travel times written to {}", zones.len(), zones.len(), output.display());
                Ok(())
            }
            Commands::Validate {
                network,
                pairs,
                seed,
            } => {
                let graph = Graph::load(&network)
                    .with_context(|| format!("loading {}", network.display()))?;

                println!("\n🔬 Path Validation - {} threads", rayon::current_num_threads());
                println!("   Pairs: {}", pairs);
                println!("   Seed: {}", seed);

                let result = validate_paths(&graph, pairs, seed)?;

                println!("\n=== VALIDATION COMPLETE ===");
                println!("  Total time:  {:.2}s", result.elapsed_s);
                println!("  Total pairs: {}", result.total_pairs);
                println!("  Routable:    {}", result.routable_pairs);
                println!("  Unreachable: {}", result.unreachable_pairs);
                println!("  MISMATCHES:  {}", result.mismatches);
                if !result.passed() {
                    println!("  Max diff:    {:.6}", result.max_diff);
                    println!("\n  First 5 failures:");
                    for f in result.failures.iter().take(5) {
                        println!(
                            "    src={} dst={} check={:?} baseline={:?} other={:?}",
                            f.src, f.dst, f.check, f.baseline_cost, f.other_cost
                        );
                    }
                    anyhow::bail!("validation failed with {} mismatches", result.mismatches);
                }
                println!("\n✅ VALIDATION PASSED - 0 mismatches");
                Ok(())
            }
        }
    }
}

fn run_assign(args: AssignArgs) -> Result<()> {
    let file = match &args.config {
        Some(path) => PartialConfig::from_file(path)?,
        None => PartialConfig::default(),
    };

    let assignment = if args.max_iterations.is_some() || args.relative_gap.is_some() {
        let base = file.assignment.clone().unwrap_or_default();
        Some(AssignmentParams {
            max_iterations: args.max_iterations.unwrap_or(base.max_iterations),
            relative_gap: args.relative_gap.unwrap_or(base.relative_gap),
            ..base
        })
    } else {
        None
    };
    let overrides = PartialConfig {
        network: args.network,
        nodes: args.nodes,
        links: args.links,
        zones: args.zones,
        demand: args.demand,
        travel_times: args.output,
        link_volumes: args.link_volumes,
        congested_network: args.congested_network,
        threads: args.threads,
        assignment,
    };
    let config = file.merge(overrides).finish()?;
    config.check_inputs()?;

    if let Some(threads) = config.threads {
        rayon::ThreadPoolBuilder::new()
            .num_threads(threads)
            .build_global()
            .context("configuring worker threads")?;
    }

    let start = Instant::now();
    let mut graph = Graph::load_or_build(&config.network, config.nodes.as_deref(), config.links.as_deref())
        .with_context(|| format!("loading {}", config.network.display()))?;
    let zones = ZoneSystem::from_csv(&config.zones)?;
    let demand = Matrix::load_csv(&config.demand, &zones)?;

    let report = assign(&mut graph, &zones, &demand, &config.assignment)?;
    println!(
        "✓ Assignment {} after {} iterations (gap {:.6})",
        if report.converged { "converged" } else { "stopped" },
        report.iterations,
        report.gaps.last().copied().unwrap_or(f64::NAN)
    );

    let travel_times = get_travel_times(&graph, &zones)?;
    travel_times.save_csv(&config.travel_times, &zones)?;
    println!("✓ Travel times: {}", config.travel_times.display());

    if let Some(path) = &config.link_volumes {
        write_link_volumes(path, &graph, &report.link_volumes)?;
        println!("✓ Link volumes: {}", path.display());
    }
    if let Some(path) = &config.congested_network {
        graph.save(path)?;
        println!("✓ Congested network: {}", path.display());
    }

    println!("\nTotal time: {:.2}s", start.elapsed().as_secs_f64());
    Ok(())
}
