//! Static user-equilibrium traffic assignment
//!
//! Each iteration finds shortest paths for every OD pair on the current link
//! times and loads the demand all-or-nothing onto them. The relative gap
//! compares the time spent by the running volumes with the time they would
//! spend on those shortest paths. The step towards the all-or-nothing load
//! is the zero of the slope of the total link cost integral along that
//! direction, found by bisection. Link times are then recomputed with the
//! volume-delay function. Path finding borrows the graph immutably and the
//! time update borrows it mutably, so the two phases can never overlap.

use rayon::prelude::*;
use roadnet_common::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::io::BufWriter;
use std::path::Path;
use std::time::Instant;
use tracing::{debug, info};

use crate::cache::CachePool;
use crate::formats::csv_error;
use crate::graph::Graph;
use crate::matrix::Matrix;
use crate::road_class::RoadClass;
use crate::route::shortest_path;
use crate::zones::ZoneSystem;

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct AssignmentParams {
    pub max_iterations: usize,
    /// Stop once the relative gap falls below this
    pub relative_gap: f64,
    /// Width at which the step-size bisection stops
    pub line_search_epsilon: f64,
    /// Origins handled per parallel task
    pub origin_chunk_size: usize,
}

impl Default for AssignmentParams {
    fn default() -> Self {
        Self {
            max_iterations: 100,
            relative_gap: 0.001,
            line_search_epsilon: 0.001,
            origin_chunk_size: 32,
        }
    }
}

impl AssignmentParams {
    pub fn validate(&self) -> Result<()> {
        if self.max_iterations == 0 {
            return Err(Error::Config("max_iterations must be at least 1".into()));
        }
        if self.origin_chunk_size == 0 {
            return Err(Error::Config("origin_chunk_size must be at least 1".into()));
        }
        if !(self.line_search_epsilon > 0.0 && self.line_search_epsilon < 1.0) {
            return Err(Error::Config("line_search_epsilon must be in (0, 1)".into()));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct AssignmentReport {
    /// Shortest-path passes run, including the one that detected convergence
    pub iterations: usize,
    pub converged: bool,
    /// Relative gap measured at the start of every iteration after the first
    pub gaps: Vec<f64>,
    /// Final volume per link, indexed like the graph's link array
    pub link_volumes: Vec<f64>,
}

/// Per-OD stored paths with current and previous costs
///
/// The cost buffers are swapped between iterations, never copied.
#[derive(Debug)]
pub struct PathLedger {
    zones: usize,
    paths: Vec<Vec<u32>>,
    costs: Vec<f64>,
    previous_costs: Vec<f64>,
}

impl PathLedger {
    pub fn new(zones: usize) -> Self {
        let n = zones * zones;
        Self {
            zones,
            paths: vec![Vec::new(); n],
            costs: vec![0.0; n],
            previous_costs: vec![0.0; n],
        }
    }

    pub fn path(&self, origin: usize, destination: usize) -> &[u32] {
        &self.paths[origin * self.zones + destination]
    }

    pub fn cost(&self, origin: usize, destination: usize) -> f64 {
        self.costs[origin * self.zones + destination]
    }

    pub fn previous_cost(&self, origin: usize, destination: usize) -> f64 {
        self.previous_costs[origin * self.zones + destination]
    }

    /// Refill paths and current costs from shortest paths on the current link times
    fn update_paths(&mut self, graph: &Graph, nodes: &[u32], demand: &Matrix, chunk: usize, pool: &CachePool) {
        let z = self.zones;
        if z == 0 {
            return;
        }
        let stride = z * chunk;
        self.paths
            .par_chunks_mut(stride)
            .zip(self.costs.par_chunks_mut(stride))
            .enumerate()
            .for_each(|(c, (paths, costs))| {
                let mut cache = pool.for_current_thread();
                for (k, (path, cost)) in paths.iter_mut().zip(costs.iter_mut()).enumerate() {
                    let (o, d) = (c * chunk + k / z, k % z);
                    path.clear();
                    *cost = 0.0;
                    // zero-demand pairs contribute nothing to volumes, step or gap
                    if demand.get(o, d) == 0.0 {
                        continue;
                    }
                    if let Some(found) = shortest_path(graph, nodes[o], nodes[d], &mut cache) {
                        *cost = found.cost;
                        path.extend_from_slice(&found.links);
                    }
                }
            });
    }

    /// Demand-weighted cost of the stored shortest paths
    fn shortest_path_time(&self, demand: &[f64]) -> f64 {
        demand
            .par_iter()
            .zip(&self.costs)
            .map(|(&d, &c)| d * c)
            .sum()
    }

    fn next_iteration(&mut self) {
        for path in &mut self.paths {
            path.clear();
        }
        std::mem::swap(&mut self.costs, &mut self.previous_costs);
    }
}

/// Assign `demand` with default parameters; link times are left congested
pub fn apply_demand_to_network(
    graph: &mut Graph,
    zones: &ZoneSystem,
    demand: &Matrix,
) -> Result<AssignmentReport> {
    assign(graph, zones, demand, &AssignmentParams::default())
}

pub fn assign(
    graph: &mut Graph,
    zones: &ZoneSystem,
    demand: &Matrix,
    params: &AssignmentParams,
) -> Result<AssignmentReport> {
    params.validate()?;
    if demand.zones() != zones.len() {
        return Err(Error::LengthMismatch {
            expected: zones.len(),
            actual: demand.zones(),
        });
    }
    let nodes = zones.graph_nodes(graph)?;
    let start = Instant::now();

    let freeflow = graph.link_times();
    let pool = CachePool::new(graph.node_count());
    let mut volumes = vec![0.0f64; graph.link_count()];
    let mut ledger = PathLedger::new(zones.len());
    let mut gaps = Vec::new();
    let mut converged = false;
    let mut iterations = 0;

    info!(
        zones = zones.len(),
        links = graph.link_count(),
        total_demand = demand.total(),
        workers = pool.len(),
        "starting assignment"
    );

    for iteration in 0..params.max_iterations {
        iterations = iteration + 1;

        ledger.update_paths(graph, &nodes, demand, params.origin_chunk_size, &pool);
        let aux = all_or_nothing_volumes(&ledger, demand, graph.link_count(), params.origin_chunk_size);

        if iteration > 0 {
            let gap = relative_gap(graph, &volumes, ledger.shortest_path_time(demand.as_slice()));
            gaps.push(gap);
            // a NaN or infinite gap never counts as converged
            if gap.is_finite() && gap < params.relative_gap {
                info!(iteration = iterations, gap, "assignment converged");
                converged = true;
                break;
            }
        }

        let step = if iteration == 0 {
            1.0
        } else {
            find_step_size(graph, &freeflow, &volumes, &aux, params.line_search_epsilon, iteration)
        };
        for (v, a) in volumes.iter_mut().zip(&aux) {
            *v = step * a + (1.0 - step) * *v;
        }
        graph.update_link_times(&volumes, &freeflow)?;

        info!(
            iteration = iterations,
            step,
            gap = gaps.last().copied().unwrap_or(f64::NAN),
            "assignment iteration"
        );
        ledger.next_iteration();
    }

    info!(
        iterations,
        converged,
        elapsed_s = start.elapsed().as_secs_f64(),
        "assignment finished"
    );

    Ok(AssignmentReport {
        iterations,
        converged,
        gaps,
        link_volumes: volumes,
    })
}

/// Total time spent by `volumes` on the current link times over the time the
/// same demand needs on its shortest paths, minus one
fn relative_gap(graph: &Graph, volumes: &[f64], shortest_path_time: f64) -> f64 {
    let total: f64 = graph
        .links()
        .par_iter()
        .zip(volumes)
        .map(|(link, &v)| if v > 0.0 { link.time as f64 * v } else { 0.0 })
        .sum();
    total / shortest_path_time - 1.0
}

/// Slope at `step` of the summed link cost integrals along `volumes -> aux`:
/// Σ t(v + step·(a - v)) · (a - v)
fn line_derivative(graph: &Graph, freeflow: &[f32], volumes: &[f64], aux: &[f64], step: f64) -> f64 {
    graph
        .links()
        .par_iter()
        .zip(freeflow)
        .zip(volumes.par_iter().zip(aux))
        .map(|((link, &ff), (&v, &a))| {
            let direction = a - v;
            if direction == 0.0 {
                return 0.0;
            }
            let time = link
                .road_class
                .congestion()
                .travel_time(ff, (v + step * direction) as f32);
            time as f64 * direction
        })
        .sum()
}

/// Bisection on [0, 1] for the zero of the line derivative
///
/// A slope that is still non-positive at 1 takes the full step. A bisection
/// that collapses onto 0 falls back to the successive-averages step 1/(k+1).
fn find_step_size(
    graph: &Graph,
    freeflow: &[f32],
    volumes: &[f64],
    aux: &[f64],
    epsilon: f64,
    iteration: usize,
) -> f64 {
    if line_derivative(graph, freeflow, volumes, aux, 1.0) <= 0.0 {
        return 1.0;
    }
    let (mut min, mut max) = (0.0f64, 1.0f64);
    while max - min > epsilon {
        let mid = 0.5 * (min + max);
        if line_derivative(graph, freeflow, volumes, aux, mid) > 0.0 {
            max = mid;
        } else {
            min = mid;
        }
    }
    let step = 0.5 * (min + max);
    if step <= epsilon {
        let averaged = 1.0 / (iteration + 1) as f64;
        debug!(bisection = step, step = averaged, "line search collapsed, using averaged step");
        return averaged;
    }
    debug!(step, "line search");
    step
}

/// Load every OD pair's demand onto its stored path
///
/// Each origin chunk accumulates into a private buffer; buffers are summed at the end.
fn all_or_nothing_volumes(ledger: &PathLedger, demand: &Matrix, n_links: usize, chunk: usize) -> Vec<f64> {
    let z = ledger.zones;
    let origins: Vec<usize> = (0..z).collect();
    origins
        .par_chunks(chunk)
        .fold(
            || vec![0.0f64; n_links],
            |mut acc, origins| {
                for &o in origins {
                    for d in 0..z {
                        let flow = demand.get(o, d);
                        if flow == 0.0 {
                            continue;
                        }
                        for &link in ledger.path(o, d) {
                            acc[link as usize] += flow;
                        }
                    }
                }
                acc
            },
        )
        .reduce(
            || vec![0.0f64; n_links],
            |mut a, b| {
                for (x, y) in a.iter_mut().zip(b) {
                    *x += y;
                }
                a
            },
        )
}

/// Shortest-path time between every pair of zones on the current link times
///
/// Unroutable pairs are -1; the diagonal is 0.
pub fn get_travel_times(graph: &Graph, zones: &ZoneSystem) -> Result<Matrix> {
    let nodes = zones.graph_nodes(graph)?;
    let z = zones.len();
    let mut matrix = Matrix::new(z);
    if z == 0 {
        return Ok(matrix);
    }

    let pool = CachePool::new(graph.node_count());
    matrix
        .as_mut_slice()
        .par_chunks_mut(z)
        .enumerate()
        .for_each(|(o, row)| {
            let mut cache = pool.for_current_thread();
            for (d, cell) in row.iter_mut().enumerate() {
                *cell = shortest_path(graph, nodes[o], nodes[d], &mut cache)
                    .map(|p| p.cost)
                    .unwrap_or(-1.0);
            }
        });
    Ok(matrix)
}

#[derive(Serialize)]
#[serde(rename_all = "PascalCase")]
struct LinkVolumeRecord {
    link: u32,
    from: u32,
    to: u32,
    road_class: RoadClass,
    volume: f64,
    time: f32,
}

/// Write one row per link with its assigned volume and current time
pub fn write_link_volumes<P: AsRef<Path>>(path: P, graph: &Graph, volumes: &[f64]) -> Result<()> {
    let path = path.as_ref();
    if volumes.len() != graph.link_count() {
        return Err(Error::LengthMismatch {
            expected: graph.link_count(),
            actual: volumes.len(),
        });
    }
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        fs::create_dir_all(dir).map_err(|e| Error::io(dir, e))?;
    }
    let file = File::create(path).map_err(|e| Error::io(path, e))?;
    let mut writer = csv::Writer::from_writer(BufWriter::new(file));
    for from in 0..graph.node_count() as u32 {
        for idx in graph.out_link_range(from) {
            let link = graph.links()[idx];
            writer
                .serialize(LinkVolumeRecord {
                    link: idx as u32,
                    from,
                    to: link.destination,
                    road_class: link.road_class,
                    volume: volumes[idx],
                    time: link.time,
                })
                .map_err(|e| csv_error(path, e))?;
        }
    }
    writer.flush().map_err(|e| Error::io(path, e))?;
    Ok(())
}
