//! Path engine self-check on random node pairs
//!
//! For every pair, Dijkstra on a reused cache is compared against A* on the
//! same cache and against Dijkstra on a freshly allocated cache. Any cost
//! difference beyond float tolerance is a mismatch.

use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;
use roadnet_common::Result;
use serde::Serialize;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Instant;
use tracing::info;

use crate::graph::Graph;
use crate::route::{shortest_path, shortest_path_astar};

const PAIRS_PER_TASK: usize = 256;
const COST_TOLERANCE: f64 = 1e-4;

/// Validation result
#[derive(Debug, Serialize)]
pub struct ValidationResult {
    pub total_pairs: usize,
    pub routable_pairs: usize,
    pub unreachable_pairs: usize,
    pub mismatches: usize,
    pub max_diff: f64,
    pub failures: Vec<Failure>,
    pub elapsed_s: f64,
}

impl ValidationResult {
    pub fn passed(&self) -> bool {
        self.mismatches == 0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Check {
    /// A* cost differs from Dijkstra
    AStar,
    /// Reused cache differs from a fresh one
    CacheReuse,
}

/// Single failure record
#[derive(Debug, Clone, Serialize)]
pub struct Failure {
    pub src: u32,
    pub dst: u32,
    pub check: Check,
    pub baseline_cost: Option<f64>,
    pub other_cost: Option<f64>,
}

/// Uniform random pairs, reproducible from `seed`
pub fn generate_query_pairs(node_count: usize, n_pairs: usize, seed: u64) -> Vec<(u32, u32)> {
    if node_count == 0 {
        return Vec::new();
    }
    let mut rng = StdRng::seed_from_u64(seed);
    (0..n_pairs)
        .map(|_| {
            (
                rng.random_range(0..node_count) as u32,
                rng.random_range(0..node_count) as u32,
            )
        })
        .collect()
}

pub fn validate_paths(graph: &Graph, n_pairs: usize, seed: u64) -> Result<ValidationResult> {
    graph.check_invariants()?;

    let start = Instant::now();
    let pairs = generate_query_pairs(graph.node_count(), n_pairs, seed);
    let completed = AtomicUsize::new(0);
    let routable = AtomicUsize::new(0);
    let failures = Mutex::new(Vec::new());

    pairs.par_chunks(PAIRS_PER_TASK).for_each(|chunk| {
        let mut cache = graph.new_cache();
        let mut local = Vec::new();
        let mut local_routable = 0;

        for &(src, dst) in chunk {
            let baseline = shortest_path(graph, src, dst, &mut cache).map(|p| p.cost);
            let astar = shortest_path_astar(graph, src, dst, &mut cache).map(|p| p.cost);
            let mut fresh_cache = graph.new_cache();
            let fresh = shortest_path(graph, src, dst, &mut fresh_cache).map(|p| p.cost);

            if baseline.is_some() {
                local_routable += 1;
            }
            for (check, other) in [(Check::AStar, astar), (Check::CacheReuse, fresh)] {
                if !costs_agree(baseline, other) {
                    local.push(Failure {
                        src,
                        dst,
                        check,
                        baseline_cost: baseline,
                        other_cost: other,
                    });
                }
            }
        }

        routable.fetch_add(local_routable, Ordering::Relaxed);
        if !local.is_empty() {
            failures.lock().extend(local);
        }
        let done = completed.fetch_add(chunk.len(), Ordering::Relaxed) + chunk.len();
        info!(done, total = pairs.len(), "validation progress");
    });

    let mut failures = failures.into_inner();
    failures.sort_by_key(|f| (f.src, f.dst));
    let max_diff = failures
        .iter()
        .filter_map(|f| Some((f.baseline_cost? - f.other_cost?).abs()))
        .fold(0.0, f64::max);
    let routable_pairs = routable.into_inner();

    Ok(ValidationResult {
        total_pairs: pairs.len(),
        routable_pairs,
        unreachable_pairs: pairs.len() - routable_pairs,
        mismatches: failures.len(),
        max_diff,
        failures,
        elapsed_s: start.elapsed().as_secs_f64(),
    })
}

fn costs_agree(a: Option<f64>, b: Option<f64>) -> bool {
    match (a, b) {
        (Some(a), Some(b)) => (a - b).abs() <= COST_TOLERANCE * a.abs().max(1.0),
        (None, None) => true,
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{LinkInput, NodeInput};
    use crate::road_class::RoadClass;

    #[test]
    fn test_pairs_are_reproducible() {
        let a = generate_query_pairs(100, 50, 7);
        let b = generate_query_pairs(100, 50, 7);
        assert_eq!(a, b);
        assert!(a.iter().all(|&(s, d)| s < 100 && d < 100));
        assert!(generate_query_pairs(0, 10, 7).is_empty());
    }

    #[test]
    fn test_costs_agree() {
        assert!(costs_agree(None, None));
        assert!(costs_agree(Some(10.0), Some(10.000_000_1)));
        assert!(!costs_agree(Some(10.0), Some(11.0)));
        assert!(!costs_agree(Some(10.0), None));
    }

    #[test]
    fn test_ring_validates() {
        let n = 40i64;
        let nodes = (0..n)
            .map(|i| {
                let angle = i as f32 / n as f32 * std::f32::consts::TAU;
                NodeInput {
                    lat: 45.0 + 0.05 * angle.sin(),
                    lon: -75.0 + 0.05 * angle.cos(),
                    links: vec![
                        LinkInput {
                            destination: (i + 1) % n,
                            time: 1.0 + (i % 3) as f32,
                            road_class: RoadClass::Primary,
                        },
                        LinkInput {
                            destination: (i + 7) % n,
                            time: 6.0,
                            road_class: RoadClass::Trunk,
                        },
                    ],
                }
            })
            .collect();
        let g = Graph::build(nodes).unwrap();

        let result = validate_paths(&g, 500, 42).unwrap();
        assert_eq!(result.total_pairs, 500);
        assert_eq!(result.unreachable_pairs, 0);
        assert!(result.passed(), "{:?}", result.failures);
    }
}
