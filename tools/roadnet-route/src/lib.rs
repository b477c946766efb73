pub mod assignment;
pub mod batch;
pub mod cache;
pub mod cli;
pub mod compute;
pub mod config;
pub mod formats;
pub mod geo;
pub mod graph;
pub mod matrix;
pub mod road_class;
pub mod route;
pub mod spatial;
pub mod validate;
pub mod zones;

pub use assignment::{apply_demand_to_network, assign, get_travel_times, AssignmentParams, AssignmentReport};
pub use cache::{CachePool, QueryCache};
pub use compute::{compute, compute_route, PathResult};
pub use graph::{Graph, LinkInput, NodeInput};
pub use matrix::Matrix;
pub use road_class::RoadClass;
pub use route::{shortest_path, shortest_path_astar, Algorithm, ShortestPath};
pub use zones::ZoneSystem;

/// Alias of [`Graph::new_cache`] for callers that hold only a graph reference
pub fn get_cache(graph: &Graph) -> QueryCache {
    graph.new_cache()
}

/// Load a demand matrix keyed by the zone system's zone numbers
pub fn build_demand_from_csv<P: AsRef<std::path::Path>>(
    path: P,
    zones: &ZoneSystem,
) -> roadnet_common::Result<Matrix> {
    Matrix::load_csv(path, zones)
}
