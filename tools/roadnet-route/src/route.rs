//! Single-pair shortest paths over the flattened graph

use serde::Serialize;

use crate::cache::{Candidate, QueryCache, UNSET};
use crate::graph::Graph;

/// Which search drives a path query
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, clap::ValueEnum)]
pub enum Algorithm {
    #[default]
    Dijkstra,
    /// Dijkstra ordered by cost plus a great-circle lower bound
    AStar,
}

/// Settled path between two nodes
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct ShortestPath {
    /// Node sequence, origin first; empty when origin and destination coincide
    pub nodes: Vec<u32>,
    /// Link indices traversed, one fewer than `nodes`
    pub links: Vec<u32>,
    /// Total link time in minutes
    pub cost: f64,
}

impl ShortestPath {
    pub fn is_empty(&self) -> bool {
        self.links.is_empty()
    }
}

/// Dijkstra from `origin` to `destination`, `None` when unreachable
pub fn shortest_path(
    graph: &Graph,
    origin: u32,
    destination: u32,
    cache: &mut QueryCache,
) -> Option<ShortestPath> {
    find_path(graph, origin, destination, cache, Algorithm::Dijkstra)
}

/// A* variant sharing the cache and reconstruction with [`shortest_path`]
pub fn shortest_path_astar(
    graph: &Graph,
    origin: u32,
    destination: u32,
    cache: &mut QueryCache,
) -> Option<ShortestPath> {
    find_path(graph, origin, destination, cache, Algorithm::AStar)
}

pub fn find_path(
    graph: &Graph,
    origin: u32,
    destination: u32,
    cache: &mut QueryCache,
    algorithm: Algorithm,
) -> Option<ShortestPath> {
    if origin == destination {
        return Some(ShortestPath::default());
    }
    debug_assert_eq!(cache.node_count(), graph.node_count());

    cache.reset();
    // Inflate the speed bound a little so float rounding never overestimates
    let speed = graph.max_speed() * (1.0 + 1e-6);
    let use_heuristic = algorithm == Algorithm::AStar && speed.is_finite() && speed > 0.0;

    let start = Candidate {
        key: 0.0,
        cost: 0.0,
        parent: origin,
        link: UNSET,
    };
    cache.queue.push(origin, start);

    let mut found = None;
    while let Some((node, entry)) = cache.queue.pop() {
        cache.settle(node, entry.parent, entry.link);
        if node == destination {
            found = Some(entry.cost);
            break;
        }

        for link_idx in graph.out_link_range(node) {
            let link = graph.links()[link_idx];
            if link.time < 0.0 || cache.is_settled(link.destination) {
                continue;
            }
            let cost = entry.cost + link.time as f64;
            let h = if use_heuristic {
                *cache
                    .heuristic
                    .entry(link.destination)
                    .or_insert_with(|| graph.distance_km(link.destination, destination) / speed)
            } else {
                0.0
            };
            cache.queue.push_increase(
                link.destination,
                Candidate {
                    key: cost + h,
                    cost,
                    parent: node,
                    link: link_idx as u32,
                },
            );
        }
    }

    let cost = found?;
    let (nodes, links) = reconstruct_path(cache, destination);
    Some(ShortestPath { nodes, links, cost })
}

/// Walk parent pointers back from `destination` until the self-parented origin
fn reconstruct_path(cache: &QueryCache, destination: u32) -> (Vec<u32>, Vec<u32>) {
    let mut nodes = vec![destination];
    let mut links = Vec::new();
    let mut current = destination;

    // A walk longer than the node count can only mean a cycle
    for _ in 0..cache.node_count() {
        let Some(prev) = cache.parent(current) else {
            break;
        };
        if prev == current {
            break;
        }
        if let Some(link) = cache.via_link(current) {
            links.push(link);
        }
        nodes.push(prev);
        current = prev;
    }

    nodes.reverse();
    links.reverse();
    (nodes, links)
}
