//! Flattened road graph: per-node link offsets into one contiguous link array

use roadnet_common::{Error, Result};
use std::ops::Range;
use std::path::Path;
use std::time::Instant;
use tracing::{debug, info, warn};

use crate::cache::QueryCache;
use crate::formats::{read_node_list, NetworkCacheFile};
use crate::geo::haversine_km;
use crate::road_class::RoadClass;
use crate::spatial::{nearest_linear, SpatialIndex};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Node {
    pub lat: f32,
    pub lon: f32,
}

/// Directed link, stored in its tail node's slice of the link array
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Link {
    pub destination: u32,
    /// Minutes; negative marks the link impassable
    pub time: f32,
    pub road_class: RoadClass,
}

/// A node as produced by map extraction, before compaction
#[derive(Debug, Clone, PartialEq)]
pub struct NodeInput {
    pub lat: f32,
    pub lon: f32,
    pub links: Vec<LinkInput>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LinkInput {
    pub destination: i64,
    pub time: f32,
    pub road_class: RoadClass,
}

pub struct Graph {
    nodes: Vec<Node>,
    /// `offsets[i]..offsets[i + 1]` is node i's slice of `links`
    offsets: Vec<u32>,
    links: Vec<Link>,
    spatial: SpatialIndex,
    /// Fastest observed km per minute, bounds the A* heuristic
    max_speed: f64,
}

impl Graph {
    /// Compact a node/link list; fails if a link points outside the node list
    pub fn build(input: Vec<NodeInput>) -> Result<Self> {
        let n = input.len();
        if u32::try_from(n).is_err() {
            return Err(Error::Graph(format!("{n} nodes exceed the u32 index range")));
        }
        for (i, node) in input.iter().enumerate() {
            if let Some(bad) = node
                .links
                .iter()
                .find(|l| l.destination < 0 || l.destination as usize >= n)
            {
                return Err(Error::InvalidLink {
                    node: i,
                    destination: bad.destination,
                });
            }
        }

        let nodes: Vec<Node> = input
            .iter()
            .map(|n| Node {
                lat: n.lat,
                lon: n.lon,
            })
            .collect();
        let degrees: Vec<u32> = input.iter().map(|n| n.links.len() as u32).collect();
        let links = input
            .into_iter()
            .flat_map(|n| n.links)
            .map(|l| Link {
                destination: l.destination as u32,
                time: l.time,
                road_class: l.road_class,
            })
            .collect();

        Self::from_parts(nodes, &degrees, links)
    }

    /// Assemble from already-compacted parts; offsets and the spatial index are built concurrently
    pub fn from_parts(nodes: Vec<Node>, degrees: &[u32], links: Vec<Link>) -> Result<Self> {
        if degrees.len() != nodes.len() {
            return Err(Error::LengthMismatch {
                expected: nodes.len(),
                actual: degrees.len(),
            });
        }
        if let Some((i, link)) = links
            .iter()
            .enumerate()
            .find(|(_, l)| l.destination as usize >= nodes.len())
        {
            return Err(Error::Graph(format!(
                "link {i} points to missing node {}",
                link.destination
            )));
        }

        let (offsets, spatial) = rayon::join(
            || {
                let mut offsets = Vec::with_capacity(degrees.len() + 1);
                let mut acc = 0u64;
                offsets.push(0u32);
                for &d in degrees {
                    acc += d as u64;
                    offsets.push(u32::try_from(acc).map_err(|_| {
                        Error::Graph(format!("{acc} links exceed the u32 index range"))
                    })?);
                }
                Ok::<_, Error>(offsets)
            },
            || SpatialIndex::build(&nodes),
        );
        let offsets = offsets?;

        let total = offsets.last().copied().unwrap_or(0) as usize;
        if total != links.len() {
            return Err(Error::LengthMismatch {
                expected: total,
                actual: links.len(),
            });
        }

        let mut graph = Self {
            nodes,
            offsets,
            links,
            spatial,
            max_speed: 0.0,
        };
        graph.max_speed = graph.observed_max_speed();
        Ok(graph)
    }

    /// Load a network cache file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let start = Instant::now();
        let cache = NetworkCacheFile::read(path)?;
        let graph = Self::from_parts(cache.nodes, &cache.degrees, cache.links)?;
        info!(
            path = %path.display(),
            nodes = graph.node_count(),
            links = graph.link_count(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "loaded network cache"
        );
        Ok(graph)
    }

    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        let degrees: Vec<u32> = self.offsets.windows(2).map(|w| w[1] - w[0]).collect();
        NetworkCacheFile::write(path, &self.nodes, &degrees, &self.links)?;
        info!(path = %path.display(), nodes = self.node_count(), "saved network cache");
        Ok(())
    }

    /// Reuse the cache when it exists, otherwise build from the extracted lists and write it
    pub fn load_or_build<P: AsRef<Path>>(
        cache: P,
        nodes_csv: Option<&Path>,
        links_csv: Option<&Path>,
    ) -> Result<Self> {
        let cache = cache.as_ref();
        if cache.exists() {
            return Self::load(cache);
        }
        let (Some(nodes_csv), Some(links_csv)) = (nodes_csv, links_csv) else {
            return Err(Error::io(
                cache,
                std::io::Error::new(
                    std::io::ErrorKind::NotFound,
                    "network cache missing and no node/link lists given to build it",
                ),
            ));
        };

        info!(cache = %cache.display(), "network cache missing, building from node list");
        let graph = Self::build(read_node_list(nodes_csv, links_csv)?)?;
        graph.save(cache)?;
        Ok(graph)
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn link_count(&self) -> usize {
        self.links.len()
    }

    pub fn node(&self, node: u32) -> Node {
        self.nodes[node as usize]
    }

    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    pub fn links(&self) -> &[Link] {
        &self.links
    }

    pub fn link(&self, link: u32) -> Link {
        self.links[link as usize]
    }

    /// Indices into the link array of a node's outgoing links
    pub fn out_link_range(&self, node: u32) -> Range<usize> {
        let i = node as usize;
        self.offsets[i] as usize..self.offsets[i + 1] as usize
    }

    pub fn out_links(&self, node: u32) -> &[Link] {
        &self.links[self.out_link_range(node)]
    }

    pub fn degree(&self, node: u32) -> usize {
        self.out_link_range(node).len()
    }

    /// Cheapest passable link from `from` to `to`
    pub fn link_between(&self, from: u32, to: u32) -> Option<u32> {
        self.out_link_range(from)
            .filter(|&i| self.links[i].destination == to && self.links[i].time >= 0.0)
            .min_by(|&a, &b| self.links[a].time.total_cmp(&self.links[b].time))
            .map(|i| i as u32)
    }

    /// Great-circle km between two nodes
    pub fn distance_km(&self, a: u32, b: u32) -> f64 {
        let (a, b) = (self.node(a), self.node(b));
        haversine_km(a.lat as f64, a.lon as f64, b.lat as f64, b.lon as f64)
    }

    /// Nearest node to a coordinate, `None` only for an empty graph
    pub fn nearest(&self, lat: f64, lon: f64) -> Option<u32> {
        if let Some(node) = self.spatial.nearest(lat, lon) {
            return Some(node);
        }
        if self.nodes.is_empty() {
            return None;
        }
        warn!(lat, lon, "spatial index returned no candidates, falling back to linear scan");
        nearest_linear(&self.nodes, lat, lon)
    }

    /// Fresh per-caller scratch state for path queries
    pub fn new_cache(&self) -> QueryCache {
        QueryCache::new(self.node_count())
    }

    /// Upper bound on km per minute over all passable links
    pub fn max_speed(&self) -> f64 {
        self.max_speed
    }

    fn observed_max_speed(&self) -> f64 {
        let mut max = 0.0f64;
        for node in 0..self.node_count() as u32 {
            for link in self.out_links(node) {
                if link.time < 0.0 {
                    continue;
                }
                let km = self.distance_km(node, link.destination);
                if km == 0.0 {
                    continue;
                }
                if link.time == 0.0 {
                    return f64::INFINITY;
                }
                max = max.max(km / link.time as f64);
            }
        }
        max
    }

    /// Snapshot of every link's current time
    pub fn link_times(&self) -> Vec<f32> {
        self.links.iter().map(|l| l.time).collect()
    }

    /// Overwrite all link times at once
    pub fn set_link_times(&mut self, times: &[f32]) -> Result<()> {
        if times.len() != self.links.len() {
            return Err(Error::LengthMismatch {
                expected: self.links.len(),
                actual: times.len(),
            });
        }
        for (link, &t) in self.links.iter_mut().zip(times) {
            link.time = t;
        }
        self.max_speed = self.observed_max_speed();
        Ok(())
    }

    /// Recompute every link time from its free-flow time and assigned volume
    pub fn update_link_times(&mut self, volumes: &[f64], freeflow: &[f32]) -> Result<()> {
        for len in [volumes.len(), freeflow.len()] {
            if len != self.links.len() {
                return Err(Error::LengthMismatch {
                    expected: self.links.len(),
                    actual: len,
                });
            }
        }
        for ((link, &volume), &ff) in self.links.iter_mut().zip(volumes).zip(freeflow) {
            link.time = link.road_class.congestion().travel_time(ff, volume as f32);
        }
        self.max_speed = self.observed_max_speed();
        debug!(max_speed = self.max_speed, "link times updated");
        Ok(())
    }

    /// Sum of current link times along a path of link indices
    pub fn path_time(&self, links: &[u32]) -> f64 {
        links.iter().map(|&l| self.links[l as usize].time as f64).sum()
    }

    /// Structural checks on the compacted arrays
    pub fn check_invariants(&self) -> Result<()> {
        if self.offsets.len() != self.nodes.len() + 1 {
            return Err(Error::Graph(format!(
                "{} offsets for {} nodes",
                self.offsets.len(),
                self.nodes.len()
            )));
        }
        if let Some(i) = self.offsets.windows(2).position(|w| w[0] > w[1]) {
            return Err(Error::Graph(format!("offsets decrease at node {i}")));
        }
        if self.offsets.last().copied().unwrap_or(0) as usize != self.links.len() {
            return Err(Error::Graph("offsets do not cover the link array".to_string()));
        }
        if let Some(l) = self
            .links
            .iter()
            .position(|l| l.destination as usize >= self.nodes.len())
        {
            return Err(Error::Graph(format!("link {l} points outside the graph")));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn link(destination: i64, time: f32) -> LinkInput {
        LinkInput {
            destination,
            time,
            road_class: RoadClass::Primary,
        }
    }

    fn triangle() -> Vec<NodeInput> {
        vec![
            NodeInput {
                lat: 45.0,
                lon: -75.0,
                links: vec![link(1, 1.0), link(2, 3.0)],
            },
            NodeInput {
                lat: 45.01,
                lon: -75.0,
                links: vec![link(2, 1.0)],
            },
            NodeInput {
                lat: 45.02,
                lon: -75.0,
                links: vec![],
            },
        ]
    }

    #[test]
    fn test_build_offsets() {
        let g = Graph::build(triangle()).unwrap();
        assert_eq!(g.node_count(), 3);
        assert_eq!(g.link_count(), 3);
        assert_eq!(g.out_link_range(0), 0..2);
        assert_eq!(g.out_link_range(1), 2..3);
        assert_eq!(g.out_link_range(2), 3..3);
        g.check_invariants().unwrap();
    }

    #[test]
    fn test_build_rejects_dangling_link() {
        let mut input = triangle();
        input[2].links.push(link(7, 1.0));
        let err = Graph::build(input).err().unwrap();
        assert!(matches!(
            err,
            Error::InvalidLink {
                node: 2,
                destination: 7
            }
        ));
    }

    #[test]
    fn test_from_parts_rejects_link_outside_graph() {
        let nodes = vec![Node { lat: 45.0, lon: -75.0 }];
        let links = vec![Link {
            destination: 4,
            time: 1.0,
            road_class: RoadClass::Primary,
        }];
        let err = Graph::from_parts(nodes, &[1], links).err().unwrap();
        assert!(matches!(err, Error::Graph(_)));
        assert!(err.to_string().starts_with("Invalid graph structure"));
    }

    #[test]
    fn test_save_load() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("network.bin");
        let g = Graph::build(triangle()).unwrap();
        g.save(&path).unwrap();

        let loaded = Graph::load(&path).unwrap();
        assert_eq!(loaded.nodes(), g.nodes());
        assert_eq!(loaded.links(), g.links());
        for n in 0..3 {
            assert_eq!(loaded.degree(n), g.degree(n));
        }
    }

    #[test]
    fn test_link_between_prefers_cheapest() {
        let mut input = triangle();
        input[0].links.push(link(1, 0.5));
        let g = Graph::build(input).unwrap();
        assert_eq!(g.link_between(0, 1), Some(2));
        assert_eq!(g.link_between(2, 0), None);
    }

    #[test]
    fn test_update_link_times_wrong_length() {
        let mut g = Graph::build(triangle()).unwrap();
        let err = g.update_link_times(&[0.0; 2], &[1.0; 3]).unwrap_err();
        assert!(matches!(
            err,
            Error::LengthMismatch {
                expected: 3,
                actual: 2
            }
        ));
    }

    #[test]
    fn test_update_link_times_keeps_freeflow_at_zero_volume() {
        let mut g = Graph::build(triangle()).unwrap();
        let ff = g.link_times();
        g.update_link_times(&[0.0; 3], &ff).unwrap();
        assert_eq!(g.link_times(), ff);
    }

    #[test]
    fn test_max_speed_tracks_fastest_link() {
        let g = Graph::build(triangle()).unwrap();
        let expected = g.distance_km(0, 1).max(g.distance_km(1, 2));
        assert!((g.max_speed() - expected).abs() < 1e-9);
    }

    #[test]
    fn test_nearest_on_empty_graph() {
        let g = Graph::build(Vec::new()).unwrap();
        assert_eq!(g.nearest(45.0, -75.0), None);
    }
}
