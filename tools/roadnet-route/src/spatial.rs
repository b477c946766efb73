//! Spatial index for snapping coordinates to graph nodes

use rstar::{PointDistance, RTree, RTreeObject, AABB};

use crate::geo::haversine_km;
use crate::graph::Node;

/// Point with node index for R-tree
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct IndexedPoint {
    pub coords: [f64; 2], // [lat, lon]
    pub node: u32,
}

impl RTreeObject for IndexedPoint {
    type Envelope = AABB<[f64; 2]>;

    fn envelope(&self) -> Self::Envelope {
        AABB::from_point(self.coords)
    }
}

impl PointDistance for IndexedPoint {
    fn distance_2(&self, point: &[f64; 2]) -> f64 {
        let dx = self.coords[0] - point[0];
        let dy = self.coords[1] - point[1];
        dx * dx + dy * dy
    }

    fn contains_point(&self, point: &[f64; 2]) -> bool {
        self.coords == *point
    }
}

/// Spatial index over graph nodes
pub struct SpatialIndex {
    tree: RTree<IndexedPoint>,
}

impl SpatialIndex {
    pub fn build(nodes: &[Node]) -> Self {
        let points = nodes
            .iter()
            .enumerate()
            .map(|(i, node)| IndexedPoint {
                coords: [node.lat as f64, node.lon as f64],
                node: i as u32,
            })
            .collect();

        Self {
            tree: RTree::bulk_load(points),
        }
    }

    /// Closest node in planar degrees, not re-ranked by great-circle distance
    pub fn nearest(&self, lat: f64, lon: f64) -> Option<u32> {
        self.tree.nearest_neighbor(&[lat, lon]).map(|point| point.node)
    }

    pub fn len(&self) -> usize {
        self.tree.size()
    }

    pub fn is_empty(&self) -> bool {
        self.tree.size() == 0
    }
}

/// Linear search for nearest node - O(n) complexity
pub fn nearest_linear(nodes: &[Node], lat: f64, lon: f64) -> Option<u32> {
    nodes
        .iter()
        .enumerate()
        .map(|(i, node)| (i, haversine_km(lat, lon, node.lat as f64, node.lon as f64)))
        .min_by(|a, b| a.1.total_cmp(&b.1))
        .map(|(i, _)| i as u32)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn grid() -> Vec<Node> {
        let mut nodes = Vec::new();
        for i in 0..10 {
            for j in 0..10 {
                nodes.push(Node {
                    lat: 45.0 + i as f32 * 0.01,
                    lon: -75.0 + j as f32 * 0.01,
                });
            }
        }
        nodes
    }

    #[test]
    fn test_snap_exact_point() {
        let nodes = grid();
        let index = SpatialIndex::build(&nodes);
        assert_eq!(index.len(), 100);
        assert_eq!(index.nearest(45.03, -74.95), Some(35));
    }

    #[test]
    fn test_snap_agrees_with_linear_scan() {
        let nodes = grid();
        let index = SpatialIndex::build(&nodes);
        let (lat, lon) = (45.0412, -74.9768);
        assert_eq!(index.nearest(lat, lon), nearest_linear(&nodes, lat, lon));
    }

    #[test]
    fn test_empty_index() {
        let index = SpatialIndex::build(&[]);
        assert!(index.is_empty());
        assert_eq!(index.nearest(0.0, 0.0), None);
        assert_eq!(nearest_linear(&[], 0.0, 0.0), None);
    }
}
