//! End-to-end coordinate-to-coordinate travel time

use serde::Serialize;

use crate::cache::QueryCache;
use crate::geo::{haversine_km, minutes_at, LAST_MILE_SPEED_KMH};
use crate::graph::Graph;
use crate::road_class::RoadClass;
use crate::route::{find_path, Algorithm, ShortestPath};

/// Travel time (minutes) and distance (km) of one trip plus the classes of its end links
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PathResult {
    pub time: f64,
    pub distance: f64,
    pub origin_class: RoadClass,
    pub dest_class: RoadClass,
}

impl PathResult {
    /// Sentinel for pairs with no connecting path
    pub const UNROUTABLE: PathResult = PathResult {
        time: -1.0,
        distance: -1.0,
        origin_class: RoadClass::None,
        dest_class: RoadClass::None,
    };

    pub fn is_routable(&self) -> bool {
        self.time >= 0.0
    }
}

pub fn compute(
    graph: &Graph,
    origin_lat: f64,
    origin_lon: f64,
    dest_lat: f64,
    dest_lon: f64,
    cache: &mut QueryCache,
) -> PathResult {
    compute_with(
        graph,
        (origin_lat, origin_lon),
        (dest_lat, dest_lon),
        cache,
        Algorithm::Dijkstra,
    )
}

/// [`compute`] with an explicit search algorithm; points are `(lat, lon)`
pub fn compute_with(
    graph: &Graph,
    origin: (f64, f64),
    dest: (f64, f64),
    cache: &mut QueryCache,
    algorithm: Algorithm,
) -> PathResult {
    compute_route(graph, origin, dest, cache, algorithm).0
}

/// [`compute_with`] that also hands back the node path it measured
///
/// The path is empty when both points snap to one node and `None` when
/// the trip is unroutable.
pub fn compute_route(
    graph: &Graph,
    origin: (f64, f64),
    dest: (f64, f64),
    cache: &mut QueryCache,
    algorithm: Algorithm,
) -> (PathResult, Option<ShortestPath>) {
    let (Some(o), Some(d)) = (graph.nearest(origin.0, origin.1), graph.nearest(dest.0, dest.1)) else {
        return (PathResult::UNROUTABLE, None);
    };

    if o == d {
        let class = nearest_link_class(graph, o, origin);
        let result = PathResult {
            time: 0.0,
            distance: 0.0,
            origin_class: class,
            dest_class: class,
        };
        return (result, Some(ShortestPath::default()));
    }

    let Some(path) = find_path(graph, o, d, cache, algorithm) else {
        return (PathResult::UNROUTABLE, None);
    };

    let road_km: f64 = path
        .nodes
        .windows(2)
        .map(|w| graph.distance_km(w[0], w[1]))
        .sum();
    let last_mile_km = snap_km(graph, o, origin) + snap_km(graph, d, dest);

    let class_of = |link: Option<&u32>| link.map_or(RoadClass::None, |&l| graph.link(l).road_class);

    let result = PathResult {
        time: path.cost + minutes_at(last_mile_km, LAST_MILE_SPEED_KMH),
        distance: road_km + last_mile_km,
        origin_class: class_of(path.links.first()),
        dest_class: class_of(path.links.last()),
    };
    (result, Some(path))
}

fn snap_km(graph: &Graph, node: u32, point: (f64, f64)) -> f64 {
    let n = graph.node(node);
    haversine_km(point.0, point.1, n.lat as f64, n.lon as f64)
}

/// Class of the outgoing link whose head lies closest to `point`
fn nearest_link_class(graph: &Graph, node: u32, point: (f64, f64)) -> RoadClass {
    graph
        .out_links(node)
        .iter()
        .map(|l| (l.road_class, snap_km(graph, l.destination, point)))
        .min_by(|a, b| a.1.total_cmp(&b.1))
        .map(|(class, _)| class)
        .unwrap_or_default()
}
