use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use roadnet_route::cache::CHUNK_SIZE;
use roadnet_route::{
    compute, shortest_path, shortest_path_astar, Graph, LinkInput, NodeInput, RoadClass,
};

/// Grid of `side`×`side` nodes with randomised two-way links and a few one-way gaps
fn random_grid(side: usize, seed: u64) -> Graph {
    let mut rng = StdRng::seed_from_u64(seed);
    let id = |r: usize, c: usize| (r * side + c) as i64;
    let mut nodes = Vec::with_capacity(side * side);
    for r in 0..side {
        for c in 0..side {
            let mut links = Vec::new();
            for (dr, dc) in [(0i64, 1i64), (1, 0), (0, -1), (-1, 0)] {
                let (nr, nc) = (r as i64 + dr, c as i64 + dc);
                if nr < 0 || nc < 0 || nr >= side as i64 || nc >= side as i64 {
                    continue;
                }
                // about one link in twenty is missing
                if rng.random_range(0..20) == 0 {
                    continue;
                }
                let class = if r % 5 == 0 { RoadClass::Primary } else { RoadClass::Residential };
                links.push(LinkInput {
                    destination: id(nr as usize, nc as usize),
                    time: rng.random_range(1.0f32..4.0),
                    road_class: class,
                });
            }
            nodes.push(NodeInput {
                lat: 45.0 + r as f32 * 0.005,
                lon: -75.0 + c as f32 * 0.005,
                links,
            });
        }
    }
    Graph::build(nodes).expect("grid builds")
}

#[test]
fn test_astar_and_dijkstra_agree_on_cost() {
    let graph = random_grid(30, 1);
    let mut rng = StdRng::seed_from_u64(2);
    let mut cache = graph.new_cache();
    let n = graph.node_count();

    for _ in 0..300 {
        let (o, d) = (rng.random_range(0..n) as u32, rng.random_range(0..n) as u32);
        let a = shortest_path(&graph, o, d, &mut cache);
        let b = shortest_path_astar(&graph, o, d, &mut cache);
        match (a, b) {
            (Some(a), Some(b)) => assert!(
                (a.cost - b.cost).abs() < 1e-6 * a.cost.max(1.0),
                "{o}->{d}: dijkstra {} astar {}",
                a.cost,
                b.cost
            ),
            (None, None) => {}
            (a, b) => panic!("{o}->{d}: reachability differs: {a:?} vs {b:?}"),
        }
    }
}

#[test]
fn test_reused_cache_matches_fresh_caches() {
    let graph = random_grid(25, 3);
    let mut rng = StdRng::seed_from_u64(4);
    let queries: Vec<(f64, f64, f64, f64)> = (0..200)
        .map(|_| {
            (
                45.0 + rng.random_range(0.0..0.12),
                -75.0 + rng.random_range(0.0..0.12),
                45.0 + rng.random_range(0.0..0.12),
                -75.0 + rng.random_range(0.0..0.12),
            )
        })
        .collect();

    let mut shared = graph.new_cache();
    for &(olat, olon, dlat, dlon) in &queries {
        let reused = compute(&graph, olat, olon, dlat, dlon, &mut shared);
        let mut fresh_cache = graph.new_cache();
        let fresh = compute(&graph, olat, olon, dlat, dlon, &mut fresh_cache);
        assert_eq!(reused, fresh);
    }
}

#[test]
fn test_path_is_consistent_with_links() {
    let graph = random_grid(20, 5);
    let mut cache = graph.new_cache();
    let last = graph.node_count() as u32 - 1;
    let path = shortest_path(&graph, 0, last, &mut cache).expect("corner to corner");

    assert_eq!(path.nodes.first(), Some(&0));
    assert_eq!(path.nodes.last(), Some(&last));
    assert_eq!(path.links.len() + 1, path.nodes.len());
    for (i, &l) in path.links.iter().enumerate() {
        assert_eq!(graph.link(l).destination, path.nodes[i + 1]);
        assert!(graph.out_link_range(path.nodes[i]).contains(&(l as usize)));
    }
    assert!((graph.path_time(&path.links) - path.cost).abs() < 1e-6);
}

#[test]
fn test_same_node_leaves_dirty_cache_untouched() {
    let graph = random_grid(40, 6);
    let mut cache = graph.new_cache();
    let last = graph.node_count() as u32 - 1;
    assert!(shortest_path(&graph, 0, last, &mut cache).is_some());

    let dirty = cache.dirty_chunks();
    assert!(dirty > 0);
    let parents: Vec<Option<u32>> = (0..graph.node_count() as u32).map(|n| cache.parent(n)).collect();

    for node in [0, 17, last] {
        let path = shortest_path(&graph, node, node, &mut cache).unwrap();
        assert!(path.is_empty());
        assert_eq!(path.cost, 0.0);
        let path = shortest_path_astar(&graph, node, node, &mut cache).unwrap();
        assert!(path.is_empty());
    }
    assert_eq!(cache.dirty_chunks(), dirty);
    let after: Vec<Option<u32>> = (0..graph.node_count() as u32).map(|n| cache.parent(n)).collect();
    assert_eq!(after, parents);
}

#[test]
fn test_partial_reset_across_many_chunks() {
    // 4096 nodes span four cache chunks
    let graph = random_grid(64, 7);
    assert!(graph.node_count() > 3 * CHUNK_SIZE);
    let mut rng = StdRng::seed_from_u64(8);
    let n = graph.node_count();

    let mut shared = graph.new_cache();
    let mut max_dirty = 0;
    for i in 0..400 {
        // every tenth query crosses the whole grid so that most chunks get dirty
        let (o, d) = if i % 10 == 0 {
            (0, n as u32 - 1)
        } else {
            (rng.random_range(0..n) as u32, rng.random_range(0..n) as u32)
        };
        let reused = shortest_path(&graph, o, d, &mut shared);
        max_dirty = max_dirty.max(shared.dirty_chunks());

        let mut fresh_cache = graph.new_cache();
        let fresh = shortest_path(&graph, o, d, &mut fresh_cache);
        assert_eq!(reused, fresh, "{o}->{d}");
    }
    assert!(max_dirty > 1, "queries only touched {max_dirty} chunk(s)");
}
