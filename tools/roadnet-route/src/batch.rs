//! Parallel travel-time computation for lists of trips

use rayon::prelude::*;
use roadnet_common::{Error, Result};
use serde::Serialize;
use std::fs::File;
use std::io::BufWriter;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Instant;
use tracing::info;

use crate::cache::CachePool;
use crate::compute::{compute_with, PathResult};
use crate::formats::{csv_error, csv_reader, parse_field};
use crate::graph::Graph;
use crate::road_class::RoadClass;
use crate::route::Algorithm;

/// Records between progress log lines
pub const PROGRESS_EVERY: usize = 10_000;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Trip {
    pub origin_lat: f64,
    pub origin_lon: f64,
    pub dest_lat: f64,
    pub dest_lon: f64,
}

#[derive(Serialize)]
#[serde(rename_all = "PascalCase")]
struct TripRecord {
    origin_lat: f64,
    origin_lon: f64,
    destination_lat: f64,
    destination_lon: f64,
    road_time: f64,
    road_distance: f64,
    origin_road_class: RoadClass,
    destination_road_class: RoadClass,
}

/// Compute every trip with one query cache per rayon worker
///
/// Results come back in input order. Unroutable trips carry the
/// [`PathResult::UNROUTABLE`] sentinel.
pub fn compute_batch(graph: &Graph, trips: &[Trip], algorithm: Algorithm) -> Vec<PathResult> {
    let start = Instant::now();
    let done = AtomicUsize::new(0);
    let total = trips.len();

    let pool = CachePool::new(graph.node_count());

    let results: Vec<PathResult> = trips
        .par_iter()
        .map(|trip| {
            let result = compute_with(
                graph,
                (trip.origin_lat, trip.origin_lon),
                (trip.dest_lat, trip.dest_lon),
                &mut pool.for_current_thread(),
                algorithm,
            );
            let n = done.fetch_add(1, Ordering::Relaxed) + 1;
            if n % PROGRESS_EVERY == 0 {
                info!(done = n, total, "batch progress");
            }
            result
        })
        .collect();

    let unroutable = results.iter().filter(|r| !r.is_routable()).count();
    info!(
        trips = total,
        unroutable,
        elapsed_s = start.elapsed().as_secs_f64(),
        "batch complete"
    );
    results
}

/// Read `origin_lat,origin_lon,dest_lat,dest_lon` rows, header skipped
pub fn read_trips<P: AsRef<Path>>(path: P) -> Result<Vec<Trip>> {
    let path = path.as_ref();
    let mut reader = csv_reader(path)?;
    let mut trips = Vec::new();
    for record in reader.records() {
        let record = record.map_err(|e| csv_error(path, e))?;
        if record.len() < 4 {
            continue;
        }
        trips.push(Trip {
            origin_lat: parse_field(&record, 0, path)?,
            origin_lon: parse_field(&record, 1, path)?,
            dest_lat: parse_field(&record, 2, path)?,
            dest_lon: parse_field(&record, 3, path)?,
        });
    }
    Ok(trips)
}

pub fn write_results<P: AsRef<Path>>(path: P, trips: &[Trip], results: &[PathResult]) -> Result<()> {
    let path = path.as_ref();
    if trips.len() != results.len() {
        return Err(Error::LengthMismatch {
            expected: trips.len(),
            actual: results.len(),
        });
    }
    let file = File::create(path).map_err(|e| Error::io(path, e))?;
    let mut writer = csv::Writer::from_writer(BufWriter::new(file));
    for (trip, r) in trips.iter().zip(results) {
        writer
            .serialize(TripRecord {
                origin_lat: trip.origin_lat,
                origin_lon: trip.origin_lon,
                destination_lat: trip.dest_lat,
                destination_lon: trip.dest_lon,
                road_time: r.time,
                road_distance: r.distance,
                origin_road_class: r.origin_class,
                destination_road_class: r.dest_class,
            })
            .map_err(|e| csv_error(path, e))?;
    }
    writer.flush().map_err(|e| Error::io(path, e))?;
    Ok(())
}
