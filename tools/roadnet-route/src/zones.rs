//! Traffic analysis zones: sparse zone numbers, dense indices, representative nodes

use roadnet_common::{Error, Result};
use rustc_hash::FxHashMap;
use std::path::Path;

use crate::formats::{csv_error, csv_reader, parse_field};
use crate::graph::Graph;

#[derive(Debug, Clone, PartialEq)]
pub struct ZoneSystem {
    /// Zone numbers in ascending order; position is the dense index
    numbers: Vec<i32>,
    nodes: Vec<i64>,
    lookup: FxHashMap<i32, usize>,
}

impl ZoneSystem {
    /// Build from `(zone number, representative node)` pairs in any order
    pub fn new(mut zones: Vec<(i32, i64)>) -> Result<Self> {
        zones.sort_by_key(|&(zone, _)| zone);
        if let Some(w) = zones.windows(2).find(|w| w[0].0 == w[1].0) {
            return Err(Error::Config(format!("zone {} is defined twice", w[0].0)));
        }

        let lookup = zones
            .iter()
            .enumerate()
            .map(|(i, &(zone, _))| (zone, i))
            .collect();
        let (numbers, nodes) = zones.into_iter().unzip();
        Ok(Self {
            numbers,
            nodes,
            lookup,
        })
    }

    /// Read `zone,node` rows; the header row is skipped, short rows are ignored
    pub fn from_csv<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let mut reader = csv_reader(path)?;
        let mut zones = Vec::new();
        for record in reader.records() {
            let record = record.map_err(|e| csv_error(path, e))?;
            if record.len() < 2 {
                continue;
            }
            zones.push((parse_field(&record, 0, path)?, parse_field(&record, 1, path)?));
        }
        let system = Self::new(zones)?;
        tracing::info!(path = %path.display(), zones = system.len(), "loaded zone system");
        Ok(system)
    }

    pub fn len(&self) -> usize {
        self.numbers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.numbers.is_empty()
    }

    pub fn zone_number(&self, index: usize) -> i32 {
        self.numbers[index]
    }

    pub fn zone_numbers(&self) -> &[i32] {
        &self.numbers
    }

    pub fn index_of(&self, zone: i32) -> Option<usize> {
        self.lookup.get(&zone).copied()
    }

    /// Like [`index_of`](Self::index_of) but a missing zone is an error
    pub fn require_index(&self, zone: i32) -> Result<usize> {
        self.index_of(zone).ok_or(Error::ZoneNotFound(zone))
    }

    pub fn node(&self, index: usize) -> i64 {
        self.nodes[index]
    }

    /// Representative nodes as graph indices, checked against the graph
    pub fn graph_nodes(&self, graph: &Graph) -> Result<Vec<u32>> {
        self.nodes
            .iter()
            .map(|&node| {
                usize::try_from(node)
                    .ok()
                    .filter(|&n| n < graph.node_count())
                    .map(|n| n as u32)
                    .ok_or(Error::NodeNotFound(node))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_sorted_dense_indices() {
        let zones = ZoneSystem::new(vec![(30, 3), (10, 1), (20, 2)]).unwrap();
        assert_eq!(zones.zone_numbers(), &[10, 20, 30]);
        assert_eq!(zones.index_of(20), Some(1));
        assert_eq!(zones.node(2), 3);
        assert_eq!(zones.index_of(25), None);
        assert!(matches!(zones.require_index(25), Err(Error::ZoneNotFound(25))));
    }

    #[test]
    fn test_duplicate_zone_rejected() {
        assert!(ZoneSystem::new(vec![(1, 1), (1, 2)]).is_err());
    }

    #[test]
    fn test_from_csv_skips_header_and_short_rows() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("zones.csv");
        fs::write(&path, "Zone,Node\n2,11\n7\n1,10\n").unwrap();

        let zones = ZoneSystem::from_csv(&path).unwrap();
        assert_eq!(zones.len(), 2);
        assert_eq!(zones.zone_number(0), 1);
        assert_eq!(zones.node(1), 11);
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let err = ZoneSystem::from_csv("/nonexistent/zones.csv").unwrap_err();
        assert!(err.is_not_found());
    }
}
