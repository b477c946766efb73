//! Extracted node/link lists in delimited text
//!
//! `nodes.csv` holds `lat,lon` with row order giving the node index;
//! `links.csv` holds `from,to,time,road_class`.

use roadnet_common::{Error, Result};
use std::path::Path;

use super::{csv_error, csv_reader, parse_field};
use crate::graph::{LinkInput, NodeInput};
use crate::road_class::RoadClass;

pub fn read_node_list<P: AsRef<Path>, Q: AsRef<Path>>(nodes_csv: P, links_csv: Q) -> Result<Vec<NodeInput>> {
    let nodes_csv = nodes_csv.as_ref();
    let links_csv = links_csv.as_ref();

    let mut nodes = Vec::new();
    let mut reader = csv_reader(nodes_csv)?;
    for record in reader.records() {
        let record = record.map_err(|e| csv_error(nodes_csv, e))?;
        if record.len() < 2 {
            continue;
        }
        nodes.push(NodeInput {
            lat: parse_field(&record, 0, nodes_csv)?,
            lon: parse_field(&record, 1, nodes_csv)?,
            links: Vec::new(),
        });
    }

    let mut reader = csv_reader(links_csv)?;
    let mut n_links = 0usize;
    for record in reader.records() {
        let record = record.map_err(|e| csv_error(links_csv, e))?;
        if record.len() < 4 {
            continue;
        }
        let from: i64 = parse_field(&record, 0, links_csv)?;
        let to: i64 = parse_field(&record, 1, links_csv)?;
        let time: f32 = parse_field(&record, 2, links_csv)?;
        let road_class: RoadClass = parse_field(&record, 3, links_csv)?;

        let node = usize::try_from(from)
            .ok()
            .and_then(|i| nodes.get_mut(i))
            .ok_or(Error::NodeNotFound(from))?;
        node.links.push(LinkInput {
            destination: to,
            time,
            road_class,
        });
        n_links += 1;
    }

    tracing::debug!(nodes = nodes.len(), links = n_links, "read extracted node list");
    Ok(nodes)
}
