//! On-disk formats: the binary network cache and the delimited-text inputs

pub mod crc;
pub mod network_cache;
pub mod node_list;

pub use network_cache::{NetworkCache, NetworkCacheFile};
pub use node_list::read_node_list;

use roadnet_common::Error;
use std::path::Path;
use std::str::FromStr;

/// Reader for comma-separated inputs: header row skipped, short rows tolerated
pub(crate) fn csv_reader(path: &Path) -> Result<csv::Reader<std::fs::File>, Error> {
    csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_path(path)
        .map_err(|e| csv_error(path, e))
}

pub(crate) fn csv_error(path: &Path, err: csv::Error) -> Error {
    let line = err.position().map(|p| p.line()).unwrap_or(0);
    let message = err.to_string();
    match err.into_kind() {
        csv::ErrorKind::Io(source) => Error::io(path, source),
        _ => Error::Csv {
            path: path.to_path_buf(),
            line,
            message,
        },
    }
}

/// Parse column `idx` of a record, reporting the file and line on failure
pub(crate) fn parse_field<T>(record: &csv::StringRecord, idx: usize, path: &Path) -> Result<T, Error>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    let line = record.position().map(|p| p.line()).unwrap_or(0);
    let raw = record.get(idx).ok_or_else(|| Error::Csv {
        path: path.to_path_buf(),
        line,
        message: format!("missing column {idx}"),
    })?;
    raw.parse().map_err(|e: T::Err| Error::Csv {
        path: path.to_path_buf(),
        line,
        message: format!("column {idx} ('{raw}'): {e}"),
    })
}
