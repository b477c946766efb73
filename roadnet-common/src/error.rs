//! Error types shared by the roadnet crates
//!
//! Library code returns these typed errors. Unroutable pairs and same-node
//! queries are never errors: they surface as sentinel values from the path
//! engine instead.

use std::io;
use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A file could not be opened, read or written
    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Leading marker of a network cache did not match
    #[error("Invalid magic number: {found:#x} (expected {expected:#x})")]
    InvalidMagic { expected: i64, found: i64 },

    /// Structurally broken binary content
    #[error("Malformed network cache: {0}")]
    Format(String),

    /// Compacted arrays that do not describe a valid graph
    #[error("Invalid graph structure: {0}")]
    Graph(String),

    #[error("Checksum mismatch: stored {stored:016x}, computed {computed:016x}")]
    ChecksumMismatch { stored: u64, computed: u64 },

    /// Malformed delimited-text row
    #[error("{}:{line}: {message}", path.display())]
    Csv {
        path: PathBuf,
        line: u64,
        message: String,
    },

    #[error("Zone not found: {0}")]
    ZoneNotFound(i32),

    #[error("Node not found: {0}")]
    NodeNotFound(i64),

    /// A link whose destination is outside the node list
    #[error("Link from node {node} points to missing node {destination}")]
    InvalidLink { node: usize, destination: i64 },

    #[error("Expected {expected} values, got {actual}")]
    LengthMismatch { expected: usize, actual: usize },

    #[error("Configuration error: {0}")]
    Config(String),
}

impl Error {
    /// Wrap an I/O error with the path it occurred on
    pub fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Error::Io {
            path: path.into(),
            source,
        }
    }

    /// Whether the error was caused by a missing file
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::Io { source, .. } if source.kind() == io::ErrorKind::NotFound)
    }
}

/// Result type alias for roadnet operations
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn io_error_reports_path() {
        let err = Error::io(
            "/tmp/network.bin",
            io::Error::new(io::ErrorKind::NotFound, "missing"),
        );
        assert!(err.is_not_found());
        assert!(err.to_string().contains("/tmp/network.bin"));
    }

    #[test]
    fn graph_and_cache_errors_are_distinct() {
        let graph = Error::Graph("offsets decrease at node 3".into());
        assert_eq!(graph.to_string(), "Invalid graph structure: offsets decrease at node 3");
        let cache = Error::Format("truncated link record".into());
        assert_eq!(cache.to_string(), "Malformed network cache: truncated link record");
    }

    #[test]
    fn invalid_magic_is_hex() {
        let err = Error::InvalidMagic {
            expected: 0x10,
            found: 0x11,
        };
        assert_eq!(
            err.to_string(),
            "Invalid magic number: 0x11 (expected 0x10)"
        );
    }
}
