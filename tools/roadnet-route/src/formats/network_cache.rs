//! network.bin format - flat binary dump of the road graph
//!
//! Layout (all little-endian):
//! - magic: i64
//! - node count: i32
//! - per node: lat f32, lon f32, out-degree i32
//! - per link, in node order: destination i32, time f32, road class i32
//! - footer: CRC-64 of everything above (u64), absent in older files

use roadnet_common::{Error, Result};
use std::fs::File;
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::Path;

use super::crc::{DigestReader, DigestWriter};
use crate::graph::{Link, Node};
use crate::road_class::RoadClass;

pub const MAGIC: i64 = 6_473_891_448;

/// Upper bound on speculative preallocation from an untrusted count
const PREALLOC_LIMIT: usize = 1 << 22;

/// Raw contents of a network cache, before the graph is assembled
#[derive(Debug, Clone, PartialEq)]
pub struct NetworkCache {
    pub nodes: Vec<Node>,
    pub degrees: Vec<u32>,
    pub links: Vec<Link>,
}

pub struct NetworkCacheFile;

impl NetworkCacheFile {
    /// Write nodes, their out-degrees and the compacted link array
    pub fn write<P: AsRef<Path>>(
        path: P,
        nodes: &[Node],
        degrees: &[u32],
        links: &[Link],
    ) -> Result<()> {
        let path = path.as_ref();
        let n_nodes = i32::try_from(nodes.len())
            .map_err(|_| Error::Format(format!("{} nodes exceed the i32 range", nodes.len())))?;
        if degrees.len() != nodes.len() {
            return Err(Error::LengthMismatch {
                expected: nodes.len(),
                actual: degrees.len(),
            });
        }

        let io_err = |e| Error::io(path, e);
        let file = File::create(path).map_err(io_err)?;
        let mut writer = DigestWriter::new(BufWriter::new(file));

        writer.write_all(&MAGIC.to_le_bytes()).map_err(io_err)?;
        writer.write_all(&n_nodes.to_le_bytes()).map_err(io_err)?;

        for (node, &degree) in nodes.iter().zip(degrees) {
            let degree = i32::try_from(degree)
                .map_err(|_| Error::Format(format!("out-degree {degree} exceeds the i32 range")))?;
            writer.write_all(&node.lat.to_le_bytes()).map_err(io_err)?;
            writer.write_all(&node.lon.to_le_bytes()).map_err(io_err)?;
            writer.write_all(&degree.to_le_bytes()).map_err(io_err)?;
        }

        for link in links {
            writer
                .write_all(&(link.destination as i32).to_le_bytes())
                .map_err(io_err)?;
            writer.write_all(&link.time.to_le_bytes()).map_err(io_err)?;
            writer
                .write_all(&link.road_class.code().to_le_bytes())
                .map_err(io_err)?;
        }

        let mut inner = writer.finish().map_err(io_err)?;
        inner.flush().map_err(io_err)?;
        Ok(())
    }

    /// Read a network cache, verifying the checksum footer when present
    pub fn read<P: AsRef<Path>>(path: P) -> Result<NetworkCache> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|e| Error::io(path, e))?;
        Self::read_from(BufReader::new(file), path)
    }

    fn read_from<R: Read>(reader: R, path: &Path) -> Result<NetworkCache> {
        let mut reader = DigestReader::new(reader);

        let magic = i64::from_le_bytes(read_array(&mut reader, path, "magic number")?);
        if magic != MAGIC {
            return Err(Error::InvalidMagic {
                expected: MAGIC,
                found: magic,
            });
        }

        let n_nodes = i32::from_le_bytes(read_array(&mut reader, path, "node count")?);
        let n_nodes = usize::try_from(n_nodes)
            .map_err(|_| Error::Format(format!("negative node count {n_nodes}")))?;

        let mut nodes = Vec::with_capacity(n_nodes.min(PREALLOC_LIMIT));
        let mut degrees = Vec::with_capacity(n_nodes.min(PREALLOC_LIMIT));
        let mut n_links = 0usize;
        for i in 0..n_nodes {
            let lat = f32::from_le_bytes(read_array(&mut reader, path, "node record")?);
            let lon = f32::from_le_bytes(read_array(&mut reader, path, "node record")?);
            let degree = i32::from_le_bytes(read_array(&mut reader, path, "node record")?);
            let degree = u32::try_from(degree)
                .map_err(|_| Error::Format(format!("node {i} has negative degree {degree}")))?;
            n_links += degree as usize;
            nodes.push(Node { lat, lon });
            degrees.push(degree);
        }

        let mut links = Vec::with_capacity(n_links.min(PREALLOC_LIMIT));
        for i in 0..n_links {
            let destination = i32::from_le_bytes(read_array(&mut reader, path, "link record")?);
            let time = f32::from_le_bytes(read_array(&mut reader, path, "link record")?);
            let code = i32::from_le_bytes(read_array(&mut reader, path, "link record")?);

            if destination < 0 || destination as usize >= n_nodes {
                return Err(Error::Format(format!(
                    "link {i} points to node {destination} of {n_nodes}"
                )));
            }
            let road_class = RoadClass::from_code(code)
                .ok_or_else(|| Error::Format(format!("link {i} has unknown road class {code}")))?;
            links.push(Link {
                destination: destination as u32,
                time,
                road_class,
            });
        }

        let (computed, mut rest) = reader.finish();
        let mut trailer = Vec::new();
        rest.read_to_end(&mut trailer)
            .map_err(|e| Error::io(path, e))?;
        match trailer.len() {
            0 => tracing::debug!(path = %path.display(), "network cache has no checksum footer"),
            8 => {
                let stored = u64::from_le_bytes(trailer[..8].try_into().map_err(|_| {
                    Error::Format("short checksum footer".to_string())
                })?);
                if stored != computed {
                    return Err(Error::ChecksumMismatch { stored, computed });
                }
            }
            n => {
                return Err(Error::Format(format!(
                    "{n} unexpected trailing bytes after the last link"
                )))
            }
        }

        Ok(NetworkCache {
            nodes,
            degrees,
            links,
        })
    }
}

fn read_array<R: Read, const N: usize>(reader: &mut R, path: &Path, what: &str) -> Result<[u8; N]> {
    let mut buf = [0u8; N];
    reader.read_exact(&mut buf).map_err(|e| {
        if e.kind() == io::ErrorKind::UnexpectedEof {
            Error::Format(format!("truncated {what}"))
        } else {
            Error::io(path, e)
        }
    })?;
    Ok(buf)
}
