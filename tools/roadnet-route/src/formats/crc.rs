//! CRC-64-ISO checksum utilities for the network cache footer

use crc::{Crc, CRC_64_GO_ISO};
use std::io::{self, Read, Write};

/// CRC-64-ISO algorithm
pub const CRC64: Crc<u64> = Crc::<u64>::new(&CRC_64_GO_ISO);

/// Compute CRC-64 checksum for a byte slice
pub fn checksum(data: &[u8]) -> u64 {
    CRC64.checksum(data)
}

/// Writer that digests every byte it forwards
pub struct DigestWriter<W> {
    inner: W,
    digest: crc::Digest<'static, u64>,
}

impl<W: Write> DigestWriter<W> {
    pub fn new(inner: W) -> Self {
        Self {
            inner,
            digest: CRC64.digest(),
        }
    }

    /// Append the checksum of everything written so far and return the inner writer
    pub fn finish(mut self) -> io::Result<W> {
        let sum = self.digest.finalize();
        self.inner.write_all(&sum.to_le_bytes())?;
        Ok(self.inner)
    }
}

impl<W: Write> Write for DigestWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let n = self.inner.write(buf)?;
        self.digest.update(&buf[..n]);
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

/// Reader that digests every byte it hands out
pub struct DigestReader<R> {
    inner: R,
    digest: crc::Digest<'static, u64>,
}

impl<R: Read> DigestReader<R> {
    pub fn new(inner: R) -> Self {
        Self {
            inner,
            digest: CRC64.digest(),
        }
    }

    /// Checksum of the bytes read so far, plus the inner reader for the footer
    pub fn finish(self) -> (u64, R) {
        (self.digest.finalize(), self.inner)
    }
}

impl<R: Read> Read for DigestReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.inner.read(buf)?;
        self.digest.update(&buf[..n]);
        Ok(n)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_crc64_basic() {
        let data = b"hello world";
        let csum = checksum(data);
        assert_ne!(csum, 0);
    }

    #[test]
    fn test_writer_appends_checksum() {
        let mut w = DigestWriter::new(Vec::new());
        w.write_all(b"hello ").unwrap();
        w.write_all(b"world").unwrap();
        let out = w.finish().unwrap();

        assert_eq!(out.len(), 11 + 8);
        let footer = u64::from_le_bytes(out[11..].try_into().unwrap());
        assert_eq!(footer, checksum(b"hello world"));
    }

    #[test]
    fn test_reader_matches_writer() {
        let data = b"roadnet";
        let mut r = DigestReader::new(&data[..]);
        let mut buf = Vec::new();
        r.read_to_end(&mut buf).unwrap();
        let (sum, _) = r.finish();
        assert_eq!(sum, checksum(data));
    }
}
