//! Dense zone-by-zone matrices with a sparse CSV interchange

use roadnet_common::{Error, Result};
use std::fs::{self, File};
use std::io::BufWriter;
use std::path::Path;

use crate::formats::{csv_error, csv_reader, parse_field};
use crate::zones::ZoneSystem;

/// Row-major Z×Z values indexed by dense zone index
#[derive(Debug, Clone, PartialEq)]
pub struct Matrix {
    zones: usize,
    data: Vec<f64>,
}

impl Matrix {
    pub fn new(zones: usize) -> Self {
        Self {
            zones,
            data: vec![0.0; zones * zones],
        }
    }

    pub fn from_vec(zones: usize, data: Vec<f64>) -> Result<Self> {
        if data.len() != zones * zones {
            return Err(Error::LengthMismatch {
                expected: zones * zones,
                actual: data.len(),
            });
        }
        Ok(Self { zones, data })
    }

    pub fn zones(&self) -> usize {
        self.zones
    }

    pub fn get(&self, origin: usize, destination: usize) -> f64 {
        self.data[origin * self.zones + destination]
    }

    pub fn set(&mut self, origin: usize, destination: usize, value: f64) {
        self.data[origin * self.zones + destination] = value;
    }

    pub fn row(&self, origin: usize) -> &[f64] {
        &self.data[origin * self.zones..(origin + 1) * self.zones]
    }

    pub fn as_slice(&self) -> &[f64] {
        &self.data
    }

    pub(crate) fn as_mut_slice(&mut self) -> &mut [f64] {
        &mut self.data
    }

    pub fn total(&self) -> f64 {
        self.data.iter().sum()
    }

    /// Read `origin,destination,value` rows keyed by zone number
    ///
    /// A zone number missing from `zones` fails the whole load.
    pub fn load_csv<P: AsRef<Path>>(path: P, zones: &ZoneSystem) -> Result<Self> {
        let path = path.as_ref();
        let mut matrix = Self::new(zones.len());
        let mut reader = csv_reader(path)?;
        let mut rows = 0usize;
        for record in reader.records() {
            let record = record.map_err(|e| csv_error(path, e))?;
            if record.len() < 3 {
                continue;
            }
            let origin = zones.require_index(parse_field(&record, 0, path)?)?;
            let destination = zones.require_index(parse_field(&record, 1, path)?)?;
            let value: f64 = parse_field(&record, 2, path)?;
            matrix.set(origin, destination, value);
            rows += 1;
        }
        tracing::info!(path = %path.display(), rows, total = matrix.total(), "loaded matrix");
        Ok(matrix)
    }

    /// Write non-zero cells as `Origin,Destination,Value`, creating the parent directory
    pub fn save_csv<P: AsRef<Path>>(&self, path: P, zones: &ZoneSystem) -> Result<()> {
        let path = path.as_ref();
        if zones.len() != self.zones {
            return Err(Error::LengthMismatch {
                expected: self.zones,
                actual: zones.len(),
            });
        }
        if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
            fs::create_dir_all(dir).map_err(|e| Error::io(dir, e))?;
        }

        let file = File::create(path).map_err(|e| Error::io(path, e))?;
        let mut writer = csv::Writer::from_writer(BufWriter::new(file));
        writer
            .write_record(["Origin", "Destination", "Value"])
            .map_err(|e| csv_error(path, e))?;
        for o in 0..self.zones {
            for (d, &value) in self.row(o).iter().enumerate() {
                if value == 0.0 {
                    continue;
                }
                writer
                    .serialize((zones.zone_number(o), zones.zone_number(d), value))
                    .map_err(|e| csv_error(path, e))?;
            }
        }
        writer.flush().map_err(|e| Error::io(path, e))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn zones() -> ZoneSystem {
        ZoneSystem::new(vec![(101, 0), (205, 1), (330, 2)]).unwrap()
    }

    #[test]
    fn test_save_skips_zero_cells() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("out").join("matrix.csv");
        let mut m = Matrix::new(3);
        m.set(0, 2, 12.5);
        m.set(2, 1, 0.1);
        m.save_csv(&path, &zones()).unwrap();

        let text = fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines, vec!["Origin,Destination,Value", "101,330,12.5", "330,205,0.1"]);
    }

    #[test]
    fn test_round_trip_reproduces_cells() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("matrix.csv");
        let z = zones();
        let m = Matrix::from_vec(3, vec![0.0, 1.0 / 3.0, 2.0, 0.0, 0.0, 1e-7, 42.0, 0.0, 0.0]).unwrap();
        m.save_csv(&path, &z).unwrap();

        let back = Matrix::load_csv(&path, &z).unwrap();
        assert_eq!(back, m);
    }

    #[test]
    fn test_unknown_zone_fails() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("demand.csv");
        fs::write(&path, "Origin,Destination,Value\n101,999,4\n").unwrap();
        let err = Matrix::load_csv(&path, &zones()).unwrap_err();
        assert!(matches!(err, Error::ZoneNotFound(999)));
    }

    #[test]
    fn test_from_vec_checks_size() {
        assert!(Matrix::from_vec(2, vec![0.0; 3]).is_err());
    }
}
