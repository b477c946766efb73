//! Assignment run configuration
//!
//! A run is described by a TOML file, e.g.
//!
//! ```toml
//! network = "network.bin"
//! zones = "zones.csv"
//! demand = "demand.csv"
//! travel_times = "out/travel_times.csv"
//! link_volumes = "out/link_volumes.csv"
//!
//! [assignment]
//! max_iterations = 50
//! relative_gap = 0.0005
//! ```
//!
//! Relative paths resolve against the directory holding the file. Every
//! field can also come from the command line, which takes precedence.

use roadnet_common::{Error, Result};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

use crate::assignment::AssignmentParams;

/// Fully resolved settings for one assignment run
#[derive(Debug, Clone, PartialEq)]
pub struct AssignmentConfig {
    /// Binary network cache; built from `nodes`/`links` when missing
    pub network: PathBuf,
    pub nodes: Option<PathBuf>,
    pub links: Option<PathBuf>,
    pub zones: PathBuf,
    pub demand: PathBuf,
    /// Output travel-time matrix
    pub travel_times: PathBuf,
    pub link_volumes: Option<PathBuf>,
    /// Output network cache holding the congested link times
    pub congested_network: Option<PathBuf>,
    pub threads: Option<usize>,
    pub assignment: AssignmentParams,
}

/// Settings from one source (file or command line), any of which may be absent
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PartialConfig {
    pub network: Option<PathBuf>,
    pub nodes: Option<PathBuf>,
    pub links: Option<PathBuf>,
    pub zones: Option<PathBuf>,
    pub demand: Option<PathBuf>,
    pub travel_times: Option<PathBuf>,
    pub link_volumes: Option<PathBuf>,
    pub congested_network: Option<PathBuf>,
    pub threads: Option<usize>,
    #[serde(default)]
    pub assignment: Option<AssignmentParams>,
}

impl PartialConfig {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|e| Error::io(path, e))?;
        let mut config: PartialConfig = toml::from_str(&text)
            .map_err(|e| Error::Config(format!("{}: {e}", path.display())))?;
        if let Some(base) = path.parent() {
            config.resolve_relative(base);
        }
        Ok(config)
    }

    fn resolve_relative(&mut self, base: &Path) {
        let fields = [
            &mut self.network,
            &mut self.nodes,
            &mut self.links,
            &mut self.zones,
            &mut self.demand,
            &mut self.travel_times,
            &mut self.link_volumes,
            &mut self.congested_network,
        ];
        for field in fields.into_iter().flatten() {
            if field.is_relative() {
                *field = base.join(&*field);
            }
        }
    }

    /// Values set in `other` win over values in `self`
    pub fn merge(self, other: PartialConfig) -> PartialConfig {
        PartialConfig {
            network: other.network.or(self.network),
            nodes: other.nodes.or(self.nodes),
            links: other.links.or(self.links),
            zones: other.zones.or(self.zones),
            demand: other.demand.or(self.demand),
            travel_times: other.travel_times.or(self.travel_times),
            link_volumes: other.link_volumes.or(self.link_volumes),
            congested_network: other.congested_network.or(self.congested_network),
            threads: other.threads.or(self.threads),
            assignment: other.assignment.or(self.assignment),
        }
    }

    pub fn finish(self) -> Result<AssignmentConfig> {
        let require = |value: Option<PathBuf>, name: &str| {
            value.ok_or_else(|| Error::Config(format!("missing required setting '{name}'")))
        };
        let assignment = self.assignment.unwrap_or_default();
        assignment.validate()?;
        Ok(AssignmentConfig {
            network: require(self.network, "network")?,
            nodes: self.nodes,
            links: self.links,
            zones: require(self.zones, "zones")?,
            demand: require(self.demand, "demand")?,
            travel_times: require(self.travel_times, "travel_times")?,
            link_volumes: self.link_volumes,
            congested_network: self.congested_network,
            threads: self.threads,
            assignment,
        })
    }
}

impl AssignmentConfig {
    /// Fail on missing inputs before any computation starts
    pub fn check_inputs(&self) -> Result<()> {
        let missing = |path: &Path| {
            Error::io(
                path,
                std::io::Error::new(std::io::ErrorKind::NotFound, "input file does not exist"),
            )
        };
        if !self.network.exists() {
            match (&self.nodes, &self.links) {
                (Some(nodes), Some(links)) => {
                    for p in [nodes, links] {
                        if !p.exists() {
                            return Err(missing(p));
                        }
                    }
                }
                _ => return Err(missing(&self.network)),
            }
        }
        for p in [&self.zones, &self.demand] {
            if !p.exists() {
                return Err(missing(p));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_file_paths_resolve_relative_to_config() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("run.toml");
        fs::write(
            &path,
            r#"
network = "network.bin"
zones = "/data/zones.csv"
demand = "demand.csv"
travel_times = "out/tt.csv"

[assignment]
max_iterations = 20
"#,
        )
        .unwrap();

        let config = PartialConfig::from_file(&path).unwrap().finish().unwrap();
        assert_eq!(config.network, dir.path().join("network.bin"));
        assert_eq!(config.zones, PathBuf::from("/data/zones.csv"));
        assert_eq!(config.assignment.max_iterations, 20);
        assert_eq!(config.assignment.relative_gap, 0.001);
    }

    #[test]
    fn test_command_line_overrides_file() {
        let file = PartialConfig {
            network: Some("a.bin".into()),
            zones: Some("z.csv".into()),
            demand: Some("d.csv".into()),
            travel_times: Some("t.csv".into()),
            ..Default::default()
        };
        let cli = PartialConfig {
            network: Some("b.bin".into()),
            threads: Some(4),
            ..Default::default()
        };
        let config = file.merge(cli).finish().unwrap();
        assert_eq!(config.network, PathBuf::from("b.bin"));
        assert_eq!(config.zones, PathBuf::from("z.csv"));
        assert_eq!(config.threads, Some(4));
    }

    #[test]
    fn test_missing_required_setting() {
        let err = PartialConfig::default().finish().unwrap_err();
        assert!(err.to_string().contains("network"));
    }

    #[test]
    fn test_unknown_key_rejected() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("run.toml");
        fs::write(&path, "netwrok = \"x\"\n").unwrap();
        assert!(matches!(PartialConfig::from_file(&path), Err(Error::Config(_))));
    }

    #[test]
    fn test_check_inputs_reports_missing_zones() {
        let dir = TempDir::new().unwrap();
        let network = dir.path().join("network.bin");
        let demand = dir.path().join("demand.csv");
        fs::write(&network, b"").unwrap();
        fs::write(&demand, "").unwrap();
        let config = PartialConfig {
            network: Some(network),
            zones: Some(dir.path().join("zones.csv")),
            demand: Some(demand),
            travel_times: Some(dir.path().join("tt.csv")),
            ..Default::default()
        }
        .finish()
        .unwrap();

        let err = config.check_inputs().unwrap_err();
        assert!(err.is_not_found());
        assert!(err.to_string().contains("zones.csv"));
    }
}
