use std::path::{Path, PathBuf};

use serde::Deserialize;

/// DEFAULT_MAX_POINTS_PER_BLOCK is the maximum number of points in an encoded block in a shard file.
pub const DEFAULT_MAX_POINTS_PER_BLOCK: usize = 1000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IndexVersion {
    /// Series are only tracked in the database series file.
    Inmem,
    /// Each shard also gets an on-disk measurement index.
    Tsi1,
}

impl Default for IndexVersion {
    fn default() -> Self {
        IndexVersion::Inmem
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct MetaConfig {
    pub dir: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct DataConfig {
    pub dir: PathBuf,
    #[serde(default)]
    pub index_version: IndexVersion,
    #[serde(default = "default_max_points_per_block")]
    pub max_points_per_block: usize,
}

fn default_max_points_per_block() -> usize {
    DEFAULT_MAX_POINTS_PER_BLOCK
}

/// Config is the destination server configuration, usually read from a TOML file:
///
/// ```toml
/// [meta]
/// dir = "/var/lib/influxdb/meta"
///
/// [data]
/// dir = "/var/lib/influxdb/data"
/// index-version = "tsi1"
/// ```
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Config {
    pub meta: MetaConfig,
    pub data: DataConfig,
}

impl Config {
    /// with_base_dir lays out meta and data directories under `base`.
    pub fn with_base_dir(base: impl AsRef<Path>) -> Self {
        let base = base.as_ref();
        Self {
            meta: MetaConfig {
                dir: base.join("meta"),
            },
            data: DataConfig {
                dir: base.join("data"),
                index_version: IndexVersion::default(),
                max_points_per_block: DEFAULT_MAX_POINTS_PER_BLOCK,
            },
        }
    }

    pub fn from_toml(content: &str) -> anyhow::Result<Self> {
        let config: Config =
            toml::from_str(content).map_err(|e| anyhow!("invalid config: {}", e))?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| anyhow!("unable to read config {}: {}", path.display(), e))?;
        Self::from_toml(content.as_str())
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.meta.dir.as_os_str().is_empty() {
            return Err(anyhow!("meta.dir must be specified"));
        }
        if self.data.dir.as_os_str().is_empty() {
            return Err(anyhow!("data.dir must be specified"));
        }
        if self.data.max_points_per_block == 0 {
            return Err(anyhow!("data.max-points-per-block must be positive"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use crate::config::{Config, IndexVersion, DEFAULT_MAX_POINTS_PER_BLOCK};

    #[test]
    fn test_parse_toml() {
        let toml = r#"
            [meta]
            dir = "/tmp/influxdb/meta"

            [data]
            dir = "/tmp/influxdb/data"
            index-version = "tsi1"
        "#;

        let config = Config::from_toml(toml).unwrap();
        assert_eq!(config.meta.dir, PathBuf::from("/tmp/influxdb/meta"));
        assert_eq!(config.data.dir, PathBuf::from("/tmp/influxdb/data"));
        assert_eq!(config.data.index_version, IndexVersion::Tsi1);
        assert_eq!(config.data.max_points_per_block, DEFAULT_MAX_POINTS_PER_BLOCK);
    }

    #[test]
    fn test_parse_toml_invalid() {
        assert!(Config::from_toml("[meta]\ndir = \"/m\"\n").is_err());

        let toml = r#"
            [meta]
            dir = "/m"
            [data]
            dir = "/d"
            max-points-per-block = 0
        "#;
        assert!(Config::from_toml(toml).is_err());
    }

    #[test]
    fn test_with_base_dir() {
        let config = Config::with_base_dir("/home/u/.influxdb");
        assert_eq!(config.meta.dir, PathBuf::from("/home/u/.influxdb/meta"));
        assert_eq!(config.data.dir, PathBuf::from("/home/u/.influxdb/data"));
        assert_eq!(config.data.index_version, IndexVersion::Inmem);
    }
}
