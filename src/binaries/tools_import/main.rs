use std::io::BufReader;
use std::path::PathBuf;

use clap::Parser;
use influxdb_tools::command::import::{ImportCommand, ImportConfig};
use influxdb_tsdb::config::{Config as ServerConfig, IndexVersion};
use influxdb_tsdb::Server;
use influxdb_utils::fs::base_dir;
use influxdb_utils::time::parse_duration;
use tracing_subscriber::EnvFilter;

/// Import an export stream read from stdin into the local server.
#[derive(Clone, Debug, PartialEq, Parser)]
#[clap(about, version, author)]
struct Config {
    /// Server config file. Meta and data directories default to the base directory.
    #[clap(long)]
    pub config: Option<PathBuf>,

    /// Destination database
    #[clap(long)]
    pub database: String,

    /// Destination retention policy
    #[clap(long)]
    pub rp: String,

    /// Shard group duration of the created retention policy
    #[clap(long, default_value = "168h")]
    pub shard_duration: String,

    /// Build an on-disk series index for every imported shard
    #[clap(long)]
    pub build_tsi: bool,

    /// Replace the retention policy if it already exists
    #[clap(long)]
    pub replace: bool,
}

impl Config {
    fn server_config(&self) -> anyhow::Result<ServerConfig> {
        let mut config = match &self.config {
            Some(path) => ServerConfig::load(path)?,
            None => ServerConfig::with_base_dir(base_dir()?),
        };
        if self.build_tsi {
            config.data.index_version = IndexVersion::Tsi1;
        }
        Ok(config)
    }

    fn import_config(&self) -> anyhow::Result<ImportConfig> {
        let mut config = ImportConfig::new(self.database.as_str(), self.rp.as_str());
        config.shard_duration = parse_duration(self.shard_duration.as_str())?;
        config.replace = self.replace;
        config.validate()?;
        Ok(config)
    }
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let config = Config::parse();
    let import_config = config.import_config()?;
    let server = Server::new(config.server_config()?);

    let mut cmd = ImportCommand::new(server, import_config);
    let stdin = std::io::stdin();
    cmd.run(BufReader::new(stdin.lock()))?;
    Ok(())
}
