use std::io::Read;
use std::time::{Duration, Instant};

use common_base::point::series_field_key;
use influxdb_tsdb::meta::RetentionPolicySpec;

use crate::errlist::ErrorList;
use crate::error::Result;
use crate::format::binary::{BucketHeader, Reader, ReaderStats};
use crate::importer::{Importer, Store};

/// DEFAULT_SHARD_DURATION is the shard group duration used when none is given.
pub const DEFAULT_SHARD_DURATION: Duration = Duration::from_secs(7 * 24 * 60 * 60);

/// ImportConfig describes the destination of an import.
#[derive(Debug, Clone, PartialEq)]
pub struct ImportConfig {
    pub database: String,
    pub retention_policy: String,
    pub shard_duration: Duration,
    /// Drop an existing retention policy of the same name before importing.
    pub replace: bool,
}

impl ImportConfig {
    pub fn new(database: impl Into<String>, retention_policy: impl Into<String>) -> Self {
        Self {
            database: database.into(),
            retention_policy: retention_policy.into(),
            shard_duration: DEFAULT_SHARD_DURATION,
            replace: false,
        }
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.database.is_empty() {
            return Err(anyhow!("database is required"));
        }
        if self.retention_policy.is_empty() {
            return Err(anyhow!("retention policy is required"));
        }
        if self.shard_duration.is_zero() {
            return Err(anyhow!("shard duration must be positive"));
        }
        Ok(())
    }

    /// retention_policy_spec is the policy to create; its shard group duration
    /// comes from the configuration, never from the stream.
    pub fn retention_policy_spec(&self) -> RetentionPolicySpec {
        RetentionPolicySpec::new(self.retention_policy.as_str(), self.shard_duration)
    }
}

/// ImportCommand replays an export stream into a store.
pub struct ImportCommand<S: Store> {
    config: ImportConfig,
    importer: Importer<S>,
}

impl<S: Store> ImportCommand<S> {
    pub fn new(store: S, config: ImportConfig) -> Self {
        let importer = Importer::new(
            store,
            config.database.as_str(),
            config.retention_policy.as_str(),
            config.replace,
        );
        Self { config, importer }
    }

    pub fn config(&self) -> &ImportConfig {
        &self.config
    }

    pub fn importer(&self) -> &Importer<S> {
        &self.importer
    }

    pub fn into_store(self) -> S {
        self.importer.into_store()
    }

    /// run imports every bucket of the stream and stops at the first failure.
    /// The importer is closed on every path.
    pub fn run<R: Read>(&mut self, r: R) -> Result<ReaderStats> {
        let now = Instant::now();

        let result = self.import(r);
        let close_result = self.importer.close();

        let stats = match result {
            Ok(stats) => stats,
            Err(e) => {
                if let Err(close_err) = close_result {
                    tracing::warn!("close importer: {}", close_err);
                }
                return Err(e);
            }
        };
        if let Err(e) = close_result {
            tracing::warn!("close importer: {}", e);
        }

        tracing::info!(
            database = self.config.database.as_str(),
            rp = self.config.retention_policy.as_str(),
            buckets = stats.buckets,
            series = stats.series,
            points = stats.points,
            elapsed = ?now.elapsed(),
            "import complete"
        );
        Ok(stats)
    }

    fn import<R: Read>(&mut self, r: R) -> Result<ReaderStats> {
        self.importer.open()?;

        let mut reader = Reader::new(r);
        let header = reader.read_header()?;
        tracing::info!(
            database = header.database.as_str(),
            rp = header.retention_policy.as_str(),
            shard_duration = header.shard_duration,
            "reading export"
        );

        self.importer
            .create_database(self.config.retention_policy_spec())?;

        while let Some(bucket) = reader.next_bucket()? {
            import_shard(&mut self.importer, &mut reader, &bucket)?;
        }

        Ok(reader.stats())
    }
}

/// import_shard writes one bucket into its own shard group. The group is
/// closed even if writing fails, and both errors are reported.
pub fn import_shard<S: Store, R: Read>(
    importer: &mut Importer<S>,
    reader: &mut Reader<R>,
    bucket: &BucketHeader,
) -> Result<()> {
    importer.start_shard_group(bucket.start, bucket.end)?;
    tracing::info!(start = bucket.start, end = bucket.end, "importing shard");

    let mut errs = ErrorList::new();
    errs.add_result(write_series(importer, reader));
    errs.add_result(importer.close_shard_group());
    errs.err()
}

fn write_series<S: Store, R: Read>(importer: &mut Importer<S>, reader: &mut Reader<R>) -> Result<()> {
    while let Some(series) = reader.next_series()? {
        importer.add_series(series.series_key.as_slice())?;

        let key = series_field_key(series.series_key.as_slice(), series.field.as_slice());
        let mut points = reader.points();
        while points.next()? {
            if let Some(v) = points.value() {
                importer.write(key.as_slice(), std::slice::from_ref(v))?;
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use crate::command::import::{ImportConfig, DEFAULT_SHARD_DURATION};

    #[test]
    fn test_import_config_validate() {
        let config = ImportConfig::new("db0", "autogen");
        assert_eq!(config.shard_duration, DEFAULT_SHARD_DURATION);
        config.validate().unwrap();

        let spec = config.retention_policy_spec();
        assert_eq!(spec.name, "autogen");
        assert_eq!(spec.shard_group_duration, Duration::from_secs(168 * 3600));

        assert!(ImportConfig::new("", "autogen").validate().is_err());
        assert!(ImportConfig::new("db0", "").validate().is_err());

        let mut config = ImportConfig::new("db0", "autogen");
        config.shard_duration = Duration::ZERO;
        assert!(config.validate().is_err());
    }
}
