use std::collections::{BTreeSet, HashMap};
use std::fs;
use std::path::{Path, PathBuf};

use common_base::point::parse_series_key;
use common_base::value::Value;

use crate::config::{Config, IndexVersion};
use crate::engine::shard::writer::ShardWriter;
use crate::index::tsi1::measurement_block::MeasurementBlockWriter;
use crate::index::INDEX_FILE_NAME;
use crate::meta::{MetaClient, RetentionPolicyInfo, RetentionPolicySpec, ShardGroupInfo};
use crate::series::series_file::{SeriesFile, SERIES_FILE_DIRECTORY};

/// Server is the local storage engine: a meta catalog plus the data
/// directory holding shard files and per-database series files.
pub struct Server {
    config: Config,
    meta: Option<MetaClient>,
    series_files: HashMap<String, SeriesFile>,
}

impl Server {
    pub fn new(config: Config) -> Self {
        Self {
            config,
            meta: None,
            series_files: HashMap::new(),
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn open(&mut self) -> anyhow::Result<()> {
        if self.meta.is_some() {
            return Ok(());
        }

        self.config.validate()?;
        fs::create_dir_all(&self.config.data.dir).map_err(|e| {
            anyhow!(
                "unable to create data dir {}: {}",
                self.config.data.dir.display(),
                e
            )
        })?;
        self.meta = Some(MetaClient::open(&self.config.meta.dir)?);

        tracing::info!(
            meta = %self.config.meta.dir.display(),
            data = %self.config.data.dir.display(),
            "server opened"
        );
        Ok(())
    }

    pub fn meta(&self) -> anyhow::Result<&MetaClient> {
        self.meta.as_ref().ok_or_else(|| anyhow!("server not open"))
    }

    fn meta_mut(&mut self) -> anyhow::Result<&mut MetaClient> {
        self.meta.as_mut().ok_or_else(|| anyhow!("server not open"))
    }

    pub fn data_dir(&self) -> &Path {
        self.config.data.dir.as_path()
    }

    pub fn retention_policy_path(&self, database: &str, rp: &str) -> PathBuf {
        self.data_dir().join(database).join(rp)
    }

    pub fn shard_path(&self, database: &str, rp: &str, shard_id: u64) -> PathBuf {
        self.retention_policy_path(database, rp)
            .join(shard_id.to_string())
    }

    pub fn series_file_path(&self, database: &str) -> PathBuf {
        self.data_dir().join(database).join(SERIES_FILE_DIRECTORY)
    }

    /// retention_policy returns `None` when either the database or the policy is missing.
    pub fn retention_policy(&self, database: &str, rp: &str) -> anyhow::Result<Option<RetentionPolicyInfo>> {
        let meta = self.meta()?;
        match meta.database(database) {
            Some(db) => Ok(db.retention_policy(rp).cloned()),
            None => Ok(None),
        }
    }

    /// create_database creates the database and the retention policy. The policy
    /// becomes the default only for a database created by this call.
    pub fn create_database(&mut self, database: &str, spec: &RetentionPolicySpec) -> anyhow::Result<()> {
        let meta = self.meta_mut()?;
        let created = meta.database(database).is_none();
        meta.create_database(database)?;
        meta.create_retention_policy(database, spec, created)?;

        tracing::info!(
            database,
            rp = spec.name.as_str(),
            shard_group_duration = ?spec.shard_group_duration,
            "database created"
        );
        Ok(())
    }

    /// drop_retention_policy removes the policy, its shard groups and their data.
    pub fn drop_retention_policy(&mut self, database: &str, rp: &str) -> anyhow::Result<()> {
        let rpi = self.meta_mut()?.drop_retention_policy(database, rp)?;

        let path = self.retention_policy_path(database, rp);
        if path.exists() {
            fs::remove_dir_all(&path)
                .map_err(|e| anyhow!("unable to remove {}: {}", path.display(), e))?;
        }

        tracing::info!(
            database,
            rp,
            shard_groups = rpi.shard_groups.len(),
            "retention policy dropped"
        );
        Ok(())
    }

    /// start_shard_group registers a shard group for exactly `[start, end)` and
    /// returns a writer for its single shard.
    pub fn start_shard_group(
        &mut self,
        database: &str,
        rp: &str,
        start: i64,
        end: i64,
    ) -> anyhow::Result<ShardGroupWriter> {
        let group = self.meta_mut()?.create_shard_group(database, rp, start, end)?;
        let shard_id = group
            .shards
            .first()
            .map(|s| s.id)
            .ok_or_else(|| anyhow!("shard group {} has no shards", group.id))?;

        let writer = match ShardWriter::new(
            shard_id,
            self.shard_path(database, rp, shard_id),
            self.config.data.max_points_per_block,
        ) {
            Ok(w) => w,
            Err(e) => {
                // leave no empty group behind to block a later import of this range
                if let Err(del_err) = self.meta_mut()?.delete_shard_group(database, rp, group.id) {
                    tracing::warn!(shard_group = group.id, "delete shard group: {}", del_err);
                }
                return Err(e);
            }
        };

        tracing::info!(
            database,
            rp,
            shard_group = group.id,
            shard = shard_id,
            start,
            end,
            "shard group started"
        );

        Ok(ShardGroupWriter {
            database: database.to_string(),
            retention_policy: rp.to_string(),
            group,
            writer,
            series: BTreeSet::new(),
        })
    }

    /// close_shard_group registers the group's series, builds the shard index when
    /// configured and finalizes the shard file. The shard file is closed even when
    /// indexing fails.
    pub fn close_shard_group(&mut self, sgw: ShardGroupWriter) -> anyhow::Result<()> {
        let ShardGroupWriter {
            database,
            retention_policy,
            group,
            writer,
            series,
        } = sgw;

        let shard_id = writer.id();
        let values = writer.values_written();

        let index_result = self.index_series(database.as_str(), retention_policy.as_str(), shard_id, &series);
        let close_result = writer.close();

        tracing::info!(
            database = database.as_str(),
            rp = retention_policy.as_str(),
            shard_group = group.id,
            shard = shard_id,
            series = series.len(),
            values,
            "shard group closed"
        );

        match (index_result, close_result) {
            (Ok(_), Ok(_)) => Ok(()),
            (Err(e), Ok(_)) | (Ok(_), Err(e)) => Err(e),
            (Err(index_err), Err(close_err)) => Err(anyhow!("{}; {}", index_err, close_err)),
        }
    }

    fn index_series(
        &mut self,
        database: &str,
        rp: &str,
        shard_id: u64,
        series: &BTreeSet<Vec<u8>>,
    ) -> anyhow::Result<()> {
        if series.is_empty() {
            return Ok(());
        }

        let sfile = self.series_file(database)?;
        let ids = sfile.create_series_list_if_not_exists(series.iter().map(|k| k.as_slice()))?;

        if self.config.data.index_version != IndexVersion::Tsi1 {
            return Ok(());
        }

        let mut mb = MeasurementBlockWriter::new();
        for (key, id) in series.iter().zip(ids) {
            match parse_series_key(key.as_slice()) {
                Ok((name, _tags)) => mb.add(name.as_slice(), id),
                Err(e) => {
                    tracing::warn!(
                        key = %String::from_utf8_lossy(key),
                        "indexing series under its full key: {}",
                        e
                    );
                    mb.add(key.as_slice(), id);
                }
            }
        }

        let path = self.shard_path(database, rp, shard_id).join(INDEX_FILE_NAME);
        let n = mb.write_file(&path)?;
        tracing::debug!(path = %path.display(), bytes = n, "shard index written");
        Ok(())
    }

    fn series_file(&mut self, database: &str) -> anyhow::Result<&mut SeriesFile> {
        if !self.series_files.contains_key(database) {
            let sfile = SeriesFile::open(self.series_file_path(database))?;
            self.series_files.insert(database.to_string(), sfile);
        }
        self.series_files
            .get_mut(database)
            .ok_or_else(|| anyhow!("series file not open: {}", database))
    }

    /// close releases the series files. Closing a closed server is a no-op.
    pub fn close(&mut self) -> anyhow::Result<()> {
        let mut first_err = None;
        for (database, mut sfile) in self.series_files.drain() {
            if let Err(e) = sfile.close() {
                tracing::warn!(database = database.as_str(), "close series file: {}", e);
                first_err.get_or_insert(e);
            }
        }
        self.meta = None;

        match first_err {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

/// ShardGroupWriter is the write handle for one open shard group.
pub struct ShardGroupWriter {
    database: String,
    retention_policy: String,
    group: ShardGroupInfo,
    writer: ShardWriter,
    series: BTreeSet<Vec<u8>>,
}

impl ShardGroupWriter {
    pub fn group(&self) -> &ShardGroupInfo {
        &self.group
    }

    pub fn database(&self) -> &str {
        self.database.as_str()
    }

    pub fn retention_policy(&self) -> &str {
        self.retention_policy.as_str()
    }

    pub fn add_series(&mut self, key: &[u8]) -> anyhow::Result<()> {
        if key.is_empty() {
            return Err(anyhow!("empty series key"));
        }
        if !self.series.contains(key) {
            self.series.insert(key.to_vec());
        }
        Ok(())
    }

    pub fn write(&mut self, key: &[u8], values: &[Value]) -> anyhow::Result<()> {
        self.writer.write(key, values)
    }
}
