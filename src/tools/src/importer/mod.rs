use std::collections::HashSet;

use common_base::value::Value;
use influxdb_tsdb::meta::RetentionPolicySpec;

use crate::errlist::ErrorList;
use crate::error::{ImportError, Result};

pub mod store;

pub use store::{ShardGroup, Store};

struct OpenGroup<G> {
    group: G,
    start: i64,
    end: i64,
    series: HashSet<Vec<u8>>,
}

/// Importer replays shards into a [`Store`] one shard group at a time.
///
/// At most one shard group is open. Every `start_shard_group` must be paired
/// with a `close_shard_group`, also when writes in between failed.
pub struct Importer<S: Store> {
    store: S,
    database: String,
    retention_policy: String,
    replace: bool,
    group: Option<OpenGroup<S::Group>>,
    closed: bool,
}

impl<S: Store> Importer<S> {
    pub fn new(
        store: S,
        database: impl Into<String>,
        retention_policy: impl Into<String>,
        replace: bool,
    ) -> Self {
        Self {
            store,
            database: database.into(),
            retention_policy: retention_policy.into(),
            replace,
            group: None,
            closed: false,
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn into_store(self) -> S {
        self.store
    }

    pub fn database(&self) -> &str {
        self.database.as_str()
    }

    pub fn retention_policy(&self) -> &str {
        self.retention_policy.as_str()
    }

    pub fn open(&mut self) -> Result<()> {
        self.store.open().map_err(ImportError::Store)
    }

    /// create_database creates the database and retention policy. An existing
    /// policy is a conflict unless the importer replaces it, in which case it is
    /// dropped with all of its shard groups first.
    pub fn create_database(&mut self, spec: RetentionPolicySpec) -> Result<()> {
        if spec.name != self.retention_policy {
            return Err(ImportError::Store(anyhow!(
                "retention policy {} does not match importer policy {}",
                spec.name,
                self.retention_policy
            )));
        }

        let existing = self
            .store
            .retention_policy(self.database.as_str(), spec.name.as_str())
            .map_err(ImportError::Store)?;
        if let Some(rpi) = existing {
            if !self.replace {
                return Err(ImportError::Conflict {
                    database: self.database.clone(),
                    retention_policy: spec.name.clone(),
                });
            }

            tracing::info!(
                database = self.database.as_str(),
                rp = rpi.name.as_str(),
                shard_groups = rpi.shard_groups.len(),
                "replacing retention policy"
            );
            self.store
                .drop_retention_policy(self.database.as_str(), spec.name.as_str())
                .map_err(ImportError::Store)?;
        }

        self.store
            .create_database(self.database.as_str(), &spec)
            .map_err(ImportError::Store)
    }

    /// start_shard_group opens the shard group covering `[start, end)`.
    pub fn start_shard_group(&mut self, start: i64, end: i64) -> Result<()> {
        if let Some(og) = &self.group {
            return Err(ImportError::Store(anyhow!(
                "shard group [{}, {}) still open",
                og.start,
                og.end
            )));
        }

        let group = self
            .store
            .start_shard_group(
                self.database.as_str(),
                self.retention_policy.as_str(),
                start,
                end,
            )
            .map_err(ImportError::Store)?;

        tracing::debug!(start, end, "shard group open");
        self.group = Some(OpenGroup {
            group,
            start,
            end,
            series: HashSet::new(),
        });
        Ok(())
    }

    fn open_group(&mut self) -> Result<&mut OpenGroup<S::Group>> {
        self.group
            .as_mut()
            .ok_or_else(|| ImportError::Write(anyhow!("importer not currently writing a shard")))
    }

    /// add_series registers the series with the open group. Repeated keys are
    /// only forwarded to the store once per group.
    pub fn add_series(&mut self, key: &[u8]) -> Result<()> {
        let og = self.open_group()?;
        if og.series.contains(key) {
            return Ok(());
        }

        og.group.add_series(key).map_err(ImportError::Write)?;
        og.series.insert(key.to_vec());
        Ok(())
    }

    pub fn write(&mut self, key: &[u8], values: &[Value]) -> Result<()> {
        let og = self.open_group()?;
        if values.is_empty() {
            return Ok(());
        }

        og.group.write(key, values).map_err(ImportError::Write)
    }

    /// close_shard_group finalizes the open shard group.
    pub fn close_shard_group(&mut self) -> Result<()> {
        let og = self
            .group
            .take()
            .ok_or_else(|| ImportError::Store(anyhow!("no shard group open")))?;

        tracing::debug!(
            start = og.start,
            end = og.end,
            series = og.series.len(),
            "shard group close"
        );
        self.store
            .close_shard_group(og.group)
            .map_err(ImportError::Store)
    }

    /// close closes a shard group left open and then the store. Closing twice is a no-op.
    pub fn close(&mut self) -> Result<()> {
        let mut errs = ErrorList::new();
        if self.group.is_some() {
            errs.add_result(self.close_shard_group());
        }

        if !self.closed {
            self.closed = true;
            errs.add_result(self.store.close().map_err(ImportError::Store));
        }

        errs.err()
    }
}
