use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use common_base::iterator::TryIterator;

use crate::series::series_segment::{SeriesEntry, SeriesEntryFlag, SeriesSegment};

/// SERIES_FILE_DIRECTORY is the name of the directory holding a database's series file.
pub const SERIES_FILE_DIRECTORY: &'static str = "_series";

const SEGMENT_NAME: &'static str = "0000";

/// SeriesFile assigns stable ids to series keys for one database and persists
/// them to an append-only segment.
pub struct SeriesFile {
    dir: PathBuf,
    segment: SeriesSegment,
    ids: HashMap<Vec<u8>, u64>,
    seq: u64,
}

impl SeriesFile {
    pub fn open(dir: impl AsRef<Path>) -> anyhow::Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)
            .map_err(|e| anyhow!("unable to create series dir {}: {}", dir.display(), e))?;

        let path = dir.join(SEGMENT_NAME);
        let mut segment = if path.exists() {
            SeriesSegment::open(0, &path)?
        } else {
            SeriesSegment::create(0, &path)?
        };

        let mut ids = HashMap::new();
        let mut seq = 0;
        let mut itr = segment.series_iterator()?;
        while let Some(entry) = itr.try_next()? {
            seq = seq.max(entry.id);
            match entry.flag {
                SeriesEntryFlag::InsertFlag(key) => {
                    ids.insert(key, entry.id);
                }
                SeriesEntryFlag::TombstoneFlag => {
                    ids.retain(|_, id| *id != entry.id);
                }
            }
        }

        segment.init_for_write()?;
        Ok(Self {
            dir,
            segment,
            ids,
            seq,
        })
    }

    pub fn dir(&self) -> &Path {
        self.dir.as_path()
    }

    pub fn series_id(&self, key: &[u8]) -> Option<u64> {
        self.ids.get(key).copied()
    }

    pub fn series_count(&self) -> usize {
        self.ids.len()
    }

    /// create_series_list_if_not_exists returns the id of every key, appending
    /// entries for keys that are new. Ids are returned in input order.
    pub fn create_series_list_if_not_exists<'a, I>(&mut self, keys: I) -> anyhow::Result<Vec<u64>>
    where
        I: IntoIterator<Item = &'a [u8]>,
    {
        let mut ids = Vec::new();
        let mut created = 0;
        for key in keys {
            if let Some(id) = self.ids.get(key) {
                ids.push(*id);
                continue;
            }

            self.seq += 1;
            let id = self.seq;
            let entry = SeriesEntry::new(SeriesEntryFlag::InsertFlag(key.to_vec()), id);
            self.segment.write_log_entry(&entry)?;
            self.ids.insert(key.to_vec(), id);
            ids.push(id);
            created += 1;
        }

        if created > 0 {
            self.segment.flush()?;
            tracing::debug!(created, dir = %self.dir.display(), "series created");
        }

        Ok(ids)
    }

    pub fn close(&mut self) -> anyhow::Result<()> {
        self.segment.close_for_write()
    }
}
