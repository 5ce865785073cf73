use std::collections::BTreeMap;
use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use common_base::value::{FieldType, Value};

use crate::engine::shard::block::encode_block;
use crate::engine::shard::index::{DirectIndex, IndexEntry};
use crate::engine::shard::{shard_file_name, FSYNC_EVERY, HEADER, MAX_KEY_LENGTH};
use crate::engine::TMP_FILE_EXTENSION;

/// ShardWriter writes the values of one shard into a single data file.
///
/// Values are buffered per key and flushed as a block once a key holds
/// `max_points_per_block` values. The file is written under a temporary name
/// and only renamed into place by [`ShardWriter::close`], so a shard that is
/// never closed leaves no visible data file.
pub struct ShardWriter {
    id: u64,
    path: PathBuf,
    tmp_path: PathBuf,

    fd: Option<BufWriter<File>>,
    index: DirectIndex,
    n: u64,

    // The bytes written count of when we last fsync'd
    last_sync: u64,

    pending: BTreeMap<Vec<u8>, Vec<Value>>,
    types: BTreeMap<Vec<u8>, FieldType>,
    max_points_per_block: usize,
    values_written: u64,
}

impl ShardWriter {
    pub fn new(id: u64, shard_dir: impl AsRef<Path>, max_points_per_block: usize) -> anyhow::Result<Self> {
        let shard_dir = shard_dir.as_ref();
        fs::create_dir_all(shard_dir)
            .map_err(|e| anyhow!("unable to create shard dir {}: {}", shard_dir.display(), e))?;

        let path = shard_dir.join(shard_file_name(1, 1));
        if path.exists() {
            return Err(anyhow!("shard file already exists: {}", path.display()));
        }
        let tmp_path = path.with_extension(format!(
            "{}.{}",
            crate::engine::TSM_FILE_EXTENSION,
            TMP_FILE_EXTENSION
        ));

        Ok(Self {
            id,
            path,
            tmp_path,
            fd: None,
            index: DirectIndex::new(),
            n: 0,
            last_sync: 0,
            pending: BTreeMap::new(),
            types: BTreeMap::new(),
            max_points_per_block: max_points_per_block.max(1),
            values_written: 0,
        })
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn path(&self) -> &Path {
        self.path.as_path()
    }

    pub fn values_written(&self) -> u64 {
        self.values_written
    }

    /// write appends values for key. All values of a key must share one field type.
    pub fn write(&mut self, key: &[u8], values: &[Value]) -> anyhow::Result<()> {
        if key.len() > MAX_KEY_LENGTH {
            return Err(anyhow!("max key length exceeded: {}", key.len()));
        }

        // Nothing to write
        if values.is_empty() {
            return Ok(());
        }

        let typ = match self.types.get(key) {
            Some(typ) => *typ,
            None => values[0].field_type(),
        };
        if let Some(v) = values.iter().find(|v| v.field_type() != typ) {
            return Err(anyhow!(
                "field type conflict: {} is {}, got {}",
                String::from_utf8_lossy(key),
                typ,
                v.field_type()
            ));
        }
        if !self.types.contains_key(key) {
            self.types.insert(key.to_vec(), typ);
        }

        let buf = self.pending.entry(key.to_vec()).or_default();
        buf.extend_from_slice(values);
        self.values_written += values.len() as u64;

        if buf.len() >= self.max_points_per_block {
            let values = std::mem::take(buf);
            self.flush_key(key, values)?;
        }

        Ok(())
    }

    fn flush_key(&mut self, key: &[u8], mut values: Vec<Value>) -> anyhow::Result<()> {
        values.sort_by_key(|v| v.unix_nano);
        for chunk in values.chunks(self.max_points_per_block) {
            self.write_block(key, chunk)?;
        }
        Ok(())
    }

    fn write_block(&mut self, key: &[u8], values: &[Value]) -> anyhow::Result<()> {
        let min_time = values[0].unix_nano;
        let max_time = values[values.len() - 1].unix_nano;
        let typ = values[0].field_type();
        let block = encode_block(values)?;

        // Write header only after we have some data to write.
        if self.fd.is_none() {
            let f = OpenOptions::new()
                .create_new(true)
                .write(true)
                .open(&self.tmp_path)
                .map_err(|e| anyhow!("unable to create {}: {}", self.tmp_path.display(), e))?;
            let mut fd = BufWriter::with_capacity(1024 * 1024, f);
            fd.write_all(&HEADER)?;
            self.n = HEADER.len() as u64;
            self.fd = Some(fd);
        }
        let fd = self.fd.as_mut().ok_or_else(|| anyhow!("shard file not open"))?;

        let checksum = crc32fast::hash(block.as_slice());
        fd.write_all(&checksum.to_be_bytes())?;
        fd.write_all(block.as_slice())?;
        let n = 4 + block.len();

        // Record this block in index
        self.index
            .add(key, typ, IndexEntry::new(min_time, max_time, self.n, n as u32))?;

        // Increment file position pointer
        self.n += n as u64;

        // fsync the file periodically to avoid long pauses with very big files.
        if self.n - self.last_sync > FSYNC_EVERY {
            fd.flush()?;
            fd.get_ref().sync_all()?;
            self.last_sync = self.n;
        }

        Ok(())
    }

    /// close flushes buffered values, writes the index and footer and moves the
    /// file into place. A shard that received no values produces no file.
    pub fn close(mut self) -> anyhow::Result<Option<PathBuf>> {
        let pending = std::mem::take(&mut self.pending);
        for (key, values) in pending {
            if !values.is_empty() {
                self.flush_key(key.as_slice(), values)?;
            }
        }

        let mut fd = match self.fd.take() {
            Some(fd) => fd,
            None => return Ok(None),
        };

        let index_pos = self.n;
        let index_size = self.index.size() as u64;
        self.index.write_to(&mut fd)?;
        fd.write_all(&index_pos.to_be_bytes())?;
        fd.flush()?;
        fd.get_ref().sync_all()?;
        drop(fd);

        fs::rename(&self.tmp_path, &self.path)?;
        tracing::debug!(
            path = %self.path.display(),
            bytes = index_pos + index_size + 8,
            keys = self.index.key_count(),
            "shard file written"
        );
        Ok(Some(self.path))
    }
}

#[cfg(test)]
mod tests {
    use common_base::value::{FieldValue, Value};

    use crate::engine::shard::reader::ShardReader;
    use crate::engine::shard::writer::ShardWriter;

    #[test]
    fn test_shard_writer_write_empty() {
        let dir = tempfile::tempdir().unwrap();
        let w = ShardWriter::new(1, dir.path(), 1000).unwrap();
        assert!(w.close().unwrap().is_none());
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn test_shard_writer_blocks() {
        let dir = tempfile::tempdir().unwrap();
        let mut w = ShardWriter::new(7, dir.path(), 2).unwrap();

        w.write(b"cpu#!~#value", &[Value::float(3, 3.0)]).unwrap();
        w.write(b"cpu#!~#value", &[Value::float(1, 1.0), Value::float(2, 2.0)])
            .unwrap();
        w.write(b"mem#!~#free", &[Value::integer(1, 10)]).unwrap();
        w.write(b"cpu#!~#value", &[Value::float(4, 4.0)]).unwrap();
        assert_eq!(w.values_written(), 5);

        let path = w.close().unwrap().unwrap();
        assert!(path.ends_with("000000001-000000001.tsm"));

        let r = ShardReader::open(&path).unwrap();
        assert_eq!(r.keys(), vec![b"cpu#!~#value".to_vec(), b"mem#!~#free".to_vec()]);

        let values = r.read(b"cpu#!~#value").unwrap();
        assert_eq!(
            values,
            vec![
                Value::float(1, 1.0),
                Value::float(2, 2.0),
                Value::float(3, 3.0),
                Value::float(4, 4.0)
            ]
        );
        assert_eq!(r.read(b"mem#!~#free").unwrap(), vec![Value::integer(1, 10)]);
    }

    #[test]
    fn test_shard_writer_unordered() {
        use rand::seq::SliceRandom;

        let dir = tempfile::tempdir().unwrap();
        let mut w = ShardWriter::new(1, dir.path(), 1000).unwrap();

        let mut values: Vec<Value> = (0..500).map(|i| Value::integer(i, i * 10)).collect();
        values.shuffle(&mut rand::thread_rng());
        for v in &values {
            w.write(b"disk#!~#used", std::slice::from_ref(v)).unwrap();
        }

        let path = w.close().unwrap().unwrap();
        let r = ShardReader::open(&path).unwrap();
        let read = r.read(b"disk#!~#used").unwrap();
        assert_eq!(read.len(), 500);
        assert!(read.windows(2).all(|w| w[0].unix_nano < w[1].unix_nano));
    }

    #[test]
    fn test_shard_writer_overlapping_flushes() {
        let dir = tempfile::tempdir().unwrap();
        let mut w = ShardWriter::new(1, dir.path(), 2).unwrap();

        w.write(b"cpu#!~#value", &[Value::float(1, 1.0), Value::float(5, 5.0)])
            .unwrap();
        w.write(b"cpu#!~#value", &[Value::float(3, 3.0), Value::float(4, 4.0)])
            .unwrap();

        let path = w.close().unwrap().unwrap();
        let r = ShardReader::open(&path).unwrap();
        assert_eq!(r.entries(b"cpu#!~#value").unwrap().entries.len(), 2);
        assert_eq!(
            r.read(b"cpu#!~#value").unwrap(),
            vec![
                Value::float(1, 1.0),
                Value::float(3, 3.0),
                Value::float(4, 4.0),
                Value::float(5, 5.0)
            ]
        );
    }

    #[test]
    fn test_shard_writer_type_conflict() {
        let dir = tempfile::tempdir().unwrap();
        let mut w = ShardWriter::new(1, dir.path(), 1000).unwrap();

        w.write(b"cpu#!~#value", &[Value::float(1, 1.0)]).unwrap();
        let err = w
            .write(b"cpu#!~#value", &[Value::new(2, FieldValue::Boolean(true))])
            .unwrap_err();
        assert!(err.to_string().contains("field type conflict"));

        // the accepted value is still made durable
        let path = w.close().unwrap().unwrap();
        let r = ShardReader::open(&path).unwrap();
        assert_eq!(r.read(b"cpu#!~#value").unwrap(), vec![Value::float(1, 1.0)]);
    }

    #[test]
    fn test_shard_writer_existing_file() {
        let dir = tempfile::tempdir().unwrap();
        let mut w = ShardWriter::new(1, dir.path(), 1000).unwrap();
        w.write(b"k", &[Value::integer(1, 1)]).unwrap();
        w.close().unwrap();

        assert!(ShardWriter::new(1, dir.path(), 1000).is_err());
    }
}
