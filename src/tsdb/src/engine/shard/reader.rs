use std::collections::BTreeMap;
use std::path::Path;

use bytes::Buf;
use common_base::value::{FieldType, Value};

use crate::engine::shard::block::decode_block;
use crate::engine::shard::index::{IndexEntries, IndexEntry};
use crate::engine::shard::{HEADER, INDEX_ENTRY_SIZE};

/// ShardReader loads a shard data file and verifies block checksums on read.
pub struct ShardReader {
    data: Vec<u8>,
    index: BTreeMap<Vec<u8>, IndexEntries>,
}

impl ShardReader {
    pub fn open(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let data = std::fs::read(path.as_ref())?;
        Self::from_bytes(data)
    }

    pub fn from_bytes(data: Vec<u8>) -> anyhow::Result<Self> {
        if data.len() < HEADER.len() + 8 {
            return Err(anyhow!("shard file too small: {} bytes", data.len()));
        }
        if data[..HEADER.len()] != HEADER {
            return Err(anyhow!("invalid shard file header"));
        }

        let footer = data.len() - 8;
        let index_pos = u64::from_be_bytes(data[footer..].try_into()?) as usize;
        if index_pos < HEADER.len() || index_pos > footer {
            return Err(anyhow!("invalid index offset: {}", index_pos));
        }

        let mut index = BTreeMap::new();
        let mut b = &data[index_pos..footer];
        while b.has_remaining() {
            if b.remaining() < 2 {
                return Err(anyhow!("short index: key length"));
            }
            let key_len = b.get_u16() as usize;
            if b.remaining() < key_len + 3 {
                return Err(anyhow!("short index: key"));
            }
            let key = b[..key_len].to_vec();
            b.advance(key_len);

            let typ = FieldType::from_value(b.get_u8())?;
            let count = b.get_u16() as usize;
            if b.remaining() < count * INDEX_ENTRY_SIZE {
                return Err(anyhow!("short index: entries"));
            }

            let mut entries = IndexEntries::new(typ);
            for _ in 0..count {
                entries.entries.push(IndexEntry::unmarshal_binary(&b[..INDEX_ENTRY_SIZE])?);
                b.advance(INDEX_ENTRY_SIZE);
            }
            index.insert(key, entries);
        }

        Ok(Self { data, index })
    }

    pub fn keys(&self) -> Vec<Vec<u8>> {
        self.index.keys().cloned().collect()
    }

    pub fn entries(&self, key: &[u8]) -> Option<&IndexEntries> {
        self.index.get(key)
    }

    /// read returns every value stored for key, in time order. Blocks of one key
    /// may overlap when the key was written out of order across flushes.
    pub fn read(&self, key: &[u8]) -> anyhow::Result<Vec<Value>> {
        let entries = match self.index.get(key) {
            Some(entries) => entries,
            None => return Ok(vec![]),
        };

        let mut values = Vec::new();
        for entry in &entries.entries {
            values.extend(self.read_block_at(entry)?);
        }
        values.sort_by_key(|v| v.unix_nano);
        Ok(values)
    }

    fn read_block_at(&self, entry: &IndexEntry) -> anyhow::Result<Vec<Value>> {
        let start = entry.offset as usize;
        let end = start + entry.size as usize;
        if entry.size < 4 || end > self.data.len() {
            return Err(anyhow!("block out of bounds: {}", entry));
        }

        let checksum = u32::from_be_bytes(self.data[start..start + 4].try_into()?);
        let block = &self.data[start + 4..end];
        if crc32fast::hash(block) != checksum {
            return Err(anyhow!("block checksum mismatch: {}", entry));
        }

        decode_block(block)
    }
}
