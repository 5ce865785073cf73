use std::collections::BTreeMap;
use std::fmt::{Display, Formatter};
use std::io::Write;

use bytes::BufMut;
use common_base::value::FieldType;
use influxdb_utils::time::format_unix_nano;

use crate::engine::shard::{INDEX_ENTRY_SIZE, MAX_INDEX_ENTRIES, MAX_KEY_LENGTH};

/// IndexEntry is the index information for a given block in a shard file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexEntry {
    /// The min and max time of all points stored in the block.
    pub min_time: i64,
    pub max_time: i64,

    /// The absolute position in the file where this block is located.
    pub offset: u64,

    /// The size in bytes of the block in the file.
    pub size: u32,
}

impl IndexEntry {
    pub fn new(min_time: i64, max_time: i64, offset: u64, size: u32) -> Self {
        Self {
            min_time,
            max_time,
            offset,
            size,
        }
    }

    /// unmarshal_binary decodes an IndexEntry from a byte slice.
    pub fn unmarshal_binary(b: &[u8]) -> anyhow::Result<Self> {
        if b.len() < INDEX_ENTRY_SIZE {
            return Err(anyhow!(
                "unmarshal_binary: short buf: {} < {}",
                b.len(),
                INDEX_ENTRY_SIZE
            ));
        }

        let min_time = i64::from_be_bytes(b[..8].try_into()?);
        let max_time = i64::from_be_bytes(b[8..16].try_into()?);
        let offset = u64::from_be_bytes(b[16..24].try_into()?);
        let size = u32::from_be_bytes(b[24..28].try_into()?);

        Ok(Self {
            min_time,
            max_time,
            offset,
            size,
        })
    }

    /// append_to writes a binary-encoded version of IndexEntry to b.
    pub fn append_to(&self, b: &mut Vec<u8>) {
        b.put_i64(self.min_time);
        b.put_i64(self.max_time);
        b.put_u64(self.offset);
        b.put_u32(self.size);
    }
}

impl Display for IndexEntry {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "min={} max={} ofs={} siz={}",
            format_unix_nano(self.min_time),
            format_unix_nano(self.max_time),
            self.offset,
            self.size,
        )
    }
}

#[derive(Debug, Clone)]
pub struct IndexEntries {
    pub typ: FieldType,
    pub entries: Vec<IndexEntry>,
}

impl IndexEntries {
    pub fn new(typ: FieldType) -> Self {
        Self {
            typ,
            entries: vec![],
        }
    }

    pub fn min_time(&self) -> Option<i64> {
        self.entries.iter().map(|e| e.min_time).min()
    }

    pub fn max_time(&self) -> Option<i64> {
        self.entries.iter().map(|e| e.max_time).max()
    }
}

/// DirectIndex accumulates index entries in memory, keyed and ordered by
/// series field key, until the file is finished.
#[derive(Default)]
pub struct DirectIndex {
    blocks: BTreeMap<Vec<u8>, IndexEntries>,
    size: u32,
}

impl DirectIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, key: &[u8], typ: FieldType, entry: IndexEntry) -> anyhow::Result<()> {
        if key.len() > MAX_KEY_LENGTH {
            return Err(anyhow!("max key length exceeded: {}", key.len()));
        }

        match self.blocks.get_mut(key) {
            Some(entries) => {
                if entries.typ != typ {
                    return Err(anyhow!(
                        "field type conflict: {} has type {}, got {}",
                        String::from_utf8_lossy(key),
                        entries.typ,
                        typ
                    ));
                }
                if entries.entries.len() >= MAX_INDEX_ENTRIES {
                    return Err(anyhow!(
                        "max blocks exceeded for key {}",
                        String::from_utf8_lossy(key)
                    ));
                }
                entries.entries.push(entry);
            }
            None => {
                // size of the key stored in the index
                self.size += (2 + key.len()) as u32;
                // size of the count of entries stored in the index
                self.size += 3;

                let mut entries = IndexEntries::new(typ);
                entries.entries.push(entry);
                self.blocks.insert(key.to_vec(), entries);
            }
        }
        self.size += INDEX_ENTRY_SIZE as u32;

        Ok(())
    }

    pub fn entries(&self, key: &[u8]) -> Option<&IndexEntries> {
        self.blocks.get(key)
    }

    pub fn key_count(&self) -> usize {
        self.blocks.len()
    }

    /// size returns the encoded size of the index in bytes.
    pub fn size(&self) -> u32 {
        self.size
    }

    /// write_to writes the index sorted by key, with each key's entries sorted by min time.
    pub fn write_to<W: Write>(&mut self, mut w: W) -> anyhow::Result<u64> {
        let mut buf = Vec::with_capacity(1024);
        let mut total = 0_u64;

        for (key, entries) in self.blocks.iter_mut() {
            entries.entries.sort_by_key(|x| x.min_time);

            buf.clear();
            buf.put_u16(key.len() as u16);
            buf.extend_from_slice(key.as_slice());
            buf.put_u8(entries.typ.value());
            buf.put_u16(entries.entries.len() as u16);
            for entry in &entries.entries {
                entry.append_to(&mut buf);
            }

            w.write_all(buf.as_slice())?;
            total += buf.len() as u64;
        }

        Ok(total)
    }
}
