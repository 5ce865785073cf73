use std::fmt::{Debug, Formatter};
use std::fs::{self, File, OpenOptions};
use std::io::{BufReader, BufWriter, ErrorKind, Read, Write};
use std::path::{Path, PathBuf};

use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use common_base::iterator::TryIterator;
use influxdb_utils::varint::{read_uvarint, VarInt};

const TMP_FILE_SUFFIX: &'static str = "initializing";

pub(crate) const SERIES_SEGMENT_VERSION: u8 = 1;
pub(crate) const SERIES_SEGMENT_MAGIC: &'static str = "SSEG";
pub(crate) const SERIES_SEGMENT_HEADER_SIZE: usize = 4 + 1;

const SERIES_ENTRY_INSERT_FLAG: u8 = 0x01;
const SERIES_ENTRY_TOMBSTONE_FLAG: u8 = 0x02;

pub enum SeriesEntryFlag {
    InsertFlag(Vec<u8>),
    TombstoneFlag,
}

impl Debug for SeriesEntryFlag {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InsertFlag(series_key) => {
                write!(f, "Insert({})", String::from_utf8_lossy(series_key))
            }
            Self::TombstoneFlag => write!(f, "Tombstone"),
        }
    }
}

impl SeriesEntryFlag {
    pub fn flag(&self) -> u8 {
        match self {
            Self::InsertFlag(_) => SERIES_ENTRY_INSERT_FLAG,
            Self::TombstoneFlag => SERIES_ENTRY_TOMBSTONE_FLAG,
        }
    }
}

/// SeriesEntry is one record of the series log: `flag(1B) | id(8B) | [len(uvarint) | key]`.
#[derive(Debug)]
pub struct SeriesEntry {
    pub(crate) flag: SeriesEntryFlag,
    pub(crate) id: u64,
}

impl SeriesEntry {
    pub fn new(flag: SeriesEntryFlag, id: u64) -> Self {
        Self { flag, id }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn len(&self) -> usize {
        let key_len = match &self.flag {
            SeriesEntryFlag::InsertFlag(key) => key.len().required_space() + key.len(),
            SeriesEntryFlag::TombstoneFlag => 0,
        };

        1 + 8 + key_len
    }

    pub fn write_to<W: Write>(&self, mut w: W) -> anyhow::Result<()> {
        w.write_u8(self.flag.flag())?;
        w.write_u64::<BigEndian>(self.id)?;

        if let SeriesEntryFlag::InsertFlag(key) = &self.flag {
            let mut buf = Vec::with_capacity(key.len() + 10);
            key.len().encode_var_vec(&mut buf);
            buf.extend_from_slice(key.as_slice());
            w.write_all(buf.as_slice())?;
        }

        Ok(())
    }

    /// read_from returns `None` at a clean end of the log.
    pub fn read_from<R: Read>(mut r: R) -> anyhow::Result<Option<Self>> {
        let flag = match r.read_u8() {
            Ok(flag) => flag,
            Err(e) if e.kind() == ErrorKind::UnexpectedEof => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        let id = r.read_u64::<BigEndian>()?;

        let flag = match flag {
            SERIES_ENTRY_INSERT_FLAG => {
                let (sz, _) = read_uvarint(&mut r)?;
                let mut key = vec![0_u8; sz as usize];
                r.read_exact(key.as_mut_slice())
                    .map_err(|_| anyhow!("not enough data for series key"))?;
                SeriesEntryFlag::InsertFlag(key)
            }
            SERIES_ENTRY_TOMBSTONE_FLAG => SeriesEntryFlag::TombstoneFlag,
            _ => return Err(anyhow!("unknown series entry flag: {}", flag)),
        };

        Ok(Some(Self::new(flag, id)))
    }
}

/// SeriesSegmentHeader represents the header of a series segment.
pub struct SeriesSegmentHeader {
    version: u8,
}

impl SeriesSegmentHeader {
    pub fn new() -> Self {
        Self {
            version: SERIES_SEGMENT_VERSION,
        }
    }

    pub fn write_to<W: Write>(&self, mut w: W) -> anyhow::Result<()> {
        w.write_all(SERIES_SEGMENT_MAGIC.as_bytes())?;
        w.write_u8(self.version)?;
        Ok(())
    }

    pub fn read_from<R: Read>(mut r: R) -> anyhow::Result<Self> {
        let mut value = [0_u8; SERIES_SEGMENT_HEADER_SIZE];
        r.read_exact(value.as_mut())
            .map_err(|_| anyhow!("not enough data for SeriesSegmentHeader"))?;

        if &value[..SERIES_SEGMENT_MAGIC.len()] != SERIES_SEGMENT_MAGIC.as_bytes() {
            return Err(anyhow!("invalid series segment"));
        }

        let version = value[SERIES_SEGMENT_MAGIC.len()];
        if version != SERIES_SEGMENT_VERSION {
            return Err(anyhow!("unsupported series segment version: {}", version));
        }

        Ok(Self { version })
    }
}

/// SeriesSegment is an append-only log of series entries.
pub struct SeriesSegment {
    id: u16,
    path: PathBuf,
    writer: Option<BufWriter<File>>,
}

impl SeriesSegment {
    pub fn open(id: u16, path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref().to_path_buf();
        let f = File::open(&path)
            .map_err(|e| anyhow!("unable to open series segment {}: {}", path.display(), e))?;
        SeriesSegmentHeader::read_from(BufReader::new(f))?;

        Ok(Self {
            id,
            path,
            writer: None,
        })
    }

    pub fn create(id: u16, path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();

        // Generate segment in temp location.
        let tmp_path = path.with_extension(TMP_FILE_SUFFIX);
        {
            let mut f = File::create(&tmp_path)?;
            SeriesSegmentHeader::new().write_to(&mut f)?;
            f.sync_all()?;
        }
        fs::rename(&tmp_path, path)?;

        Self::open(id, path)
    }

    /// init_for_write opens the append handle for the segment.
    pub fn init_for_write(&mut self) -> anyhow::Result<()> {
        if self.writer.is_none() {
            let f = OpenOptions::new().append(true).open(&self.path)?;
            self.writer = Some(BufWriter::new(f));
        }
        Ok(())
    }

    pub fn write_log_entry(&mut self, entry: &SeriesEntry) -> anyhow::Result<()> {
        let writer = self
            .writer
            .as_mut()
            .ok_or_else(|| anyhow!("series segment not writable"))?;
        entry.write_to(writer)
    }

    /// flush flushes buffered entries and syncs the file.
    pub fn flush(&mut self) -> anyhow::Result<()> {
        if let Some(writer) = self.writer.as_mut() {
            writer.flush()?;
            writer.get_ref().sync_all()?;
        }
        Ok(())
    }

    pub fn close_for_write(&mut self) -> anyhow::Result<()> {
        self.flush()?;
        self.writer = None;
        Ok(())
    }

    pub fn series_iterator(&self) -> anyhow::Result<SeriesEntryIterator> {
        let f = File::open(&self.path)?;
        let mut reader = BufReader::new(f);
        SeriesSegmentHeader::read_from(&mut reader)?;
        Ok(SeriesEntryIterator { reader })
    }

    pub fn id(&self) -> u16 {
        self.id
    }

    pub fn path(&self) -> &Path {
        self.path.as_path()
    }
}

pub struct SeriesEntryIterator {
    reader: BufReader<File>,
}

impl TryIterator for SeriesEntryIterator {
    type Item = SeriesEntry;

    fn try_next(&mut self) -> anyhow::Result<Option<Self::Item>> {
        SeriesEntry::read_from(&mut self.reader)
    }
}
