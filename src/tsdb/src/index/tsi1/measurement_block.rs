use std::collections::{BTreeMap, BTreeSet};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use bytes::{Buf, BufMut};
use influxdb_utils::varint::VarInt;

use crate::common::Section;

/// MEASUREMENT_BLOCK_VERSION is the version of the measurement block.
pub const MEASUREMENT_BLOCK_VERSION: u16 = 1;

/// 1 byte offset for the block to ensure non-zero offsets.
pub const MEASUREMENT_FILL_SIZE: usize = 1;

/// Measurement trailer fields
pub const MEASUREMENT_TRAILER_SIZE: usize = 0 +
    2 + // version
    8 + 8; // data offset/size

pub const SERIES_ID_SIZE: usize = 8;

/// MeasurementBlockTrailer represents meta data at the end of a MeasurementBlock.
#[derive(Debug, PartialEq, Eq)]
pub struct MeasurementBlockTrailer {
    /// Encoding version
    version: u16,

    /// Offset & size of data section.
    data: Section,
}

impl MeasurementBlockTrailer {
    pub fn read_from(b: &[u8]) -> anyhow::Result<Self> {
        if b.len() != MEASUREMENT_TRAILER_SIZE {
            return Err(anyhow!("invalid index file"));
        }

        let mut b = b;
        let version = b.get_u16();
        if version != MEASUREMENT_BLOCK_VERSION {
            return Err(anyhow!("unsupported measurement block version: {}", version));
        }
        let data = Section::read_from(b)?;

        Ok(Self { version, data })
    }

    pub fn write_to<W: Write>(&self, mut w: W) -> anyhow::Result<()> {
        w.write_all(&self.version.to_be_bytes())?;
        self.data.write_to(w)
    }
}

/// MeasurementBlockWriter groups series ids by measurement and writes them
/// as a sorted block:
///
/// ┌──────┬──────────────────────────────────────────────┬─────────┐
/// │ Fill │ Flag │ Name Len │ Name │ N │ Series IDs ...   │ Trailer │
/// │  1B  │  1B  │ uvarint  │  NB  │uv │ N × 8 bytes      │   18B   │
/// └──────┴──────────────────────────────────────────────┴─────────┘
#[derive(Default)]
pub struct MeasurementBlockWriter {
    measurements: BTreeMap<Vec<u8>, BTreeSet<u64>>,
}

impl MeasurementBlockWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, name: &[u8], series_id: u64) {
        self.measurements
            .entry(name.to_vec())
            .or_default()
            .insert(series_id);
    }

    pub fn is_empty(&self) -> bool {
        self.measurements.is_empty()
    }

    pub fn write_to<W: Write>(&self, mut w: W) -> anyhow::Result<u64> {
        let mut buf = Vec::with_capacity(4096);
        buf.put_u8(0);

        let offset = buf.len() as u64;
        for (name, ids) in &self.measurements {
            buf.put_u8(0);
            name.len().encode_var_vec(&mut buf);
            buf.extend_from_slice(name.as_slice());
            ids.len().encode_var_vec(&mut buf);
            for id in ids {
                buf.put_u64(*id);
            }
        }
        let size = buf.len() as u64 - offset;

        let trailer = MeasurementBlockTrailer {
            version: MEASUREMENT_BLOCK_VERSION,
            data: Section::new(offset, size),
        };
        trailer.write_to(&mut buf)?;

        w.write_all(buf.as_slice())?;
        Ok(buf.len() as u64)
    }

    pub fn write_file(&self, path: impl AsRef<Path>) -> anyhow::Result<u64> {
        let f = File::create(path.as_ref())?;
        let mut w = BufWriter::new(f);
        let n = self.write_to(&mut w)?;
        w.flush()?;
        w.get_ref().sync_all()?;
        Ok(n)
    }
}

/// MeasurementBlock is a decoded, read-only measurement block.
pub struct MeasurementBlock {
    measurements: BTreeMap<Vec<u8>, Vec<u64>>,
}

impl MeasurementBlock {
    pub fn from_bytes(data: &[u8]) -> anyhow::Result<Self> {
        if data.len() < MEASUREMENT_FILL_SIZE + MEASUREMENT_TRAILER_SIZE {
            return Err(anyhow!("measurement block too small"));
        }
        let trailer = MeasurementBlockTrailer::read_from(&data[data.len() - MEASUREMENT_TRAILER_SIZE..])?;
        if trailer.data.max_offset() as usize > data.len() - MEASUREMENT_TRAILER_SIZE {
            return Err(anyhow!("measurement data section out of bounds"));
        }

        let mut b = &data[trailer.data.offset as usize..trailer.data.max_offset() as usize];
        let mut measurements = BTreeMap::new();
        while b.has_remaining() {
            let _flag = b.get_u8();
            let (name_len, n) = usize::decode_var(b).ok_or(anyhow!("bad measurement name length"))?;
            b.advance(n);
            if b.remaining() < name_len {
                return Err(anyhow!("short measurement name"));
            }
            let name = b[..name_len].to_vec();
            b.advance(name_len);

            let (count, n) = usize::decode_var(b).ok_or(anyhow!("bad series count"))?;
            b.advance(n);
            if b.remaining() < count * SERIES_ID_SIZE {
                return Err(anyhow!("short series id list"));
            }
            let ids = (0..count).map(|_| b.get_u64()).collect();
            measurements.insert(name, ids);
        }

        Ok(Self { measurements })
    }

    pub fn open(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let data = std::fs::read(path.as_ref())?;
        Self::from_bytes(data.as_slice())
    }

    pub fn measurement_names(&self) -> Vec<&[u8]> {
        self.measurements.keys().map(|k| k.as_slice()).collect()
    }

    pub fn series_ids(&self, name: &[u8]) -> Option<&[u64]> {
        self.measurements.get(name).map(|ids| ids.as_slice())
    }
}

#[cfg(test)]
mod tests {
    use crate::index::tsi1::measurement_block::{MeasurementBlock, MeasurementBlockWriter};

    #[test]
    fn test_measurement_block() {
        let mut w = MeasurementBlockWriter::new();
        w.add(b"mem", 3);
        w.add(b"cpu", 2);
        w.add(b"cpu", 1);
        w.add(b"cpu", 2);

        let mut buf = vec![];
        let n = w.write_to(&mut buf).unwrap();
        assert_eq!(n as usize, buf.len());

        let block = MeasurementBlock::from_bytes(&buf).unwrap();
        assert_eq!(block.measurement_names(), vec![&b"cpu"[..], &b"mem"[..]]);
        assert_eq!(block.series_ids(b"cpu"), Some(&[1_u64, 2][..]));
        assert_eq!(block.series_ids(b"mem"), Some(&[3_u64][..]));
        assert!(block.series_ids(b"disk").is_none());
    }

    #[test]
    fn test_measurement_block_corrupt() {
        let w = MeasurementBlockWriter::new();
        let mut buf = vec![];
        w.write_to(&mut buf).unwrap();
        assert!(MeasurementBlock::from_bytes(&buf).unwrap().measurement_names().is_empty());

        let len = buf.len();
        buf[len - 17] = 9; // version
        assert!(MeasurementBlock::from_bytes(&buf).is_err());
        assert!(MeasurementBlock::from_bytes(&[0; 4]).is_err());
    }
}
