//! Binary export format.
//!
//! A stream holds the shards of one database and retention policy:
//!
//! ```text
//! ┌──────────┬────────┬──────────────────────────────────────────────────────┐
//! │  Magic   │ Header │ Bucket ...                                           │
//! │ IFLXDUMP │ frame  │ BucketHeader (SeriesHeader Points* SeriesFooter)*    │
//! │    8B    │        │ BucketFooter                                         │
//! └──────────┴────────┴──────────────────────────────────────────────────────┘
//! ```
//!
//! Every record is a frame: `type(1B) | length(uvarint) | payload`.
//! Integers are big endian and byte strings are uvarint length prefixed.

use bytes::{Buf, BufMut};
use common_base::value::{FieldType, FieldValue, Value};
use influxdb_utils::varint::VarInt;

use crate::error::{ImportError, Result};

pub mod reader;
pub mod writer;

pub use reader::{PointsReader, Reader, ReaderStats};
pub use writer::Writer;

pub const MAGIC: [u8; 8] = *b"IFLXDUMP";

/// VERSION is the only stream version understood by the reader.
pub const VERSION: u8 = 1;

/// MAX_FRAME_SIZE bounds the payload of a single frame.
pub const MAX_FRAME_SIZE: u64 = 64 * 1024 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordType {
    Header = 1,
    BucketHeader = 2,
    BucketFooter = 3,
    SeriesHeader = 4,
    FloatPoints = 5,
    IntegerPoints = 6,
    UnsignedPoints = 7,
    BooleanPoints = 8,
    StringPoints = 9,
    SeriesFooter = 10,
}

impl RecordType {
    pub fn from_u8(v: u8) -> Option<Self> {
        let typ = match v {
            1 => RecordType::Header,
            2 => RecordType::BucketHeader,
            3 => RecordType::BucketFooter,
            4 => RecordType::SeriesHeader,
            5 => RecordType::FloatPoints,
            6 => RecordType::IntegerPoints,
            7 => RecordType::UnsignedPoints,
            8 => RecordType::BooleanPoints,
            9 => RecordType::StringPoints,
            10 => RecordType::SeriesFooter,
            _ => return None,
        };
        Some(typ)
    }

    /// points returns the frame type carrying values of `typ`.
    pub fn points(typ: FieldType) -> Self {
        match typ {
            FieldType::Float => RecordType::FloatPoints,
            FieldType::Integer => RecordType::IntegerPoints,
            FieldType::Unsigned => RecordType::UnsignedPoints,
            FieldType::Boolean => RecordType::BooleanPoints,
            FieldType::String => RecordType::StringPoints,
        }
    }

    pub fn is_points(&self) -> bool {
        matches!(
            self,
            RecordType::FloatPoints
                | RecordType::IntegerPoints
                | RecordType::UnsignedPoints
                | RecordType::BooleanPoints
                | RecordType::StringPoints
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Header {
    pub version: u8,
    pub database: String,
    pub retention_policy: String,
    /// Shard group duration of the exported policy, in nanoseconds.
    pub shard_duration: i64,
}

impl Header {
    pub fn new(database: impl Into<String>, retention_policy: impl Into<String>, shard_duration: i64) -> Self {
        Self {
            version: VERSION,
            database: database.into(),
            retention_policy: retention_policy.into(),
            shard_duration,
        }
    }

    pub fn encode(&self, buf: &mut Vec<u8>) {
        buf.put_u8(self.version);
        put_bytes(buf, self.database.as_bytes());
        put_bytes(buf, self.retention_policy.as_bytes());
        buf.put_i64(self.shard_duration);
    }

    pub fn decode(mut b: &[u8]) -> Result<Self> {
        let version = get_u8(&mut b)?;
        if version != VERSION {
            return Err(ImportError::Format(format!(
                "unsupported version: {}, expected {}",
                version, VERSION
            )));
        }
        let database = get_string(&mut b)?;
        let retention_policy = get_string(&mut b)?;
        let shard_duration = get_i64(&mut b)?;

        Ok(Self {
            version,
            database,
            retention_policy,
            shard_duration,
        })
    }
}

/// BucketHeader opens the data of one shard covering `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BucketHeader {
    pub start: i64,
    pub end: i64,
}

impl BucketHeader {
    pub fn new(start: i64, end: i64) -> Self {
        Self { start, end }
    }

    pub fn encode(&self, buf: &mut Vec<u8>) {
        buf.put_i64(self.start);
        buf.put_i64(self.end);
    }

    pub fn decode(mut b: &[u8]) -> Result<Self> {
        let start = get_i64(&mut b)?;
        let end = get_i64(&mut b)?;
        Ok(Self { start, end })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SeriesHeader {
    pub field_type: FieldType,
    pub series_key: Vec<u8>,
    pub field: Vec<u8>,
}

impl SeriesHeader {
    pub fn new(field_type: FieldType, series_key: &[u8], field: &[u8]) -> Self {
        Self {
            field_type,
            series_key: series_key.to_vec(),
            field: field.to_vec(),
        }
    }

    pub fn encode(&self, buf: &mut Vec<u8>) {
        buf.put_u8(self.field_type.value());
        put_bytes(buf, self.series_key.as_slice());
        put_bytes(buf, self.field.as_slice());
    }

    pub fn decode(mut b: &[u8]) -> Result<Self> {
        let field_type =
            FieldType::from_value(get_u8(&mut b)?).map_err(|e| ImportError::Format(e.to_string()))?;
        let series_key = get_bytes(&mut b)?.to_vec();
        let field = get_bytes(&mut b)?.to_vec();
        if series_key.is_empty() {
            return Err(ImportError::format("empty series key"));
        }

        Ok(Self {
            field_type,
            series_key,
            field,
        })
    }
}

/// encode_points writes a points payload. Every value must be of type `typ`.
pub fn encode_points(typ: FieldType, values: &[Value], buf: &mut Vec<u8>) -> Result<()> {
    values.len().encode_var_vec(buf);
    for v in values {
        buf.put_i64(v.unix_nano);
        match (&v.value, typ) {
            (FieldValue::Float(f), FieldType::Float) => buf.put_u64(f.to_bits()),
            (FieldValue::Integer(i), FieldType::Integer) => buf.put_i64(*i),
            (FieldValue::Unsigned(u), FieldType::Unsigned) => buf.put_u64(*u),
            (FieldValue::Boolean(b), FieldType::Boolean) => buf.put_u8(*b as u8),
            (FieldValue::String(s), FieldType::String) => put_bytes(buf, s.as_slice()),
            (other, _) => {
                return Err(ImportError::Format(format!(
                    "{} value in {} series",
                    other.field_type(),
                    typ
                )))
            }
        }
    }
    Ok(())
}

pub fn decode_points(typ: FieldType, mut b: &[u8]) -> Result<Vec<Value>> {
    let count = get_uvarint(&mut b)? as usize;
    // each point needs at least a timestamp and one value byte
    if count > b.len() / 9 {
        return Err(ImportError::Format(format!("point count {} exceeds frame", count)));
    }

    let mut values = Vec::with_capacity(count);
    for _ in 0..count {
        let unix_nano = get_i64(&mut b)?;
        let value = match typ {
            FieldType::Float => FieldValue::Float(f64::from_bits(get_u64(&mut b)?)),
            FieldType::Integer => FieldValue::Integer(get_i64(&mut b)?),
            FieldType::Unsigned => FieldValue::Unsigned(get_u64(&mut b)?),
            FieldType::Boolean => match get_u8(&mut b)? {
                0 => FieldValue::Boolean(false),
                1 => FieldValue::Boolean(true),
                v => return Err(ImportError::Format(format!("invalid boolean: {}", v))),
            },
            FieldType::String => FieldValue::String(get_bytes(&mut b)?.to_vec()),
        };
        values.push(Value::new(unix_nano, value));
    }

    if b.has_remaining() {
        return Err(ImportError::Format(format!(
            "{} trailing bytes in points frame",
            b.remaining()
        )));
    }
    Ok(values)
}

fn put_bytes(buf: &mut Vec<u8>, b: &[u8]) {
    b.len().encode_var_vec(buf);
    buf.extend_from_slice(b);
}

fn short(what: &str) -> ImportError {
    ImportError::Format(format!("short buffer reading {}", what))
}

fn get_u8(b: &mut &[u8]) -> Result<u8> {
    if b.remaining() < 1 {
        return Err(short("u8"));
    }
    Ok(b.get_u8())
}

fn get_u64(b: &mut &[u8]) -> Result<u64> {
    if b.remaining() < 8 {
        return Err(short("u64"));
    }
    Ok(b.get_u64())
}

fn get_i64(b: &mut &[u8]) -> Result<i64> {
    if b.remaining() < 8 {
        return Err(short("i64"));
    }
    Ok(b.get_i64())
}

fn get_uvarint(b: &mut &[u8]) -> Result<u64> {
    let (v, n) = u64::decode_var(b).ok_or_else(|| short("uvarint"))?;
    b.advance(n);
    Ok(v)
}

fn get_bytes<'a>(b: &mut &'a [u8]) -> Result<&'a [u8]> {
    let n = get_uvarint(b)? as usize;
    if b.len() < n {
        return Err(short("bytes"));
    }
    let s: &'a [u8] = *b;
    let (v, rest) = s.split_at(n);
    *b = rest;
    Ok(v)
}

fn get_string(b: &mut &[u8]) -> Result<String> {
    let v = get_bytes(b)?;
    String::from_utf8(v.to_vec()).map_err(|e| ImportError::Format(format!("invalid utf-8: {}", e)))
}
