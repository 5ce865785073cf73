use std::io::Write;

use common_base::value::{FieldType, Value};
use influxdb_utils::varint::write_uvarint;

use crate::error::{ImportError, Result};
use crate::format::binary::{encode_points, BucketHeader, Header, RecordType, SeriesHeader, MAGIC};

/// Writer produces an export stream. Records must be written in stream order:
/// header, then per bucket a bucket header, its series and a bucket footer.
pub struct Writer<W: Write> {
    w: W,
    header_written: bool,
    in_bucket: bool,
    series_type: Option<FieldType>,
    buf: Vec<u8>,
}

impl<W: Write> Writer<W> {
    pub fn new(w: W) -> Self {
        Self {
            w,
            header_written: false,
            in_bucket: false,
            series_type: None,
            buf: Vec::with_capacity(4096),
        }
    }

    pub fn write_header(&mut self, header: &Header) -> Result<()> {
        if self.header_written {
            return Err(ImportError::format("header already written"));
        }
        self.w.write_all(&MAGIC)?;

        self.buf.clear();
        header.encode(&mut self.buf);
        self.write_frame(RecordType::Header)?;
        self.header_written = true;
        Ok(())
    }

    pub fn write_bucket_header(&mut self, start: i64, end: i64) -> Result<()> {
        if !self.header_written || self.in_bucket {
            return Err(ImportError::format("bucket header out of order"));
        }

        self.buf.clear();
        BucketHeader::new(start, end).encode(&mut self.buf);
        self.write_frame(RecordType::BucketHeader)?;
        self.in_bucket = true;
        Ok(())
    }

    pub fn write_series_header(&mut self, header: &SeriesHeader) -> Result<()> {
        if !self.in_bucket || self.series_type.is_some() {
            return Err(ImportError::format("series header out of order"));
        }

        self.buf.clear();
        header.encode(&mut self.buf);
        self.write_frame(RecordType::SeriesHeader)?;
        self.series_type = Some(header.field_type);
        Ok(())
    }

    pub fn write_points(&mut self, values: &[Value]) -> Result<()> {
        let typ = self
            .series_type
            .ok_or_else(|| ImportError::format("points written outside a series"))?;

        self.buf.clear();
        encode_points(typ, values, &mut self.buf)?;
        self.write_frame(RecordType::points(typ))
    }

    pub fn write_series_footer(&mut self) -> Result<()> {
        if self.series_type.take().is_none() {
            return Err(ImportError::format("series footer out of order"));
        }
        self.buf.clear();
        self.write_frame(RecordType::SeriesFooter)
    }

    pub fn write_bucket_footer(&mut self) -> Result<()> {
        if !self.in_bucket || self.series_type.is_some() {
            return Err(ImportError::format("bucket footer out of order"));
        }
        self.buf.clear();
        self.write_frame(RecordType::BucketFooter)?;
        self.in_bucket = false;
        Ok(())
    }

    fn write_frame(&mut self, typ: RecordType) -> Result<()> {
        self.w.write_all(&[typ as u8])?;
        write_uvarint(&mut self.w, self.buf.len() as u64)?;
        self.w.write_all(self.buf.as_slice())?;
        Ok(())
    }

    pub fn flush(&mut self) -> Result<()> {
        self.w.flush()?;
        Ok(())
    }

    pub fn into_inner(self) -> W {
        self.w
    }
}
