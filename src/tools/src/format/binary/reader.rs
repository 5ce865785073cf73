use std::io::{ErrorKind, Read};

use common_base::value::{FieldType, Value};
use influxdb_utils::varint::read_uvarint;

use crate::error::{ImportError, Result};
use crate::format::binary::{
    decode_points, BucketHeader, Header, RecordType, SeriesHeader, MAGIC, MAX_FRAME_SIZE,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Header,
    Bucket,
    Series,
    Points(FieldType),
    Done,
}

/// ReaderStats counts the records decoded so far.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ReaderStats {
    pub buckets: u64,
    pub series: u64,
    pub points: u64,
}

/// Reader decodes an export stream record by record.
///
/// Records are consumed strictly forward. Moving to the next bucket or series
/// discards whatever is left unread of the current one.
pub struct Reader<R: Read> {
    r: R,
    state: State,
    stats: ReaderStats,
    payload: Vec<u8>,
}

impl<R: Read> Reader<R> {
    pub fn new(r: R) -> Self {
        Self {
            r,
            state: State::Header,
            stats: ReaderStats::default(),
            payload: Vec::new(),
        }
    }

    pub fn stats(&self) -> ReaderStats {
        self.stats
    }

    /// read_header validates the magic and reads the stream header. It must be
    /// the first call on a reader.
    pub fn read_header(&mut self) -> Result<Header> {
        if self.state != State::Header {
            return Err(ImportError::format("header already read"));
        }

        let mut magic = [0_u8; MAGIC.len()];
        self.r.read_exact(&mut magic).map_err(|e| match e.kind() {
            ErrorKind::UnexpectedEof => ImportError::format("missing magic"),
            _ => ImportError::Io(e),
        })?;
        if magic != MAGIC {
            return Err(ImportError::format("invalid magic"));
        }

        match self.read_frame()? {
            Some(RecordType::Header) => {}
            Some(typ) => {
                return Err(ImportError::Format(format!(
                    "expected header, got {:?}",
                    typ
                )))
            }
            None => return Err(ImportError::format("missing header")),
        }
        let header = Header::decode(self.payload.as_slice())?;

        self.state = State::Bucket;
        Ok(header)
    }

    /// next_bucket returns the next bucket header, or `None` at the end of the stream.
    pub fn next_bucket(&mut self) -> Result<Option<BucketHeader>> {
        match self.state {
            State::Header => return Err(ImportError::format("header not read")),
            State::Done => return Ok(None),
            State::Series | State::Points(_) => self.drain_bucket()?,
            State::Bucket => {}
        }

        match self.read_frame()? {
            Some(RecordType::BucketHeader) => {
                let bh = BucketHeader::decode(self.payload.as_slice())?;
                self.state = State::Series;
                self.stats.buckets += 1;
                Ok(Some(bh))
            }
            Some(typ) => Err(ImportError::Format(format!(
                "expected bucket header, got {:?}",
                typ
            ))),
            None => {
                self.state = State::Done;
                Ok(None)
            }
        }
    }

    /// next_series returns the next series header of the current bucket, or
    /// `None` once the bucket footer has been read.
    pub fn next_series(&mut self) -> Result<Option<SeriesHeader>> {
        match self.state {
            State::Header => return Err(ImportError::format("header not read")),
            State::Bucket | State::Done => return Ok(None),
            State::Points(_) => self.drain_series()?,
            State::Series => {}
        }

        match self.read_frame()? {
            Some(RecordType::SeriesHeader) => {
                let sh = SeriesHeader::decode(self.payload.as_slice())?;
                self.state = State::Points(sh.field_type);
                self.stats.series += 1;
                Ok(Some(sh))
            }
            Some(RecordType::BucketFooter) => {
                self.state = State::Bucket;
                Ok(None)
            }
            Some(typ) => Err(ImportError::Format(format!(
                "expected series header, got {:?}",
                typ
            ))),
            None => Err(ImportError::format("unexpected end of stream in bucket")),
        }
    }

    /// points returns a cursor over the values of the current series. The
    /// cursor borrows the reader, so no other record can be read while it is alive.
    pub fn points(&mut self) -> PointsReader<'_, R> {
        PointsReader {
            reader: self,
            values: Vec::new().into_iter(),
            current: None,
        }
    }

    fn drain_series(&mut self) -> Result<()> {
        let mut frames = 0;
        loop {
            match self.read_frame()? {
                Some(RecordType::SeriesFooter) => break,
                Some(typ) if typ.is_points() => frames += 1,
                Some(typ) => {
                    return Err(ImportError::Format(format!(
                        "unexpected {:?} in series",
                        typ
                    )))
                }
                None => return Err(ImportError::format("unexpected end of stream in series")),
            }
        }
        if frames > 0 {
            tracing::debug!(frames, "drained unread points");
        }

        self.state = State::Series;
        Ok(())
    }

    fn drain_bucket(&mut self) -> Result<()> {
        if let State::Points(_) = self.state {
            self.drain_series()?;
        }
        while self.next_series()?.is_some() {
            tracing::debug!("drained unread series");
        }
        Ok(())
    }

    /// read_frame reads the next frame into `self.payload`. `None` is a clean
    /// end of stream at a frame boundary.
    fn read_frame(&mut self) -> Result<Option<RecordType>> {
        let mut typ = [0_u8; 1];
        loop {
            match self.r.read(&mut typ) {
                Ok(0) => return Ok(None),
                Ok(_) => break,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            }
        }
        let typ = RecordType::from_u8(typ[0])
            .ok_or_else(|| ImportError::Format(format!("unknown record type: {}", typ[0])))?;

        let (len, _) = read_uvarint(&mut self.r).map_err(truncated)?;
        if len > MAX_FRAME_SIZE {
            return Err(ImportError::Format(format!("frame too large: {} bytes", len)));
        }

        self.payload.resize(len as usize, 0);
        self.r.read_exact(self.payload.as_mut_slice()).map_err(truncated)?;

        Ok(Some(typ))
    }
}

fn truncated(e: std::io::Error) -> ImportError {
    match e.kind() {
        ErrorKind::UnexpectedEof | ErrorKind::InvalidData => {
            ImportError::Format(format!("truncated frame: {}", e))
        }
        _ => ImportError::Io(e),
    }
}

/// PointsReader walks the values of one series.
pub struct PointsReader<'a, R: Read> {
    reader: &'a mut Reader<R>,
    values: std::vec::IntoIter<Value>,
    current: Option<Value>,
}

impl<'a, R: Read> PointsReader<'a, R> {
    /// next advances to the next value. It returns `false` once the series
    /// footer is reached.
    pub fn next(&mut self) -> Result<bool> {
        self.current = None;
        loop {
            if let Some(v) = self.values.next() {
                self.current = Some(v);
                self.reader.stats.points += 1;
                return Ok(true);
            }

            let field_type = match self.reader.state {
                State::Points(field_type) => field_type,
                _ => return Ok(false),
            };

            match self.reader.read_frame()? {
                Some(RecordType::SeriesFooter) => {
                    self.reader.state = State::Series;
                    return Ok(false);
                }
                Some(typ) if typ == RecordType::points(field_type) => {
                    let values = decode_points(field_type, self.reader.payload.as_slice())?;
                    self.values = values.into_iter();
                }
                Some(typ) if typ.is_points() => {
                    return Err(ImportError::Format(format!(
                        "{:?} in {} series",
                        typ, field_type
                    )))
                }
                Some(typ) => {
                    return Err(ImportError::Format(format!(
                        "unexpected {:?} in series",
                        typ
                    )))
                }
                None => return Err(ImportError::format("unexpected end of stream in series")),
            }
        }
    }

    /// value is the value the last successful `next` moved to.
    pub fn value(&self) -> Option<&Value> {
        self.current.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use common_base::value::{FieldType, FieldValue, Value};

    use crate::error::ImportError;
    use crate::format::binary::{Header, Reader, SeriesHeader, Writer, MAGIC};

    fn write_stream() -> Vec<u8> {
        let mut w = Writer::new(vec![]);
        w.write_header(&Header::new("db0", "autogen", 1000)).unwrap();

        w.write_bucket_header(1000, 2000).unwrap();
        w.write_series_header(&SeriesHeader::new(FieldType::Float, b"cpu,host=a", b"usage"))
            .unwrap();
        w.write_points(&[Value::float(1000, 1.0), Value::float(1100, 2.0)])
            .unwrap();
        w.write_points(&[Value::float(1200, 3.0)]).unwrap();
        w.write_series_footer().unwrap();
        w.write_series_header(&SeriesHeader::new(FieldType::Boolean, b"cpu,host=a", b"up"))
            .unwrap();
        w.write_points(&[Value::new(1000, FieldValue::Boolean(true))])
            .unwrap();
        w.write_series_footer().unwrap();
        w.write_bucket_footer().unwrap();

        w.write_bucket_header(2000, 3000).unwrap();
        w.write_series_header(&SeriesHeader::new(FieldType::Integer, b"mem", b"free"))
            .unwrap();
        w.write_points(&[Value::integer(2500, 7)]).unwrap();
        w.write_series_footer().unwrap();
        w.write_bucket_footer().unwrap();

        w.into_inner()
    }

    fn read_values<R: std::io::Read>(r: &mut Reader<R>) -> Vec<Value> {
        let mut values = vec![];
        let mut points = r.points();
        while points.next().unwrap() {
            values.push(points.value().unwrap().clone());
        }
        values
    }

    #[test]
    fn test_reader_read_all() {
        let data = write_stream();
        let mut r = Reader::new(data.as_slice());

        let header = r.read_header().unwrap();
        assert_eq!(header, Header::new("db0", "autogen", 1000));

        let bucket = r.next_bucket().unwrap().unwrap();
        assert_eq!((bucket.start, bucket.end), (1000, 2000));

        let series = r.next_series().unwrap().unwrap();
        assert_eq!(series.series_key, b"cpu,host=a".to_vec());
        assert_eq!(series.field, b"usage".to_vec());
        assert_eq!(
            read_values(&mut r),
            vec![Value::float(1000, 1.0), Value::float(1100, 2.0), Value::float(1200, 3.0)]
        );

        let series = r.next_series().unwrap().unwrap();
        assert_eq!(series.field_type, FieldType::Boolean);
        assert_eq!(read_values(&mut r), vec![Value::new(1000, FieldValue::Boolean(true))]);
        assert!(r.next_series().unwrap().is_none());
        assert!(r.next_series().unwrap().is_none());

        let bucket = r.next_bucket().unwrap().unwrap();
        assert_eq!((bucket.start, bucket.end), (2000, 3000));
        r.next_series().unwrap().unwrap();
        assert_eq!(read_values(&mut r), vec![Value::integer(2500, 7)]);
        assert!(r.next_series().unwrap().is_none());

        assert!(r.next_bucket().unwrap().is_none());
        assert!(r.next_bucket().unwrap().is_none());

        let stats = r.stats();
        assert_eq!((stats.buckets, stats.series, stats.points), (2, 3, 5));
    }

    #[test]
    fn test_reader_skips_unread_records() {
        let data = write_stream();
        let mut r = Reader::new(data.as_slice());
        r.read_header().unwrap();

        // leave the first series half read
        r.next_bucket().unwrap().unwrap();
        r.next_series().unwrap().unwrap();
        {
            let mut points = r.points();
            assert!(points.next().unwrap());
            assert_eq!(points.value(), Some(&Value::float(1000, 1.0)));
        }
        let series = r.next_series().unwrap().unwrap();
        assert_eq!(series.field, b"up".to_vec());

        // skip the rest of the bucket
        let bucket = r.next_bucket().unwrap().unwrap();
        assert_eq!(bucket.start, 2000);

        // skip a whole bucket without reading its series
        assert!(r.next_bucket().unwrap().is_none());
    }

    #[test]
    fn test_reader_header_only() {
        let mut w = Writer::new(vec![]);
        w.write_header(&Header::new("db0", "autogen", 1000)).unwrap();
        let data = w.into_inner();

        let mut r = Reader::new(data.as_slice());
        r.read_header().unwrap();
        assert!(r.next_bucket().unwrap().is_none());
        assert!(matches!(r.read_header(), Err(ImportError::Format(_))));
    }

    #[test]
    fn test_reader_header_required() {
        let data = write_stream();
        let mut r = Reader::new(data.as_slice());
        assert!(matches!(r.next_bucket(), Err(ImportError::Format(_))));
        assert!(matches!(r.next_series(), Err(ImportError::Format(_))));
    }

    #[test]
    fn test_reader_bad_magic() {
        let mut data = write_stream();
        data[0] = b'X';
        let mut r = Reader::new(data.as_slice());
        assert!(matches!(r.read_header(), Err(ImportError::Format(_))));

        let mut r = Reader::new(&MAGIC[..4]);
        assert!(matches!(r.read_header(), Err(ImportError::Format(_))));

        let mut r = Reader::new(&MAGIC[..]);
        assert!(matches!(r.read_header(), Err(ImportError::Format(_))));
    }

    #[test]
    fn test_reader_truncated() {
        let data = write_stream();
        // cut inside the last points frame of the second bucket
        let data = &data[..data.len() - 8];

        let mut r = Reader::new(data);
        r.read_header().unwrap();
        r.next_bucket().unwrap().unwrap();
        r.next_bucket().unwrap().unwrap();
        r.next_series().unwrap().unwrap();
        let mut points = r.points();
        assert!(matches!(points.next(), Err(ImportError::Format(_))));
    }

    #[test]
    fn test_reader_truncated_while_draining() {
        let data = write_stream();
        let data = &data[..data.len() - 1];

        let mut r = Reader::new(data);
        r.read_header().unwrap();
        r.next_bucket().unwrap().unwrap();
        r.next_bucket().unwrap().unwrap();
        assert!(matches!(r.next_bucket(), Err(ImportError::Format(_))));
    }

    #[test]
    fn test_reader_point_type_mismatch() {
        let mut w = Writer::new(vec![]);
        w.write_header(&Header::new("db0", "autogen", 1000)).unwrap();
        w.write_bucket_header(0, 10).unwrap();
        w.write_series_header(&SeriesHeader::new(FieldType::Integer, b"cpu", b"v"))
            .unwrap();
        w.write_points(&[Value::integer(1, 1)]).unwrap();
        w.write_series_footer().unwrap();
        w.write_bucket_footer().unwrap();
        let mut data = w.into_inner();

        // the points frame follows the series header frame: retag it as float
        let pos = data
            .iter()
            .rposition(|b| *b == 6)
            .unwrap();
        data[pos] = 5;

        let mut r = Reader::new(data.as_slice());
        r.read_header().unwrap();
        r.next_bucket().unwrap().unwrap();
        r.next_series().unwrap().unwrap();
        let mut points = r.points();
        assert!(matches!(points.next(), Err(ImportError::Format(_))));
    }
}
