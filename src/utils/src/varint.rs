//! Unsigned LEB128 varints, the same encoding as Go's `binary.PutUvarint`.

use std::io::{self, Read, Write};

/// MAX_VARINT_LEN64 is the maximum length of a varint-encoded 64-bit integer.
pub const MAX_VARINT_LEN64: usize = 10;

pub trait VarInt: Sized + Copy {
    fn required_space(self) -> usize;
    fn encode_var(self, dst: &mut [u8]) -> usize;
    /// decode_var returns the value and the number of bytes read, or `None` when
    /// `src` is too short or the value overflows.
    fn decode_var(src: &[u8]) -> Option<(Self, usize)>;

    fn encode_var_vec(self, dst: &mut Vec<u8>) -> usize {
        let mut buf = [0_u8; MAX_VARINT_LEN64];
        let n = self.encode_var(&mut buf);
        dst.extend_from_slice(&buf[..n]);
        n
    }
}

impl VarInt for u64 {
    fn required_space(self) -> usize {
        let mut n = 1;
        let mut v = self;
        while v >= 0x80 {
            v >>= 7;
            n += 1;
        }
        n
    }

    fn encode_var(self, dst: &mut [u8]) -> usize {
        let mut v = self;
        let mut i = 0;
        while v >= 0x80 {
            dst[i] = (v as u8) | 0x80;
            v >>= 7;
            i += 1;
        }
        dst[i] = v as u8;
        i + 1
    }

    fn decode_var(src: &[u8]) -> Option<(Self, usize)> {
        let mut x = 0_u64;
        let mut s = 0_u32;
        for (i, &b) in src.iter().enumerate() {
            if i == MAX_VARINT_LEN64 {
                return None;
            }
            if b < 0x80 {
                if i == MAX_VARINT_LEN64 - 1 && b > 1 {
                    return None;
                }
                return Some((x | (b as u64) << s, i + 1));
            }
            x |= ((b & 0x7f) as u64) << s;
            s += 7;
        }
        None
    }
}

impl VarInt for usize {
    fn required_space(self) -> usize {
        (self as u64).required_space()
    }

    fn encode_var(self, dst: &mut [u8]) -> usize {
        (self as u64).encode_var(dst)
    }

    fn decode_var(src: &[u8]) -> Option<(Self, usize)> {
        u64::decode_var(src).map(|(v, n)| (v as usize, n))
    }
}

pub fn write_uvarint<W: Write>(w: &mut W, v: u64) -> io::Result<usize> {
    let mut buf = [0_u8; MAX_VARINT_LEN64];
    let n = v.encode_var(&mut buf);
    w.write_all(&buf[..n])?;
    Ok(n)
}

/// read_uvarint reads one varint byte at a time. An `UnexpectedEof` is only
/// returned when the reader ends before the first byte; a varint cut short
/// after that is reported as `InvalidData`.
pub fn read_uvarint<R: Read>(r: &mut R) -> io::Result<(u64, usize)> {
    let mut x = 0_u64;
    let mut s = 0_u32;
    let mut b = [0_u8; 1];
    for i in 0..MAX_VARINT_LEN64 {
        if let Err(e) = r.read_exact(&mut b) {
            if i > 0 && e.kind() == io::ErrorKind::UnexpectedEof {
                return Err(io::Error::new(io::ErrorKind::InvalidData, "truncated varint"));
            }
            return Err(e);
        }
        let b = b[0];
        if b < 0x80 {
            if i == MAX_VARINT_LEN64 - 1 && b > 1 {
                break;
            }
            return Ok((x | (b as u64) << s, i + 1));
        }
        x |= ((b & 0x7f) as u64) << s;
        s += 7;
    }
    Err(io::Error::new(io::ErrorKind::InvalidData, "varint overflows a 64-bit integer"))
}

#[cfg(test)]
mod tests {
    use std::io::{Cursor, ErrorKind};

    use quickcheck::quickcheck;

    use crate::varint::{read_uvarint, write_uvarint, VarInt, MAX_VARINT_LEN64};

    #[test]
    fn test_known_encodings() {
        let mut buf = vec![];
        300_u64.encode_var_vec(&mut buf);
        assert_eq!(buf, vec![0xac, 0x02]);

        buf.clear();
        u64::MAX.encode_var_vec(&mut buf);
        assert_eq!(buf.len(), MAX_VARINT_LEN64);
        assert_eq!(u64::MAX.required_space(), MAX_VARINT_LEN64);
        assert_eq!(0_u64.required_space(), 1);
    }

    #[test]
    fn test_decode_short() {
        assert!(u64::decode_var(&[]).is_none());
        assert!(u64::decode_var(&[0x80, 0x80]).is_none());
    }

    #[test]
    fn test_read_uvarint_eof() {
        let mut r = Cursor::new(vec![]);
        let err = read_uvarint(&mut r).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UnexpectedEof);

        let mut r = Cursor::new(vec![0x80]);
        let err = read_uvarint(&mut r).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidData);
    }

    quickcheck! {
        fn prop_stream_and_slice_agree(v: u64) -> bool {
            let mut buf = vec![];
            let n = write_uvarint(&mut buf, v).unwrap();
            let (a, an) = u64::decode_var(&buf).unwrap();
            let (b, bn) = read_uvarint(&mut Cursor::new(&buf)).unwrap();
            a == v && b == v && an == n && bn == n && v.required_space() == n
        }
    }
}
