use std::io::Cursor;

use bytes::{Buf, BufMut};
use common_base::value::{FieldType, FieldValue, Value};
use influxdb_utils::varint::VarInt;

/// ENCODED_BLOCK_HEADER_SIZE is the size of the header for an encoded block.  There is one
/// byte encoding the type of the block.
const ENCODED_BLOCK_HEADER_SIZE: usize = 1;

/// encode_block encodes values of a single field type into a block.
pub fn encode_block(values: &[Value]) -> anyhow::Result<Vec<u8>> {
    if values.is_empty() {
        return Err(anyhow!("encode_block: no data found"));
    }

    let typ = values[0].field_type();
    let size: usize = values.iter().map(|v| v.encode_size()).sum();
    let mut payload = Vec::with_capacity(size + 10);
    values.len().encode_var_vec(&mut payload);

    for v in values {
        if v.field_type() != typ {
            return Err(anyhow!(
                "encode_block: mixed field types {} and {}",
                typ,
                v.field_type()
            ));
        }

        payload.put_i64(v.unix_nano);
        match &v.value {
            FieldValue::Float(f) => payload.put_u64(f.to_bits()),
            FieldValue::Integer(i) => payload.put_i64(*i),
            FieldValue::Unsigned(u) => payload.put_u64(*u),
            FieldValue::Boolean(b) => payload.put_u8(*b as u8),
            FieldValue::String(s) => {
                s.len().encode_var_vec(&mut payload);
                payload.extend_from_slice(s.as_slice());
            }
        }
    }

    let compressed = snap::raw::Encoder::new()
        .compress_vec(payload.as_slice())
        .map_err(|e| anyhow!("encode_block: {}", e))?;

    let mut block = Vec::with_capacity(ENCODED_BLOCK_HEADER_SIZE + compressed.len());
    block.push(typ.value());
    block.extend_from_slice(compressed.as_slice());
    Ok(block)
}

/// block_type returns the field type stored in the block.
pub fn block_type(block: &[u8]) -> anyhow::Result<FieldType> {
    if block.len() < ENCODED_BLOCK_HEADER_SIZE {
        return Err(anyhow!("block_type: empty block"));
    }
    FieldType::from_value(block[0])
}

/// decode_block decodes all values in the block.
pub fn decode_block(block: &[u8]) -> anyhow::Result<Vec<Value>> {
    let typ = block_type(block)?;
    let payload = snap::raw::Decoder::new()
        .decompress_vec(&block[ENCODED_BLOCK_HEADER_SIZE..])
        .map_err(|e| anyhow!("decode_block: {}", e))?;

    let (count, n) =
        usize::decode_var(payload.as_slice()).ok_or(anyhow!("decode_block: bad count"))?;
    let mut cur = Cursor::new(&payload[n..]);

    let mut values = Vec::with_capacity(count);
    for _ in 0..count {
        let fixed = match typ {
            FieldType::Boolean => 9,
            FieldType::String => 8,
            _ => 16,
        };
        if cur.remaining() < fixed {
            return Err(anyhow!("decode_block: short block"));
        }

        let unix_nano = cur.get_i64();
        let value = match typ {
            FieldType::Float => FieldValue::Float(f64::from_bits(cur.get_u64())),
            FieldType::Integer => FieldValue::Integer(cur.get_i64()),
            FieldType::Unsigned => FieldValue::Unsigned(cur.get_u64()),
            FieldType::Boolean => FieldValue::Boolean(cur.get_u8() != 0),
            FieldType::String => {
                let pos = cur.position() as usize;
                let rest = &cur.get_ref()[pos..];
                let (len, n) =
                    usize::decode_var(rest).ok_or(anyhow!("decode_block: bad string length"))?;
                if rest.len() < n + len {
                    return Err(anyhow!("decode_block: short string"));
                }
                let s = rest[n..n + len].to_vec();
                cur.set_position((pos + n + len) as u64);
                FieldValue::String(s)
            }
        };
        values.push(Value::new(unix_nano, value));
    }

    Ok(values)
}

#[cfg(test)]
mod tests {
    use common_base::value::{FieldType, FieldValue, Value};

    use crate::engine::shard::block::{block_type, decode_block, encode_block};

    #[test]
    fn test_encode_decode_mixed_kinds() {
        let cases = vec![
            vec![Value::float(1, 1.5), Value::float(2, -3.25)],
            vec![Value::integer(1, -7), Value::integer(5, i64::MAX)],
            vec![Value::new(3, FieldValue::Unsigned(u64::MAX))],
            vec![
                Value::new(1, FieldValue::Boolean(true)),
                Value::new(2, FieldValue::Boolean(false)),
            ],
            vec![
                Value::new(1, FieldValue::String(b"".to_vec())),
                Value::new(2, FieldValue::String(b"hello world".to_vec())),
            ],
        ];

        for values in cases {
            let block = encode_block(values.as_slice()).unwrap();
            assert_eq!(block_type(&block).unwrap(), values[0].field_type());
            assert_eq!(decode_block(&block).unwrap(), values);
        }
    }

    #[test]
    fn test_encode_rejects_mixed_types() {
        let values = vec![Value::float(1, 1.0), Value::integer(2, 1)];
        assert!(encode_block(&values).is_err());
        assert!(encode_block(&[]).is_err());
    }

    #[test]
    fn test_decode_corrupt() {
        let mut block = encode_block(&[Value::float(1, 1.0)]).unwrap();
        block.truncate(block.len() - 2);
        assert!(decode_block(&block).is_err());

        assert!(block_type(&[9]).is_err());
        assert_eq!(block_type(&[0]).unwrap(), FieldType::Float);
    }
}
