//! Record serialization and chunk framing.
//!
//! A chunk is what one spill writes to a partition's backing file: the records of
//! the buffer at spill time, each framed as `[payload_len: varint][payload]`, with no
//! header and no trailer. Chunks carry no delimiter between them in the file, so
//! the partition keeps the byte length of every chunk it writes.

use crate::error::SpillError;
use crate::types::{Row, Value, BLOB_TAG, FLOAT_TAG, INT_TAG, NULL_TAG, TEXT_TAG};
use crate::varint::{append_varint, read_varint, varint_len};
use crate::Result;

/// Converts one record to and from its byte payload.
pub trait RecordCodec {
    type Record;

    /// Appends the payload of `record` to `buf`.
    fn encode(&self, record: &Self::Record, buf: &mut Vec<u8>);

    /// Decodes a record from exactly `buf`. Input that does not hold exactly one
    /// record is corrupt.
    fn decode(&self, buf: &[u8]) -> Result<Self::Record>;

    /// Payload length of `record`. Must equal what [`RecordCodec::encode`] appends,
    /// partitions rely on it to track their buffered size without re-encoding.
    fn encoded_len(&self, record: &Self::Record) -> usize {
        let mut scratch = Vec::new();
        self.encode(record, &mut scratch);
        scratch.len()
    }
}

/// Bytes a record occupies inside a chunk, including its length prefix.
pub fn framed_len<C: RecordCodec + ?Sized>(codec: &C, record: &C::Record) -> usize {
    let payload_len = codec.encoded_len(record);
    varint_len(payload_len as u64) + payload_len
}

/// Appends `records` to `out` as one chunk.
pub fn encode_chunk<C: RecordCodec + ?Sized>(codec: &C, records: &[C::Record], out: &mut Vec<u8>) {
    let mut record_buf = Vec::new();
    for record in records {
        codec.encode(record, &mut record_buf);
        append_varint(out, record_buf.len() as u64);
        out.extend_from_slice(&record_buf);
        record_buf.clear();
    }
}

/// Decodes every record of a chunk previously produced by [`encode_chunk`].
pub fn decode_chunk<C: RecordCodec + ?Sized>(codec: &C, data: &[u8]) -> Result<Vec<C::Record>> {
    let mut records = Vec::new();
    let mut offset = 0;
    while offset < data.len() {
        let (record_len, varint_size) = read_varint(&data[offset..])?;
        offset += varint_size;

        let record_len = record_len as usize;
        if record_len > data.len() - offset {
            return Err(SpillError::Corrupt(format!(
                "chunk record truncated: expected {record_len} bytes at offset {offset}, {} available",
                data.len() - offset
            )));
        }

        records.push(codec.decode(&data[offset..offset + record_len])?);
        offset += record_len;
    }
    Ok(records)
}

/// Codec for [`Row`].
///
/// Format: `[num_values: varint]` then, per value, `[tag: 1][payload]` where integers
/// and floats are 8 little-endian bytes and text/blob are `[len: varint][bytes]`.
#[derive(Debug, Clone, Copy, Default)]
pub struct RowCodec;

impl RowCodec {
    fn read_fixed8(buf: &[u8], offset: usize, what: &str) -> Result<[u8; 8]> {
        buf.get(offset..offset + 8)
            .and_then(|bytes| <[u8; 8]>::try_from(bytes).ok())
            .ok_or_else(|| SpillError::Corrupt(format!("Row: buffer too small for {what}")))
    }

    fn read_bytes<'a>(buf: &'a [u8], offset: &mut usize, what: &str) -> Result<&'a [u8]> {
        let (len, varint_len) = read_varint(&buf[*offset..])?;
        *offset += varint_len;
        let len = len as usize;
        if len > buf.len() - *offset {
            return Err(SpillError::Corrupt(format!(
                "Row: buffer too small for {what}"
            )));
        }
        let bytes = &buf[*offset..*offset + len];
        *offset += len;
        Ok(bytes)
    }
}

impl RecordCodec for RowCodec {
    type Record = Row;

    fn encode(&self, row: &Row, buf: &mut Vec<u8>) {
        append_varint(buf, row.len() as u64);
        for value in row.values() {
            buf.push(value.tag());
            match value {
                Value::Null => {}
                Value::Integer(i) => buf.extend_from_slice(&i.to_le_bytes()),
                Value::Float(f) => buf.extend_from_slice(&f.to_le_bytes()),
                Value::Text(t) => {
                    append_varint(buf, t.len() as u64);
                    buf.extend_from_slice(t.as_bytes());
                }
                Value::Blob(b) => {
                    append_varint(buf, b.len() as u64);
                    buf.extend_from_slice(b);
                }
            }
        }
    }

    fn decode(&self, buf: &[u8]) -> Result<Row> {
        let (num_values, mut offset) = read_varint(buf)?;

        let mut values = Vec::with_capacity((num_values as usize).min(buf.len()));
        for _ in 0..num_values {
            let Some(&tag) = buf.get(offset) else {
                return Err(SpillError::Corrupt(
                    "Row: unexpected end of buffer".to_string(),
                ));
            };
            offset += 1;

            let value = match tag {
                NULL_TAG => Value::Null,
                INT_TAG => {
                    let bytes = Self::read_fixed8(buf, offset, "integer")?;
                    offset += 8;
                    Value::Integer(i64::from_le_bytes(bytes))
                }
                FLOAT_TAG => {
                    let bytes = Self::read_fixed8(buf, offset, "float")?;
                    offset += 8;
                    Value::Float(f64::from_le_bytes(bytes))
                }
                TEXT_TAG => {
                    let bytes = Self::read_bytes(buf, &mut offset, "text")?;
                    let text = std::str::from_utf8(bytes)
                        .map_err(|_| SpillError::Corrupt("Invalid UTF-8 in text".to_string()))?;
                    Value::Text(text.to_string())
                }
                BLOB_TAG => Value::Blob(Self::read_bytes(buf, &mut offset, "blob")?.to_vec()),
                _ => {
                    return Err(SpillError::Corrupt(format!(
                        "Row: unknown value type {tag}"
                    )));
                }
            };
            values.push(value);
        }

        if offset != buf.len() {
            return Err(SpillError::Corrupt(format!(
                "Row: {} trailing bytes after {num_values} values",
                buf.len() - offset
            )));
        }
        Ok(Row::new(values))
    }

    fn encoded_len(&self, row: &Row) -> usize {
        let values_len: usize = row
            .values()
            .iter()
            .map(|value| {
                1 + match value {
                    Value::Null => 0,
                    Value::Integer(_) | Value::Float(_) => 8,
                    Value::Text(t) => varint_len(t.len() as u64) + t.len(),
                    Value::Blob(b) => varint_len(b.len() as u64) + b.len(),
                }
            })
            .sum();
        varint_len(row.len() as u64) + values_len
    }
}
