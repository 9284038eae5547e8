//! Binary snapshot format for a whole [`Registry`]
//!
//! All integers are little-endian.
//!
//! ```text
//! File       := CollectionCount:i32 Collection*
//! Collection := Key:String TypeTag:u8 EventCount:i64 Event*
//! Event      := Timestamp:i64 Payload      (no payload for the None tag)
//! String     := Length:i32 UTF-8 bytes
//! ```
//!
//! Decoding replays every event through [`EventSeries::add`], so the bucket
//! aggregates are rebuilt rather than read from disk. A decode either yields
//! a complete registry or an error, never a partial one.

use super::registry::Registry;
use crate::data::{DataType, Decimal, EventSeries, RecordError, Value};

/// Encode every series in creation order.
///
/// Each series is read under its own lock; the result is consistent per
/// series but not across series.
pub fn encode(registry: &Registry) -> Result<Vec<u8>, CodecError> {
    let series = registry.snapshot();
    let mut out = Vec::with_capacity(64 * series.len().max(1));

    let count = i32::try_from(series.len()).map_err(|_| CodecError::TooLarge("collection count"))?;
    out.extend_from_slice(&count.to_le_bytes());

    for s in &series {
        encode_series(&mut out, s)?;
    }

    Ok(out)
}

fn encode_series(out: &mut Vec<u8>, series: &EventSeries) -> Result<(), CodecError> {
    write_string(out, series.name())?;
    out.push(series.data_type().tag());

    series.with_events(|events| {
        out.extend_from_slice(&(events.len() as i64).to_le_bytes());
        for (timestamp, value) in events {
            out.extend_from_slice(&timestamp.to_le_bytes());
            write_payload(out, value)?;
        }
        Ok(())
    })
}

fn write_string(out: &mut Vec<u8>, s: &str) -> Result<(), CodecError> {
    let len = i32::try_from(s.len()).map_err(|_| CodecError::TooLarge("string length"))?;
    out.extend_from_slice(&len.to_le_bytes());
    out.extend_from_slice(s.as_bytes());
    Ok(())
}

fn write_payload(out: &mut Vec<u8>, value: &Value) -> Result<(), CodecError> {
    match value {
        Value::None => {}
        Value::String(s) => write_string(out, s)?,
        Value::I8(v) => out.extend_from_slice(&v.to_le_bytes()),
        Value::U8(v) => out.push(*v),
        Value::I16(v) => out.extend_from_slice(&v.to_le_bytes()),
        Value::U16(v) => out.extend_from_slice(&v.to_le_bytes()),
        Value::I32(v) => out.extend_from_slice(&v.to_le_bytes()),
        Value::U32(v) => out.extend_from_slice(&v.to_le_bytes()),
        Value::I64(v) => out.extend_from_slice(&v.to_le_bytes()),
        Value::U64(v) => out.extend_from_slice(&v.to_le_bytes()),
        Value::F32(v) => out.extend_from_slice(&v.to_le_bytes()),
        Value::F64(v) => out.extend_from_slice(&v.to_le_bytes()),
        Value::Decimal(d) => out.extend_from_slice(&d.to_le_bytes()),
        Value::Bool(b) => out.push(u8::from(*b)),
    }
    Ok(())
}

/// Decode a full snapshot into a fresh, clean registry
pub fn decode(data: &[u8]) -> Result<Registry, CodecError> {
    let mut reader = Reader::new(data);
    let registry = Registry::new();

    let count = reader.read_i32()?;
    if count < 0 {
        return Err(CodecError::InvalidLength {
            offset: 0,
            length: count as i64,
        });
    }

    for _ in 0..count {
        let key = reader.read_string()?;

        let tag_offset = reader.pos;
        let tag = reader.read_u8()?;
        let data_type = DataType::from_tag(tag).ok_or(CodecError::UnknownTag {
            offset: tag_offset,
            tag,
        })?;

        let count_offset = reader.pos;
        let event_count = reader.read_i64()?;
        // Every event needs at least its timestamp
        if event_count < 0 || event_count as u64 > (reader.remaining() / 8) as u64 {
            return Err(CodecError::InvalidLength {
                offset: count_offset,
                length: event_count,
            });
        }

        let series = registry.resolve(&key, data_type);
        if series.data_type() != data_type {
            return Err(CodecError::Record(RecordError::TypeMismatch {
                key,
                expected: series.data_type(),
                actual: data_type,
            }));
        }

        for _ in 0..event_count {
            let timestamp = reader.read_i64()?;
            let value = reader.read_payload(data_type)?;
            series.add(timestamp, value)?;
        }
    }

    if reader.remaining() > 0 {
        return Err(CodecError::TrailingBytes(reader.remaining()));
    }

    Ok(registry)
}

/// Bounds-checked cursor over the snapshot bytes
struct Reader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8], CodecError> {
        if self.remaining() < n {
            return Err(CodecError::UnexpectedEof {
                offset: self.pos,
                needed: n,
            });
        }
        let bytes = &self.data[self.pos..self.pos + n];
        self.pos += n;
        Ok(bytes)
    }

    fn take_array<const N: usize>(&mut self) -> Result<[u8; N], CodecError> {
        let offset = self.pos;
        self.take(N)?
            .try_into()
            .map_err(|_| CodecError::UnexpectedEof { offset, needed: N })
    }

    fn read_u8(&mut self) -> Result<u8, CodecError> {
        Ok(self.take_array::<1>()?[0])
    }

    fn read_i32(&mut self) -> Result<i32, CodecError> {
        Ok(i32::from_le_bytes(self.take_array()?))
    }

    fn read_i64(&mut self) -> Result<i64, CodecError> {
        Ok(i64::from_le_bytes(self.take_array()?))
    }

    fn read_string(&mut self) -> Result<String, CodecError> {
        let offset = self.pos;
        let len = self.read_i32()?;
        if len < 0 {
            return Err(CodecError::InvalidLength {
                offset,
                length: len as i64,
            });
        }

        let bytes = self.take(len as usize)?;
        String::from_utf8(bytes.to_vec()).map_err(|_| CodecError::InvalidUtf8 { offset })
    }

    fn read_payload(&mut self, data_type: DataType) -> Result<Value, CodecError> {
        let value = match data_type {
            DataType::None => Value::None,
            DataType::String => Value::String(self.read_string()?),
            DataType::SByte => Value::I8(i8::from_le_bytes(self.take_array()?)),
            DataType::Byte => Value::U8(self.read_u8()?),
            DataType::Short => Value::I16(i16::from_le_bytes(self.take_array()?)),
            DataType::UShort => Value::U16(u16::from_le_bytes(self.take_array()?)),
            DataType::Int => Value::I32(i32::from_le_bytes(self.take_array()?)),
            DataType::UInt => Value::U32(u32::from_le_bytes(self.take_array()?)),
            DataType::Long => Value::I64(i64::from_le_bytes(self.take_array()?)),
            DataType::ULong => Value::U64(u64::from_le_bytes(self.take_array()?)),
            DataType::Float => Value::F32(f32::from_le_bytes(self.take_array()?)),
            DataType::Double => Value::F64(f64::from_le_bytes(self.take_array()?)),
            DataType::Decimal => {
                let offset = self.pos;
                let bytes: [u8; 16] = self.take_array()?;
                let decimal = Decimal::from_le_bytes(bytes).ok_or(CodecError::InvalidDecimal {
                    offset,
                })?;
                Value::Decimal(decimal)
            }
            DataType::Bool => Value::Bool(self.read_u8()? != 0),
        };
        Ok(value)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CodecError {
    #[error("unexpected end of data at offset {offset}, needed {needed} more bytes")]
    UnexpectedEof { offset: usize, needed: usize },

    #[error("unknown type tag {tag} at offset {offset}")]
    UnknownTag { offset: usize, tag: u8 },

    #[error("invalid length {length} at offset {offset}")]
    InvalidLength { offset: usize, length: i64 },

    #[error("invalid UTF-8 in string at offset {offset}")]
    InvalidUtf8 { offset: usize },

    #[error("invalid decimal at offset {offset}")]
    InvalidDecimal { offset: usize },

    #[error("{0} trailing bytes after last collection")]
    TrailingBytes(usize),

    #[error("{0} does not fit the on-disk format")]
    TooLarge(&'static str),

    #[error("invalid event: {0}")]
    Record(#[from] RecordError),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{local_bucket_start, Granularity};

    fn sample_registry() -> Registry {
        let registry = Registry::new();
        registry.record("login", 1_700_000_000, Value::I32(1)).unwrap();
        registry.record("login", 1_700_086_400, Value::I32(2)).unwrap();
        registry.record("page", 1_700_000_100, Value::String("/home".into())).unwrap();
        registry.record("ping", 1_700_000_200, Value::None).unwrap();
        registry
            .record("price", 1_700_000_300, Value::Decimal(Decimal::new(-1999, 2).unwrap()))
            .unwrap();
        registry.record("ok", 1_700_000_400, Value::Bool(true)).unwrap();
        registry.record("ratio", 1_700_000_500, Value::F32(0.25)).unwrap();
        registry.record("bytes", 1_700_000_600, Value::U64(u64::MAX)).unwrap();
        registry.record("delta", 1_700_000_700, Value::I8(-3)).unwrap();
        registry
    }

    fn assert_same(a: &Registry, b: &Registry) {
        assert_eq!(a.keys(), b.keys());
        for key in a.keys() {
            let sa = a.get(&key).unwrap();
            let sb = b.get(&key).unwrap();
            assert_eq!(sa.data_type(), sb.data_type());
            sa.with_events(|ea| sb.with_events(|eb| assert_eq!(ea, eb)));
            for g in Granularity::ALL {
                assert_eq!(sa.bucket_counts(g), sb.bucket_counts(g));
            }
        }
    }

    #[test]
    fn test_encode_layout() {
        let registry = Registry::new();
        registry.record("ab", 7, Value::I16(-2)).unwrap();
        registry.record("n", 9, Value::None).unwrap();

        let bytes = encode(&registry).unwrap();

        let mut expected = Vec::new();
        expected.extend_from_slice(&2i32.to_le_bytes());
        expected.extend_from_slice(&2i32.to_le_bytes());
        expected.extend_from_slice(b"ab");
        expected.push(DataType::Short.tag());
        expected.extend_from_slice(&1i64.to_le_bytes());
        expected.extend_from_slice(&7i64.to_le_bytes());
        expected.extend_from_slice(&(-2i16).to_le_bytes());
        expected.extend_from_slice(&1i32.to_le_bytes());
        expected.extend_from_slice(b"n");
        expected.push(DataType::None.tag());
        expected.extend_from_slice(&1i64.to_le_bytes());
        expected.extend_from_slice(&9i64.to_le_bytes());

        assert_eq!(bytes, expected);
    }

    #[test]
    fn test_round_trip_rebuilds_aggregates() {
        let registry = sample_registry();
        // Overwrite an existing timestamp; the series double counts it
        registry.record("login", 1_700_000_000, Value::I32(5)).unwrap();

        let decoded = decode(&encode(&registry).unwrap()).unwrap();

        assert_eq!(decoded.keys(), registry.keys());
        let login = decoded.get("login").unwrap();
        assert_eq!(login.len(), 2);
        login.with_events(|events| assert_eq!(events.get(&1_700_000_000), Some(&Value::I32(5))));

        // Aggregates are rebuilt from events, so the extra count does not persist
        let day = local_bucket_start(1_700_000_000, Granularity::Day).unwrap();
        assert_eq!(registry.get("login").unwrap().bucket_count(Granularity::Day, day), 2);
        assert_eq!(login.bucket_count(Granularity::Day, day), 1);

        assert!(!decoded.is_dirty());
    }

    #[test]
    fn test_round_trip_distinct_timestamps() {
        let registry = sample_registry();
        let decoded = decode(&encode(&registry).unwrap()).unwrap();
        assert_same(&registry, &decoded);
    }

    #[test]
    fn test_three_int_events() {
        let registry = Registry::new();
        for (i, ts) in [1_700_000_000, 1_700_003_600, 1_702_000_000].iter().enumerate() {
            registry.record("k", *ts, Value::I32(i as i32)).unwrap();
        }

        let decoded = decode(&encode(&registry).unwrap()).unwrap();
        let before = registry.get("k").unwrap();
        let restored = decoded.get("k").unwrap();

        assert_eq!(before.len(), 3);
        assert_eq!(restored.len(), 3);
        for g in Granularity::ALL {
            for ts in [1_700_000_000, 1_702_000_000] {
                let start = local_bucket_start(ts, g).unwrap();
                assert_eq!(before.bucket_count(g, start), restored.bucket_count(g, start));
            }
        }
    }

    #[test]
    fn test_empty_registry() {
        let bytes = encode(&Registry::new()).unwrap();
        assert_eq!(bytes, 0i32.to_le_bytes().to_vec());
        assert!(decode(&bytes).unwrap().is_empty());
    }

    #[test]
    fn test_truncated_mid_event() {
        let registry = Registry::new();
        for ts in [1000, 2000, 3000] {
            registry.record("k", ts, Value::I64(ts)).unwrap();
        }
        let bytes = encode(&registry).unwrap();

        // Cut inside the last payload
        let cut = &bytes[..bytes.len() - 3];
        assert!(matches!(decode(cut), Err(CodecError::UnexpectedEof { .. })));

        // Every shorter prefix fails too
        for len in 0..bytes.len() {
            assert!(decode(&bytes[..len]).is_err(), "prefix {} decoded", len);
        }
    }

    #[test]
    fn test_unknown_tag() {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&1i32.to_le_bytes());
        bytes.extend_from_slice(&1i32.to_le_bytes());
        bytes.push(b'k');
        bytes.push(42);
        bytes.extend_from_slice(&0i64.to_le_bytes());

        assert_eq!(decode(&bytes).unwrap_err(), CodecError::UnknownTag { offset: 9, tag: 42 });
    }

    #[test]
    fn test_negative_lengths() {
        assert!(matches!(
            decode(&(-1i32).to_le_bytes()),
            Err(CodecError::InvalidLength { .. })
        ));

        let mut bytes = Vec::new();
        bytes.extend_from_slice(&1i32.to_le_bytes());
        bytes.extend_from_slice(&(-5i32).to_le_bytes());
        assert!(matches!(decode(&bytes), Err(CodecError::InvalidLength { .. })));
    }

    #[test]
    fn test_oversized_event_count() {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&1i32.to_le_bytes());
        bytes.extend_from_slice(&1i32.to_le_bytes());
        bytes.push(b'k');
        bytes.push(DataType::None.tag());
        bytes.extend_from_slice(&i64::MAX.to_le_bytes());

        assert!(matches!(decode(&bytes), Err(CodecError::InvalidLength { .. })));
    }

    #[test]
    fn test_invalid_utf8() {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&1i32.to_le_bytes());
        bytes.extend_from_slice(&2i32.to_le_bytes());
        bytes.extend_from_slice(&[0xC3, 0x28]);
        bytes.push(DataType::None.tag());
        bytes.extend_from_slice(&0i64.to_le_bytes());

        assert_eq!(decode(&bytes).unwrap_err(), CodecError::InvalidUtf8 { offset: 4 });
    }

    #[test]
    fn test_invalid_decimal_flags() {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&1i32.to_le_bytes());
        bytes.extend_from_slice(&1i32.to_le_bytes());
        bytes.push(b'd');
        bytes.push(DataType::Decimal.tag());
        bytes.extend_from_slice(&1i64.to_le_bytes());
        bytes.extend_from_slice(&1000i64.to_le_bytes());
        bytes.extend_from_slice(&[0u8; 12]);
        bytes.extend_from_slice(&0x0000_00FFu32.to_le_bytes());

        assert!(matches!(decode(&bytes), Err(CodecError::InvalidDecimal { .. })));
    }

    #[test]
    fn test_trailing_bytes() {
        let mut bytes = encode(&sample_registry()).unwrap();
        bytes.push(0);
        assert_eq!(decode(&bytes).unwrap_err(), CodecError::TrailingBytes(1));
    }

    #[test]
    fn test_conflicting_repeated_key() {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&2i32.to_le_bytes());
        for tag in [DataType::Int, DataType::Bool] {
            bytes.extend_from_slice(&1i32.to_le_bytes());
            bytes.push(b'k');
            bytes.push(tag.tag());
            bytes.extend_from_slice(&0i64.to_le_bytes());
        }

        assert!(matches!(
            decode(&bytes),
            Err(CodecError::Record(RecordError::TypeMismatch { .. }))
        ));
    }
}
