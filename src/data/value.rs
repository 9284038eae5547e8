use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// A single typed event payload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum Value {
    None,
    String(String),
    #[serde(rename = "sbyte")]
    I8(i8),
    #[serde(rename = "byte")]
    U8(u8),
    #[serde(rename = "short")]
    I16(i16),
    #[serde(rename = "ushort")]
    U16(u16),
    #[serde(rename = "int")]
    I32(i32),
    #[serde(rename = "uint")]
    U32(u32),
    #[serde(rename = "long")]
    I64(i64),
    #[serde(rename = "ulong")]
    U64(u64),
    #[serde(rename = "float")]
    F32(f32),
    #[serde(rename = "double")]
    F64(f64),
    Decimal(Decimal),
    Bool(bool),
}

impl Value {
    pub fn data_type(&self) -> DataType {
        match self {
            Value::None => DataType::None,
            Value::String(_) => DataType::String,
            Value::I8(_) => DataType::SByte,
            Value::U8(_) => DataType::Byte,
            Value::I16(_) => DataType::Short,
            Value::U16(_) => DataType::UShort,
            Value::I32(_) => DataType::Int,
            Value::U32(_) => DataType::UInt,
            Value::I64(_) => DataType::Long,
            Value::U64(_) => DataType::ULong,
            Value::F32(_) => DataType::Float,
            Value::F64(_) => DataType::Double,
            Value::Decimal(_) => DataType::Decimal,
            Value::Bool(_) => DataType::Bool,
        }
    }
}

impl Default for Value {
    fn default() -> Self {
        Value::None
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::None => write!(f, "NONE"),
            Value::String(s) => write!(f, "{}", s),
            Value::I8(v) => write!(f, "{}", v),
            Value::U8(v) => write!(f, "{}", v),
            Value::I16(v) => write!(f, "{}", v),
            Value::U16(v) => write!(f, "{}", v),
            Value::I32(v) => write!(f, "{}", v),
            Value::U32(v) => write!(f, "{}", v),
            Value::I64(v) => write!(f, "{}", v),
            Value::U64(v) => write!(f, "{}", v),
            Value::F32(v) => write!(f, "{}", v),
            Value::F64(v) => write!(f, "{}", v),
            Value::Decimal(d) => write!(f, "{}", d),
            Value::Bool(b) => write!(f, "{}", b),
        }
    }
}

/// Tag identifying which kind a [`Value`] holds.
///
/// The discriminants are the on-disk type tags and must never be renumbered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum DataType {
    None = 0,
    String = 1,
    SByte = 2,
    Byte = 3,
    Short = 4,
    UShort = 5,
    Int = 6,
    UInt = 7,
    Long = 8,
    ULong = 9,
    Float = 10,
    Double = 11,
    Decimal = 12,
    Bool = 13,
}

impl DataType {
    pub fn tag(self) -> u8 {
        self as u8
    }

    pub fn from_tag(tag: u8) -> Option<Self> {
        let data_type = match tag {
            0 => DataType::None,
            1 => DataType::String,
            2 => DataType::SByte,
            3 => DataType::Byte,
            4 => DataType::Short,
            5 => DataType::UShort,
            6 => DataType::Int,
            7 => DataType::UInt,
            8 => DataType::Long,
            9 => DataType::ULong,
            10 => DataType::Float,
            11 => DataType::Double,
            12 => DataType::Decimal,
            13 => DataType::Bool,
            _ => return None,
        };
        Some(data_type)
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DataType::None => "NONE",
            DataType::String => "STRING",
            DataType::SByte => "SBYTE",
            DataType::Byte => "BYTE",
            DataType::Short => "SHORT",
            DataType::UShort => "USHORT",
            DataType::Int => "INT",
            DataType::UInt => "UINT",
            DataType::Long => "LONG",
            DataType::ULong => "ULONG",
            DataType::Float => "FLOAT",
            DataType::Double => "DOUBLE",
            DataType::Decimal => "DECIMAL",
            DataType::Bool => "BOOL",
        };
        f.write_str(name)
    }
}

const SCALE_MASK: u32 = 0x00FF_0000;
const SIGN_MASK: u32 = 0x8000_0000;
const MAX_SCALE: u32 = 28;
const MANTISSA_LIMIT: u128 = 1 << 96;

/// 128-bit fixed-point decimal: a 96-bit mantissa with a base-10 scale.
///
/// Stored as the four little-endian words `lo, mid, hi, flags`, where `flags`
/// carries the scale in bits 16..24 and the sign in bit 31.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Decimal {
    lo: u32,
    mid: u32,
    hi: u32,
    flags: u32,
}

impl Decimal {
    /// Build from a signed mantissa and scale; `None` if either is out of range
    pub fn new(mantissa: i128, scale: u32) -> Option<Self> {
        if scale > MAX_SCALE {
            return None;
        }
        let magnitude = mantissa.unsigned_abs();
        if magnitude >= MANTISSA_LIMIT {
            return None;
        }
        let mut flags = scale << 16;
        if mantissa < 0 {
            flags |= SIGN_MASK;
        }
        Some(Self {
            lo: magnitude as u32,
            mid: (magnitude >> 32) as u32,
            hi: (magnitude >> 64) as u32,
            flags,
        })
    }

    /// Rebuild from raw words, rejecting reserved flag bits and oversized scales
    pub fn from_parts(lo: u32, mid: u32, hi: u32, flags: u32) -> Option<Self> {
        if flags & !(SCALE_MASK | SIGN_MASK) != 0 {
            return None;
        }
        if (flags & SCALE_MASK) >> 16 > MAX_SCALE {
            return None;
        }
        Some(Self { lo, mid, hi, flags })
    }

    pub fn to_le_bytes(&self) -> [u8; 16] {
        let mut out = [0u8; 16];
        out[0..4].copy_from_slice(&self.lo.to_le_bytes());
        out[4..8].copy_from_slice(&self.mid.to_le_bytes());
        out[8..12].copy_from_slice(&self.hi.to_le_bytes());
        out[12..16].copy_from_slice(&self.flags.to_le_bytes());
        out
    }

    pub fn from_le_bytes(bytes: [u8; 16]) -> Option<Self> {
        let word = |i: usize| u32::from_le_bytes([bytes[i], bytes[i + 1], bytes[i + 2], bytes[i + 3]]);
        Self::from_parts(word(0), word(4), word(8), word(12))
    }

    pub fn scale(&self) -> u32 {
        (self.flags & SCALE_MASK) >> 16
    }

    pub fn is_negative(&self) -> bool {
        self.flags & SIGN_MASK != 0
    }

    pub fn mantissa(&self) -> i128 {
        let magnitude =
            (self.lo as i128) | ((self.mid as i128) << 32) | ((self.hi as i128) << 64);
        if self.is_negative() {
            -magnitude
        } else {
            magnitude
        }
    }
}

impl fmt::Display for Decimal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let digits = self.mantissa().unsigned_abs().to_string();
        let scale = self.scale() as usize;
        let sign = if self.is_negative() { "-" } else { "" };

        if scale == 0 {
            return write!(f, "{}{}", sign, digits);
        }

        let padded = if digits.len() <= scale {
            format!("{}{}", "0".repeat(scale - digits.len() + 1), digits)
        } else {
            digits
        };
        let (int_part, frac_part) = padded.split_at(padded.len() - scale);
        write!(f, "{}{}.{}", sign, int_part, frac_part)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid decimal literal: {0}")]
pub struct ParseDecimalError(String);

impl FromStr for Decimal {
    type Err = ParseDecimalError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || ParseDecimalError(s.to_string());
        let trimmed = s.trim();

        let (negative, body) = match trimmed.strip_prefix('-') {
            Some(rest) => (true, rest),
            None => (false, trimmed.strip_prefix('+').unwrap_or(trimmed)),
        };

        let (int_part, frac_part) = match body.split_once('.') {
            Some((i, f)) => (i, f),
            None => (body, ""),
        };

        if int_part.is_empty() && frac_part.is_empty() {
            return Err(invalid());
        }
        if !int_part.bytes().chain(frac_part.bytes()).all(|b| b.is_ascii_digit()) {
            return Err(invalid());
        }

        let mut magnitude: i128 = 0;
        for b in int_part.bytes().chain(frac_part.bytes()) {
            magnitude = magnitude
                .checked_mul(10)
                .and_then(|m| m.checked_add((b - b'0') as i128))
                .ok_or_else(invalid)?;
        }

        let mantissa = if negative { -magnitude } else { magnitude };
        Decimal::new(mantissa, frac_part.len() as u32).ok_or_else(invalid)
    }
}

impl Serialize for Decimal {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Decimal {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        text.parse().map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tag_round_trip() {
        for tag in 0..=13u8 {
            let data_type = DataType::from_tag(tag).unwrap();
            assert_eq!(data_type.tag(), tag);
        }
        assert!(DataType::from_tag(14).is_none());
        assert!(DataType::from_tag(0xFF).is_none());
    }

    #[test]
    fn test_value_data_type() {
        assert_eq!(Value::I32(1).data_type(), DataType::Int);
        assert_eq!(Value::U64(1).data_type(), DataType::ULong);
        assert_eq!(Value::None.data_type(), DataType::None);
        assert_eq!(Value::String("a".into()).data_type(), DataType::String);
    }

    #[test]
    fn test_decimal_display() {
        assert_eq!(Decimal::new(12345, 2).unwrap().to_string(), "123.45");
        assert_eq!(Decimal::new(-5, 3).unwrap().to_string(), "-0.005");
        assert_eq!(Decimal::new(42, 0).unwrap().to_string(), "42");
    }

    #[test]
    fn test_decimal_parse() {
        let d: Decimal = "-19.990".parse().unwrap();
        assert_eq!(d.mantissa(), -19990);
        assert_eq!(d.scale(), 3);
        assert!(d.is_negative());

        assert!("".parse::<Decimal>().is_err());
        assert!("1.2.3".parse::<Decimal>().is_err());
        assert!("abc".parse::<Decimal>().is_err());
    }

    #[test]
    fn test_decimal_limits() {
        assert!(Decimal::new(1, 29).is_none());
        assert!(Decimal::new(1i128 << 96, 0).is_none());
        assert!(Decimal::new((1i128 << 96) - 1, 0).is_some());
        // reserved flag bits must be zero
        assert!(Decimal::from_parts(1, 0, 0, 0x0000_0001).is_none());
        assert!(Decimal::from_parts(1, 0, 0, 29 << 16).is_none());
    }

    #[test]
    fn test_decimal_bytes_layout() {
        let d = Decimal::new(-1, 1).unwrap();
        let bytes = d.to_le_bytes();
        assert_eq!(&bytes[0..4], &[1, 0, 0, 0]);
        assert_eq!(&bytes[12..16], &[0, 0, 1, 0x80]);
        assert_eq!(Decimal::from_le_bytes(bytes), Some(d));
    }

    #[test]
    fn test_value_json_shape() {
        let json = serde_json::to_value(Value::I32(7)).unwrap();
        assert_eq!(json, serde_json::json!({"type": "int", "value": 7}));

        let none: Value = serde_json::from_value(serde_json::json!({"type": "none"})).unwrap();
        assert_eq!(none, Value::None);

        let dec: Value =
            serde_json::from_value(serde_json::json!({"type": "decimal", "value": "1.50"}))
                .unwrap();
        assert_eq!(dec, Value::Decimal(Decimal::new(150, 2).unwrap()));
    }
}
