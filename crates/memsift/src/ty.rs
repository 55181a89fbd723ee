//! Value types understood by the scanner.

use crate::Value;
use byteorder::{ByteOrder as _, LittleEndian};
use serde::{Deserialize, Serialize};
use std::{fmt, mem, num, str};

#[derive(Debug, thiserror::Error)]
pub enum ParseTypeError {
    #[error("not a valid type: {0}")]
    Invalid(String),
    #[error("invalid size: {0}")]
    InvalidSize(String, #[source] num::ParseIntError),
    #[error("type `{0}` requires a size, like `{0}/8`")]
    MissingSize(String),
}

#[derive(Debug, thiserror::Error)]
pub enum ValueParseError {
    #[error("type cannot be parsed from a literal: {0}")]
    Unsupported(Type),
    #[error("literal `{0}` does not fit in type {1}")]
    OutOfRange(String, Type),
    #[error("failed to parse integer")]
    Integer(#[source] num::ParseIntError),
    #[error("failed to parse float")]
    Float(#[source] num::ParseFloatError),
    #[error("failed to parse byte literal")]
    Bytes(#[source] hex::FromHexError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", content = "size")]
pub enum Type {
    #[serde(rename = "u8")]
    U8,
    #[serde(rename = "i8")]
    I8,
    #[serde(rename = "u16")]
    U16,
    #[serde(rename = "i16")]
    I16,
    #[serde(rename = "u32")]
    U32,
    #[serde(rename = "i32")]
    I32,
    #[serde(rename = "u64")]
    U64,
    #[serde(rename = "i64")]
    I64,
    #[serde(rename = "f32")]
    F32,
    #[serde(rename = "f64")]
    F64,
    #[serde(rename = "string")]
    String(usize),
    #[serde(rename = "bytes")]
    Bytes(usize),
    #[serde(rename = "regex")]
    Regex,
}

impl Type {
    /// The known in-memory size of the type.
    ///
    /// `regex` is match-only and has no decodable size.
    #[inline]
    pub fn size(self) -> Option<usize> {
        Some(match self {
            Self::U8 => mem::size_of::<u8>(),
            Self::I8 => mem::size_of::<i8>(),
            Self::U16 => mem::size_of::<u16>(),
            Self::I16 => mem::size_of::<i16>(),
            Self::U32 => mem::size_of::<u32>(),
            Self::I32 => mem::size_of::<i32>(),
            Self::U64 => mem::size_of::<u64>(),
            Self::I64 => mem::size_of::<i64>(),
            Self::F32 => mem::size_of::<f32>(),
            Self::F64 => mem::size_of::<f64>(),
            Self::String(len) => len,
            Self::Bytes(len) => len,
            Self::Regex => return None,
        })
    }

    /// Test if the type supports numeric ordering.
    pub fn is_numeric(self) -> bool {
        !matches!(self, Self::String(..) | Self::Bytes(..) | Self::Regex)
    }

    /// The default scan alignment for the type.
    pub fn default_alignment(self) -> usize {
        match self {
            Self::String(..) | Self::Bytes(..) | Self::Regex => 1,
            other => other.size().unwrap_or(1),
        }
    }

    /// Decode a value of this type from the head of the given buffer.
    ///
    /// Returns `None` when the buffer is too short or the type is not
    /// decodable. Strings stop at the first NUL or the declared length,
    /// whichever comes first.
    pub fn decode(self, buf: &[u8]) -> Option<Value> {
        let size = self.size()?;

        if buf.len() < size {
            return None;
        }

        let buf = &buf[..size];

        Some(match self {
            Self::U8 => Value::U8(buf[0]),
            Self::I8 => Value::I8(buf[0] as i8),
            Self::U16 => Value::U16(LittleEndian::read_u16(buf)),
            Self::I16 => Value::I16(LittleEndian::read_i16(buf)),
            Self::U32 => Value::U32(LittleEndian::read_u32(buf)),
            Self::I32 => Value::I32(LittleEndian::read_i32(buf)),
            Self::U64 => Value::U64(LittleEndian::read_u64(buf)),
            Self::I64 => Value::I64(LittleEndian::read_i64(buf)),
            Self::F32 => Value::F32(LittleEndian::read_f32(buf)),
            Self::F64 => Value::F64(LittleEndian::read_f64(buf)),
            Self::String(..) => {
                let end = buf.iter().position(|b| *b == 0).unwrap_or(buf.len());
                Value::String(buf[..end].to_vec())
            }
            Self::Bytes(..) => Value::Bytes(buf.to_vec()),
            Self::Regex => return None,
        })
    }

    /// Test if a value carries this type, ignoring declared lengths.
    pub fn matches_value(self, value: &Value) -> bool {
        match (self, value) {
            (Self::U8, Value::U8(..)) => true,
            (Self::I8, Value::I8(..)) => true,
            (Self::U16, Value::U16(..)) => true,
            (Self::I16, Value::I16(..)) => true,
            (Self::U32, Value::U32(..)) => true,
            (Self::I32, Value::I32(..)) => true,
            (Self::U64, Value::U64(..)) => true,
            (Self::I64, Value::I64(..)) => true,
            (Self::F32, Value::F32(..)) => true,
            (Self::F64, Value::F64(..)) => true,
            (Self::String(..), Value::String(..)) => true,
            (Self::Bytes(..), Value::Bytes(..)) => true,
            _ => false,
        }
    }

    /// Parse a decimal literal of the type.
    pub fn parse(self, input: &str) -> Result<Value, ValueParseError> {
        self.parse_radix(input, 10)
    }

    /// Parse a hex literal of the type. A leading `0x` is accepted.
    pub fn parse_hex(self, input: &str) -> Result<Value, ValueParseError> {
        let input = if input.starts_with("0x") || input.starts_with("0X") {
            &input[2..]
        } else {
            input
        };

        self.parse_radix(input, 16)
    }

    fn parse_radix(self, input: &str, radix: u32) -> Result<Value, ValueParseError> {
        macro_rules! parse_int {
            ($ty:ty, $variant:ident) => {{
                let wide =
                    i128::from_str_radix(input, radix).map_err(ValueParseError::Integer)?;

                if wide < <$ty>::min_value() as i128 || wide > <$ty>::max_value() as i128 {
                    return Err(ValueParseError::OutOfRange(input.to_string(), self));
                }

                Value::$variant(wide as $ty)
            }};
        }

        let value = match self {
            Self::U8 => parse_int!(u8, U8),
            Self::I8 => parse_int!(i8, I8),
            Self::U16 => parse_int!(u16, U16),
            Self::I16 => parse_int!(i16, I16),
            Self::U32 => parse_int!(u32, U32),
            Self::I32 => parse_int!(i32, I32),
            Self::U64 => parse_int!(u64, U64),
            Self::I64 => parse_int!(i64, I64),
            Self::F32 if radix == 10 => {
                Value::F32(str::parse::<f32>(input).map_err(ValueParseError::Float)?)
            }
            Self::F64 if radix == 10 => {
                Value::F64(str::parse::<f64>(input).map_err(ValueParseError::Float)?)
            }
            Self::String(len) => {
                let mut bytes = input.as_bytes().to_vec();
                bytes.truncate(len);
                Value::String(bytes)
            }
            Self::Bytes(..) => {
                let clean = input
                    .chars()
                    .filter(|c| !c.is_whitespace())
                    .collect::<String>();
                Value::Bytes(hex::decode(&clean).map_err(ValueParseError::Bytes)?)
            }
            ty => return Err(ValueParseError::Unsupported(ty)),
        };

        Ok(value)
    }
}

impl fmt::Display for Type {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        let o = match *self {
            Type::U8 => "u8",
            Type::I8 => "i8",
            Type::U16 => "u16",
            Type::I16 => "i16",
            Type::U32 => "u32",
            Type::I32 => "i32",
            Type::U64 => "u64",
            Type::I64 => "i64",
            Type::F32 => "f32",
            Type::F64 => "f64",
            Type::String(len) => return write!(fmt, "string/{}", len),
            Type::Bytes(len) => return write!(fmt, "bytes/{}", len),
            Type::Regex => "regex",
        };

        o.fmt(fmt)
    }
}

impl str::FromStr for Type {
    type Err = ParseTypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (first, ext) = match s.find('/') {
            Some(index) => {
                let (s, ext) = s.split_at(index);
                (s, Some(&ext[1..]))
            }
            None => (s, None),
        };

        let sized = |size: Option<&str>| -> Result<usize, ParseTypeError> {
            let size = size.ok_or_else(|| ParseTypeError::MissingSize(first.to_string()))?;
            str::parse::<usize>(size)
                .map_err(|e| ParseTypeError::InvalidSize(size.to_string(), e))
        };

        let ty = match (first, ext) {
            ("u8", None) => Type::U8,
            ("i8", None) => Type::I8,
            ("u16", None) => Type::U16,
            ("i16", None) => Type::I16,
            ("u32", None) => Type::U32,
            ("i32", None) => Type::I32,
            ("u64", None) => Type::U64,
            ("i64", None) => Type::I64,
            ("f32", None) => Type::F32,
            ("f64", None) => Type::F64,
            ("regex", None) => Type::Regex,
            ("string", size) => Type::String(sized(size)?),
            ("bytes", size) => Type::Bytes(sized(size)?),
            _ => return Err(ParseTypeError::Invalid(s.to_string())),
        };

        Ok(ty)
    }
}

#[cfg(test)]
mod tests {
    use super::{Type, ValueParseError};
    use crate::Value;

    #[test]
    fn test_decode() {
        let buf = [0x2A, 0x00, 0x00, 0x00, 0xFF];

        assert_eq!(Type::U32.decode(&buf), Some(Value::U32(42)));
        assert_eq!(Type::U8.decode(&buf[4..]), Some(Value::U8(0xFF)));
        assert_eq!(Type::U64.decode(&buf), None);
        assert_eq!(Type::Regex.decode(&buf), None);
    }

    #[test]
    fn test_decode_string_stops_at_nul() {
        let buf = b"abc\0def";

        assert_eq!(
            Type::String(7).decode(buf),
            Some(Value::String(b"abc".to_vec()))
        );
        assert_eq!(
            Type::String(2).decode(buf),
            Some(Value::String(b"ab".to_vec()))
        );
    }

    #[test]
    fn test_parse_literals() {
        assert_eq!(Type::U8.parse("255").unwrap(), Value::U8(255));
        assert_eq!(Type::U8.parse_hex("0xFF").unwrap(), Value::U8(255));
        assert_eq!(Type::I32.parse("-7").unwrap(), Value::I32(-7));
        assert_eq!(Type::F32.parse("1.5").unwrap(), Value::F32(1.5));
        assert_eq!(
            Type::Bytes(3).parse_hex("48 8B 05").unwrap(),
            Value::Bytes(vec![0x48, 0x8B, 0x05])
        );
    }

    #[test]
    fn test_parse_out_of_range() {
        assert!(matches!(
            Type::U8.parse("256"),
            Err(ValueParseError::OutOfRange(..))
        ));
        assert!(matches!(
            Type::I8.parse("-129"),
            Err(ValueParseError::OutOfRange(..))
        ));
        assert!(matches!(
            Type::U16.parse_hex("0x10000"),
            Err(ValueParseError::OutOfRange(..))
        ));
    }

    #[test]
    fn test_parse_rejects_unsupported() {
        assert!(matches!(
            Type::Regex.parse("1"),
            Err(ValueParseError::Unsupported(..))
        ));
        assert!(matches!(
            Type::F32.parse_hex("0x1"),
            Err(ValueParseError::Unsupported(..))
        ));
    }

    #[test]
    fn test_round_trip_names() {
        for s in &["u8", "i64", "f32", "string/8", "bytes/4", "regex"] {
            let ty = str::parse::<Type>(s).unwrap();
            assert_eq!(&ty.to_string(), s);
        }

        assert!(str::parse::<Type>("string").is_err());
        assert!(str::parse::<Type>("u7").is_err());
    }
}
