use crate::{Address, Type};
use byteorder::{ByteOrder as _, LittleEndian};
use serde::{Deserialize, Serialize};
use std::fmt;

/// A single dynamic literal value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    U8(u8),
    I8(i8),
    U16(u16),
    I16(i16),
    U32(u32),
    I32(i32),
    U64(u64),
    I64(i64),
    F32(f32),
    F64(f64),
    String(Vec<u8>),
    Bytes(Vec<u8>),
}

impl Value {
    /// Get the type of the value.
    pub fn ty(&self) -> Type {
        use self::Value::*;

        match self {
            U8(..) => Type::U8,
            I8(..) => Type::I8,
            U16(..) => Type::U16,
            I16(..) => Type::I16,
            U32(..) => Type::U32,
            I32(..) => Type::I32,
            U64(..) => Type::U64,
            I64(..) => Type::I64,
            F32(..) => Type::F32,
            F64(..) => Type::F64,
            String(bytes) => Type::String(bytes.len()),
            Bytes(bytes) => Type::Bytes(bytes.len()),
        }
    }

    /// Get the size in bytes of this value.
    pub fn size(&self) -> usize {
        use self::Value::*;

        match self {
            U8(..) | I8(..) => 1,
            U16(..) | I16(..) => 2,
            U32(..) | I32(..) | F32(..) => 4,
            U64(..) | I64(..) | F64(..) => 8,
            String(bytes) => bytes.len(),
            Bytes(bytes) => bytes.len(),
        }
    }

    /// Encode the value into the head of the given buffer.
    ///
    /// The buffer must hold at least `self.size()` bytes.
    pub fn encode(&self, buf: &mut [u8]) {
        match self {
            Self::U8(value) => buf[0] = *value,
            Self::I8(value) => buf[0] = *value as u8,
            Self::U16(value) => LittleEndian::write_u16(buf, *value),
            Self::I16(value) => LittleEndian::write_i16(buf, *value),
            Self::U32(value) => LittleEndian::write_u32(buf, *value),
            Self::I32(value) => LittleEndian::write_i32(buf, *value),
            Self::U64(value) => LittleEndian::write_u64(buf, *value),
            Self::I64(value) => LittleEndian::write_i64(buf, *value),
            Self::F32(value) => LittleEndian::write_f32(buf, *value),
            Self::F64(value) => LittleEndian::write_f64(buf, *value),
            Self::String(bytes) | Self::Bytes(bytes) => {
                let len = usize::min(buf.len(), bytes.len());
                buf[..len].copy_from_slice(&bytes[..len]);
            }
        }
    }

    /// Try to treat the value as an address.
    ///
    /// Returns `None` when the value is not an unsigned machine word.
    pub fn as_address(&self) -> Option<Address> {
        match *self {
            Self::U32(value) => Some(Address::new(value as u64)),
            Self::U64(value) => Some(Address::new(value)),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::U8(value) => write!(fmt, "{}", value),
            Value::I8(value) => write!(fmt, "{}", value),
            Value::U16(value) => write!(fmt, "{}", value),
            Value::I16(value) => write!(fmt, "{}", value),
            Value::U32(value) => write!(fmt, "{}", value),
            Value::I32(value) => write!(fmt, "{}", value),
            Value::U64(value) => write!(fmt, "{}", value),
            Value::I64(value) => write!(fmt, "{}", value),
            Value::F32(value) => write!(fmt, "{}", value),
            Value::F64(value) => write!(fmt, "{}", value),
            Value::String(bytes) => write!(fmt, "{}", EscapeBytes(bytes)),
            Value::Bytes(bytes) => {
                let mut it = bytes.iter().peekable();

                while let Some(b) = it.next() {
                    write!(fmt, "{:02X}", b)?;

                    if it.peek().is_some() {
                        write!(fmt, " ")?;
                    }
                }

                Ok(())
            }
        }
    }
}

struct EscapeBytes<'a>(&'a [u8]);

impl fmt::Display for EscapeBytes<'_> {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(fmt, "\"")?;

        for b in self.0 {
            match *b {
                b'\\' => write!(fmt, "\\\\")?,
                b'"' => write!(fmt, "\\\"")?,
                b'\t' => write!(fmt, "\\t")?,
                b'\n' => write!(fmt, "\\n")?,
                b'\r' => write!(fmt, "\\r")?,
                0 => write!(fmt, "\\0")?,
                b if b.is_ascii_graphic() || b == b' ' => write!(fmt, "{}", b as char)?,
                b => write!(fmt, "\\x{:02X}", b)?,
            }
        }

        write!(fmt, "\"")?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::Value;
    use crate::Type;

    #[test]
    fn test_encode_round_trip() {
        let values = vec![
            Value::U8(0xFF),
            Value::I16(-2),
            Value::U32(42),
            Value::I64(-1),
            Value::F32(1.5),
            Value::F64(-0.25),
            Value::Bytes(vec![1, 2, 3]),
        ];

        for value in values {
            let mut buf = vec![0u8; value.size()];
            value.encode(&mut buf);
            assert_eq!(value.ty().decode(&buf), Some(value));
        }
    }

    #[test]
    fn test_nan_is_never_equal() {
        let a = Value::F32(f32::NAN);
        let b = Value::F32(f32::NAN);

        assert_ne!(a, b);
        assert_ne!(a, a.clone());
    }

    #[test]
    fn test_display() {
        assert_eq!(Value::U32(42).to_string(), "42");
        assert_eq!(Value::Bytes(vec![0x48, 0x8B]).to_string(), "48 8B");
        assert_eq!(
            Value::String(b"hi\0".to_vec()).to_string(),
            "\"hi\\0\""
        );
        assert_eq!(Type::String(4).to_string(), "string/4");
    }
}
