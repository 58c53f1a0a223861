use super::registry::{
    lookup_type, lookup_type_by_name, FloatWidth, IntWidth, TypeClass, TypeDesc, NULL_TYPE_ID,
};
use crate::error::{Error, Result};
use std::fmt::Write as _;

/// Initial buffer size for variable-length types
pub const DEFAULT_VALUE_LENGTH: usize = 16;

/// A typed value container.
///
/// The container owns its bytes and always carries the id of a known type.
/// A NULL container has no buffer at all.
#[derive(Debug, Clone, PartialEq)]
pub struct Value {
    type_id: u32,
    data: Option<Vec<u8>>,
}

impl Value {
    /// Create a zeroed value of the named type.
    ///
    /// Fails for unknown names and for `null`, which is only reachable via
    /// [`Value::set_null`].
    pub fn new(type_name: &str) -> Result<Self> {
        let desc = lookup_type_by_name(type_name)
            .ok_or_else(|| Error::InvalidType(format!("unknown type '{}'", type_name)))?;

        if desc.is_null() {
            return Err(Error::InvalidType(
                "values cannot be created as null".to_string(),
            ));
        }

        let length = if desc.is_varlen() {
            DEFAULT_VALUE_LENGTH
        } else {
            desc.length
        };

        Ok(Self {
            type_id: desc.id,
            data: Some(vec![0u8; length]),
        })
    }

    pub fn type_id(&self) -> u32 {
        self.type_id
    }

    pub fn descriptor(&self) -> Result<&'static TypeDesc> {
        lookup_type(self.type_id)
            .ok_or_else(|| Error::InvalidType(format!("unknown type id {:#06x}", self.type_id)))
    }

    pub fn type_name(&self) -> &'static str {
        self.descriptor().map(|d| d.name).unwrap_or("unknown")
    }

    pub fn is_null(&self) -> bool {
        self.type_id == NULL_TYPE_ID
    }

    /// Logical size of the buffer in bytes
    pub fn len(&self) -> usize {
        self.data.as_ref().map_or(0, Vec::len)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Raw bytes, or `None` for a NULL value
    pub fn as_bytes(&self) -> Option<&[u8]> {
        self.data.as_deref()
    }

    /// Overwrite type and bytes at once.
    ///
    /// This is the only setter that can change the type of a value. Fixed
    /// width types take the first `length` bytes of `data`; variable-length
    /// types take all of it.
    pub fn set_raw(&mut self, type_id: u32, data: &[u8]) -> Result<()> {
        let desc = lookup_type(type_id)
            .ok_or_else(|| Error::InvalidType(format!("unknown type id {:#06x}", type_id)))?;

        if desc.is_null() {
            return Err(Error::InvalidType(
                "use set_null to store a null value".to_string(),
            ));
        }

        let length = if desc.length != 0 {
            desc.length
        } else {
            data.len()
        };

        if data.len() < length {
            return Err(Error::InvalidLength {
                expected: length,
                actual: data.len(),
            });
        }

        let buffer = self.data.get_or_insert_with(Vec::new);
        buffer.resize(length, 0);
        buffer.copy_from_slice(&data[..length]);
        self.type_id = type_id;

        Ok(())
    }

    /// Drop the buffer and mark the value as NULL.
    pub fn set_null(&mut self) {
        self.data = None;
        self.type_id = NULL_TYPE_ID;
    }

    /// Store an integer, truncated to the width of the current type.
    pub fn set_numeric(&mut self, value: i64) -> Result<()> {
        let TypeClass::Integer(width) = self.class()? else {
            return Err(self.mismatch("an integer"));
        };

        match width {
            IntWidth::W1 => self.write_fixed(&(value as i8).to_ne_bytes()),
            IntWidth::W2 => self.write_fixed(&(value as i16).to_ne_bytes()),
            IntWidth::W4 => self.write_fixed(&(value as i32).to_ne_bytes()),
            IntWidth::W8 => self.write_fixed(&value.to_ne_bytes()),
        }
    }

    /// Store a single precision float; the current type must be `float4`.
    pub fn set_float(&mut self, value: f32) -> Result<()> {
        match self.class()? {
            TypeClass::Float(FloatWidth::W4) => self.write_fixed(&value.to_ne_bytes()),
            _ => Err(self.mismatch("a 4 byte float")),
        }
    }

    /// Store a double precision float; the current type must be `float8`.
    pub fn set_double(&mut self, value: f64) -> Result<()> {
        match self.class()? {
            TypeClass::Float(FloatWidth::W8) => self.write_fixed(&value.to_ne_bytes()),
            _ => Err(self.mismatch("an 8 byte float")),
        }
    }

    /// Replace the text, resizing the buffer to the string's byte length.
    ///
    /// Text ends at the first NUL when formatted, so strings containing one
    /// are rejected and the value is left as it was.
    pub fn set_text(&mut self, text: &str) -> Result<()> {
        if self.class()? != TypeClass::Text {
            return Err(self.mismatch("text"));
        }
        if let Some(at) = text.bytes().position(|b| b == 0) {
            return Err(Error::InvalidType(format!(
                "text may not contain a NUL byte (found at offset {})",
                at
            )));
        }

        let buffer = self.data.get_or_insert_with(Vec::new);
        if buffer.len() != text.len() {
            buffer.resize(text.len(), 0);
        }
        buffer.copy_from_slice(text.as_bytes());

        Ok(())
    }

    /// Render the value for display.
    pub fn format(&self) -> Result<String> {
        let class = self.class()?;
        let bytes = self.as_bytes().unwrap_or_default();

        let rendered = match class {
            TypeClass::Null => "null".to_string(),
            TypeClass::Integer(width) => {
                let mut buf = itoa::Buffer::new();
                match width {
                    IntWidth::W1 => buf.format(i8::from_ne_bytes(fixed(bytes)?)).to_string(),
                    IntWidth::W2 => buf.format(i16::from_ne_bytes(fixed(bytes)?)).to_string(),
                    IntWidth::W4 => buf.format(i32::from_ne_bytes(fixed(bytes)?)).to_string(),
                    IntWidth::W8 => buf.format(i64::from_ne_bytes(fixed(bytes)?)).to_string(),
                }
            }
            TypeClass::Float(FloatWidth::W4) => f32::from_ne_bytes(fixed(bytes)?).to_string(),
            TypeClass::Float(FloatWidth::W8) => f64::from_ne_bytes(fixed(bytes)?).to_string(),
            TypeClass::Text => {
                // a freshly created text value is all zeros and prints as empty
                let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
                String::from_utf8_lossy(&bytes[..end]).into_owned()
            }
            TypeClass::Binary => {
                let mut out = String::with_capacity(bytes.len() * 3);
                for (i, byte) in bytes.iter().enumerate() {
                    if i > 0 {
                        out.push(' ');
                    }
                    let _ = write!(out, "{:02x}", byte);
                }
                out
            }
        };

        Ok(rendered)
    }

    fn class(&self) -> Result<TypeClass> {
        self.descriptor()?.class()
    }

    fn write_fixed(&mut self, bytes: &[u8]) -> Result<()> {
        match self.data.as_mut() {
            Some(buffer) if buffer.len() == bytes.len() => {
                buffer.copy_from_slice(bytes);
                Ok(())
            }
            other => Err(Error::InvalidLength {
                expected: bytes.len(),
                actual: other.map_or(0, |b| b.len()),
            }),
        }
    }

    fn mismatch(&self, wanted: &str) -> Error {
        Error::InvalidType(format!(
            "cannot store {} in a value of type '{}'",
            wanted,
            self.type_name()
        ))
    }
}

fn fixed<const N: usize>(bytes: &[u8]) -> Result<[u8; N]> {
    bytes.try_into().map_err(|_| Error::InvalidLength {
        expected: N,
        actual: bytes.len(),
    })
}
