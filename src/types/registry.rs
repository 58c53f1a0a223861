use crate::error::{Error, Result};

/// Id reserved for the symbolic NULL type.
pub const NULL_TYPE_ID: u32 = 0x0000;

bitflags::bitflags! {
    /// How the bytes of a value are interpreted.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct TypeFlags: u32 {
        /// Signed integer of the descriptor's width.
        const NUMERIC = 1 << 0;
        /// IEEE-754 float of the descriptor's width.
        const FLOATING = 1 << 1;
        /// UTF-8 text.
        const TEXT = 1 << 2;
        /// Opaque bytes.
        const BINARY = 1 << 3;
        /// No fixed length; the buffer is resized on write.
        const VARLEN = 1 << 4;
    }
}

/// Static metadata describing one value type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TypeDesc {
    pub id: u32,
    pub name: &'static str,
    /// Width in bytes, 0 for variable-length types
    pub length: usize,
    pub flags: TypeFlags,
}

/// Byte width of an integer type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IntWidth {
    W1,
    W2,
    W4,
    W8,
}

/// Byte width of a floating point type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FloatWidth {
    W4,
    W8,
}

/// The capability class a descriptor resolves to.
///
/// Setters and formatting match on this instead of testing flags one by one,
/// so a width that does not fit its class is rejected in a single place.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeClass {
    Null,
    Integer(IntWidth),
    Float(FloatWidth),
    Text,
    Binary,
}

static TYPE_TABLE: [TypeDesc; 10] = [
    TypeDesc {
        id: NULL_TYPE_ID,
        name: "null",
        length: 0,
        flags: TypeFlags::empty(),
    },
    TypeDesc {
        id: 0x0001,
        name: "bit",
        length: 1,
        flags: TypeFlags::NUMERIC,
    },
    TypeDesc {
        id: 0x0002,
        name: "int8",
        length: 1,
        flags: TypeFlags::NUMERIC,
    },
    TypeDesc {
        id: 0x0003,
        name: "int16",
        length: 2,
        flags: TypeFlags::NUMERIC,
    },
    TypeDesc {
        id: 0x0004,
        name: "int32",
        length: 4,
        flags: TypeFlags::NUMERIC,
    },
    TypeDesc {
        id: 0x0005,
        name: "int64",
        length: 8,
        flags: TypeFlags::NUMERIC,
    },
    TypeDesc {
        id: 0x0010,
        name: "float4",
        length: 4,
        flags: TypeFlags::FLOATING,
    },
    TypeDesc {
        id: 0x0011,
        name: "float8",
        length: 8,
        flags: TypeFlags::FLOATING,
    },
    TypeDesc {
        id: 0x0020,
        name: "text",
        length: 0,
        flags: TypeFlags::TEXT.union(TypeFlags::VARLEN),
    },
    TypeDesc {
        id: 0x0030,
        name: "binary",
        length: 0,
        flags: TypeFlags::BINARY.union(TypeFlags::VARLEN),
    },
];

/// All known descriptors, in id order.
pub fn types() -> &'static [TypeDesc] {
    &TYPE_TABLE
}

/// Find a descriptor by id
pub fn lookup_type(id: u32) -> Option<&'static TypeDesc> {
    TYPE_TABLE.iter().find(|desc| desc.id == id)
}

/// Find a descriptor by name
pub fn lookup_type_by_name(name: &str) -> Option<&'static TypeDesc> {
    TYPE_TABLE.iter().find(|desc| desc.name == name)
}

impl TypeDesc {
    pub fn is_null(&self) -> bool {
        self.id == NULL_TYPE_ID
    }

    pub fn is_varlen(&self) -> bool {
        self.flags.contains(TypeFlags::VARLEN)
    }

    /// Resolve the flags and width into a [`TypeClass`].
    pub fn class(&self) -> Result<TypeClass> {
        if self.is_null() {
            return Ok(TypeClass::Null);
        }

        if self.flags.contains(TypeFlags::NUMERIC) {
            let width = match self.length {
                1 => IntWidth::W1,
                2 => IntWidth::W2,
                4 => IntWidth::W4,
                8 => IntWidth::W8,
                n => return Err(self.bad_width(n)),
            };
            Ok(TypeClass::Integer(width))
        } else if self.flags.contains(TypeFlags::FLOATING) {
            let width = match self.length {
                4 => FloatWidth::W4,
                8 => FloatWidth::W8,
                n => return Err(self.bad_width(n)),
            };
            Ok(TypeClass::Float(width))
        } else if self.flags.contains(TypeFlags::TEXT) {
            Ok(TypeClass::Text)
        } else if self.flags.contains(TypeFlags::BINARY) {
            Ok(TypeClass::Binary)
        } else {
            Err(Error::InvalidType(format!(
                "'{}' has no usable capability flags",
                self.name
            )))
        }
    }

    fn bad_width(&self, width: usize) -> Error {
        Error::InvalidType(format!("'{}' has unsupported width {}", self.name, width))
    }
}
