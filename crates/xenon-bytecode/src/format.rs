//! On-disk program image format
//!
//! Layout:
//!
//! ```text
//! magic[5]      = "XPRG_"
//! reserved[1]   = 0x00
//! bigEndianFlag : u8 (0=LE, 1=BE)
//! fileVersion   : u16              ; currently 0x0001
//! -- version header, u32 each --
//! dependencyTableOffset, dependencyTableLength
//! objectTableOffset,     objectTableLength
//! constantTableOffset,   constantTableLength
//! globalTableOffset,     globalTableLength
//! functionTableOffset,   functionTableLength
//! bytecodeOffset,        bytecodeLength
//! -- tables at their declared offsets --
//! ```
//!
//! All multi-byte fields after the big-endian flag obey it. Each function's
//! bytecode body is zero-padded to a 64-byte boundary so entry addresses align
//! for the interpreter's instruction fetch.

use crate::serializer::{ByteOrder, DecodeError, Deserializer, Serializer};
use xenon_core::ValueType;

/// Magic number identifying a Xenon program image.
pub const MAGIC: [u8; 5] = *b"XPRG_";

/// Current program file version.
pub const FILE_VERSION: u16 = 0x0001;

/// Alignment applied to the end of each function's bytecode body.
pub const FUNCTION_ALIGNMENT: usize = 64;

/// A constant table entry. Object values cannot appear in the constant table,
/// which the type encodes by omission.
#[derive(Debug, Clone, PartialEq)]
pub enum Constant {
    /// Null value
    Null,
    /// Boolean value
    Bool(bool),
    /// 8-bit signed integer
    Int8(i8),
    /// 16-bit signed integer
    Int16(i16),
    /// 32-bit signed integer
    Int32(i32),
    /// 64-bit signed integer
    Int64(i64),
    /// 8-bit unsigned integer
    Uint8(u8),
    /// 16-bit unsigned integer
    Uint16(u16),
    /// 32-bit unsigned integer
    Uint32(u32),
    /// 64-bit unsigned integer
    Uint64(u64),
    /// 32-bit IEEE-754 float
    Float32(f32),
    /// 64-bit IEEE-754 float
    Float64(f64),
    /// UTF-8 string
    String(String),
}

impl Constant {
    /// The value type tag written ahead of the payload.
    pub fn value_type(&self) -> ValueType {
        match self {
            Constant::Null => ValueType::Null,
            Constant::Bool(_) => ValueType::Bool,
            Constant::Int8(_) => ValueType::Int8,
            Constant::Int16(_) => ValueType::Int16,
            Constant::Int32(_) => ValueType::Int32,
            Constant::Int64(_) => ValueType::Int64,
            Constant::Uint8(_) => ValueType::Uint8,
            Constant::Uint16(_) => ValueType::Uint16,
            Constant::Uint32(_) => ValueType::Uint32,
            Constant::Uint64(_) => ValueType::Uint64,
            Constant::Float32(_) => ValueType::Float32,
            Constant::Float64(_) => ValueType::Float64,
            Constant::String(_) => ValueType::String,
        }
    }

    pub(crate) fn encode(&self, writer: &mut Serializer) {
        writer.write_u8(self.value_type().to_u8());
        match self {
            Constant::Null => {}
            Constant::Bool(v) => writer.write_bool(*v),
            Constant::Int8(v) => writer.write_i8(*v),
            Constant::Int16(v) => writer.write_i16(*v),
            Constant::Int32(v) => writer.write_i32(*v),
            Constant::Int64(v) => writer.write_i64(*v),
            Constant::Uint8(v) => writer.write_u8(*v),
            Constant::Uint16(v) => writer.write_u16(*v),
            Constant::Uint32(v) => writer.write_u32(*v),
            Constant::Uint64(v) => writer.write_u64(*v),
            Constant::Float32(v) => writer.write_f32(*v),
            Constant::Float64(v) => writer.write_f64(*v),
            Constant::String(v) => writer.write_cstring(v),
        }
    }

    pub(crate) fn decode(reader: &mut Deserializer<'_>) -> Result<Self, DecodeError> {
        let tag_offset = reader.position();
        let tag = reader.read_u8()?;
        let value_type = ValueType::from_u8(tag).ok_or(DecodeError::InvalidValueType {
            tag,
            offset: tag_offset,
        })?;

        Ok(match value_type {
            ValueType::Null => Constant::Null,
            ValueType::Bool => Constant::Bool(reader.read_bool()?),
            ValueType::Int8 => Constant::Int8(reader.read_i8()?),
            ValueType::Int16 => Constant::Int16(reader.read_i16()?),
            ValueType::Int32 => Constant::Int32(reader.read_i32()?),
            ValueType::Int64 => Constant::Int64(reader.read_i64()?),
            ValueType::Uint8 => Constant::Uint8(reader.read_u8()?),
            ValueType::Uint16 => Constant::Uint16(reader.read_u16()?),
            ValueType::Uint32 => Constant::Uint32(reader.read_u32()?),
            ValueType::Uint64 => Constant::Uint64(reader.read_u64()?),
            ValueType::Float32 => Constant::Float32(reader.read_f32()?),
            ValueType::Float64 => Constant::Float64(reader.read_f64()?),
            ValueType::String => Constant::String(reader.read_cstring()?),
            ValueType::Array | ValueType::Object => {
                return Err(DecodeError::InvalidValueType {
                    tag,
                    offset: tag_offset,
                })
            }
        })
    }
}

/// Object schema table entry.
#[derive(Debug, Clone, PartialEq)]
pub struct ObjectTypeEntry {
    /// Fully qualified type name
    pub name: String,
    /// Member definitions in binding-index order
    pub members: Vec<(String, ValueType)>,
}

/// Function table entry.
#[derive(Debug, Clone, PartialEq)]
pub struct FunctionEntry {
    /// Canonical signature string
    pub signature: String,
    /// Whether the body is supplied by the host at runtime
    pub is_native: bool,
    /// Number of parameters
    pub num_params: u16,
    /// Number of return values
    pub num_returns: u16,
    /// Bytecode range start (script functions only)
    pub offset_start: u32,
    /// Bytecode range end, exclusive (script functions only)
    pub offset_end: u32,
    /// Local variable name → constant index (script functions only)
    pub locals: Vec<(String, u32)>,
}

/// In-memory form of a decoded program image.
#[derive(Debug, Clone)]
pub struct ProgramImage {
    /// Byte order declared by the image header
    pub byte_order: ByteOrder,
    /// Declared dependency program names
    pub dependencies: Vec<String>,
    /// Object schema definitions
    pub object_types: Vec<ObjectTypeEntry>,
    /// Constant table
    pub constants: Vec<Constant>,
    /// Global variable name → constant index
    pub globals: Vec<(String, u32)>,
    /// Function definitions
    pub functions: Vec<FunctionEntry>,
    /// Contiguous bytecode for all script functions
    pub bytecode: Vec<u8>,
}

struct VersionHeader {
    dependency_table: (u32, u32),
    object_table: (u32, u32),
    constant_table: (u32, u32),
    global_table: (u32, u32),
    function_table: (u32, u32),
    bytecode: (u32, u32),
}

impl VersionHeader {
    fn decode(reader: &mut Deserializer<'_>) -> Result<Self, DecodeError> {
        let mut pair = || -> Result<(u32, u32), DecodeError> {
            Ok((reader.read_u32()?, reader.read_u32()?))
        };
        Ok(Self {
            dependency_table: pair()?,
            object_table: pair()?,
            constant_table: pair()?,
            global_table: pair()?,
            function_table: pair()?,
            bytecode: pair()?,
        })
    }
}

impl ProgramImage {
    /// Decode a program image from its serialized bytes.
    ///
    /// The magic and reserved bytes are read natively; the reader switches to
    /// the declared byte order after the big-endian flag, so every multi-byte
    /// field that follows is converted as needed.
    pub fn decode(data: &[u8]) -> Result<Self, DecodeError> {
        let mut reader = Deserializer::new(data);

        let magic: [u8; 5] = reader
            .read_bytes(MAGIC.len())?
            .try_into()
            .expect("magic width");
        if magic != MAGIC {
            return Err(DecodeError::InvalidMagic(magic));
        }

        // Reserved header byte.
        reader.read_u8()?;

        let byte_order = ByteOrder::from_flag(reader.read_u8()?);
        reader.set_byte_order(byte_order);

        let version = reader.read_u16()?;
        if version != FILE_VERSION {
            return Err(DecodeError::UnsupportedVersion(version));
        }

        let header = VersionHeader::decode(&mut reader)?;

        reader.set_position(header.dependency_table.0 as usize)?;
        let mut dependencies = Vec::with_capacity(header.dependency_table.1 as usize);
        for _ in 0..header.dependency_table.1 {
            dependencies.push(reader.read_cstring()?);
        }

        reader.set_position(header.object_table.0 as usize)?;
        let mut object_types = Vec::with_capacity(header.object_table.1 as usize);
        for _ in 0..header.object_table.1 {
            let name = reader.read_cstring()?;
            let member_count = reader.read_u32()?;
            let mut members = Vec::with_capacity(member_count as usize);
            for _ in 0..member_count {
                let member_name = reader.read_cstring()?;
                let tag_offset = reader.position();
                let tag = reader.read_u8()?;
                let value_type =
                    ValueType::from_u8(tag).ok_or(DecodeError::InvalidValueType {
                        tag,
                        offset: tag_offset,
                    })?;
                members.push((member_name, value_type));
            }
            object_types.push(ObjectTypeEntry { name, members });
        }

        reader.set_position(header.constant_table.0 as usize)?;
        let mut constants = Vec::with_capacity(header.constant_table.1 as usize);
        for _ in 0..header.constant_table.1 {
            constants.push(Constant::decode(&mut reader)?);
        }

        reader.set_position(header.global_table.0 as usize)?;
        let mut globals = Vec::with_capacity(header.global_table.1 as usize);
        for _ in 0..header.global_table.1 {
            let name = reader.read_cstring()?;
            let constant_index = reader.read_u32()?;
            globals.push((name, constant_index));
        }

        reader.set_position(header.function_table.0 as usize)?;
        let mut functions = Vec::with_capacity(header.function_table.1 as usize);
        for _ in 0..header.function_table.1 {
            let signature = reader.read_cstring()?;
            let is_native = reader.read_bool()?;
            let num_params = reader.read_u16()?;
            let num_returns = reader.read_u16()?;

            let mut entry = FunctionEntry {
                signature,
                is_native,
                num_params,
                num_returns,
                offset_start: 0,
                offset_end: 0,
                locals: Vec::new(),
            };

            if !is_native {
                entry.offset_start = reader.read_u32()?;
                entry.offset_end = reader.read_u32()?;
                let local_count = reader.read_u32()?;
                entry.locals.reserve(local_count as usize);
                for _ in 0..local_count {
                    let name = reader.read_cstring()?;
                    let constant_index = reader.read_u32()?;
                    entry.locals.push((name, constant_index));
                }
            }

            functions.push(entry);
        }

        reader.set_position(header.bytecode.0 as usize)?;
        let bytecode = reader.read_bytes(header.bytecode.1 as usize)?.to_vec();

        Ok(Self {
            byte_order,
            dependencies,
            object_types,
            constants,
            globals,
            functions,
            bytecode,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_magic() {
        let data = b"NOPE_\x00\x00\x01\x00";
        assert!(matches!(
            ProgramImage::decode(data),
            Err(DecodeError::InvalidMagic(_))
        ));
    }

    #[test]
    fn test_unsupported_version() {
        let mut data = Vec::new();
        data.extend_from_slice(&MAGIC);
        data.push(0); // reserved
        data.push(0); // little-endian
        data.extend_from_slice(&0x7777u16.to_le_bytes());
        assert!(matches!(
            ProgramImage::decode(&data),
            Err(DecodeError::UnsupportedVersion(0x7777))
        ));
    }

    #[test]
    fn test_truncated_header() {
        let data = &MAGIC[..3];
        assert!(matches!(
            ProgramImage::decode(data),
            Err(DecodeError::UnexpectedEnd(_))
        ));
    }

    #[test]
    fn test_constant_tag_rejects_object() {
        let mut writer = Serializer::new(ByteOrder::LittleEndian);
        writer.write_u8(ValueType::Object.to_u8());
        let bytes = writer.into_bytes();
        let mut reader = Deserializer::new(&bytes);
        assert!(matches!(
            Constant::decode(&mut reader),
            Err(DecodeError::InvalidValueType { .. })
        ));
    }
}
