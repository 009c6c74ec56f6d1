//! Endian-aware byte stream serialization
//!
//! The program image negotiates its endianness through a header flag, so both
//! the writer and the reader select a byte order at runtime and may switch it
//! mid-stream (the reader only learns the file's order after the flag byte).

use thiserror::Error;

/// Byte order for multi-byte fields in a program image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ByteOrder {
    /// Least-significant byte first
    LittleEndian,
    /// Most-significant byte first
    BigEndian,
}

impl ByteOrder {
    /// The byte order of the host CPU.
    pub const fn native() -> Self {
        #[cfg(target_endian = "little")]
        {
            ByteOrder::LittleEndian
        }
        #[cfg(target_endian = "big")]
        {
            ByteOrder::BigEndian
        }
    }

    /// Value of the image header's big-endian flag for this order.
    pub const fn flag(self) -> u8 {
        match self {
            ByteOrder::LittleEndian => 0,
            ByteOrder::BigEndian => 1,
        }
    }

    /// Byte order described by the image header's big-endian flag.
    pub const fn from_flag(flag: u8) -> Self {
        if flag == 0 {
            ByteOrder::LittleEndian
        } else {
            ByteOrder::BigEndian
        }
    }
}

/// Errors that can occur while decoding a byte stream.
#[derive(Debug, Error)]
pub enum DecodeError {
    /// Unexpected end of stream
    #[error("unexpected end of stream at offset {0}")]
    UnexpectedEnd(usize),

    /// Invalid UTF-8 string data
    #[error("invalid UTF-8 string at offset {0}")]
    InvalidUtf8(usize),

    /// Invalid magic number
    #[error("invalid magic number: {0:?}, expected \"XPRG_\"")]
    InvalidMagic([u8; 5]),

    /// Unsupported file version
    #[error("unsupported file version: {0:#06x}")]
    UnsupportedVersion(u16),

    /// Invalid value type tag in a table
    #[error("invalid value type tag {tag:#04x} at offset {offset}")]
    InvalidValueType {
        /// The offending tag byte
        tag: u8,
        /// Stream offset of the tag
        offset: usize,
    },
}

macro_rules! write_scalar {
    ($(#[$doc:meta] $name:ident: $ty:ty),+ $(,)?) => {
        $(
            #[$doc]
            pub fn $name(&mut self, value: $ty) {
                match self.byte_order {
                    ByteOrder::LittleEndian => self.write_bytes(&value.to_le_bytes()),
                    ByteOrder::BigEndian => self.write_bytes(&value.to_be_bytes()),
                }
            }
        )+
    };
}

macro_rules! read_scalar {
    ($(#[$doc:meta] $name:ident: $ty:ty),+ $(,)?) => {
        $(
            #[$doc]
            pub fn $name(&mut self) -> Result<$ty, DecodeError> {
                const WIDTH: usize = std::mem::size_of::<$ty>();
                let bytes: [u8; WIDTH] = self
                    .read_bytes(WIDTH)?
                    .try_into()
                    .expect("read_bytes returned the requested width");
                Ok(match self.byte_order {
                    ByteOrder::LittleEndian => <$ty>::from_le_bytes(bytes),
                    ByteOrder::BigEndian => <$ty>::from_be_bytes(bytes),
                })
            }
        )+
    };
}

/// Byte stream writer with a movable cursor.
///
/// Writing past the current end extends the buffer; rewinding and writing
/// again overwrites in place, which is how the two-pass version header is
/// patched after the table offsets are known.
pub struct Serializer {
    buffer: Vec<u8>,
    position: usize,
    byte_order: ByteOrder,
}

impl Serializer {
    /// Create a new writer with the given byte order.
    pub fn new(byte_order: ByteOrder) -> Self {
        Self {
            buffer: Vec::new(),
            position: 0,
            byte_order,
        }
    }

    /// Current byte order.
    pub fn byte_order(&self) -> ByteOrder {
        self.byte_order
    }

    /// Current cursor position.
    pub fn position(&self) -> usize {
        self.position
    }

    /// Move the cursor. Positions beyond the current length are clamped.
    pub fn set_position(&mut self, position: usize) {
        self.position = position.min(self.buffer.len());
    }

    /// Total stream length.
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    /// Whether the stream is empty.
    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// Consume the writer, returning the underlying buffer.
    pub fn into_bytes(self) -> Vec<u8> {
        self.buffer
    }

    /// Borrow the stream contents.
    pub fn as_bytes(&self) -> &[u8] {
        &self.buffer
    }

    /// Write raw bytes at the cursor, overwriting then extending as needed.
    pub fn write_bytes(&mut self, data: &[u8]) {
        let end = self.position + data.len();
        if end > self.buffer.len() {
            self.buffer.resize(end, 0);
        }
        self.buffer[self.position..end].copy_from_slice(data);
        self.position = end;
    }

    /// Write a single byte.
    pub fn write_u8(&mut self, value: u8) {
        self.write_bytes(&[value]);
    }

    /// Write a signed byte.
    pub fn write_i8(&mut self, value: i8) {
        self.write_bytes(&[value as u8]);
    }

    /// Write a boolean as a single 0/1 byte.
    pub fn write_bool(&mut self, value: bool) {
        self.write_u8(u8::from(value));
    }

    write_scalar! {
        /// Write a u16 in the stream byte order
        write_u16: u16,
        /// Write an i16 in the stream byte order
        write_i16: i16,
        /// Write a u32 in the stream byte order
        write_u32: u32,
        /// Write an i32 in the stream byte order
        write_i32: i32,
        /// Write a u64 in the stream byte order
        write_u64: u64,
        /// Write an i64 in the stream byte order
        write_i64: i64,
    }

    /// Write an f32 in the stream byte order.
    pub fn write_f32(&mut self, value: f32) {
        self.write_u32(value.to_bits());
    }

    /// Write an f64 in the stream byte order.
    pub fn write_f64(&mut self, value: f64) {
        self.write_u64(value.to_bits());
    }

    /// Write string bytes followed by a null terminator.
    pub fn write_cstring(&mut self, value: &str) {
        self.write_bytes(value.as_bytes());
        self.write_u8(0);
    }
}

/// Byte stream reader with a movable cursor.
pub struct Deserializer<'a> {
    data: &'a [u8],
    position: usize,
    byte_order: ByteOrder,
}

impl<'a> Deserializer<'a> {
    /// Create a new reader. Multi-byte fields read in native order until
    /// [`Deserializer::set_byte_order`] is called.
    pub fn new(data: &'a [u8]) -> Self {
        Self {
            data,
            position: 0,
            byte_order: ByteOrder::native(),
        }
    }

    /// Switch the byte order for subsequent reads.
    pub fn set_byte_order(&mut self, byte_order: ByteOrder) {
        self.byte_order = byte_order;
    }

    /// Current cursor position.
    pub fn position(&self) -> usize {
        self.position
    }

    /// Move the cursor to an absolute offset.
    pub fn set_position(&mut self, position: usize) -> Result<(), DecodeError> {
        if position > self.data.len() {
            return Err(DecodeError::UnexpectedEnd(position));
        }
        self.position = position;
        Ok(())
    }

    /// Total stream length.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Whether the stream is empty.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Read a raw byte slice.
    pub fn read_bytes(&mut self, count: usize) -> Result<&'a [u8], DecodeError> {
        let end = self
            .position
            .checked_add(count)
            .ok_or(DecodeError::UnexpectedEnd(self.position))?;
        if end > self.data.len() {
            return Err(DecodeError::UnexpectedEnd(self.position));
        }
        let slice = &self.data[self.position..end];
        self.position = end;
        Ok(slice)
    }

    /// Read a single byte.
    pub fn read_u8(&mut self) -> Result<u8, DecodeError> {
        Ok(self.read_bytes(1)?[0])
    }

    /// Read a signed byte.
    pub fn read_i8(&mut self) -> Result<i8, DecodeError> {
        Ok(self.read_u8()? as i8)
    }

    /// Read a boolean encoded as a 0/1 byte.
    pub fn read_bool(&mut self) -> Result<bool, DecodeError> {
        Ok(self.read_u8()? != 0)
    }

    read_scalar! {
        /// Read a u16 in the stream byte order
        read_u16: u16,
        /// Read an i16 in the stream byte order
        read_i16: i16,
        /// Read a u32 in the stream byte order
        read_u32: u32,
        /// Read an i32 in the stream byte order
        read_i32: i32,
        /// Read a u64 in the stream byte order
        read_u64: u64,
        /// Read an i64 in the stream byte order
        read_i64: i64,
    }

    /// Read an f32 in the stream byte order.
    pub fn read_f32(&mut self) -> Result<f32, DecodeError> {
        Ok(f32::from_bits(self.read_u32()?))
    }

    /// Read an f64 in the stream byte order.
    pub fn read_f64(&mut self) -> Result<f64, DecodeError> {
        Ok(f64::from_bits(self.read_u64()?))
    }

    /// Read a null-terminated UTF-8 string.
    pub fn read_cstring(&mut self) -> Result<String, DecodeError> {
        let start = self.position;
        let terminator = self.data[start..]
            .iter()
            .position(|&b| b == 0)
            .ok_or(DecodeError::UnexpectedEnd(start))?;
        let bytes = &self.data[start..start + terminator];
        let text = std::str::from_utf8(bytes).map_err(|_| DecodeError::InvalidUtf8(start))?;
        self.position = start + terminator + 1;
        Ok(text.to_owned())
    }
}
