use crate::value::{Shape, Value, WireValue};
use bytes::{Buf, BufMut, BytesMut};
use std::fmt;
use std::ops::Deref;
use thiserror::Error;
use uuid::Uuid;
use viaduct_nbt::NbtError;

#[derive(Debug, Error)]
pub enum CodecError {
    #[error("VarInt too big")]
    VarIntTooBig,
    #[error("Not enough data")]
    NotEnoughData,
    #[error("String too long: {0} > {1}")]
    StringTooLong(usize, usize),
    #[error("Negative length: {0}")]
    NegativeLength(i32),
    #[error("Value of shape {found} cannot be written as {expected}")]
    ShapeMismatch { expected: Shape, found: Shape },
    #[error("Invalid value: {0}")]
    InvalidValue(String),
    #[error("NBT error: {0}")]
    Nbt(#[from] NbtError),
}

pub type CodecResult<T> = Result<T, CodecError>;

/// Fail with `NotEnoughData` unless `len` bytes remain.
pub fn ensure_remaining(buf: &BytesMut, len: usize) -> CodecResult<()> {
    if buf.remaining() < len {
        return Err(CodecError::NotEnoughData);
    }
    Ok(())
}

/// Read a VarInt from the buffer.
pub fn read_varint(buf: &mut BytesMut) -> CodecResult<i32> {
    let mut result: i32 = 0;
    let mut shift: u32 = 0;
    loop {
        if !buf.has_remaining() {
            return Err(CodecError::NotEnoughData);
        }
        let byte = buf.get_u8();
        result |= ((byte & 0x7F) as i32) << shift;
        if byte & 0x80 == 0 {
            return Ok(result);
        }
        shift += 7;
        if shift >= 35 {
            return Err(CodecError::VarIntTooBig);
        }
    }
}

/// Write a VarInt to the buffer.
pub fn write_varint(buf: &mut BytesMut, mut value: i32) {
    loop {
        let mut byte = (value & 0x7F) as u8;
        value = ((value as u32) >> 7) as i32;
        if value != 0 {
            byte |= 0x80;
        }
        buf.put_u8(byte);
        if value == 0 {
            break;
        }
    }
}

/// Calculate the byte length of a VarInt.
pub fn varint_len(value: i32) -> usize {
    let mut val = value as u32;
    let mut len = 0;
    loop {
        len += 1;
        val >>= 7;
        if val == 0 {
            break;
        }
    }
    len
}

/// Read a VarInt that is used as a length prefix.
pub fn read_length(buf: &mut BytesMut) -> CodecResult<usize> {
    let len = read_varint(buf)?;
    if len < 0 {
        return Err(CodecError::NegativeLength(len));
    }
    Ok(len as usize)
}

/// Read a protocol string (varint-prefixed UTF-8).
pub fn read_string(buf: &mut BytesMut, max_len: usize) -> CodecResult<String> {
    let len = read_length(buf)?;
    if len > max_len * 4 {
        return Err(CodecError::StringTooLong(len, max_len));
    }
    ensure_remaining(buf, len)?;
    let bytes = buf.split_to(len);
    String::from_utf8(bytes.to_vec())
        .map_err(|e| CodecError::InvalidValue(format!("string is not UTF-8: {}", e)))
}

/// Write a protocol string.
pub fn write_string(buf: &mut BytesMut, s: &str) {
    write_varint(buf, s.len() as i32);
    buf.put_slice(s.as_bytes());
}

/// Read a UUID (128 bits, big endian).
pub fn read_uuid(buf: &mut BytesMut) -> CodecResult<Uuid> {
    ensure_remaining(buf, 16)?;
    let mut bytes = [0u8; 16];
    buf.copy_to_slice(&mut bytes);
    Ok(Uuid::from_bytes(bytes))
}

/// Write a UUID.
pub fn write_uuid(buf: &mut BytesMut, uuid: &Uuid) {
    buf.put_slice(uuid.as_bytes());
}

/// A typed reader/writer for one wire value shape.
///
/// Codecs are declared as `static` items and compared by address: two codecs
/// that carry the same Rust type are still different codecs.
pub struct Codec<T: WireValue> {
    name: &'static str,
    read: fn(&mut BytesMut) -> CodecResult<T>,
    write: fn(&mut BytesMut, &T) -> CodecResult<()>,
    convert: Option<fn(&Value) -> Option<T>>,
}

impl<T: WireValue> Codec<T> {
    pub const fn new(
        name: &'static str,
        read: fn(&mut BytesMut) -> CodecResult<T>,
        write: fn(&mut BytesMut, &T) -> CodecResult<()>,
    ) -> Self {
        Self {
            name,
            read,
            write,
            convert: None,
        }
    }

    /// Attach a conversion that adapts values of other shapes to this codec.
    pub const fn with_conversion(self, convert: fn(&Value) -> Option<T>) -> Self {
        Self {
            name: self.name,
            read: self.read,
            write: self.write,
            convert: Some(convert),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn read(&self, buf: &mut BytesMut) -> CodecResult<T> {
        (self.read)(buf)
    }

    pub fn write(&self, buf: &mut BytesMut, value: &T) -> CodecResult<()> {
        (self.write)(buf, value)
    }
}

/// Type-erased view of a [`Codec`], used wherever values are stored as [`Value`].
pub trait AnyCodec: Send + Sync {
    fn name(&self) -> &'static str;

    fn shape(&self) -> Shape;

    fn read_value(&self, buf: &mut BytesMut) -> CodecResult<Value>;

    fn write_value(&self, buf: &mut BytesMut, value: &Value) -> CodecResult<()>;

    /// Adapt a value of another shape. Hands the value back if this codec
    /// has no conversion or the conversion rejects it.
    fn convert_value(&self, value: Value) -> Result<Value, Value>;
}

impl<T: WireValue> AnyCodec for Codec<T> {
    fn name(&self) -> &'static str {
        self.name
    }

    fn shape(&self) -> Shape {
        T::SHAPE
    }

    fn read_value(&self, buf: &mut BytesMut) -> CodecResult<Value> {
        self.read(buf).map(WireValue::into_value)
    }

    fn write_value(&self, buf: &mut BytesMut, value: &Value) -> CodecResult<()> {
        let typed = T::from_ref(value).ok_or(CodecError::ShapeMismatch {
            expected: T::SHAPE,
            found: value.shape(),
        })?;
        self.write(buf, typed)
    }

    fn convert_value(&self, value: Value) -> Result<Value, Value> {
        match self.convert.and_then(|convert| convert(&value)) {
            Some(converted) => Ok(converted.into_value()),
            None => Err(value),
        }
    }
}

/// Identity handle to a static codec.
#[derive(Clone, Copy)]
pub struct CodecRef(&'static dyn AnyCodec);

impl CodecRef {
    pub fn new(codec: &'static dyn AnyCodec) -> Self {
        Self(codec)
    }
}

impl Deref for CodecRef {
    type Target = dyn AnyCodec;

    fn deref(&self) -> &Self::Target {
        self.0
    }
}

impl PartialEq for CodecRef {
    fn eq(&self, other: &Self) -> bool {
        std::ptr::addr_eq(
            self.0 as *const dyn AnyCodec,
            other.0 as *const dyn AnyCodec,
        )
    }
}

impl Eq for CodecRef {}

impl fmt::Debug for CodecRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.0.name())
    }
}

impl<T: WireValue> From<&'static Codec<T>> for CodecRef {
    fn from(codec: &'static Codec<T>) -> Self {
        Self(codec)
    }
}
