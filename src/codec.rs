//! Byte-level (de)serialization for [`Object`] values.
//!
//! Every function here operates on caller-owned byte ranges and never
//! allocates on its own; `decode_string` and `decode_object` return slices
//! that borrow from the input buffer. All multi-byte integers are
//! little-endian on the wire, regardless of host endianness.

use byteorder::{ByteOrder, LittleEndian};
use thiserror::Error;

/// Maximum length of a wire string, in bytes.
pub const MAX_STRING_LEN: usize = u16::MAX as usize;

/// Tag byte identifying an [`Object`] variant on the wire.
pub mod tag {
    pub const NIL: u8 = 0;
    pub const INTEGER: u8 = 1;
    pub const DOUBLE: u8 = 2;
    pub const STRING: u8 = 3;
    pub const ARRAY: u8 = 4;
}

/// Tag byte identifying a [`crate::wire::Request`]/[`crate::wire::Response`] command.
pub mod command_tag {
    pub const GET: u8 = 1;
    pub const SET: u8 = 2;
    pub const DELETE: u8 = 3;
    pub const LIST: u8 = 4;
    pub const UNKNOWN: u8 = 5;
}

/// Failures produced while decoding or encoding wire values.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum CodecError {
    /// The destination or source buffer did not have enough room.
    #[error("buffer too small")]
    BufferTooSmall,
    /// A string's encoded length exceeds [`MAX_STRING_LEN`].
    #[error("string too long")]
    StringTooLong,
    /// A tag byte did not match any known variant.
    #[error("invalid type tag")]
    InvalidType,
}

pub type Result<T> = std::result::Result<T, CodecError>;

/// A tagged value, as defined by the wire protocol.
#[derive(Debug, Clone, PartialEq)]
pub enum Object<'a> {
    Nil,
    Integer(i64),
    Double(f64),
    String(&'a [u8]),
    Array(Vec<Object<'a>>),
}

/// An owned counterpart of [`Object`], used where borrowing from the input
/// buffer isn't possible (e.g. values that outlive the read buffer).
#[derive(Debug, Clone, PartialEq)]
pub enum OwnedObject {
    Nil,
    Integer(i64),
    Double(f64),
    String(Vec<u8>),
    Array(Vec<OwnedObject>),
}

impl<'a> Object<'a> {
    pub fn to_owned(&self) -> OwnedObject {
        match self {
            Object::Nil => OwnedObject::Nil,
            Object::Integer(v) => OwnedObject::Integer(*v),
            Object::Double(v) => OwnedObject::Double(*v),
            Object::String(s) => OwnedObject::String(s.to_vec()),
            Object::Array(items) => OwnedObject::Array(items.iter().map(Object::to_owned).collect()),
        }
    }
}

macro_rules! encode_uint {
    ($name:ident, $ty:ty, $write:path) => {
        /// Writes a fixed-width little-endian integer, returning the number of bytes written.
        pub fn $name(buf: &mut [u8], v: $ty) -> Result<usize> {
            let width = std::mem::size_of::<$ty>();
            if buf.len() < width {
                return Err(CodecError::BufferTooSmall);
            }
            $write(&mut buf[..width], v);
            Ok(width)
        }
    };
}

macro_rules! decode_uint {
    ($name:ident, $ty:ty, $read:path) => {
        /// Reads a fixed-width little-endian integer, returning the value and bytes consumed.
        pub fn $name(buf: &[u8]) -> Result<($ty, usize)> {
            let width = std::mem::size_of::<$ty>();
            if buf.len() < width {
                return Err(CodecError::BufferTooSmall);
            }
            Ok(($read(&buf[..width]), width))
        }
    };
}

encode_uint!(encode_u16, u16, LittleEndian::write_u16);
encode_uint!(encode_u32, u32, LittleEndian::write_u32);
encode_uint!(encode_u64, u64, LittleEndian::write_u64);
decode_uint!(decode_u16, u16, LittleEndian::read_u16);
decode_uint!(decode_u32, u32, LittleEndian::read_u32);
decode_uint!(decode_u64, u64, LittleEndian::read_u64);

/// Writes a single byte. Exists alongside the `uN` family for uniformity.
pub fn encode_u8(buf: &mut [u8], v: u8) -> Result<usize> {
    if buf.is_empty() {
        return Err(CodecError::BufferTooSmall);
    }
    buf[0] = v;
    Ok(1)
}

/// Reads a single byte.
pub fn decode_u8(buf: &[u8]) -> Result<(u8, usize)> {
    buf.first().copied().map(|b| (b, 1)).ok_or(CodecError::BufferTooSmall)
}

/// Writes a signed 64-bit integer, little-endian.
pub fn encode_i64(buf: &mut [u8], v: i64) -> Result<usize> {
    encode_u64(buf, v as u64)
}

/// Reads a signed 64-bit integer, little-endian.
pub fn decode_i64(buf: &[u8]) -> Result<(i64, usize)> {
    let (v, n) = decode_u64(buf)?;
    Ok((v as i64, n))
}

/// Writes an IEEE 754 double, little-endian bit-for-bit.
pub fn encode_f64(buf: &mut [u8], v: f64) -> Result<usize> {
    encode_u64(buf, v.to_bits())
}

/// Reads an IEEE 754 double, little-endian bit-for-bit.
pub fn decode_f64(buf: &[u8]) -> Result<(f64, usize)> {
    let (bits, n) = decode_u64(buf)?;
    Ok((f64::from_bits(bits), n))
}

/// Writes a length-prefixed string: a 2-byte little-endian length, then the bytes.
pub fn encode_string(buf: &mut [u8], s: &[u8]) -> Result<usize> {
    if s.len() > MAX_STRING_LEN {
        return Err(CodecError::StringTooLong);
    }
    if buf.len() < 2 + s.len() {
        return Err(CodecError::BufferTooSmall);
    }
    let n = encode_u16(buf, s.len() as u16)?;
    buf[n..n + s.len()].copy_from_slice(s);
    Ok(n + s.len())
}

/// Reads a length-prefixed string, returning a view into `buf` and the bytes consumed.
pub fn decode_string(buf: &[u8]) -> Result<(&[u8], usize)> {
    let (len, n) = decode_u16(buf)?;
    let len = len as usize;
    if buf.len() < n + len {
        return Err(CodecError::BufferTooSmall);
    }
    Ok((&buf[n..n + len], n + len))
}

/// Writes a tag byte identifying an [`Object`] variant.
pub fn encode_object(buf: &mut [u8], obj: &Object<'_>) -> Result<usize> {
    match obj {
        Object::Nil => encode_u8(buf, tag::NIL),
        Object::Integer(v) => {
            let n = encode_u8(buf, tag::INTEGER)?;
            Ok(n + encode_i64(&mut buf[n..], *v)?)
        }
        Object::Double(v) => {
            let n = encode_u8(buf, tag::DOUBLE)?;
            Ok(n + encode_f64(&mut buf[n..], *v)?)
        }
        Object::String(s) => {
            let n = encode_u8(buf, tag::STRING)?;
            Ok(n + encode_string(&mut buf[n..], s)?)
        }
        Object::Array(items) => {
            if items.len() > MAX_STRING_LEN {
                return Err(CodecError::StringTooLong);
            }
            let mut n = encode_u8(buf, tag::ARRAY)?;
            n += encode_u16(&mut buf[n..], items.len() as u16)?;
            for item in items {
                n += encode_object(&mut buf[n..], item)?;
            }
            Ok(n)
        }
    }
}

/// Reads a tagged [`Object`], returning the value (borrowing from `buf` where
/// applicable) and the number of bytes consumed. An unrecognized tag byte
/// yields [`CodecError::InvalidType`] so the caller can fall back to treating
/// the surrounding message as `Unknown`.
pub fn decode_object(buf: &[u8]) -> Result<(Object<'_>, usize)> {
    let (t, mut n) = decode_u8(buf)?;
    match t {
        tag::NIL => Ok((Object::Nil, n)),
        tag::INTEGER => {
            let (v, k) = decode_i64(&buf[n..])?;
            Ok((Object::Integer(v), n + k))
        }
        tag::DOUBLE => {
            let (v, k) = decode_f64(&buf[n..])?;
            Ok((Object::Double(v), n + k))
        }
        tag::STRING => {
            let (s, k) = decode_string(&buf[n..])?;
            Ok((Object::String(s), n + k))
        }
        tag::ARRAY => {
            let (count, k) = decode_u16(&buf[n..])?;
            n += k;
            let mut items = Vec::with_capacity(count as usize);
            for _ in 0..count {
                let (item, k) = decode_object(&buf[n..])?;
                n += k;
                items.push(item);
            }
            Ok((Object::Array(items), n))
        }
        _ => Err(CodecError::InvalidType),
    }
}

/// Writes a command tag byte.
pub fn encode_command_tag(buf: &mut [u8], t: u8) -> Result<usize> {
    encode_u8(buf, t)
}

/// Reads a command tag byte. Returns [`CodecError::InvalidType`] for any
/// value outside `1..=4`, so the caller can build an `Unknown` request from
/// the whole payload.
pub fn decode_command_tag(buf: &[u8]) -> Result<(u8, usize)> {
    let (t, n) = decode_u8(buf)?;
    match t {
        command_tag::GET | command_tag::SET | command_tag::DELETE | command_tag::LIST => Ok((t, n)),
        _ => Err(CodecError::InvalidType),
    }
}
