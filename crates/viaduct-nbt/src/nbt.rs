use bytes::{Buf, BufMut, BytesMut};
use thiserror::Error;

/// NBT tag type IDs.
pub const TAG_END: u8 = 0;
pub const TAG_BYTE: u8 = 1;
pub const TAG_SHORT: u8 = 2;
pub const TAG_INT: u8 = 3;
pub const TAG_LONG: u8 = 4;
pub const TAG_FLOAT: u8 = 5;
pub const TAG_DOUBLE: u8 = 6;
pub const TAG_BYTE_ARRAY: u8 = 7;
pub const TAG_STRING: u8 = 8;
pub const TAG_LIST: u8 = 9;
pub const TAG_COMPOUND: u8 = 10;
pub const TAG_INT_ARRAY: u8 = 11;
pub const TAG_LONG_ARRAY: u8 = 12;

/// Nesting limit for lists and compounds, matching the vanilla reader.
const MAX_DEPTH: usize = 512;

#[derive(Debug, Error)]
pub enum NbtError {
    #[error("Not enough data")]
    NotEnoughData,
    #[error("Unknown tag type {0}")]
    UnknownTag(u8),
    #[error("Negative length {0}")]
    NegativeLength(i32),
    #[error("Nesting deeper than {0}")]
    TooDeep(usize),
}

pub type NbtResult<T> = Result<T, NbtError>;

/// An NBT value.
#[derive(Debug, Clone, PartialEq)]
pub enum NbtValue {
    Byte(i8),
    Short(i16),
    Int(i32),
    Long(i64),
    Float(f32),
    Double(f64),
    ByteArray(Vec<i8>),
    String(String),
    List(Vec<NbtValue>),
    Compound(Vec<(String, NbtValue)>),
    IntArray(Vec<i32>),
    LongArray(Vec<i64>),
}

impl NbtValue {
    pub fn tag_id(&self) -> u8 {
        match self {
            NbtValue::Byte(_) => TAG_BYTE,
            NbtValue::Short(_) => TAG_SHORT,
            NbtValue::Int(_) => TAG_INT,
            NbtValue::Long(_) => TAG_LONG,
            NbtValue::Float(_) => TAG_FLOAT,
            NbtValue::Double(_) => TAG_DOUBLE,
            NbtValue::ByteArray(_) => TAG_BYTE_ARRAY,
            NbtValue::String(_) => TAG_STRING,
            NbtValue::List(_) => TAG_LIST,
            NbtValue::Compound(_) => TAG_COMPOUND,
            NbtValue::IntArray(_) => TAG_INT_ARRAY,
            NbtValue::LongArray(_) => TAG_LONG_ARRAY,
        }
    }

    /// Look up a child of a compound by name.
    pub fn get(&self, name: &str) -> Option<&NbtValue> {
        match self {
            NbtValue::Compound(entries) => entries
                .iter()
                .find(|(key, _)| key == name)
                .map(|(_, value)| value),
            _ => None,
        }
    }

    /// Set a child of a compound, replacing any child with the same name.
    /// Does nothing on other tag types.
    pub fn insert(&mut self, name: &str, value: NbtValue) {
        if let NbtValue::Compound(entries) = self {
            match entries.iter_mut().find(|(key, _)| key == name) {
                Some((_, existing)) => *existing = value,
                None => entries.push((name.to_string(), value)),
            }
        }
    }

    /// Remove a child of a compound by name.
    pub fn remove(&mut self, name: &str) -> Option<NbtValue> {
        match self {
            NbtValue::Compound(entries) => {
                let position = entries.iter().position(|(key, _)| key == name)?;
                Some(entries.remove(position).1)
            }
            _ => None,
        }
    }

    /// Write this value as a full named root tag (1.8 item and file format).
    pub fn write_root_named(&self, name: &str, buf: &mut BytesMut) {
        buf.put_u8(self.tag_id());
        write_nbt_string(name, buf);
        self.write_payload(buf);
    }

    /// Write just the payload (no tag type or name).
    pub fn write_payload(&self, buf: &mut BytesMut) {
        match self {
            NbtValue::Byte(v) => buf.put_i8(*v),
            NbtValue::Short(v) => buf.put_i16(*v),
            NbtValue::Int(v) => buf.put_i32(*v),
            NbtValue::Long(v) => buf.put_i64(*v),
            NbtValue::Float(v) => buf.put_f32(*v),
            NbtValue::Double(v) => buf.put_f64(*v),
            NbtValue::ByteArray(v) => {
                buf.put_i32(v.len() as i32);
                for b in v {
                    buf.put_i8(*b);
                }
            }
            NbtValue::String(v) => {
                write_nbt_string(v, buf);
            }
            NbtValue::List(v) => {
                if v.is_empty() {
                    buf.put_u8(TAG_END);
                    buf.put_i32(0);
                } else {
                    buf.put_u8(v[0].tag_id());
                    buf.put_i32(v.len() as i32);
                    for item in v {
                        item.write_payload(buf);
                    }
                }
            }
            NbtValue::Compound(entries) => {
                for (name, value) in entries {
                    buf.put_u8(value.tag_id());
                    write_nbt_string(name, buf);
                    value.write_payload(buf);
                }
                buf.put_u8(TAG_END);
            }
            NbtValue::IntArray(v) => {
                buf.put_i32(v.len() as i32);
                for i in v {
                    buf.put_i32(*i);
                }
            }
            NbtValue::LongArray(v) => {
                buf.put_i32(v.len() as i32);
                for l in v {
                    buf.put_i64(*l);
                }
            }
        }
    }

    /// Read a named root tag. Returns `None` when the root is `TAG_END`,
    /// which is how an absent tag is encoded inside item slots.
    pub fn read_root_named(buf: &mut BytesMut) -> NbtResult<Option<(String, NbtValue)>> {
        let tag = read_u8(buf)?;
        if tag == TAG_END {
            return Ok(None);
        }
        let name = read_nbt_string(buf)?;
        let value = read_payload(tag, buf, 0)?;
        Ok(Some((name, value)))
    }
}

fn write_nbt_string(s: &str, buf: &mut BytesMut) {
    let bytes = s.as_bytes();
    buf.put_u16(bytes.len() as u16);
    buf.put_slice(bytes);
}

fn ensure(buf: &BytesMut, len: usize) -> NbtResult<()> {
    if buf.remaining() < len {
        return Err(NbtError::NotEnoughData);
    }
    Ok(())
}

fn read_u8(buf: &mut BytesMut) -> NbtResult<u8> {
    ensure(buf, 1)?;
    Ok(buf.get_u8())
}

fn read_len(buf: &mut BytesMut) -> NbtResult<usize> {
    ensure(buf, 4)?;
    let len = buf.get_i32();
    if len < 0 {
        return Err(NbtError::NegativeLength(len));
    }
    Ok(len as usize)
}

fn read_nbt_string(buf: &mut BytesMut) -> NbtResult<String> {
    ensure(buf, 2)?;
    let len = buf.get_u16() as usize;
    ensure(buf, len)?;
    let bytes = buf.split_to(len);
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

fn read_payload(tag: u8, buf: &mut BytesMut, depth: usize) -> NbtResult<NbtValue> {
    if depth > MAX_DEPTH {
        return Err(NbtError::TooDeep(MAX_DEPTH));
    }
    let value = match tag {
        TAG_BYTE => {
            ensure(buf, 1)?;
            NbtValue::Byte(buf.get_i8())
        }
        TAG_SHORT => {
            ensure(buf, 2)?;
            NbtValue::Short(buf.get_i16())
        }
        TAG_INT => {
            ensure(buf, 4)?;
            NbtValue::Int(buf.get_i32())
        }
        TAG_LONG => {
            ensure(buf, 8)?;
            NbtValue::Long(buf.get_i64())
        }
        TAG_FLOAT => {
            ensure(buf, 4)?;
            NbtValue::Float(buf.get_f32())
        }
        TAG_DOUBLE => {
            ensure(buf, 8)?;
            NbtValue::Double(buf.get_f64())
        }
        TAG_BYTE_ARRAY => {
            let len = read_len(buf)?;
            ensure(buf, len)?;
            NbtValue::ByteArray((0..len).map(|_| buf.get_i8()).collect())
        }
        TAG_STRING => NbtValue::String(read_nbt_string(buf)?),
        TAG_LIST => {
            let element = read_u8(buf)?;
            let len = read_len(buf)?;
            let mut items = Vec::with_capacity(len.min(1024));
            for _ in 0..len {
                items.push(read_payload(element, buf, depth + 1)?);
            }
            NbtValue::List(items)
        }
        TAG_COMPOUND => {
            let mut entries = Vec::new();
            loop {
                let child = read_u8(buf)?;
                if child == TAG_END {
                    break;
                }
                let name = read_nbt_string(buf)?;
                entries.push((name, read_payload(child, buf, depth + 1)?));
            }
            NbtValue::Compound(entries)
        }
        TAG_INT_ARRAY => {
            let len = read_len(buf)?;
            ensure(buf, len * 4)?;
            NbtValue::IntArray((0..len).map(|_| buf.get_i32()).collect())
        }
        TAG_LONG_ARRAY => {
            let len = read_len(buf)?;
            ensure(buf, len * 8)?;
            NbtValue::LongArray((0..len).map(|_| buf.get_i64()).collect())
        }
        other => return Err(NbtError::UnknownTag(other)),
    };
    Ok(value)
}

/// Helper macro for building compound tags.
#[macro_export]
macro_rules! nbt_compound {
    ($($key:expr => $val:expr),* $(,)?) => {
        $crate::NbtValue::Compound(vec![
            $(($key.into(), $val)),*
        ])
    };
}

/// Helper macro for building list tags.
#[macro_export]
macro_rules! nbt_list {
    ($($val:expr),* $(,)?) => {
        $crate::NbtValue::List(vec![$($val),*])
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_named_compound() {
        let nbt = nbt_compound! {
            "display" => nbt_compound! {
                "Name" => NbtValue::String("Excalibur".into()),
                "Lore" => nbt_list![NbtValue::String("old".into())],
            },
            "HideFlags" => NbtValue::Int(63),
        };
        let mut buf = BytesMut::new();
        nbt.write_root_named("", &mut buf);
        assert_eq!(buf[0], TAG_COMPOUND);

        let (name, read) = NbtValue::read_root_named(&mut buf).unwrap().unwrap();
        assert_eq!(name, "");
        assert_eq!(read, nbt);
        assert!(buf.is_empty());
    }

    #[test]
    fn test_end_tag_is_absent() {
        let mut buf = BytesMut::from(&[TAG_END][..]);
        assert!(NbtValue::read_root_named(&mut buf).unwrap().is_none());
    }

    #[test]
    fn test_truncated_input() {
        let nbt = nbt_compound! { "value" => NbtValue::Long(7) };
        let mut buf = BytesMut::new();
        nbt.write_root_named("root", &mut buf);
        let mut cut = buf.split_to(buf.len() - 3);
        assert!(matches!(
            NbtValue::read_root_named(&mut cut),
            Err(NbtError::NotEnoughData)
        ));
    }

    #[test]
    fn test_compound_lookup() {
        let nbt = nbt_compound! { "ench" => NbtValue::Short(1) };
        assert_eq!(nbt.get("ench"), Some(&NbtValue::Short(1)));
        assert_eq!(nbt.get("missing"), None);
    }

    #[test]
    fn test_insert_and_remove() {
        let mut nbt = nbt_compound! { "a" => NbtValue::Int(1) };
        nbt.insert("a", NbtValue::Int(2));
        nbt.insert("b", NbtValue::String("x".into()));
        assert_eq!(nbt.get("a"), Some(&NbtValue::Int(2)));
        assert_eq!(nbt.remove("b"), Some(NbtValue::String("x".into())));
        assert_eq!(nbt.remove("b"), None);
    }

    #[test]
    fn test_long_array() {
        let nbt = NbtValue::LongArray(vec![1, 2, 3]);
        let mut buf = BytesMut::new();
        nbt.write_payload(&mut buf);
        // 4 bytes length (3) + 3 * 8 bytes = 28 bytes
        assert_eq!(buf.len(), 28);
    }
}
