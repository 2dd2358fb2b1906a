//! Standard codec singletons shared by every rule set.

use crate::codec::*;
use crate::value::Shape;
use bytes::{Buf, BufMut, BytesMut};
use uuid::Uuid;
use viaduct_nbt::{NbtValue, TAG_END};
use viaduct_types::{BlockPos, ItemStack};

/// Longest string vanilla accepts.
pub const MAX_STRING_LEN: usize = 32767;

/// Reads nothing, writes nothing. Accepts any value on write.
pub static NOTHING: Codec<()> =
    Codec::new("Nothing", |_| Ok(()), |_, _| Ok(())).with_conversion(|_| Some(()));

pub static BOOLEAN: Codec<bool> = Codec::new(
    "Boolean",
    |buf| {
        ensure_remaining(buf, 1)?;
        Ok(buf.get_u8() != 0)
    },
    |buf, v| {
        buf.put_u8(*v as u8);
        Ok(())
    },
)
.with_conversion(|v| v.as_i64().map(|n| n != 0));

pub static BYTE: Codec<i8> = Codec::new(
    "Byte",
    |buf| {
        ensure_remaining(buf, 1)?;
        Ok(buf.get_i8())
    },
    |buf, v| {
        buf.put_i8(*v);
        Ok(())
    },
)
.with_conversion(|v| v.as_i64().map(|n| n as i8));

pub static UNSIGNED_BYTE: Codec<u8> = Codec::new(
    "UnsignedByte",
    |buf| {
        ensure_remaining(buf, 1)?;
        Ok(buf.get_u8())
    },
    |buf, v| {
        buf.put_u8(*v);
        Ok(())
    },
)
.with_conversion(|v| v.as_i64().map(|n| n as u8));

pub static SHORT: Codec<i16> = Codec::new(
    "Short",
    |buf| {
        ensure_remaining(buf, 2)?;
        Ok(buf.get_i16())
    },
    |buf, v| {
        buf.put_i16(*v);
        Ok(())
    },
)
.with_conversion(|v| v.as_i64().map(|n| n as i16));

pub static INT: Codec<i32> = Codec::new(
    "Int",
    |buf| {
        ensure_remaining(buf, 4)?;
        Ok(buf.get_i32())
    },
    |buf, v| {
        buf.put_i32(*v);
        Ok(())
    },
)
.with_conversion(|v| v.as_i64().map(|n| n as i32));

pub static VAR_INT: Codec<i32> = Codec::new("VarInt", read_varint, |buf, v| {
    write_varint(buf, *v);
    Ok(())
})
.with_conversion(|v| v.as_i64().map(|n| n as i32));

pub static LONG: Codec<i64> = Codec::new(
    "Long",
    |buf| {
        ensure_remaining(buf, 8)?;
        Ok(buf.get_i64())
    },
    |buf, v| {
        buf.put_i64(*v);
        Ok(())
    },
)
.with_conversion(|v| v.as_i64());

pub static FLOAT: Codec<f32> = Codec::new(
    "Float",
    |buf| {
        ensure_remaining(buf, 4)?;
        Ok(buf.get_f32())
    },
    |buf, v| {
        buf.put_f32(*v);
        Ok(())
    },
)
.with_conversion(|v| v.as_f64().map(|n| n as f32));

pub static DOUBLE: Codec<f64> = Codec::new(
    "Double",
    |buf| {
        ensure_remaining(buf, 8)?;
        Ok(buf.get_f64())
    },
    |buf, v| {
        buf.put_f64(*v);
        Ok(())
    },
)
.with_conversion(|v| v.as_f64());

pub static STRING: Codec<String> = Codec::new(
    "String",
    |buf| read_string(buf, MAX_STRING_LEN),
    |buf, v| {
        write_string(buf, v);
        Ok(())
    },
);

pub static UUID: Codec<Uuid> = Codec::new("UUID", read_uuid, |buf, v| {
    write_uuid(buf, v);
    Ok(())
});

pub static POSITION: Codec<BlockPos> = Codec::new(
    "Position",
    |buf| {
        ensure_remaining(buf, 8)?;
        Ok(BlockPos::decode(buf.get_u64()))
    },
    |buf, v| {
        buf.put_u64(v.encode());
        Ok(())
    },
);

/// Item slot: short id (-1 = empty), byte count, short damage, named NBT root.
pub static ITEM: Codec<Option<ItemStack>> = Codec::new("Item", read_item, write_item);

pub static VAR_INT_ARRAY: Codec<Vec<i32>> = Codec::new(
    "VarIntArray",
    |buf| {
        let len = read_length(buf)?;
        let mut values = Vec::with_capacity(len.min(buf.remaining()));
        for _ in 0..len {
            values.push(read_varint(buf)?);
        }
        Ok(values)
    },
    |buf, v| {
        write_varint(buf, v.len() as i32);
        for value in v {
            write_varint(buf, *value);
        }
        Ok(())
    },
);

pub static STRING_ARRAY: Codec<Vec<String>> = Codec::new(
    "StringArray",
    |buf| {
        let len = read_length(buf)?;
        let mut values = Vec::with_capacity(len.min(buf.remaining()));
        for _ in 0..len {
            values.push(read_string(buf, MAX_STRING_LEN)?);
        }
        Ok(values)
    },
    |buf, v| {
        write_varint(buf, v.len() as i32);
        for value in v {
            write_string(buf, value);
        }
        Ok(())
    },
);

/// Everything left in the payload.
pub static REMAINING_BYTES: Codec<Vec<u8>> = Codec::new(
    "RemainingBytes",
    |buf| {
        let len = buf.remaining();
        Ok(buf.split_to(len).to_vec())
    },
    |buf, v| {
        buf.put_slice(v);
        Ok(())
    },
);

/// The codec that writes a value of `shape` without conversion, for values
/// that reach serialization under a codec of another shape. Metadata lists
/// are version specific and have no codec here.
pub fn natural_codec(shape: Shape) -> Option<CodecRef> {
    let codec = match shape {
        Shape::Nothing => CodecRef::from(&NOTHING),
        Shape::Bool => CodecRef::from(&BOOLEAN),
        Shape::Byte => CodecRef::from(&BYTE),
        Shape::UByte => CodecRef::from(&UNSIGNED_BYTE),
        Shape::Short => CodecRef::from(&SHORT),
        Shape::Int => CodecRef::from(&INT),
        Shape::Long => CodecRef::from(&LONG),
        Shape::Float => CodecRef::from(&FLOAT),
        Shape::Double => CodecRef::from(&DOUBLE),
        Shape::String => CodecRef::from(&STRING),
        Shape::Uuid => CodecRef::from(&UUID),
        Shape::Position => CodecRef::from(&POSITION),
        Shape::Item => CodecRef::from(&ITEM),
        Shape::IntArray => CodecRef::from(&VAR_INT_ARRAY),
        Shape::StringArray => CodecRef::from(&STRING_ARRAY),
        Shape::Bytes => CodecRef::from(&REMAINING_BYTES),
        Shape::Metadata => return None,
    };
    Some(codec)
}

pub fn read_item(buf: &mut BytesMut) -> CodecResult<Option<ItemStack>> {
    ensure_remaining(buf, 2)?;
    let id = buf.get_i16();
    if id < 0 {
        return Ok(None);
    }
    ensure_remaining(buf, 3)?;
    let count = buf.get_i8();
    let damage = buf.get_i16();
    let tag = NbtValue::read_root_named(buf)?.map(|(_, tag)| tag);
    Ok(Some(ItemStack {
        id,
        count,
        damage,
        tag,
    }))
}

pub fn write_item(buf: &mut BytesMut, item: &Option<ItemStack>) -> CodecResult<()> {
    match item {
        None => buf.put_i16(-1),
        Some(item) => {
            buf.put_i16(item.id);
            buf.put_i8(item.count);
            buf.put_i16(item.damage);
            match &item.tag {
                Some(tag) => tag.write_root_named("", buf),
                None => buf.put_u8(TAG_END),
            }
        }
    }
    Ok(())
}
