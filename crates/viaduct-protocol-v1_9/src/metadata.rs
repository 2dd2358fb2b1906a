//! Entity metadata: the 1.8 and 1.9 wire formats and the per-entity rules.

use crate::items;
use bytes::{Buf, BufMut, BytesMut};
use viaduct_protocol_core::types::{read_item, write_item, MAX_STRING_LEN};
use viaduct_protocol_core::{
    ensure_remaining, read_string, read_varint, write_string, write_varint, Codec, CodecError,
    CodecResult,
};
use viaduct_types::{BlockPos, EntityType, MetaValue, Metadata};

const END_1_8: u8 = 0x7F;
const END_1_9: u8 = 0xFF;

/// 1.8 list: `type << 5 | index` header per entry, `0x7F` terminator.
pub static METADATA_LIST_1_8: Codec<Vec<Metadata>> =
    Codec::new("MetadataList1_8", read_list_1_8, write_list_1_8);

/// 1.9 list: index byte, type byte and value per entry, `0xFF` terminator.
pub static METADATA_LIST_1_9: Codec<Vec<Metadata>> =
    Codec::new("MetadataList1_9", read_list_1_9, write_list_1_9);

fn read_list_1_8(buf: &mut BytesMut) -> CodecResult<Vec<Metadata>> {
    let mut list = Vec::new();
    loop {
        ensure_remaining(buf, 1)?;
        let header = buf.get_u8();
        if header == END_1_8 {
            return Ok(list);
        }
        let index = header & 0x1F;
        let value = match header >> 5 {
            0 => {
                ensure_remaining(buf, 1)?;
                MetaValue::Byte(buf.get_i8())
            }
            1 => {
                ensure_remaining(buf, 2)?;
                MetaValue::Short(buf.get_i16())
            }
            2 => {
                ensure_remaining(buf, 4)?;
                MetaValue::Int(buf.get_i32())
            }
            3 => {
                ensure_remaining(buf, 4)?;
                MetaValue::Float(buf.get_f32())
            }
            4 => MetaValue::String(read_string(buf, MAX_STRING_LEN)?),
            5 => MetaValue::Slot(read_item(buf)?),
            6 => {
                ensure_remaining(buf, 12)?;
                MetaValue::Vector(buf.get_i32(), buf.get_i32(), buf.get_i32())
            }
            // only 3 bits, so 7 is the last type
            _ => {
                ensure_remaining(buf, 12)?;
                MetaValue::Rotation(buf.get_f32(), buf.get_f32(), buf.get_f32())
            }
        };
        list.push(Metadata::new(index, value));
    }
}

fn write_list_1_8(buf: &mut BytesMut, list: &Vec<Metadata>) -> CodecResult<()> {
    for meta in list {
        let type_id: u8 = match &meta.value {
            MetaValue::Byte(_) => 0,
            MetaValue::Short(_) => 1,
            MetaValue::Int(_) => 2,
            MetaValue::Float(_) => 3,
            MetaValue::String(_) => 4,
            MetaValue::Slot(_) => 5,
            MetaValue::Vector(..) => 6,
            MetaValue::Rotation(..) => 7,
            other => return Err(unwritable("1.8", meta.index, other)),
        };
        buf.put_u8(type_id << 5 | (meta.index & 0x1F));
        match &meta.value {
            MetaValue::Byte(v) => buf.put_i8(*v),
            MetaValue::Short(v) => buf.put_i16(*v),
            MetaValue::Int(v) => buf.put_i32(*v),
            MetaValue::Float(v) => buf.put_f32(*v),
            MetaValue::String(v) => write_string(buf, v),
            MetaValue::Slot(item) => write_item(buf, item)?,
            MetaValue::Vector(x, y, z) => {
                buf.put_i32(*x);
                buf.put_i32(*y);
                buf.put_i32(*z);
            }
            MetaValue::Rotation(x, y, z) => {
                buf.put_f32(*x);
                buf.put_f32(*y);
                buf.put_f32(*z);
            }
            _ => {}
        }
    }
    buf.put_u8(END_1_8);
    Ok(())
}

fn read_list_1_9(buf: &mut BytesMut) -> CodecResult<Vec<Metadata>> {
    let mut list = Vec::new();
    loop {
        ensure_remaining(buf, 1)?;
        let index = buf.get_u8();
        if index == END_1_9 {
            return Ok(list);
        }
        ensure_remaining(buf, 1)?;
        let value = match buf.get_u8() {
            0 => {
                ensure_remaining(buf, 1)?;
                MetaValue::Byte(buf.get_i8())
            }
            1 => MetaValue::VarInt(read_varint(buf)?),
            2 => {
                ensure_remaining(buf, 4)?;
                MetaValue::Float(buf.get_f32())
            }
            3 => MetaValue::String(read_string(buf, MAX_STRING_LEN)?),
            4 => MetaValue::Chat(read_string(buf, MAX_STRING_LEN)?),
            5 => MetaValue::Slot(read_item(buf)?),
            6 => {
                ensure_remaining(buf, 1)?;
                MetaValue::Boolean(buf.get_u8() != 0)
            }
            7 => {
                ensure_remaining(buf, 12)?;
                MetaValue::Rotation(buf.get_f32(), buf.get_f32(), buf.get_f32())
            }
            8 => {
                ensure_remaining(buf, 8)?;
                MetaValue::Position(BlockPos::decode(buf.get_u64()))
            }
            other => {
                return Err(CodecError::InvalidValue(format!(
                    "unsupported 1.9 metadata type {} at index {}",
                    other, index
                )))
            }
        };
        list.push(Metadata::new(index, value));
    }
}

fn write_list_1_9(buf: &mut BytesMut, list: &Vec<Metadata>) -> CodecResult<()> {
    for meta in list {
        let type_id: u8 = match &meta.value {
            MetaValue::Byte(_) => 0,
            MetaValue::VarInt(_) => 1,
            MetaValue::Float(_) => 2,
            MetaValue::String(_) => 3,
            MetaValue::Chat(_) => 4,
            MetaValue::Slot(_) => 5,
            MetaValue::Boolean(_) => 6,
            MetaValue::Rotation(..) => 7,
            MetaValue::Position(_) => 8,
            other => return Err(unwritable("1.9", meta.index, other)),
        };
        buf.put_u8(meta.index);
        buf.put_u8(type_id);
        match &meta.value {
            MetaValue::Byte(v) => buf.put_i8(*v),
            MetaValue::VarInt(v) => write_varint(buf, *v),
            MetaValue::Float(v) => buf.put_f32(*v),
            MetaValue::String(v) | MetaValue::Chat(v) => write_string(buf, v),
            MetaValue::Slot(item) => write_item(buf, item)?,
            MetaValue::Boolean(v) => buf.put_u8(*v as u8),
            MetaValue::Rotation(x, y, z) => {
                buf.put_f32(*x);
                buf.put_f32(*y);
                buf.put_f32(*z);
            }
            MetaValue::Position(pos) => buf.put_u64(pos.encode()),
            _ => {}
        }
    }
    buf.put_u8(END_1_9);
    Ok(())
}

fn unwritable(version: &str, index: u8, value: &MetaValue) -> CodecError {
    CodecError::InvalidValue(format!(
        "{:?} at index {} has no {} metadata type",
        value, index, version
    ))
}

/// Indices whose 1.8 byte became a 1.9 boolean for every entity.
const BOOLEAN_INDICES: [u8; 2] = [
    3, // custom name visible
    4, // silent
];

/// Re-type a 1.8 list into the 1.9 type set.
pub fn to_1_9(list: Vec<Metadata>) -> Vec<Metadata> {
    list.into_iter()
        .map(|Metadata { index, value }| {
            let value = match value {
                MetaValue::Byte(v) if BOOLEAN_INDICES.contains(&index) => MetaValue::Boolean(v != 0),
                MetaValue::Short(v) => MetaValue::VarInt(v as i32),
                MetaValue::Int(v) => MetaValue::VarInt(v),
                MetaValue::Vector(x, y, z) => MetaValue::Position(BlockPos::new(x, y, z)),
                MetaValue::Slot(mut item) => {
                    items::to_client(&mut item);
                    MetaValue::Slot(item)
                }
                other => other,
            };
            Metadata::new(index, value)
        })
        .collect()
}

/// What happens to one metadata field of one entity kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetaRule {
    /// Field crashes 1.9 clients; remove it.
    Drop,
    /// Player entity flags, drive the blocking shield.
    PlayerFlags,
    /// Armor stand flags, detect holograms.
    ArmorStandFlags,
    /// Boss custom name, drives the boss bar title.
    BossName,
    /// Boss health, drives the boss bar progress.
    BossHealth,
}

/// Rule table keyed by entity type and field index.
pub fn rule_for(entity_type: EntityType, index: u8) -> Option<MetaRule> {
    match (entity_type, index) {
        (EntityType::Wither, 10) | (EntityType::EnderDragon, 11) => Some(MetaRule::Drop),
        (EntityType::Player, 0) => Some(MetaRule::PlayerFlags),
        (EntityType::ArmorStand, 0) => Some(MetaRule::ArmorStandFlags),
        (EntityType::Wither | EntityType::EnderDragon, 2) => Some(MetaRule::BossName),
        (EntityType::Wither | EntityType::EnderDragon, 6) => Some(MetaRule::BossHealth),
        _ => None,
    }
}
