use serde::{Deserialize, Serialize};
use viaduct_nbt::NbtValue;

/// A block position in the world (x, y, z integers).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BlockPos {
    pub x: i32,
    pub y: i32,
    pub z: i32,
}

impl BlockPos {
    pub fn new(x: i32, y: i32, z: i32) -> Self {
        Self { x, y, z }
    }

    /// Encode as a 64-bit long (1.8 / 1.9 protocol format).
    /// x: 26 bits, y: 12 bits, z: 26 bits
    pub fn encode(&self) -> u64 {
        ((self.x as u64 & 0x3FFFFFF) << 38)
            | ((self.y as u64 & 0xFFF) << 26)
            | (self.z as u64 & 0x3FFFFFF)
    }

    pub fn decode(val: u64) -> Self {
        let mut x = (val >> 38) as i32;
        let mut y = ((val >> 26) & 0xFFF) as i32;
        let mut z = (val & 0x3FFFFFF) as i32;
        if x >= 1 << 25 {
            x -= 1 << 26;
        }
        if y >= 1 << 11 {
            y -= 1 << 12;
        }
        if z >= 1 << 25 {
            z -= 1 << 26;
        }
        Self { x, y, z }
    }
}

/// An item stack in an inventory slot (1.8 / 1.9 slot layout).
#[derive(Debug, Clone, PartialEq)]
pub struct ItemStack {
    /// Numeric item id.
    pub id: i16,
    pub count: i8,
    /// Damage / data value.
    pub damage: i16,
    pub tag: Option<NbtValue>,
}

impl ItemStack {
    pub fn new(id: i16, count: i8, damage: i16) -> Self {
        Self {
            id,
            count,
            damage,
            tag: None,
        }
    }
}

/// Entity kinds the translation layer needs to tell apart.
///
/// Ids are the 1.8 spawn ids: mobs from Spawn Mob, objects from Spawn Object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntityType {
    Player,
    ArmorStand,
    Creeper,
    Skeleton,
    Spider,
    Zombie,
    Slime,
    Ghast,
    PigZombie,
    Enderman,
    Blaze,
    EnderDragon,
    Wither,
    Bat,
    Witch,
    Guardian,
    Pig,
    Sheep,
    Cow,
    Chicken,
    Squid,
    Wolf,
    Horse,
    Rabbit,
    Villager,
    /// A mob whose id this layer has no special handling for.
    OtherMob(u8),
    /// A non-living object (minecart, arrow, item frame, ...).
    OtherObject(i8),
}

impl EntityType {
    pub fn from_mob_id(id: u8) -> Self {
        match id {
            30 => EntityType::ArmorStand,
            50 => EntityType::Creeper,
            51 => EntityType::Skeleton,
            52 => EntityType::Spider,
            54 => EntityType::Zombie,
            55 => EntityType::Slime,
            56 => EntityType::Ghast,
            57 => EntityType::PigZombie,
            58 => EntityType::Enderman,
            61 => EntityType::Blaze,
            63 => EntityType::EnderDragon,
            64 => EntityType::Wither,
            65 => EntityType::Bat,
            66 => EntityType::Witch,
            68 => EntityType::Guardian,
            90 => EntityType::Pig,
            91 => EntityType::Sheep,
            92 => EntityType::Cow,
            93 => EntityType::Chicken,
            94 => EntityType::Squid,
            95 => EntityType::Wolf,
            100 => EntityType::Horse,
            101 => EntityType::Rabbit,
            120 => EntityType::Villager,
            other => EntityType::OtherMob(other),
        }
    }

    pub fn from_object_id(id: i8) -> Self {
        match id {
            78 => EntityType::ArmorStand,
            other => EntityType::OtherObject(other),
        }
    }

    /// Display name used when a boss entity has no custom name.
    pub fn boss_name(self) -> Option<&'static str> {
        match self {
            EntityType::EnderDragon => Some("Ender Dragon"),
            EntityType::Wither => Some("Wither"),
            _ => None,
        }
    }

    /// Maximum health of a boss entity, used to scale boss bar progress.
    pub fn boss_max_health(self) -> Option<f32> {
        match self {
            EntityType::EnderDragon => Some(200.0),
            EntityType::Wither => Some(300.0),
            _ => None,
        }
    }
}

/// One entry of an entity metadata list.
#[derive(Debug, Clone, PartialEq)]
pub struct Metadata {
    pub index: u8,
    pub value: MetaValue,
}

impl Metadata {
    pub fn new(index: u8, value: MetaValue) -> Self {
        Self { index, value }
    }
}

/// A metadata value. The variant set is the union of the 1.8 and 1.9 wire types.
#[derive(Debug, Clone, PartialEq)]
pub enum MetaValue {
    Byte(i8),
    Short(i16),
    Int(i32),
    VarInt(i32),
    Float(f32),
    String(String),
    Chat(String),
    Slot(Option<ItemStack>),
    Boolean(bool),
    /// 1.8 "position" type: three plain ints.
    Vector(i32, i32, i32),
    Rotation(f32, f32, f32),
    Position(BlockPos),
}

impl MetaValue {
    pub fn as_byte(&self) -> Option<i8> {
        match self {
            MetaValue::Byte(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            MetaValue::String(s) | MetaValue::Chat(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_float(&self) -> Option<f32> {
        match self {
            MetaValue::Float(v) => Some(*v),
            _ => None,
        }
    }

    /// Interpret a 1.8 byte-typed boolean or a 1.9 boolean.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            MetaValue::Boolean(b) => Some(*b),
            MetaValue::Byte(v) => Some(*v != 0),
            _ => None,
        }
    }
}

/// Find a metadata entry by field index.
pub fn meta_by_index(list: &[Metadata], index: u8) -> Option<&Metadata> {
    list.iter().find(|m| m.index == index)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_block_pos_roundtrip() {
        for pos in [
            BlockPos::new(0, 0, 0),
            BlockPos::new(100, 64, -200),
            BlockPos::new(-33_554_432, -2048, 33_554_431),
            BlockPos::new(-1, -1, -1),
        ] {
            assert_eq!(BlockPos::decode(pos.encode()), pos);
        }
    }

    #[test]
    fn test_block_pos_layout() {
        // y sits between x and z in the 1.8 layout
        assert_eq!(BlockPos::new(0, 1, 0).encode(), 1 << 26);
        assert_eq!(BlockPos::new(1, 0, 0).encode(), 1 << 38);
        assert_eq!(BlockPos::new(0, 0, 1).encode(), 1);
    }

    #[test]
    fn test_entity_ids() {
        assert_eq!(EntityType::from_mob_id(64), EntityType::Wither);
        assert_eq!(EntityType::from_mob_id(63), EntityType::EnderDragon);
        assert_eq!(EntityType::from_mob_id(200), EntityType::OtherMob(200));
        assert_eq!(EntityType::from_object_id(78), EntityType::ArmorStand);
        assert_eq!(EntityType::Wither.boss_name(), Some("Wither"));
        assert_eq!(EntityType::Pig.boss_max_health(), None);
    }

    #[test]
    fn test_meta_lookup() {
        let list = vec![
            Metadata::new(0, MetaValue::Byte(0x20)),
            Metadata::new(2, MetaValue::String("name".into())),
        ];
        assert_eq!(meta_by_index(&list, 2).and_then(|m| m.value.as_str()), Some("name"));
        assert!(meta_by_index(&list, 3).is_none());
        assert_eq!(MetaValue::Byte(1).as_bool(), Some(true));
    }
}
