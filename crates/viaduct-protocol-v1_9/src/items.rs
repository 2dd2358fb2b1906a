//! Item id tables and the item stack rewrites between 1.8 and 1.9.

use crate::chat::fix_json;
use std::collections::HashMap;
use std::sync::LazyLock;
use viaduct_nbt::NbtValue;
use viaduct_types::ItemStack;

pub const ITEM_IRON_SWORD: i16 = 267;
pub const ITEM_WOODEN_SWORD: i16 = 268;
pub const ITEM_STONE_SWORD: i16 = 272;
pub const ITEM_DIAMOND_SWORD: i16 = 276;
pub const ITEM_GOLDEN_SWORD: i16 = 283;
pub const ITEM_POTION: i16 = 373;
pub const ITEM_SPAWN_EGG: i16 = 383;
pub const ITEM_WRITTEN_BOOK: i16 = 387;
/// 1.9 only.
pub const ITEM_SPLASH_POTION: i16 = 438;
/// 1.9 only.
pub const ITEM_SHIELD: i16 = 442;

/// 1.8 damage values at or above this are splash potions.
const SPLASH_FLAG: i16 = 16384;
const SPLASH_OFFSET: i16 = 8192;

/// Returns true if the given 1.8 item id is a sword (can block).
pub fn is_sword(item_id: i16) -> bool {
    matches!(
        item_id,
        ITEM_WOODEN_SWORD | ITEM_STONE_SWORD | ITEM_IRON_SWORD | ITEM_GOLDEN_SWORD | ITEM_DIAMOND_SWORD
    )
}

pub fn shield() -> ItemStack {
    ItemStack::new(ITEM_SHIELD, 1, 0)
}

const ENTITY_NAMES: &[(i16, &str)] = &[
    (1, "Item"),
    (2, "XPOrb"),
    (7, "ThrownEgg"),
    (8, "LeashKnot"),
    (9, "Painting"),
    (10, "Arrow"),
    (11, "Snowball"),
    (12, "Fireball"),
    (13, "SmallFireball"),
    (14, "ThrownEnderpearl"),
    (15, "EyeOfEnderSignal"),
    (16, "ThrownPotion"),
    (17, "ThrownExpBottle"),
    (18, "ItemFrame"),
    (19, "WitherSkull"),
    (20, "PrimedTnt"),
    (21, "FallingSand"),
    (22, "FireworksRocketEntity"),
    (30, "ArmorStand"),
    (40, "MinecartCommandBlock"),
    (41, "Boat"),
    (42, "MinecartRideable"),
    (43, "MinecartChest"),
    (44, "MinecartFurnace"),
    (45, "MinecartTNT"),
    (46, "MinecartHopper"),
    (47, "MinecartSpawner"),
    (48, "Mob"),
    (49, "Monster"),
    (50, "Creeper"),
    (51, "Skeleton"),
    (52, "Spider"),
    (53, "Giant"),
    (54, "Zombie"),
    (55, "Slime"),
    (56, "Ghast"),
    (57, "PigZombie"),
    (58, "Enderman"),
    (59, "CaveSpider"),
    (60, "Silverfish"),
    (61, "Blaze"),
    (62, "LavaSlime"),
    (63, "EnderDragon"),
    (64, "WitherBoss"),
    (65, "Bat"),
    (66, "Witch"),
    (67, "Endermite"),
    (68, "Guardian"),
    (90, "Pig"),
    (91, "Sheep"),
    (92, "Cow"),
    (93, "Chicken"),
    (94, "Squid"),
    (95, "Wolf"),
    (96, "MushroomCow"),
    (97, "SnowMan"),
    (98, "Ozelot"),
    (99, "VillagerGolem"),
    (100, "EntityHorse"),
    (101, "Rabbit"),
    (120, "Villager"),
    (200, "EnderCrystal"),
];

const POTION_NAMES: &[(i16, &str)] = &[
    (-1, "empty"),
    (0, "water"),
    (64, "mundane"),
    (32, "thick"),
    (16, "awkward"),
    (8198, "night_vision"),
    (8262, "long_night_vision"),
    (8206, "invisibility"),
    (8270, "long_invisibility"),
    (8203, "leaping"),
    (8267, "long_leaping"),
    (8235, "strong_leaping"),
    (8195, "fire_resistance"),
    (8259, "long_fire_resistance"),
    (8194, "swiftness"),
    (8258, "long_swiftness"),
    (8226, "strong_swiftness"),
    (8202, "slowness"),
    (8266, "long_slowness"),
    (8205, "water_breathing"),
    (8269, "long_water_breathing"),
    (8261, "healing"),
    (8229, "strong_healing"),
    (8204, "harming"),
    (8236, "strong_harming"),
    (8196, "poison"),
    (8260, "long_poison"),
    (8228, "strong_poison"),
    (8193, "regeneration"),
    (8257, "long_regeneration"),
    (8225, "strong_regeneration"),
    (8201, "strength"),
    (8265, "long_strength"),
    (8233, "strong_strength"),
    (8200, "weakness"),
    (8264, "long_weakness"),
];

struct NameTable {
    by_id: HashMap<i16, &'static str>,
    by_name: HashMap<&'static str, i16>,
}

impl NameTable {
    fn build(entries: &'static [(i16, &'static str)]) -> Self {
        Self {
            by_id: entries.iter().copied().collect(),
            by_name: entries.iter().map(|&(id, name)| (name, id)).collect(),
        }
    }
}

static ENTITIES: LazyLock<NameTable> = LazyLock::new(|| NameTable::build(ENTITY_NAMES));
static POTIONS: LazyLock<NameTable> = LazyLock::new(|| NameTable::build(POTION_NAMES));

/// 1.8 spawn egg damage value -> 1.9 `EntityTag.id`.
pub fn entity_name(id: i16) -> Option<&'static str> {
    ENTITIES.by_id.get(&id).copied()
}

/// 1.8 potion damage value -> 1.9 potion name (without namespace).
pub fn potion_name(damage: i16) -> Option<&'static str> {
    POTIONS.by_id.get(&damage).copied()
}

/// Rewrite an item sent by a 1.8 server for a 1.9 client.
pub fn to_client(item: &mut Option<ItemStack>) {
    let Some(item) = item.as_mut() else {
        return;
    };
    match item.id {
        ITEM_SPAWN_EGG if item.damage != 0 => {
            let tag = item.tag.get_or_insert_with(empty_compound);
            if let Some(name) = entity_name(item.damage) {
                let mut entity_tag = empty_compound();
                entity_tag.insert("id", NbtValue::String(name.to_string()));
                tag.insert("EntityTag", entity_tag);
            }
            item.damage = 0;
        }
        ITEM_POTION => {
            let tag = item.tag.get_or_insert_with(empty_compound);
            if item.damage >= SPLASH_FLAG {
                item.id = ITEM_SPLASH_POTION;
                item.damage -= SPLASH_OFFSET;
            }
            if let Some(name) = potion_name(item.damage) {
                tag.insert("Potion", NbtValue::String(format!("minecraft:{}", name)));
            }
            item.damage = 0;
        }
        ITEM_WRITTEN_BOOK => {
            let tag = item.tag.get_or_insert_with(empty_compound);
            match tag.remove("pages") {
                Some(NbtValue::List(pages)) => {
                    let pages = pages
                        .into_iter()
                        .map(|page| match page {
                            NbtValue::String(text) => NbtValue::String(fix_json(&text)),
                            other => other,
                        })
                        .collect();
                    tag.insert("pages", NbtValue::List(pages));
                }
                Some(other) => tag.insert("pages", other),
                None => tag.insert("pages", NbtValue::List(vec![NbtValue::String(fix_json(""))])),
            }
        }
        _ => {}
    }
}

/// Rewrite an item sent by a 1.9 client for a 1.8 server.
pub fn to_server(item: &mut Option<ItemStack>) {
    let Some(item) = item.as_mut() else {
        return;
    };
    match item.id {
        ITEM_SPAWN_EGG if item.damage == 0 => {
            let mut damage = 0;
            if let Some(tag) = item.tag.as_mut() {
                if let Some(entity_tag) = tag.remove("EntityTag") {
                    if let Some(NbtValue::String(name)) = entity_tag.get("id") {
                        damage = ENTITIES.by_name.get(name.as_str()).copied().unwrap_or(0);
                    }
                }
            }
            item.damage = damage;
        }
        ITEM_POTION | ITEM_SPLASH_POTION => {
            let splash = item.id == ITEM_SPLASH_POTION;
            let mut damage = 0;
            if let Some(tag) = item.tag.as_mut() {
                if let Some(NbtValue::String(potion)) = tag.remove("Potion") {
                    let name = potion.trim_start_matches("minecraft:");
                    if let Some(id) = POTIONS.by_name.get(name) {
                        damage = if splash { id + SPLASH_OFFSET } else { *id };
                    }
                }
            }
            item.id = ITEM_POTION;
            item.damage = damage;
        }
        _ => {}
    }
}

fn empty_compound() -> NbtValue {
    NbtValue::Compound(Vec::new())
}
