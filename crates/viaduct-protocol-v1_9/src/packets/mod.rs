//! 1.8 server <-> 1.9 client packet rules, grouped by what they touch.

mod entity;
mod inventory;
mod player;
mod spawn;
mod world;

use crate::metadata::{self, METADATA_LIST_1_8, METADATA_LIST_1_9};
use crate::storage::EntityTracker;
use viaduct_protocol_core::types::VAR_INT;
use viaduct_protocol_core::{PacketContext, RegistryBuilder, TranslateResult, UserConnection};

// === 1.9 clientbound ids of packets the rules emit on their own ===

pub const BOSS_BAR: i32 = 0x0C;
pub const ENTITY_RELATIVE_MOVE: i32 = 0x25;
pub const ENTITY_EQUIPMENT: i32 = 0x3C;
pub const SET_PASSENGERS: i32 = 0x40;
pub const TEAMS: i32 = 0x41;

pub fn register(registry: &mut RegistryBuilder) {
    player::register(registry);
    spawn::register(registry);
    entity::register(registry);
    world::register(registry);
    inventory::register(registry);
}

fn tracker(conn: &mut UserConnection) -> &mut EntityTracker {
    conn.get_or_create::<EntityTracker>()
}

/// Read a 1.8 metadata list, apply the entity rules and write it as 1.9.
/// The entity id must already be written as the first VarInt.
fn rewrite_metadata(ctx: &mut PacketContext, conn: &mut UserConnection) -> TranslateResult<()> {
    let entity = ctx.get(&VAR_INT, 0)?;
    let mut list = metadata::to_1_9(ctx.read(&METADATA_LIST_1_8)?);
    conn.with::<EntityTracker, _>(|tracker, outbox| {
        tracker.handle_metadata(entity, &mut list, outbox)
    })?;
    ctx.write(&METADATA_LIST_1_9, list);
    Ok(())
}
