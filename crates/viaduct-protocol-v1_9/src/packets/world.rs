use super::tracker;
use crate::chat::{fix_json, text_component};
use crate::items;
use crate::storage::EntityTracker;
use tracing::trace;
use viaduct_protocol_core::types::{BOOLEAN, BYTE, ITEM, POSITION, STRING, UNSIGNED_BYTE, VAR_INT};
use viaduct_protocol_core::{
    ConnectionState, PacketContext, PacketRemapper, RegistryBuilder, TranslateResult,
    UserConnection,
};
use viaduct_types::BlockPos;

// Play clientbound, 1.8 ids
const CHUNK_DATA: i32 = 0x21;
const MULTI_BLOCK_CHANGE: i32 = 0x22;
const BLOCK_CHANGE: i32 = 0x23;
const BLOCK_ACTION: i32 = 0x24;
const BLOCK_BREAK_ANIMATION: i32 = 0x25;
const MAP_CHUNK_BULK: i32 = 0x26;
const EXPLOSION: i32 = 0x27;
const EFFECT: i32 = 0x28;
const SOUND_EFFECT: i32 = 0x29;
const PARTICLE: i32 = 0x2A;
const UPDATE_SIGN: i32 = 0x33;
const MAP: i32 = 0x34;
const UPDATE_BLOCK_ENTITY: i32 = 0x35;
const SERVER_DIFFICULTY: i32 = 0x41;
const WORLD_BORDER: i32 = 0x44;

// Play serverbound, 1.9 ids
const PLAYER_DIGGING: i32 = 0x13;
const CLIENT_UPDATE_SIGN: i32 = 0x19;
const BLOCK_PLACEMENT: i32 = 0x1C;
const USE_ITEM: i32 = 0x1D;

// Play serverbound, 1.8 ids
const BLOCK_PLACEMENT_1_8: i32 = 0x08;

const DIG_RELEASE_USE_ITEM: i32 = 5;
const DIG_SWAP_HANDS: i32 = 6;
const OFF_HAND: i32 = 1;
/// 1.8 marks "used the item in the air" with face 255.
const FACE_NONE: u8 = 255;

pub(super) fn register(registry: &mut RegistryBuilder) {
    use ConnectionState::Play;

    // Chunk translation is not done; the 1.9 client cannot read 1.8 sections.
    registry.cancel_outbound(Play, CHUNK_DATA);
    registry.cancel_outbound(Play, MAP_CHUNK_BULK);
    // Sound names changed in 1.9 and there is no table for them.
    registry.cancel_outbound(Play, SOUND_EFFECT);

    registry.register_outbound(
        Play,
        UPDATE_SIGN,
        0x46,
        PacketRemapper::new()
            .map(&POSITION)
            .map_with(&STRING, &STRING, fix_line)
            .map_with(&STRING, &STRING, fix_line)
            .map_with(&STRING, &STRING, fix_line)
            .map_with(&STRING, &STRING, fix_line),
    );

    registry.register_outbound(
        Play,
        MAP,
        0x24,
        PacketRemapper::new()
            .map(&VAR_INT)
            .map(&BYTE)
            // tracking position
            .create(&BOOLEAN, true),
    );

    for (old_id, new_id) in [
        (MULTI_BLOCK_CHANGE, 0x10),
        (BLOCK_CHANGE, 0x0B),
        (BLOCK_ACTION, 0x0A),
        (BLOCK_BREAK_ANIMATION, 0x08),
        (EXPLOSION, 0x1C),
        (EFFECT, 0x21),
        (PARTICLE, 0x22),
        (UPDATE_BLOCK_ENTITY, 0x09),
        (SERVER_DIFFICULTY, 0x0D),
        (WORLD_BORDER, 0x35),
    ] {
        registry.register_outbound(Play, old_id, new_id, None);
    }

    registry.register_inbound(
        Play,
        CLIENT_UPDATE_SIGN,
        0x12,
        PacketRemapper::new()
            .map(&POSITION)
            .map_with(&STRING, &STRING, to_component)
            .map_with(&STRING, &STRING, to_component)
            .map_with(&STRING, &STRING, to_component)
            .map_with(&STRING, &STRING, to_component),
    );

    registry.register_inbound(
        Play,
        PLAYER_DIGGING,
        0x07,
        PacketRemapper::new()
            .map_to(&VAR_INT, &BYTE)
            .handler(|ctx, conn| match ctx.get(&BYTE, 0)? as i32 {
                DIG_RELEASE_USE_ITEM => conn.with::<EntityTracker, _>(|tracker, outbox| {
                    if !tracker.config().shield_blocking || !tracker.is_blocking() {
                        return Ok(());
                    }
                    tracker.set_blocking(false);
                    match tracker.entity_id() {
                        Some(own) => tracker.set_second_hand(own, None, outbox),
                        None => Ok(()),
                    }
                }),
                DIG_SWAP_HANDS => {
                    ctx.cancel();
                    Ok(())
                }
                _ => Ok(()),
            }),
    );

    registry.register_inbound(
        Play,
        BLOCK_PLACEMENT,
        BLOCK_PLACEMENT_1_8,
        PacketRemapper::new()
            .map(&POSITION)
            .map_to(&VAR_INT, &UNSIGNED_BYTE)
            .handler(|ctx, conn| {
                if ctx.read(&VAR_INT)? == OFF_HAND {
                    ctx.cancel();
                    return Ok(());
                }
                let held = tracker(conn).held_item();
                ctx.write(&ITEM, held);
                Ok(())
            })
            .map(&UNSIGNED_BYTE)
            .map(&UNSIGNED_BYTE)
            .map(&UNSIGNED_BYTE)
            .handler(remember_placement),
    );

    registry.register_inbound(
        Play,
        USE_ITEM,
        BLOCK_PLACEMENT_1_8,
        PacketRemapper::new().handler(use_item),
    );
}

fn fix_line(
    line: String,
    _ctx: &mut PacketContext,
    _conn: &mut UserConnection,
) -> TranslateResult<String> {
    Ok(fix_json(&line))
}

fn to_component(
    line: String,
    _ctx: &mut PacketContext,
    _conn: &mut UserConnection,
) -> TranslateResult<String> {
    Ok(text_component(&line))
}

/// The block the client would place against, given the clicked face.
fn placed_against(pos: BlockPos, face: u8) -> Option<BlockPos> {
    let BlockPos { x, y, z } = pos;
    Some(match face {
        0 => BlockPos::new(x, y - 1, z),
        1 => BlockPos::new(x, y + 1, z),
        2 => BlockPos::new(x, y, z - 1),
        3 => BlockPos::new(x, y, z + 1),
        4 => BlockPos::new(x - 1, y, z),
        5 => BlockPos::new(x + 1, y, z),
        _ => return None,
    })
}

/// A 1.9 client follows every block placement with a Use Item; remember the
/// placement so that echo can be dropped.
fn remember_placement(ctx: &mut PacketContext, conn: &mut UserConnection) -> TranslateResult<()> {
    let pos = ctx.get(&POSITION, 0)?;
    let face = ctx.get(&UNSIGNED_BYTE, 0)?;
    let tracker = tracker(conn);
    match placed_against(pos, face) {
        Some(target) => {
            tracker.add_block_interaction(target);
            tracker.set_last_place_block(Some(target));
        }
        None => tracker.set_last_place_block(None),
    }
    Ok(())
}

/// 1.9 Use Item becomes a 1.8 placement "in the air".
fn use_item(ctx: &mut PacketContext, conn: &mut UserConnection) -> TranslateResult<()> {
    let hand = ctx.read(&VAR_INT)?;
    ctx.clear_input();
    if hand == OFF_HAND {
        ctx.cancel();
        return Ok(());
    }

    conn.with::<EntityTracker, _>(|tracker, outbox| {
        if let Some(last) = tracker.last_place_block() {
            tracker.set_last_place_block(None);
            if tracker.is_block_interaction(&last) {
                trace!("Dropping Use Item echo of placement at {:?}", last);
                ctx.cancel();
                return Ok(());
            }
        }

        let held = tracker.held_item();
        let sword = held.as_ref().is_some_and(|item| items::is_sword(item.id));
        ctx.write(&POSITION, BlockPos::new(-1, -1, -1));
        ctx.write(&UNSIGNED_BYTE, FACE_NONE);
        ctx.write(&ITEM, held);
        ctx.write(&UNSIGNED_BYTE, 0);
        ctx.write(&UNSIGNED_BYTE, 0);
        ctx.write(&UNSIGNED_BYTE, 0);

        if sword && tracker.config().shield_blocking {
            tracker.set_blocking(true);
            if let Some(own) = tracker.entity_id() {
                tracker.set_second_hand(own, Some(items::shield()), outbox)?;
            }
        }
        Ok(())
    })
}
