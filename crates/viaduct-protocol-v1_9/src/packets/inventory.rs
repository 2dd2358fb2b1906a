use super::tracker;
use crate::chat::fix_json;
use crate::items;
use viaduct_protocol_core::types::{BYTE, ITEM, SHORT, STRING, UNSIGNED_BYTE, VAR_INT};
use viaduct_protocol_core::{
    ConnectionState, PacketContext, PacketRemapper, RegistryBuilder, TranslateResult,
    UserConnection,
};
use viaduct_types::ItemStack;

// Play clientbound, 1.8 ids
const OPEN_WINDOW: i32 = 0x2D;
const CLOSE_WINDOW: i32 = 0x2E;
const SET_SLOT: i32 = 0x2F;
const WINDOW_ITEMS: i32 = 0x30;
const WINDOW_PROPERTY: i32 = 0x31;
const CONFIRM_TRANSACTION: i32 = 0x32;

// Play serverbound, 1.9 ids
const CLIENT_CONFIRM_TRANSACTION: i32 = 0x05;
const ENCHANT_ITEM: i32 = 0x06;
const CLICK_WINDOW: i32 = 0x07;
const CLIENT_CLOSE_WINDOW: i32 = 0x08;
const CREATIVE_INVENTORY_ACTION: i32 = 0x18;

const PLAYER_WINDOW: i8 = 0;
/// Player inventory slots 36..45 are the hotbar.
const HOTBAR_START: i16 = 36;

pub(super) fn register(registry: &mut RegistryBuilder) {
    use ConnectionState::Play;

    registry.register_outbound(
        Play,
        OPEN_WINDOW,
        0x13,
        PacketRemapper::new()
            .map(&UNSIGNED_BYTE)
            .map(&STRING)
            .map_with(&STRING, &STRING, |title, _, _| Ok(fix_json(&title))),
    );

    registry.register_outbound(
        Play,
        SET_SLOT,
        0x16,
        PacketRemapper::new()
            .map(&BYTE)
            .map(&SHORT)
            .map_with(&ITEM, &ITEM, |mut item, ctx, conn| {
                let window = ctx.get(&BYTE, 0)?;
                let slot = ctx.get(&SHORT, 0)?;
                if window == PLAYER_WINDOW {
                    track_hotbar(conn, slot, &item);
                }
                items::to_client(&mut item);
                Ok(item)
            }),
    );

    registry.register_outbound(
        Play,
        WINDOW_ITEMS,
        0x14,
        PacketRemapper::new().handler(rewrite_window_items),
    );

    for (old_id, new_id) in [
        (CLOSE_WINDOW, 0x12),
        (WINDOW_PROPERTY, 0x15),
        (CONFIRM_TRANSACTION, 0x11),
    ] {
        registry.register_outbound(Play, old_id, new_id, None);
    }

    registry.register_inbound(
        Play,
        CLICK_WINDOW,
        0x0E,
        PacketRemapper::new()
            .map(&UNSIGNED_BYTE)
            .map(&SHORT)
            .map(&BYTE)
            .map(&SHORT)
            // mode
            .map_to(&VAR_INT, &BYTE)
            .map_with(&ITEM, &ITEM, |mut item, _, _| {
                items::to_server(&mut item);
                Ok(item)
            }),
    );

    registry.register_inbound(
        Play,
        CREATIVE_INVENTORY_ACTION,
        0x10,
        PacketRemapper::new()
            .map(&SHORT)
            .map_with(&ITEM, &ITEM, |mut item, ctx, conn| {
                items::to_server(&mut item);
                let slot = ctx.get(&SHORT, 0)?;
                track_hotbar(conn, slot, &item);
                Ok(item)
            }),
    );

    for (old_id, new_id) in [
        (CLIENT_CONFIRM_TRANSACTION, 0x0F),
        (ENCHANT_ITEM, 0x11),
        (CLIENT_CLOSE_WINDOW, 0x0D),
    ] {
        registry.register_inbound(Play, old_id, new_id, None);
    }
}

fn rewrite_window_items(ctx: &mut PacketContext, conn: &mut UserConnection) -> TranslateResult<()> {
    let window = ctx.passthrough(&UNSIGNED_BYTE)?;
    let count = ctx.passthrough(&SHORT)?;
    for slot in 0..count {
        let mut item = ctx.read(&ITEM)?;
        if window as i8 == PLAYER_WINDOW {
            track_hotbar(conn, slot, &item);
        }
        items::to_client(&mut item);
        ctx.write(&ITEM, item);
    }
    Ok(())
}

/// Remember hotbar contents in 1.8 form; Use Item has to send the held stack.
fn track_hotbar(conn: &mut UserConnection, slot: i16, item: &Option<ItemStack>) {
    let index = slot
        .checked_sub(HOTBAR_START)
        .and_then(|index| usize::try_from(index).ok());
    if let Some(index) = index {
        tracker(conn).set_hotbar_item(index, item.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::EntityTracker;
    use crate::Protocol1_9To1_8;
    use bytes::BytesMut;
    use std::sync::Arc;
    use viaduct_protocol_core::{
        read_varint, ConnectionId, ConnectionInfo, Direction, ProtocolPipeline, Translation,
    };

    fn creative(slot: i16, item: Option<ItemStack>) -> BytesMut {
        let mut payload = BytesMut::new();
        SHORT.write(&mut payload, &slot).unwrap();
        ITEM.write(&mut payload, &item).unwrap();
        payload
    }

    fn setup() -> (ProtocolPipeline, UserConnection) {
        let pipeline = ProtocolPipeline::new(vec![Arc::new(Protocol1_9To1_8::default())]);
        let (mut conn, _) = UserConnection::new(ConnectionInfo::new(ConnectionId(6)));
        conn.set_state(ConnectionState::Play);
        pipeline.init(&mut conn);
        (pipeline, conn)
    }

    #[test]
    fn test_creative_slot_far_below_hotbar() {
        let (pipeline, mut conn) = setup();
        for slot in [i16::MIN, -1, 0, 35] {
            let translation = pipeline
                .translate(
                    Direction::Inbound,
                    &mut conn,
                    CREATIVE_INVENTORY_ACTION,
                    creative(slot, None),
                )
                .unwrap();
            let Translation::Rewritten(mut out) = translation else {
                panic!("creative action for slot {} was not rewritten", slot);
            };
            assert_eq!(read_varint(&mut out).unwrap(), 0x10);
            assert_eq!(SHORT.read(&mut out).unwrap(), slot);
        }
        assert_eq!(conn.get::<EntityTracker>().unwrap().held_item(), None);
    }

    #[test]
    fn test_creative_hotbar_slot_is_tracked() {
        let (pipeline, mut conn) = setup();
        let item = Some(ItemStack::new(items::ITEM_STONE_SWORD, 1, 0));
        pipeline
            .translate(
                Direction::Inbound,
                &mut conn,
                CREATIVE_INVENTORY_ACTION,
                creative(HOTBAR_START, item),
            )
            .unwrap();
        let held = conn.get::<EntityTracker>().unwrap().held_item();
        assert_eq!(held.map(|item| item.id), Some(items::ITEM_STONE_SWORD));
    }
}
