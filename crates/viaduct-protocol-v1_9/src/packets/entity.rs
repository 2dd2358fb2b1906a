use super::spawn::from_fixed_point;
use super::{rewrite_metadata, tracker, SET_PASSENGERS};
use crate::items;
use crate::metadata::METADATA_LIST_1_9;
use crate::storage::EntityTracker;
use tracing::trace;
use viaduct_protocol_core::types::{BOOLEAN, BYTE, DOUBLE, INT, ITEM, SHORT, VAR_INT, VAR_INT_ARRAY};
use viaduct_protocol_core::{
    ConnectionState, PacketContext, PacketRemapper, RegistryBuilder, TranslateResult,
    UserConnection, Value,
};

const ENTITY_EQUIPMENT_1_8: i32 = 0x04;
const USE_BED: i32 = 0x0A;
const ANIMATION: i32 = 0x0B;
const COLLECT_ITEM: i32 = 0x0D;
const ENTITY_VELOCITY: i32 = 0x12;
const ENTITY: i32 = 0x14;
const ENTITY_RELATIVE_MOVE_1_8: i32 = 0x15;
const ENTITY_LOOK: i32 = 0x16;
const ENTITY_LOOK_AND_MOVE: i32 = 0x17;
const ENTITY_TELEPORT: i32 = 0x18;
const ENTITY_HEAD_LOOK: i32 = 0x19;
const ENTITY_STATUS: i32 = 0x1A;
const ATTACH_ENTITY: i32 = 0x1B;
const ENTITY_METADATA: i32 = 0x1C;
const ENTITY_EFFECT: i32 = 0x1D;
const REMOVE_ENTITY_EFFECT: i32 = 0x1E;
const SET_EXPERIENCE: i32 = 0x1F;
const ENTITY_PROPERTIES: i32 = 0x20;
const UPDATE_ENTITY_NBT: i32 = 0x49;

/// 1.9 effect flags: particles shown, with or without the HUD indicator.
const EFFECT_HIDDEN: i8 = 0;
const EFFECT_PARTICLES: i8 = 1;
const EFFECT_PARTICLES_AND_ICON: i8 = 2;

pub(super) fn register(registry: &mut RegistryBuilder) {
    use ConnectionState::Play;

    registry.register_outbound(
        Play,
        ENTITY_EQUIPMENT_1_8,
        0x3C,
        PacketRemapper::new()
            .map(&VAR_INT)
            // 1.9 puts the off hand at 1, armor moves up by one
            .map_with(&SHORT, &VAR_INT, |slot, _, _| {
                Ok(if slot > 0 { slot as i32 + 1 } else { slot as i32 })
            })
            .map_with(&ITEM, &ITEM, |mut item, ctx, conn| {
                if ctx.get(&VAR_INT, 1)? == 0 {
                    let entity = ctx.get(&VAR_INT, 0)?;
                    let sword = item.as_ref().is_some_and(|item| items::is_sword(item.id));
                    tracker(conn).set_can_block(entity, sword);
                }
                items::to_client(&mut item);
                Ok(item)
            }),
    );

    registry.register_outbound(
        Play,
        ENTITY_RELATIVE_MOVE_1_8,
        0x25,
        PacketRemapper::new()
            .map(&VAR_INT)
            .map_with(&BYTE, &SHORT, to_relative_move)
            .map_with(&BYTE, &SHORT, to_relative_move)
            .map_with(&BYTE, &SHORT, to_relative_move)
            .map(&BOOLEAN),
    );

    registry.register_outbound(
        Play,
        ENTITY_LOOK_AND_MOVE,
        0x26,
        PacketRemapper::new()
            .map(&VAR_INT)
            .map_with(&BYTE, &SHORT, to_relative_move)
            .map_with(&BYTE, &SHORT, to_relative_move)
            .map_with(&BYTE, &SHORT, to_relative_move)
            .map(&BYTE)
            .map(&BYTE)
            .map(&BOOLEAN),
    );

    registry.register_outbound(
        Play,
        ENTITY_TELEPORT,
        0x4A,
        PacketRemapper::new()
            .map(&VAR_INT)
            .map_with(&INT, &DOUBLE, from_fixed_point)
            .map_with(&INT, &DOUBLE, from_fixed_point)
            .map_with(&INT, &DOUBLE, from_fixed_point)
            .map(&BYTE)
            .map(&BYTE)
            .map(&BOOLEAN)
            .handler(|ctx, conn| {
                let entity = ctx.get(&VAR_INT, 0)?;
                let tracker = tracker(conn);
                if tracker.config().hologram_patch && tracker.is_hologram(entity) {
                    let y = ctx.get(&DOUBLE, 1)?;
                    ctx.set(&DOUBLE, 1, y + tracker.config().hologram_y_offset)?;
                }
                Ok(())
            }),
    );

    registry.register_outbound(
        Play,
        ATTACH_ENTITY,
        0x3A,
        PacketRemapper::new().handler(rewrite_attach),
    );

    registry.register_outbound(
        Play,
        ENTITY_METADATA,
        0x39,
        PacketRemapper::new()
            .map(&VAR_INT)
            .handler(rewrite_metadata)
            .handler(|ctx, _| {
                let list = ctx.get_value((&METADATA_LIST_1_9).into(), 0)?;
                if matches!(list, Value::Metadata(list) if list.is_empty()) {
                    ctx.cancel();
                }
                Ok(())
            }),
    );

    registry.register_outbound(
        Play,
        ENTITY_EFFECT,
        0x4C,
        PacketRemapper::new()
            .map(&VAR_INT)
            .map(&BYTE)
            .map(&BYTE)
            .map(&VAR_INT)
            .map_with(&BOOLEAN, &BYTE, |particles, _, conn| {
                Ok(match particles {
                    true if tracker(conn).config().new_effect_indicator => {
                        EFFECT_PARTICLES_AND_ICON
                    }
                    true => EFFECT_PARTICLES,
                    false => EFFECT_HIDDEN,
                })
            }),
    );

    registry.cancel_outbound(Play, UPDATE_ENTITY_NBT);

    for (old_id, new_id) in [
        (USE_BED, 0x2F),
        (ANIMATION, 0x06),
        (COLLECT_ITEM, 0x49),
        (ENTITY_VELOCITY, 0x3B),
        (ENTITY, 0x28),
        (ENTITY_LOOK, 0x27),
        (ENTITY_HEAD_LOOK, 0x34),
        (ENTITY_STATUS, 0x1B),
        (REMOVE_ENTITY_EFFECT, 0x31),
        (SET_EXPERIENCE, 0x3D),
        (ENTITY_PROPERTIES, 0x4B),
    ] {
        registry.register_outbound(Play, old_id, new_id, None);
    }
}

/// 1.8 moves in 1/32 block steps, 1.9 in 1/4096.
fn to_relative_move(
    delta: i8,
    _ctx: &mut PacketContext,
    _conn: &mut UserConnection,
) -> TranslateResult<i16> {
    Ok(delta as i16 * 128)
}

/// Leashes stay Attach Entity; riding becomes Set Passengers.
fn rewrite_attach(ctx: &mut PacketContext, conn: &mut UserConnection) -> TranslateResult<()> {
    let passenger = ctx.read(&INT)?;
    let vehicle = ctx.read(&INT)?;
    let leash = ctx.read(&BOOLEAN)?;
    if leash {
        ctx.write(&INT, passenger);
        ctx.write(&INT, vehicle);
        return Ok(());
    }

    ctx.set_id(Some(SET_PASSENGERS));
    let tracker = conn.get_or_create::<EntityTracker>();
    if vehicle == -1 {
        let Some(old_vehicle) = tracker.remove_passenger(passenger) else {
            trace!("Entity {} left no known vehicle", passenger);
            ctx.cancel();
            return Ok(());
        };
        ctx.write(&VAR_INT, old_vehicle);
        ctx.write(&VAR_INT_ARRAY, Vec::new());
    } else {
        tracker.set_vehicle(passenger, vehicle);
        ctx.write(&VAR_INT, vehicle);
        ctx.write(&VAR_INT_ARRAY, vec![passenger]);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{ProtocolConfig, Protocol1_9To1_8};
    use bytes::BytesMut;
    use std::sync::Arc;
    use viaduct_protocol_core::{
        read_varint, ConnectionId, ConnectionInfo, Direction, ProtocolPipeline, Translation,
    };
    use viaduct_types::ItemStack;

    fn play_conn() -> UserConnection {
        let (mut conn, _) = UserConnection::new(ConnectionInfo::new(ConnectionId(2)));
        conn.set_state(ConnectionState::Play);
        conn
    }

    fn rewrite(
        config: ProtocolConfig,
        conn: &mut UserConnection,
        id: i32,
        payload: BytesMut,
    ) -> BytesMut {
        let pipeline = ProtocolPipeline::new(vec![Arc::new(Protocol1_9To1_8::new(config))]);
        pipeline.init(conn);
        let Translation::Rewritten(data) = pipeline
            .translate(Direction::Outbound, conn, id, payload)
            .unwrap()
        else {
            panic!("packet 0x{:02X} was not rewritten", id);
        };
        data
    }

    fn effect(particles: bool) -> BytesMut {
        let mut payload = BytesMut::new();
        VAR_INT.write(&mut payload, &7).unwrap();
        BYTE.write(&mut payload, &1).unwrap();
        BYTE.write(&mut payload, &0).unwrap();
        VAR_INT.write(&mut payload, &200).unwrap();
        BOOLEAN.write(&mut payload, &particles).unwrap();
        payload
    }

    fn indicator(mut data: BytesMut) -> i8 {
        assert_eq!(read_varint(&mut data).unwrap(), 0x4C);
        assert_eq!(VAR_INT.read(&mut data).unwrap(), 7);
        BYTE.read(&mut data).unwrap();
        BYTE.read(&mut data).unwrap();
        assert_eq!(VAR_INT.read(&mut data).unwrap(), 200);
        BYTE.read(&mut data).unwrap()
    }

    #[test]
    fn test_effect_indicator() {
        let mut conn = play_conn();
        let config = ProtocolConfig::default();
        let shown = rewrite(config.clone(), &mut conn, ENTITY_EFFECT, effect(true));
        assert_eq!(indicator(shown), EFFECT_PARTICLES_AND_ICON);
        let hidden = rewrite(config, &mut conn, ENTITY_EFFECT, effect(false));
        assert_eq!(indicator(hidden), EFFECT_HIDDEN);

        let config = ProtocolConfig {
            new_effect_indicator: false,
            ..ProtocolConfig::default()
        };
        let plain = rewrite(config, &mut conn, ENTITY_EFFECT, effect(true));
        assert_eq!(indicator(plain), EFFECT_PARTICLES);
    }

    #[test]
    fn test_equipment_slots_shift_and_track_swords() {
        let mut conn = play_conn();
        let equipment = |slot: i16, item: Option<ItemStack>| {
            let mut payload = BytesMut::new();
            VAR_INT.write(&mut payload, &3).unwrap();
            SHORT.write(&mut payload, &slot).unwrap();
            ITEM.write(&mut payload, &item).unwrap();
            payload
        };

        let sword = Some(ItemStack::new(items::ITEM_IRON_SWORD, 1, 0));
        let mut out = rewrite(
            ProtocolConfig::default(),
            &mut conn,
            ENTITY_EQUIPMENT_1_8,
            equipment(0, sword),
        );
        assert_eq!(read_varint(&mut out).unwrap(), 0x3C);
        assert_eq!(VAR_INT.read(&mut out).unwrap(), 3);
        assert_eq!(VAR_INT.read(&mut out).unwrap(), 0);
        assert_eq!(ITEM.read(&mut out).unwrap().unwrap().id, items::ITEM_IRON_SWORD);
        assert!(conn.get::<EntityTracker>().unwrap().can_block(3));

        // helmet: 4 on 1.8, 5 on 1.9
        let mut out = rewrite(
            ProtocolConfig::default(),
            &mut conn,
            ENTITY_EQUIPMENT_1_8,
            equipment(4, None),
        );
        read_varint(&mut out).unwrap();
        VAR_INT.read(&mut out).unwrap();
        assert_eq!(VAR_INT.read(&mut out).unwrap(), 5);
        // armor doesn't change what the hand holds
        assert!(conn.get::<EntityTracker>().unwrap().can_block(3));

        rewrite(
            ProtocolConfig::default(),
            &mut conn,
            ENTITY_EQUIPMENT_1_8,
            equipment(0, None),
        );
        assert!(!conn.get::<EntityTracker>().unwrap().can_block(3));
    }

    #[test]
    fn test_update_entity_nbt_is_dropped() {
        let mut conn = play_conn();
        let pipeline = ProtocolPipeline::new(vec![Arc::new(Protocol1_9To1_8::default())]);
        pipeline.init(&mut conn);
        let mut payload = BytesMut::new();
        VAR_INT.write(&mut payload, &1).unwrap();
        let translation = pipeline
            .translate(Direction::Outbound, &mut conn, UPDATE_ENTITY_NBT, payload)
            .unwrap();
        assert!(matches!(translation, Translation::Suppressed));
    }
}
