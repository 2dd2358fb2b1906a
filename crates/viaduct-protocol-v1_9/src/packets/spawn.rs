use super::{rewrite_metadata, tracker, ENTITY_EQUIPMENT};
use crate::items;
use crate::storage::EntityTracker;
use viaduct_protocol_core::types::{
    BYTE, DOUBLE, INT, ITEM, POSITION, SHORT, STRING, UNSIGNED_BYTE, UUID, VAR_INT, VAR_INT_ARRAY,
};
use viaduct_protocol_core::{
    ConnectionState, PacketContext, PacketRemapper, RegistryBuilder, TranslateResult,
    UserConnection,
};
use viaduct_types::{EntityType, ItemStack};

const SPAWN_PLAYER: i32 = 0x0C;
const SPAWN_OBJECT: i32 = 0x0E;
const SPAWN_MOB: i32 = 0x0F;
const SPAWN_PAINTING: i32 = 0x10;
const SPAWN_EXPERIENCE_ORB: i32 = 0x11;
const DESTROY_ENTITIES: i32 = 0x13;
const SPAWN_GLOBAL_ENTITY: i32 = 0x2C;

pub(super) fn register(registry: &mut RegistryBuilder) {
    use ConnectionState::Play;

    registry.register_outbound(
        Play,
        SPAWN_OBJECT,
        0x00,
        fixed_position(
            PacketRemapper::new()
                .map(&VAR_INT)
                .handler(write_entity_uuid)
                .map(&BYTE)
                .handler(|ctx, conn| {
                    let entity = ctx.get(&VAR_INT, 0)?;
                    let kind = ctx.get(&BYTE, 0)?;
                    tracker(conn).add_entity(entity, EntityType::from_object_id(kind));
                    Ok(())
                }),
        )
        .map(&BYTE)
        .map(&BYTE)
        .map(&INT)
        .handler(|ctx, _| {
            // 1.9 always sends the velocity
            let (mut x, mut y, mut z) = (0, 0, 0);
            if ctx.get(&INT, 0)? > 0 {
                x = ctx.read(&SHORT)?;
                y = ctx.read(&SHORT)?;
                z = ctx.read(&SHORT)?;
            }
            ctx.write(&SHORT, x);
            ctx.write(&SHORT, y);
            ctx.write(&SHORT, z);
            Ok(())
        }),
    );

    registry.register_outbound(
        Play,
        SPAWN_EXPERIENCE_ORB,
        0x01,
        fixed_position(PacketRemapper::new().map(&VAR_INT)).map(&SHORT),
    );

    registry.register_outbound(
        Play,
        SPAWN_GLOBAL_ENTITY,
        0x02,
        fixed_position(PacketRemapper::new().map(&VAR_INT).map(&BYTE)),
    );

    registry.register_outbound(
        Play,
        SPAWN_MOB,
        0x03,
        fixed_position(
            PacketRemapper::new()
                .map(&VAR_INT)
                .handler(write_entity_uuid)
                .map(&UNSIGNED_BYTE)
                .handler(|ctx, conn| {
                    let entity = ctx.get(&VAR_INT, 0)?;
                    let kind = ctx.get(&UNSIGNED_BYTE, 0)?;
                    tracker(conn).add_entity(entity, EntityType::from_mob_id(kind));
                    Ok(())
                }),
        )
        // yaw, pitch, head pitch
        .map(&BYTE)
        .map(&BYTE)
        .map(&BYTE)
        // velocity
        .map(&SHORT)
        .map(&SHORT)
        .map(&SHORT)
        .handler(rewrite_metadata),
    );

    registry.register_outbound(
        Play,
        SPAWN_PAINTING,
        0x04,
        PacketRemapper::new()
            .map(&VAR_INT)
            .handler(write_entity_uuid)
            .map(&STRING)
            .map(&POSITION)
            .map_to(&UNSIGNED_BYTE, &BYTE),
    );

    registry.register_outbound(
        Play,
        SPAWN_PLAYER,
        0x05,
        fixed_position(
            PacketRemapper::new()
                .map(&VAR_INT)
                .map(&UUID)
                .handler(|ctx, conn| {
                    let entity = ctx.get(&VAR_INT, 0)?;
                    tracker(conn).add_entity(entity, EntityType::Player);
                    Ok(())
                }),
        )
        .map(&BYTE)
        .map(&BYTE)
        .handler(|ctx, conn| {
            // the held item moved to the equipment packet
            let item = ctx.read(&SHORT)?;
            if item == 0 {
                return Ok(());
            }
            let entity = ctx.get(&VAR_INT, 0)?;
            tracker(conn).set_can_block(entity, items::is_sword(item));
            let mut equipment = ctx.derive(ENTITY_EQUIPMENT);
            equipment.write(&VAR_INT, entity);
            equipment.write(&VAR_INT, 0);
            equipment.write(&ITEM, Some(ItemStack::new(item, 1, 0)));
            equipment.send(conn)
        })
        .handler(rewrite_metadata),
    );

    registry.register_outbound(
        Play,
        DESTROY_ENTITIES,
        0x30,
        PacketRemapper::new().map(&VAR_INT_ARRAY).handler(|ctx, conn| {
            let entities = ctx.get(&VAR_INT_ARRAY, 0)?;
            conn.with::<EntityTracker, _>(|tracker, outbox| {
                entities
                    .into_iter()
                    .try_for_each(|entity| tracker.remove_entity(entity, outbox))
            })
        }),
    );
}

/// 1.8 absolute positions are fixed-point ints (1/32 block), 1.9 uses doubles.
fn fixed_position(remapper: PacketRemapper) -> PacketRemapper {
    remapper
        .map_with(&INT, &DOUBLE, from_fixed_point)
        .map_with(&INT, &DOUBLE, from_fixed_point)
        .map_with(&INT, &DOUBLE, from_fixed_point)
}

pub(super) fn from_fixed_point(
    value: i32,
    _ctx: &mut PacketContext,
    _conn: &mut UserConnection,
) -> TranslateResult<f64> {
    Ok(value as f64 / 32.0)
}

fn write_entity_uuid(ctx: &mut PacketContext, conn: &mut UserConnection) -> TranslateResult<()> {
    let entity = ctx.get(&VAR_INT, 0)?;
    let uuid = tracker(conn).entity_uuid(entity);
    ctx.write(&UUID, uuid);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::METADATA_LIST_1_8;
    use crate::Protocol1_9To1_8;
    use bytes::BytesMut;
    use std::sync::Arc;
    use viaduct_protocol_core::{
        read_varint, ConnectionId, ConnectionInfo, Direction, ProtocolPipeline, Translation,
    };
    use viaduct_types::{MetaValue, Metadata};

    fn setup() -> (ProtocolPipeline, UserConnection) {
        let pipeline = ProtocolPipeline::new(vec![Arc::new(Protocol1_9To1_8::default())]);
        let (mut conn, _) = UserConnection::new(ConnectionInfo::new(ConnectionId(5)));
        conn.set_state(ConnectionState::Play);
        pipeline.init(&mut conn);
        (pipeline, conn)
    }

    fn rewrite(
        pipeline: &ProtocolPipeline,
        conn: &mut UserConnection,
        id: i32,
        payload: BytesMut,
    ) -> BytesMut {
        let Translation::Rewritten(data) = pipeline
            .translate(Direction::Outbound, conn, id, payload)
            .unwrap()
        else {
            panic!("packet 0x{:02X} was not rewritten", id);
        };
        data
    }

    #[test]
    fn test_object_without_data_gets_zero_velocity() {
        let (pipeline, mut conn) = setup();
        let mut payload = BytesMut::new();
        VAR_INT.write(&mut payload, &8).unwrap();
        BYTE.write(&mut payload, &2).unwrap();
        for coord in [64, 2048, -32] {
            INT.write(&mut payload, &coord).unwrap();
        }
        BYTE.write(&mut payload, &0).unwrap();
        BYTE.write(&mut payload, &0).unwrap();
        INT.write(&mut payload, &0).unwrap();

        let mut out = rewrite(&pipeline, &mut conn, SPAWN_OBJECT, payload);
        assert_eq!(read_varint(&mut out).unwrap(), 0x00);
        assert_eq!(VAR_INT.read(&mut out).unwrap(), 8);
        let uuid = UUID.read(&mut out).unwrap();
        assert_eq!(BYTE.read(&mut out).unwrap(), 2);
        assert_eq!(DOUBLE.read(&mut out).unwrap(), 2.0);
        assert_eq!(DOUBLE.read(&mut out).unwrap(), 64.0);
        assert_eq!(DOUBLE.read(&mut out).unwrap(), -1.0);
        BYTE.read(&mut out).unwrap();
        BYTE.read(&mut out).unwrap();
        assert_eq!(INT.read(&mut out).unwrap(), 0);
        for _ in 0..3 {
            assert_eq!(SHORT.read(&mut out).unwrap(), 0);
        }
        assert!(out.is_empty());

        let tracker = conn.get_or_create::<EntityTracker>();
        assert_eq!(tracker.entity_type(8), Some(EntityType::from_object_id(2)));
        // the same entity keeps its uuid
        assert_eq!(tracker.entity_uuid(8), uuid);
    }

    #[test]
    fn test_destroy_forgets_entity_and_hides_boss_bar() {
        let (pipeline, mut conn) = setup();
        let mut spawn = BytesMut::new();
        VAR_INT.write(&mut spawn, &20).unwrap();
        UNSIGNED_BYTE.write(&mut spawn, &63).unwrap();
        for value in [0, 0, 0] {
            INT.write(&mut spawn, &value).unwrap();
        }
        for value in [0i8, 0, 0] {
            BYTE.write(&mut spawn, &value).unwrap();
        }
        for value in [0i16, 0, 0] {
            SHORT.write(&mut spawn, &value).unwrap();
        }
        let list = vec![Metadata::new(6, MetaValue::Float(100.0))];
        METADATA_LIST_1_8.write(&mut spawn, &list).unwrap();
        rewrite(&pipeline, &mut conn, SPAWN_MOB, spawn);
        assert_eq!(conn.take_outbox().len(), 1);

        let mut destroy = BytesMut::new();
        VAR_INT_ARRAY.write(&mut destroy, &vec![20]).unwrap();
        let mut out = rewrite(&pipeline, &mut conn, DESTROY_ENTITIES, destroy);
        assert_eq!(read_varint(&mut out).unwrap(), 0x30);
        assert_eq!(VAR_INT_ARRAY.read(&mut out).unwrap(), vec![20]);

        let sent = conn.take_outbox();
        assert_eq!(sent.len(), 1);
        assert_eq!(read_varint(&mut sent[0].data.clone()).unwrap(), crate::packets::BOSS_BAR);
        let tracker = conn.get::<EntityTracker>().unwrap();
        assert_eq!(tracker.entity_type(20), None);
        assert!(tracker.boss_bar(20).is_none());
    }
}
