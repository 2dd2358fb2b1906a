//! Rules letting a 1.9 client (protocol 107) play on a 1.8 server (protocol 47).

pub mod chat;
pub mod config;
pub mod items;
pub mod metadata;
pub mod packets;
pub mod storage;

pub use config::ProtocolConfig;
pub use storage::{BossBar, BossColor, BossStyle, EntityTracker};

use std::sync::Arc;
use viaduct_protocol_core::{Protocol, RegistryBuilder, UserConnection};

pub const CLIENT_VERSION: i32 = 107;
pub const SERVER_VERSION: i32 = 47;

pub struct Protocol1_9To1_8 {
    config: Arc<ProtocolConfig>,
}

impl Protocol1_9To1_8 {
    pub fn new(config: ProtocolConfig) -> Self {
        Self {
            config: Arc::new(config),
        }
    }

    pub fn config(&self) -> &ProtocolConfig {
        &self.config
    }
}

impl Default for Protocol1_9To1_8 {
    fn default() -> Self {
        Self::new(ProtocolConfig::default())
    }
}

impl Protocol for Protocol1_9To1_8 {
    fn name(&self) -> &'static str {
        "1.9->1.8"
    }

    fn client_version(&self) -> i32 {
        CLIENT_VERSION
    }

    fn server_version(&self) -> i32 {
        SERVER_VERSION
    }

    fn register(&self, registry: &mut RegistryBuilder) {
        packets::register(registry);
    }

    fn init(&self, conn: &mut UserConnection) {
        conn.get_or_create::<EntityTracker>()
            .set_config(self.config.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::METADATA_LIST_1_8;
    use bytes::BytesMut;
    use viaduct_protocol_core::types::{
        BOOLEAN, BYTE, INT, ITEM, POSITION, SHORT, STRING, UNSIGNED_BYTE, VAR_INT,
        VAR_INT_ARRAY,
    };
    use viaduct_protocol_core::{
        read_varint, ConnectionId, ConnectionInfo, ConnectionState, Direction, ProtocolPipeline,
        Translation,
    };
    use viaduct_types::{BlockPos, ItemStack, MetaValue, Metadata};

    fn setup() -> (ProtocolPipeline, UserConnection) {
        let pipeline = ProtocolPipeline::new(vec![Arc::new(Protocol1_9To1_8::default())]);
        let (mut conn, _) = UserConnection::new(ConnectionInfo::new(ConnectionId(1)));
        conn.set_state(ConnectionState::Play);
        pipeline.init(&mut conn);
        (pipeline, conn)
    }

    fn translate(
        pipeline: &ProtocolPipeline,
        conn: &mut UserConnection,
        direction: Direction,
        id: i32,
        payload: BytesMut,
    ) -> Option<BytesMut> {
        match pipeline.translate(direction, conn, id, payload).unwrap() {
            Translation::Rewritten(data) => Some(data),
            Translation::Suppressed => None,
            Translation::Unchanged { .. } => panic!("packet 0x{:02X} was not translated", id),
        }
    }

    #[test]
    fn test_chat_is_fixed() {
        let (pipeline, mut conn) = setup();
        let mut payload = BytesMut::new();
        STRING.write(&mut payload, &"hello".to_string()).unwrap();
        BYTE.write(&mut payload, &0).unwrap();

        let mut out = translate(&pipeline, &mut conn, Direction::Outbound, 0x02, payload).unwrap();
        assert_eq!(read_varint(&mut out).unwrap(), 0x0F);
        assert_eq!(STRING.read(&mut out).unwrap(), r#"{"text":"hello"}"#);
        assert_eq!(BYTE.read(&mut out).unwrap(), 0);
        assert!(out.is_empty());
    }

    #[test]
    fn test_relative_move_is_rescaled() {
        let (pipeline, mut conn) = setup();
        let mut payload = BytesMut::new();
        VAR_INT.write(&mut payload, &5).unwrap();
        for delta in [1i8, -2, 0] {
            BYTE.write(&mut payload, &delta).unwrap();
        }
        BOOLEAN.write(&mut payload, &true).unwrap();

        let mut out = translate(&pipeline, &mut conn, Direction::Outbound, 0x15, payload).unwrap();
        assert_eq!(read_varint(&mut out).unwrap(), 0x25);
        assert_eq!(VAR_INT.read(&mut out).unwrap(), 5);
        assert_eq!(SHORT.read(&mut out).unwrap(), 128);
        assert_eq!(SHORT.read(&mut out).unwrap(), -256);
        assert_eq!(SHORT.read(&mut out).unwrap(), 0);
        assert!(BOOLEAN.read(&mut out).unwrap());
    }

    #[test]
    fn test_metadata_of_unknown_entity_is_suppressed() {
        let (pipeline, mut conn) = setup();
        let mut payload = BytesMut::new();
        VAR_INT.write(&mut payload, &9).unwrap();
        let list = vec![Metadata::new(0, MetaValue::Byte(0))];
        METADATA_LIST_1_8.write(&mut payload, &list).unwrap();

        assert!(translate(&pipeline, &mut conn, Direction::Outbound, 0x1C, payload).is_none());
    }

    #[test]
    fn test_attach_becomes_set_passengers() {
        let (pipeline, mut conn) = setup();
        let attach = |vehicle: i32| {
            let mut payload = BytesMut::new();
            INT.write(&mut payload, &4).unwrap();
            INT.write(&mut payload, &vehicle).unwrap();
            BOOLEAN.write(&mut payload, &false).unwrap();
            payload
        };

        let mut out =
            translate(&pipeline, &mut conn, Direction::Outbound, 0x1B, attach(10)).unwrap();
        assert_eq!(read_varint(&mut out).unwrap(), 0x40);
        assert_eq!(VAR_INT.read(&mut out).unwrap(), 10);
        assert_eq!(VAR_INT_ARRAY.read(&mut out).unwrap(), vec![4]);

        let mut out =
            translate(&pipeline, &mut conn, Direction::Outbound, 0x1B, attach(-1)).unwrap();
        assert_eq!(read_varint(&mut out).unwrap(), 0x40);
        assert_eq!(VAR_INT.read(&mut out).unwrap(), 10);
        assert!(VAR_INT_ARRAY.read(&mut out).unwrap().is_empty());

        // already dismounted
        assert!(translate(&pipeline, &mut conn, Direction::Outbound, 0x1B, attach(-1)).is_none());
    }

    #[test]
    fn test_use_item_echo_after_placement_is_dropped() {
        let (pipeline, mut conn) = setup();
        let mut placement = BytesMut::new();
        POSITION.write(&mut placement, &BlockPos::new(1, 64, 1)).unwrap();
        VAR_INT.write(&mut placement, &1).unwrap();
        VAR_INT.write(&mut placement, &0).unwrap();
        for cursor in [8u8, 8, 8] {
            UNSIGNED_BYTE.write(&mut placement, &cursor).unwrap();
        }

        let mut out =
            translate(&pipeline, &mut conn, Direction::Inbound, 0x1C, placement).unwrap();
        assert_eq!(read_varint(&mut out).unwrap(), 0x08);
        assert_eq!(POSITION.read(&mut out).unwrap(), BlockPos::new(1, 64, 1));
        assert_eq!(UNSIGNED_BYTE.read(&mut out).unwrap(), 1);
        assert_eq!(ITEM.read(&mut out).unwrap(), None);

        let use_item = || {
            let mut payload = BytesMut::new();
            VAR_INT.write(&mut payload, &0).unwrap();
            payload
        };
        assert!(translate(&pipeline, &mut conn, Direction::Inbound, 0x1D, use_item()).is_none());

        // a later Use Item is a real one
        let mut out =
            translate(&pipeline, &mut conn, Direction::Inbound, 0x1D, use_item()).unwrap();
        assert_eq!(read_varint(&mut out).unwrap(), 0x08);
        assert_eq!(POSITION.read(&mut out).unwrap(), BlockPos::new(-1, -1, -1));
        assert_eq!(UNSIGNED_BYTE.read(&mut out).unwrap(), 255);
    }

    #[test]
    fn test_sword_use_shows_shield() {
        let (pipeline, mut conn) = setup();
        let mut join = BytesMut::new();
        INT.write(&mut join, &1).unwrap();
        UNSIGNED_BYTE.write(&mut join, &0).unwrap();
        BYTE.write(&mut join, &0).unwrap();
        UNSIGNED_BYTE.write(&mut join, &0).unwrap();
        UNSIGNED_BYTE.write(&mut join, &20).unwrap();
        STRING.write(&mut join, &"default".to_string()).unwrap();
        BOOLEAN.write(&mut join, &false).unwrap();
        translate(&pipeline, &mut conn, Direction::Outbound, 0x01, join).unwrap();

        let mut slot = BytesMut::new();
        BYTE.write(&mut slot, &0).unwrap();
        SHORT.write(&mut slot, &36).unwrap();
        ITEM.write(&mut slot, &Some(ItemStack::new(items::ITEM_DIAMOND_SWORD, 1, 0))).unwrap();
        translate(&pipeline, &mut conn, Direction::Outbound, 0x2F, slot).unwrap();
        assert!(conn.take_outbox().is_empty());

        let mut payload = BytesMut::new();
        VAR_INT.write(&mut payload, &0).unwrap();
        let mut out = translate(&pipeline, &mut conn, Direction::Inbound, 0x1D, payload).unwrap();
        assert_eq!(read_varint(&mut out).unwrap(), 0x08);
        POSITION.read(&mut out).unwrap();
        UNSIGNED_BYTE.read(&mut out).unwrap();
        let held = ITEM.read(&mut out).unwrap().unwrap();
        assert_eq!(held.id, items::ITEM_DIAMOND_SWORD);

        assert!(conn.get::<EntityTracker>().unwrap().is_blocking());
        let sent = conn.take_outbox();
        assert_eq!(sent.len(), 1);
        let mut equipment = sent[0].data.clone();
        assert_eq!(sent[0].direction, Direction::Outbound);
        assert_eq!(read_varint(&mut equipment).unwrap(), packets::ENTITY_EQUIPMENT);
        assert_eq!(VAR_INT.read(&mut equipment).unwrap(), 1);
        assert_eq!(VAR_INT.read(&mut equipment).unwrap(), 1);
        assert_eq!(ITEM.read(&mut equipment).unwrap().unwrap().id, items::ITEM_SHIELD);
    }

    #[test]
    fn test_wither_spawn_shows_boss_bar() {
        let (pipeline, mut conn) = setup();
        let mut payload = BytesMut::new();
        VAR_INT.write(&mut payload, &20).unwrap();
        UNSIGNED_BYTE.write(&mut payload, &64).unwrap();
        for coord in [32, 2048, -64] {
            INT.write(&mut payload, &coord).unwrap();
        }
        for angle in [0i8, 0, 0] {
            BYTE.write(&mut payload, &angle).unwrap();
        }
        for velocity in [0i16, 0, 0] {
            SHORT.write(&mut payload, &velocity).unwrap();
        }
        let list = vec![Metadata::new(6, MetaValue::Float(150.0))];
        METADATA_LIST_1_8.write(&mut payload, &list).unwrap();

        let mut out = translate(&pipeline, &mut conn, Direction::Outbound, 0x0F, payload).unwrap();
        assert_eq!(read_varint(&mut out).unwrap(), 0x03);
        assert_eq!(VAR_INT.read(&mut out).unwrap(), 20);

        let tracker = conn.get::<EntityTracker>().unwrap();
        let bar = tracker.boss_bar(20).unwrap();
        assert!((bar.health() - 0.5).abs() < f32::EPSILON);
        let sent = conn.take_outbox();
        assert_eq!(sent.len(), 1);
        assert_eq!(read_varint(&mut sent[0].data.clone()).unwrap(), packets::BOSS_BAR);
    }
}
