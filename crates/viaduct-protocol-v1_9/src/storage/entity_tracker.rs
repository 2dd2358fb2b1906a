use super::boss_bar::BossBar;
use crate::config::ProtocolConfig;
use crate::items;
use crate::metadata::{rule_for, MetaRule};
use crate::packets::{ENTITY_EQUIPMENT, ENTITY_RELATIVE_MOVE, TEAMS};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};
use uuid::Uuid;
use viaduct_protocol_core::types::{BOOLEAN, BYTE, ITEM, SHORT, STRING, VAR_INT};
use viaduct_protocol_core::{
    ConnectionId, ConnectionInfo, Direction, Outbox, PacketContext, StoredObject, TranslateResult,
    TtlCache,
};
use viaduct_types::{meta_by_index, BlockPos, EntityType, ItemStack, MetaValue, Metadata};

/// Team every player is put in so 1.9 collision stays off.
pub const AUTO_TEAM_NAME: &str = "viaduct";

const BLOCK_INTERACTION_CAPACITY: usize = 10;
const BLOCK_INTERACTION_TTL: Duration = Duration::from_millis(250);

const FLAG_BLOCKING: i8 = 0x10;
const FLAG_INVISIBLE: i8 = 0x20;
const ARMOR_STAND_SMALL: i8 = 0x01;
const OFF_HAND_SLOT: i32 = 1;
const HOTBAR_SIZE: usize = 9;

/// Everything the 1.9 rules remember about one connection's world.
pub struct EntityTracker {
    connection: ConnectionId,
    config: Arc<ProtocolConfig>,
    uuids: HashMap<i32, Uuid>,
    client_entity_types: HashMap<i32, EntityType>,
    /// passenger -> vehicle
    vehicles: HashMap<i32, i32>,
    boss_bars: HashMap<i32, BossBar>,
    valid_blocking: HashSet<i32>,
    known_holograms: HashSet<i32>,
    block_interactions: TtlCache<BlockPos>,
    blocking: bool,
    auto_team: bool,
    team_exists: bool,
    /// Team the server last put the player in.
    current_team: Option<String>,
    last_place_block: Option<BlockPos>,
    entity_id: Option<i32>,
    held_slot: usize,
    hotbar: [Option<ItemStack>; HOTBAR_SIZE],
}

impl StoredObject for EntityTracker {
    fn create(info: &ConnectionInfo) -> Self {
        EntityTracker::new(info.id, Arc::new(ProtocolConfig::default()))
    }

    fn dispose(&mut self, outbox: &mut Outbox) {
        for (entity, bar) in self.boss_bars.iter_mut() {
            if let Err(e) = bar.hide(outbox) {
                warn!("Failed to hide boss bar of entity {}: {}", entity, e);
            }
        }
        self.boss_bars.clear();
    }
}

impl EntityTracker {
    pub fn new(connection: ConnectionId, config: Arc<ProtocolConfig>) -> Self {
        Self {
            connection,
            auto_team: config.auto_team,
            config,
            uuids: HashMap::new(),
            client_entity_types: HashMap::new(),
            vehicles: HashMap::new(),
            boss_bars: HashMap::new(),
            valid_blocking: HashSet::new(),
            known_holograms: HashSet::new(),
            block_interactions: TtlCache::new(BLOCK_INTERACTION_CAPACITY, BLOCK_INTERACTION_TTL),
            blocking: false,
            team_exists: false,
            current_team: None,
            last_place_block: None,
            entity_id: None,
            held_slot: 0,
            hotbar: Default::default(),
        }
    }

    pub fn config(&self) -> &ProtocolConfig {
        &self.config
    }

    pub fn set_config(&mut self, config: Arc<ProtocolConfig>) {
        self.auto_team = config.auto_team;
        self.config = config;
    }

    /// The UUID 1.9 spawn packets need. Allocated on first request.
    pub fn entity_uuid(&mut self, id: i32) -> Uuid {
        *self.uuids.entry(id).or_insert_with(Uuid::new_v4)
    }

    pub fn add_entity(&mut self, id: i32, entity_type: EntityType) {
        self.client_entity_types.insert(id, entity_type);
    }

    pub fn entity_type(&self, id: i32) -> Option<EntityType> {
        self.client_entity_types.get(&id).copied()
    }

    /// Forget an entity and take down anything shown on its behalf.
    pub fn remove_entity(&mut self, id: i32, outbox: &mut Outbox) -> TranslateResult<()> {
        self.client_entity_types.remove(&id);
        self.uuids.remove(&id);
        self.vehicles.remove(&id);
        self.vehicles.retain(|_, vehicle| *vehicle != id);
        self.valid_blocking.remove(&id);
        self.known_holograms.remove(&id);
        if let Some(mut bar) = self.boss_bars.remove(&id) {
            bar.hide(outbox)?;
        }
        Ok(())
    }

    /// The player's own entity id, known after Join Game.
    pub fn entity_id(&self) -> Option<i32> {
        self.entity_id
    }

    pub fn set_entity_id(&mut self, id: i32) {
        self.entity_id = Some(id);
    }

    pub fn is_own(&self, id: i32) -> bool {
        self.entity_id == Some(id)
    }

    pub fn vehicle(&self, passenger: i32) -> Option<i32> {
        self.vehicles.get(&passenger).copied()
    }

    pub fn set_vehicle(&mut self, passenger: i32, vehicle: i32) {
        self.vehicles.insert(passenger, vehicle);
    }

    /// Dismount. Returns the vehicle the passenger was riding.
    pub fn remove_passenger(&mut self, passenger: i32) -> Option<i32> {
        self.vehicles.remove(&passenger)
    }

    pub fn boss_bar(&self, id: i32) -> Option<&BossBar> {
        self.boss_bars.get(&id)
    }

    pub fn is_blocking(&self) -> bool {
        self.blocking
    }

    pub fn set_blocking(&mut self, blocking: bool) {
        self.blocking = blocking;
    }

    /// Whether the entity holds something it can block with.
    pub fn can_block(&self, id: i32) -> bool {
        self.valid_blocking.contains(&id)
    }

    pub fn set_can_block(&mut self, id: i32, can_block: bool) {
        if can_block {
            self.valid_blocking.insert(id);
        } else {
            self.valid_blocking.remove(&id);
        }
    }

    pub fn is_hologram(&self, id: i32) -> bool {
        self.known_holograms.contains(&id)
    }

    pub fn add_block_interaction(&mut self, pos: BlockPos) {
        self.block_interactions.insert(pos);
    }

    /// Whether a placement against `pos` happened in the last 250ms.
    pub fn is_block_interaction(&mut self, pos: &BlockPos) -> bool {
        self.block_interactions.contains(pos)
    }

    pub fn last_place_block(&self) -> Option<BlockPos> {
        self.last_place_block
    }

    pub fn set_last_place_block(&mut self, pos: Option<BlockPos>) {
        self.last_place_block = pos;
    }

    pub fn auto_team(&self) -> bool {
        self.auto_team
    }

    pub fn team_exists(&self) -> bool {
        self.team_exists
    }

    pub fn current_team(&self) -> Option<&str> {
        self.current_team.as_deref()
    }

    pub fn set_current_team(&mut self, team: impl Into<String>) {
        self.current_team = Some(team.into());
    }

    pub fn held_slot(&self) -> usize {
        self.held_slot
    }

    pub fn set_held_slot(&mut self, slot: i16) {
        match usize::try_from(slot) {
            Ok(slot) if slot < HOTBAR_SIZE => self.held_slot = slot,
            _ => debug!("Ignoring held slot {} on connection {}", slot, self.connection),
        }
    }

    pub fn set_hotbar_item(&mut self, slot: usize, item: Option<ItemStack>) {
        if let Some(entry) = self.hotbar.get_mut(slot) {
            *entry = item;
        }
    }

    /// The item in the player's main hand, as the server last described it.
    pub fn held_item(&self) -> Option<ItemStack> {
        self.hotbar[self.held_slot].clone()
    }

    /// Show `item` in the off hand of `entity`.
    pub fn set_second_hand(
        &self,
        entity: i32,
        item: Option<ItemStack>,
        outbox: &mut Outbox,
    ) -> TranslateResult<()> {
        let mut packet = PacketContext::new(Some(ENTITY_EQUIPMENT), None, self.connection);
        packet.write(&VAR_INT, entity);
        packet.write(&VAR_INT, OFF_HAND_SLOT);
        packet.write(&ITEM, item);
        packet.send_to(Direction::Outbound, outbox)
    }

    /// Add the player to (or take them out of) the no-collision team.
    pub fn send_team_packet(
        &mut self,
        add: bool,
        username: &str,
        outbox: &mut Outbox,
    ) -> TranslateResult<()> {
        let mut packet = PacketContext::new(Some(TEAMS), None, self.connection);
        packet.write(&STRING, AUTO_TEAM_NAME.to_string());
        if add {
            if !self.team_exists {
                packet.write(&BYTE, 0);
                packet.write(&STRING, AUTO_TEAM_NAME.to_string());
                packet.write(&STRING, String::new());
                packet.write(&STRING, String::new());
                packet.write(&BYTE, 0);
                packet.write(&STRING, String::new());
                packet.write(&STRING, "never".to_string());
                packet.write(&BYTE, 0);
            } else {
                packet.write(&BYTE, 3);
            }
            packet.write(&VAR_INT, 1);
            packet.write(&STRING, username.to_string());
        } else {
            packet.write(&BYTE, 1);
        }
        packet.send_to(Direction::Outbound, outbox)?;
        self.team_exists = add;
        Ok(())
    }

    /// Apply the per-entity metadata rules to an already re-typed list.
    ///
    /// Metadata for an entity this connection never saw spawn is dropped.
    pub fn handle_metadata(
        &mut self,
        entity: i32,
        list: &mut Vec<Metadata>,
        outbox: &mut Outbox,
    ) -> TranslateResult<()> {
        let Some(entity_type) = self.entity_type(entity) else {
            if self.config.suppress_unknown_entities {
                debug!("Dropping metadata for unknown entity {}", entity);
            } else {
                warn!("Dropping metadata for unknown entity {}", entity);
            }
            list.clear();
            return Ok(());
        };

        list.retain(|meta| rule_for(entity_type, meta.index) != Some(MetaRule::Drop));

        for meta in list.iter() {
            match rule_for(entity_type, meta.index) {
                Some(MetaRule::PlayerFlags) => self.player_flags(entity, &meta.value, outbox)?,
                Some(MetaRule::ArmorStandFlags) => {
                    self.armor_stand_flags(entity, &meta.value, list.as_slice(), outbox)?
                }
                Some(MetaRule::BossName) => {
                    self.boss_name(entity, entity_type, &meta.value, outbox)?
                }
                Some(MetaRule::BossHealth) => {
                    self.boss_health(entity, entity_type, &meta.value, outbox)?
                }
                Some(MetaRule::Drop) | None => {}
            }
        }
        Ok(())
    }

    fn player_flags(
        &self,
        entity: i32,
        value: &MetaValue,
        outbox: &mut Outbox,
    ) -> TranslateResult<()> {
        if self.is_own(entity) || !self.config.shield_blocking {
            return Ok(());
        }
        let Some(flags) = value.as_byte() else {
            return Ok(());
        };
        if flags & FLAG_BLOCKING == 0 {
            self.set_second_hand(entity, None, outbox)
        } else if self.can_block(entity) {
            self.set_second_hand(entity, Some(items::shield()), outbox)
        } else {
            Ok(())
        }
    }

    fn armor_stand_flags(
        &mut self,
        entity: i32,
        value: &MetaValue,
        list: &[Metadata],
        outbox: &mut Outbox,
    ) -> TranslateResult<()> {
        if !self.config.hologram_patch || self.known_holograms.contains(&entity) {
            return Ok(());
        }
        let Some(stand_flags) = meta_by_index(list, 10).and_then(|m| m.value.as_byte()) else {
            return Ok(());
        };
        let flags = value.as_byte().unwrap_or(0);
        let named = meta_by_index(list, 2)
            .and_then(|m| m.value.as_str())
            .is_some_and(|name| !name.is_empty());
        let name_visible = meta_by_index(list, 3)
            .and_then(|m| m.value.as_bool())
            .unwrap_or(false);
        if flags & FLAG_INVISIBLE == 0 || stand_flags & ARMOR_STAND_SMALL == 0 || !named || !name_visible {
            return Ok(());
        }

        self.known_holograms.insert(entity);
        debug!("Entity {} is a hologram", entity);
        let mut packet = PacketContext::new(Some(ENTITY_RELATIVE_MOVE), None, self.connection);
        packet.write(&VAR_INT, entity);
        packet.write(&SHORT, 0);
        packet.write(&SHORT, hologram_delta(self.config.hologram_y_offset));
        packet.write(&SHORT, 0);
        packet.write(&BOOLEAN, true);
        packet.send_to(Direction::Outbound, outbox)
    }

    fn boss_name(
        &mut self,
        entity: i32,
        entity_type: EntityType,
        value: &MetaValue,
        outbox: &mut Outbox,
    ) -> TranslateResult<()> {
        if !self.config.bossbar_patch {
            return Ok(());
        }
        let title = match value.as_str() {
            Some(name) if !name.is_empty() => name.to_string(),
            _ => entity_type.boss_name().unwrap_or_default().to_string(),
        };
        match self.boss_bars.get_mut(&entity) {
            Some(bar) => bar.set_title(title, outbox),
            None => {
                let mut bar = BossBar::new(self.connection, title, 1.0);
                bar.show(outbox)?;
                self.boss_bars.insert(entity, bar);
                Ok(())
            }
        }
    }

    fn boss_health(
        &mut self,
        entity: i32,
        entity_type: EntityType,
        value: &MetaValue,
        outbox: &mut Outbox,
    ) -> TranslateResult<()> {
        if !self.config.bossbar_patch || self.config.bossbar_anti_flicker {
            return Ok(());
        }
        let (Some(health), Some(max)) = (value.as_float(), entity_type.boss_max_health()) else {
            return Ok(());
        };
        let progress = (health / max).clamp(0.0, 1.0);
        match self.boss_bars.get_mut(&entity) {
            Some(bar) => bar.set_health(progress, outbox),
            None => {
                let title = entity_type.boss_name().unwrap_or_default();
                let mut bar = BossBar::new(self.connection, title, progress);
                bar.show(outbox)?;
                self.boss_bars.insert(entity, bar);
                Ok(())
            }
        }
    }
}

/// Relative move (1/4096 block) that shifts a hologram by `offset` blocks.
fn hologram_delta(offset: f64) -> i16 {
    (128.0 * (offset * 32.0)) as i16
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::items::ITEM_SHIELD;
    use bytes::BytesMut;
    use viaduct_protocol_core::read_varint;

    fn tracker() -> EntityTracker {
        EntityTracker::new(ConnectionId(1), Arc::new(ProtocolConfig::default()))
    }

    fn packet_id(data: &BytesMut) -> i32 {
        read_varint(&mut data.clone()).unwrap()
    }

    #[test]
    fn test_uuid_is_stable() {
        let mut tracker = tracker();
        let first = tracker.entity_uuid(5);
        assert_eq!(tracker.entity_uuid(5), first);
        assert_ne!(tracker.entity_uuid(6), first);
    }

    #[test]
    fn test_remove_entity_purges_everything() {
        let mut tracker = tracker();
        let mut outbox = Outbox::default();
        tracker.add_entity(7, EntityType::Wither);
        tracker.entity_uuid(7);
        tracker.set_can_block(7, true);
        tracker.set_vehicle(8, 7);
        let mut list = vec![Metadata::new(6, MetaValue::Float(150.0))];
        tracker.handle_metadata(7, &mut list, &mut outbox).unwrap();
        assert!(tracker.boss_bar(7).is_some());
        outbox.drain();

        tracker.remove_entity(7, &mut outbox).unwrap();
        assert_eq!(tracker.entity_type(7), None);
        assert!(!tracker.can_block(7));
        assert_eq!(tracker.vehicle(8), None);
        assert!(tracker.boss_bar(7).is_none());
        // the bar is hidden exactly once
        assert_eq!(outbox.len(), 1);
        tracker.remove_entity(7, &mut outbox).unwrap();
        assert_eq!(outbox.len(), 1);
    }

    #[test]
    fn test_latest_vehicle_wins() {
        let mut tracker = tracker();
        tracker.set_vehicle(4, 10);
        tracker.set_vehicle(4, 11);
        assert_eq!(tracker.vehicle(4), Some(11));
        assert_eq!(tracker.remove_passenger(4), Some(11));
        assert_eq!(tracker.vehicle(4), None);
    }

    #[test]
    fn test_unknown_entity_metadata_dropped() {
        let mut tracker = tracker();
        let mut outbox = Outbox::default();
        let mut list = vec![Metadata::new(0, MetaValue::Byte(0))];
        tracker.handle_metadata(99, &mut list, &mut outbox).unwrap();
        assert!(list.is_empty());
        assert!(outbox.is_empty());
    }

    #[test]
    fn test_wither_crash_field_dropped() {
        let mut tracker = tracker();
        let mut outbox = Outbox::default();
        tracker.add_entity(3, EntityType::Wither);
        let mut list = vec![
            Metadata::new(10, MetaValue::VarInt(0)),
            Metadata::new(0, MetaValue::Byte(0)),
        ];
        tracker.handle_metadata(3, &mut list, &mut outbox).unwrap();
        assert_eq!(list, vec![Metadata::new(0, MetaValue::Byte(0))]);
    }

    #[test]
    fn test_boss_bar_health_and_title() {
        let mut tracker = tracker();
        let mut outbox = Outbox::default();
        tracker.add_entity(4, EntityType::EnderDragon);
        let mut list = vec![
            Metadata::new(2, MetaValue::String(String::new())),
            Metadata::new(6, MetaValue::Float(100.0)),
        ];
        tracker.handle_metadata(4, &mut list, &mut outbox).unwrap();
        let bar = tracker.boss_bar(4).unwrap();
        assert_eq!(bar.title(), "Ender Dragon");
        assert_eq!(bar.health(), 0.5);
        // add + health update
        assert_eq!(outbox.len(), 2);
    }

    #[test]
    fn test_anti_flicker_skips_health_updates() {
        let config = ProtocolConfig {
            bossbar_anti_flicker: true,
            ..ProtocolConfig::default()
        };
        let mut tracker = EntityTracker::new(ConnectionId(1), Arc::new(config));
        let mut outbox = Outbox::default();
        tracker.add_entity(4, EntityType::Wither);
        for health in [300.0, 150.0] {
            let mut list = vec![Metadata::new(6, MetaValue::Float(health))];
            tracker.handle_metadata(4, &mut list, &mut outbox).unwrap();
        }
        // health alone never shows a bar
        assert!(tracker.boss_bar(4).is_none());
        assert!(outbox.is_empty());

        // the name still does, and later health stays put
        let mut list = vec![Metadata::new(2, MetaValue::String("Boss".into()))];
        tracker.handle_metadata(4, &mut list, &mut outbox).unwrap();
        let mut list = vec![Metadata::new(6, MetaValue::Float(30.0))];
        tracker.handle_metadata(4, &mut list, &mut outbox).unwrap();
        assert_eq!(tracker.boss_bar(4).unwrap().health(), 1.0);
        assert_eq!(outbox.len(), 1);
    }

    #[test]
    fn test_blocking_player_gets_shield() {
        let mut tracker = tracker();
        let mut outbox = Outbox::default();
        tracker.set_entity_id(1);
        tracker.add_entity(2, EntityType::Player);
        tracker.set_can_block(2, true);
        let mut list = vec![Metadata::new(0, MetaValue::Byte(FLAG_BLOCKING))];
        tracker.handle_metadata(2, &mut list, &mut outbox).unwrap();

        let mut data = outbox.drain().remove(0).data;
        assert_eq!(read_varint(&mut data).unwrap(), ENTITY_EQUIPMENT);
        assert_eq!(VAR_INT.read(&mut data).unwrap(), 2);
        assert_eq!(VAR_INT.read(&mut data).unwrap(), OFF_HAND_SLOT);
        assert_eq!(ITEM.read(&mut data).unwrap().map(|i| i.id), Some(ITEM_SHIELD));

        // own player is never touched
        tracker.add_entity(1, EntityType::Player);
        tracker.handle_metadata(1, &mut list, &mut outbox).unwrap();
        assert!(outbox.is_empty());
    }

    #[test]
    fn test_blocking_without_sword_leaves_off_hand() {
        let mut tracker = tracker();
        let mut outbox = Outbox::default();
        tracker.add_entity(2, EntityType::Player);
        let mut list = vec![Metadata::new(0, MetaValue::Byte(FLAG_BLOCKING))];
        tracker.handle_metadata(2, &mut list, &mut outbox).unwrap();
        assert!(outbox.is_empty());

        // dropping the flag clears the hand
        let mut list = vec![Metadata::new(0, MetaValue::Byte(0))];
        tracker.handle_metadata(2, &mut list, &mut outbox).unwrap();
        let mut data = outbox.drain().remove(0).data;
        assert_eq!(read_varint(&mut data).unwrap(), ENTITY_EQUIPMENT);
        assert_eq!(VAR_INT.read(&mut data).unwrap(), 2);
        assert_eq!(VAR_INT.read(&mut data).unwrap(), OFF_HAND_SLOT);
        assert_eq!(ITEM.read(&mut data).unwrap(), None);
    }

    #[test]
    fn test_hologram_registered_once() {
        let mut tracker = tracker();
        let mut outbox = Outbox::default();
        tracker.add_entity(9, EntityType::ArmorStand);
        let list = vec![
            Metadata::new(0, MetaValue::Byte(FLAG_INVISIBLE)),
            Metadata::new(2, MetaValue::String("Hello".into())),
            Metadata::new(3, MetaValue::Boolean(true)),
            Metadata::new(10, MetaValue::Byte(ARMOR_STAND_SMALL)),
        ];
        tracker.handle_metadata(9, &mut list.clone(), &mut outbox).unwrap();
        tracker.handle_metadata(9, &mut list.clone(), &mut outbox).unwrap();
        assert!(tracker.is_hologram(9));
        let packets = outbox.drain();
        assert_eq!(packets.len(), 1);
        let mut data = packets[0].data.clone();
        assert_eq!(read_varint(&mut data).unwrap(), ENTITY_RELATIVE_MOVE);
        assert_eq!(VAR_INT.read(&mut data).unwrap(), 9);
        assert_eq!(SHORT.read(&mut data).unwrap(), 0);
        assert_eq!(SHORT.read(&mut data).unwrap(), -4096);
    }

    #[test]
    fn test_team_created_once() {
        let mut tracker = tracker();
        let mut outbox = Outbox::default();
        tracker.send_team_packet(true, "Steve", &mut outbox).unwrap();
        tracker.send_team_packet(true, "Steve", &mut outbox).unwrap();
        assert!(tracker.team_exists());
        tracker.send_team_packet(false, "Steve", &mut outbox).unwrap();
        assert!(!tracker.team_exists());

        let modes: Vec<i8> = outbox
            .drain()
            .into_iter()
            .map(|packet| {
                let mut data = packet.data;
                assert_eq!(read_varint(&mut data).unwrap(), TEAMS);
                assert_eq!(STRING.read(&mut data).unwrap(), AUTO_TEAM_NAME);
                BYTE.read(&mut data).unwrap()
            })
            .collect();
        assert_eq!(modes, vec![0, 3, 1]);
    }

    #[test]
    fn test_dispose_hides_bars() {
        let mut tracker = tracker();
        let mut outbox = Outbox::default();
        tracker.add_entity(4, EntityType::Wither);
        let mut list = vec![Metadata::new(2, MetaValue::String("Boss".into()))];
        tracker.handle_metadata(4, &mut list, &mut outbox).unwrap();
        outbox.drain();
        StoredObject::dispose(&mut tracker, &mut outbox);
        assert_eq!(outbox.len(), 1);
        assert_eq!(packet_id(&outbox.drain()[0].data), crate::packets::BOSS_BAR);
    }

    #[test]
    fn test_block_interaction_and_held_item() {
        let mut tracker = tracker();
        let pos = BlockPos::new(1, 65, 1);
        assert!(!tracker.is_block_interaction(&pos));
        tracker.add_block_interaction(pos);
        assert!(tracker.is_block_interaction(&pos));

        tracker.set_hotbar_item(2, Some(ItemStack::new(276, 1, 0)));
        tracker.set_held_slot(2);
        assert_eq!(tracker.held_item().map(|i| i.id), Some(276));
        tracker.set_held_slot(12);
        assert_eq!(tracker.held_slot(), 2);
    }
}
