use crate::chat::text_component;
use crate::packets::BOSS_BAR;
use tracing::trace;
use uuid::Uuid;
use viaduct_protocol_core::types::{FLOAT, STRING, UNSIGNED_BYTE, UUID, VAR_INT};
use viaduct_protocol_core::{ConnectionId, Direction, Outbox, PacketContext, TranslateResult};

const ACTION_ADD: i32 = 0;
const ACTION_REMOVE: i32 = 1;
const ACTION_HEALTH: i32 = 2;
const ACTION_TITLE: i32 = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BossColor {
    Pink = 0,
    Blue = 1,
    Red = 2,
    Green = 3,
    Yellow = 4,
    Purple = 5,
    White = 6,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BossStyle {
    Solid = 0,
    Segmented6 = 1,
    Segmented10 = 2,
    Segmented12 = 3,
    Segmented20 = 4,
}

/// A boss bar shown on a 1.9 client for a 1.8 boss entity.
///
/// Changes made while the bar is hidden are only sent with the next `show`.
#[derive(Debug, Clone)]
pub struct BossBar {
    uuid: Uuid,
    connection: ConnectionId,
    title: String,
    health: f32,
    color: BossColor,
    style: BossStyle,
    visible: bool,
}

impl BossBar {
    pub fn new(connection: ConnectionId, title: impl Into<String>, health: f32) -> Self {
        Self {
            uuid: Uuid::new_v4(),
            connection,
            title: title.into(),
            health: health.clamp(0.0, 1.0),
            color: BossColor::Pink,
            style: BossStyle::Solid,
            visible: false,
        }
    }

    pub fn uuid(&self) -> Uuid {
        self.uuid
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn health(&self) -> f32 {
        self.health
    }

    pub fn color(&self) -> BossColor {
        self.color
    }

    pub fn style(&self) -> BossStyle {
        self.style
    }

    pub fn is_visible(&self) -> bool {
        self.visible
    }

    pub fn show(&mut self, outbox: &mut Outbox) -> TranslateResult<()> {
        if self.visible {
            return Ok(());
        }
        self.visible = true;
        trace!("Showing boss bar {} \"{}\"", self.uuid, self.title);
        let mut packet = self.packet(ACTION_ADD);
        packet.write(&STRING, text_component(&self.title));
        packet.write(&FLOAT, self.health);
        packet.write(&VAR_INT, self.color as i32);
        packet.write(&VAR_INT, self.style as i32);
        packet.write(&UNSIGNED_BYTE, 0);
        packet.send_to(Direction::Outbound, outbox)
    }

    pub fn hide(&mut self, outbox: &mut Outbox) -> TranslateResult<()> {
        if !self.visible {
            return Ok(());
        }
        self.visible = false;
        trace!("Hiding boss bar {}", self.uuid);
        self.packet(ACTION_REMOVE).send_to(Direction::Outbound, outbox)
    }

    pub fn set_title(&mut self, title: impl Into<String>, outbox: &mut Outbox) -> TranslateResult<()> {
        self.title = title.into();
        if !self.visible {
            return Ok(());
        }
        let mut packet = self.packet(ACTION_TITLE);
        packet.write(&STRING, text_component(&self.title));
        packet.send_to(Direction::Outbound, outbox)
    }

    /// Progress between 0 and 1, clamped.
    pub fn set_health(&mut self, health: f32, outbox: &mut Outbox) -> TranslateResult<()> {
        self.health = health.clamp(0.0, 1.0);
        if !self.visible {
            return Ok(());
        }
        let mut packet = self.packet(ACTION_HEALTH);
        packet.write(&FLOAT, self.health);
        packet.send_to(Direction::Outbound, outbox)
    }

    fn packet(&self, action: i32) -> PacketContext {
        let mut packet = PacketContext::new(Some(BOSS_BAR), None, self.connection);
        packet.write(&UUID, self.uuid);
        packet.write(&VAR_INT, action);
        packet
    }
}
