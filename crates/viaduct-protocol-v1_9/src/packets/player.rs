use super::{tracker, TEAMS};
use crate::chat::fix_json;
use crate::storage::{EntityTracker, AUTO_TEAM_NAME};
use serde_json::Value as Json;
use tracing::{debug, warn};
use uuid::Uuid;
use viaduct_protocol_core::types::{
    BOOLEAN, BYTE, DOUBLE, FLOAT, INT, NOTHING, SHORT, STRING, STRING_ARRAY, UNSIGNED_BYTE, UUID,
    VAR_INT,
};
use viaduct_protocol_core::{
    ConnectionState, PacketContext, PacketRemapper, RegistryBuilder, TranslateResult,
    UserConnection,
};
use viaduct_types::EntityType;

// Status / login clientbound (same ids on both versions)
const STATUS_RESPONSE: i32 = 0x00;
const LOGIN_SUCCESS: i32 = 0x02;

// Play clientbound, 1.8 ids
const KEEP_ALIVE: i32 = 0x00;
const JOIN_GAME: i32 = 0x01;
const CHAT_MESSAGE: i32 = 0x02;
const TIME_UPDATE: i32 = 0x03;
const SPAWN_POSITION: i32 = 0x05;
const UPDATE_HEALTH: i32 = 0x06;
const RESPAWN: i32 = 0x07;
const PLAYER_POSITION: i32 = 0x08;
const HELD_ITEM_CHANGE: i32 = 0x09;
const CHANGE_GAME_STATE: i32 = 0x2B;
const STATISTICS: i32 = 0x37;
const PLAYER_LIST_ITEM: i32 = 0x38;
const PLAYER_ABILITIES: i32 = 0x39;
const TAB_COMPLETE: i32 = 0x3A;
const SCOREBOARD_OBJECTIVE: i32 = 0x3B;
const UPDATE_SCORE: i32 = 0x3C;
const DISPLAY_SCOREBOARD: i32 = 0x3D;
const TEAMS_1_8: i32 = 0x3E;
const PLUGIN_MESSAGE: i32 = 0x3F;
const DISCONNECT: i32 = 0x40;
const COMBAT_EVENT: i32 = 0x42;
const CAMERA: i32 = 0x43;
const TITLE: i32 = 0x45;
const SET_COMPRESSION: i32 = 0x46;
const PLAYER_LIST_HEADER_FOOTER: i32 = 0x47;
const RESOURCE_PACK_SEND: i32 = 0x48;

// Play serverbound, 1.9 ids
const TELEPORT_CONFIRM: i32 = 0x00;
const CLIENT_TAB_COMPLETE: i32 = 0x01;
const CLIENT_CHAT: i32 = 0x02;
const CLIENT_STATUS: i32 = 0x03;
const CLIENT_SETTINGS: i32 = 0x04;
const CLIENT_PLUGIN_MESSAGE: i32 = 0x09;
const USE_ENTITY: i32 = 0x0A;
const CLIENT_KEEP_ALIVE: i32 = 0x0B;
const PLAYER_POSITION_ONLY: i32 = 0x0C;
const PLAYER_POSITION_LOOK: i32 = 0x0D;
const PLAYER_LOOK: i32 = 0x0E;
const PLAYER_GROUND: i32 = 0x0F;
const VEHICLE_MOVE: i32 = 0x10;
const STEER_BOAT: i32 = 0x11;
const CLIENT_ABILITIES: i32 = 0x12;
const ENTITY_ACTION: i32 = 0x14;
const STEER_VEHICLE: i32 = 0x15;
const RESOURCE_PACK_STATUS: i32 = 0x16;
const CLIENT_HELD_ITEM: i32 = 0x17;
const CLIENT_ANIMATION: i32 = 0x1A;
const SPECTATE: i32 = 0x1B;

/// Client status action the 1.9 client sends when opening its inventory.
const STATUS_OPEN_INVENTORY: i32 = 2;

pub(super) fn register(registry: &mut RegistryBuilder) {
    use ConnectionState::{Login, Play, Status};

    registry.register_outbound(
        Status,
        STATUS_RESPONSE,
        STATUS_RESPONSE,
        PacketRemapper::new().map_with(&STRING, &STRING, |json, _, conn| {
            Ok(rewrite_status(&json, conn.info().client_protocol))
        }),
    );

    registry.register_outbound(
        Login,
        LOGIN_SUCCESS,
        LOGIN_SUCCESS,
        PacketRemapper::new()
            .map(&STRING)
            .map(&STRING)
            .handler(|ctx, conn| {
                let uuid = ctx.get(&STRING, 0)?;
                let username = ctx.get(&STRING, 1)?;
                let info = conn.info_mut();
                match Uuid::parse_str(&uuid) {
                    Ok(uuid) => info.uuid = Some(uuid),
                    Err(e) => warn!("Login success with unparsable uuid {:?}: {}", uuid, e),
                }
                debug!("Connection {} logged in as {}", info.id, username);
                info.username = Some(username);
                Ok(())
            }),
    );

    // === Clientbound ===

    registry.register_outbound(
        Play,
        JOIN_GAME,
        0x23,
        PacketRemapper::new()
            .map(&INT)
            .map(&UNSIGNED_BYTE)
            .map(&BYTE)
            .map(&UNSIGNED_BYTE)
            .map(&UNSIGNED_BYTE)
            .map(&STRING)
            .map(&BOOLEAN)
            .handler(|ctx, conn| {
                let entity = ctx.get(&INT, 0)?;
                let username = conn.info().username.clone();
                conn.with::<EntityTracker, _>(|tracker, outbox| {
                    tracker.add_entity(entity, EntityType::Player);
                    tracker.set_entity_id(entity);
                    match username {
                        Some(name) if tracker.auto_team() => {
                            tracker.send_team_packet(true, &name, outbox)
                        }
                        _ => Ok(()),
                    }
                })
            }),
    );

    registry.register_outbound(
        Play,
        CHAT_MESSAGE,
        0x0F,
        PacketRemapper::new()
            .map_with(&STRING, &STRING, |json, _, _| Ok(fix_json(&json)))
            .map(&BYTE),
    );

    registry.register_outbound(
        Play,
        PLAYER_POSITION,
        0x2E,
        PacketRemapper::new()
            .map(&DOUBLE)
            .map(&DOUBLE)
            .map(&DOUBLE)
            .map(&FLOAT)
            .map(&FLOAT)
            .map(&BYTE)
            // teleport id, never confirmed to a 1.8 server
            .create(&VAR_INT, 0),
    );

    registry.register_outbound(
        Play,
        HELD_ITEM_CHANGE,
        0x37,
        PacketRemapper::new().map(&BYTE).handler(|ctx, conn| {
            let slot = ctx.get(&BYTE, 0)?;
            tracker(conn).set_held_slot(slot as i16);
            Ok(())
        }),
    );

    registry.register_outbound(
        Play,
        PLAYER_LIST_ITEM,
        0x2D,
        PacketRemapper::new().handler(rewrite_player_list),
    );

    registry.register_outbound(Play, TEAMS_1_8, TEAMS, PacketRemapper::new().handler(rewrite_teams));

    registry.register_outbound(
        Play,
        DISCONNECT,
        0x1A,
        PacketRemapper::new().map_with(&STRING, &STRING, |json, _, _| Ok(fix_json(&json))),
    );

    registry.register_outbound(
        Play,
        TITLE,
        0x45,
        PacketRemapper::new().map(&VAR_INT).handler(|ctx, _| {
            // title and subtitle carry a chat component
            if matches!(ctx.get(&VAR_INT, 0)?, 0 | 1) {
                let json = ctx.read(&STRING)?;
                ctx.write(&STRING, fix_json(&json));
            }
            Ok(())
        }),
    );

    registry.register_outbound(
        Play,
        PLAYER_LIST_HEADER_FOOTER,
        0x48,
        PacketRemapper::new()
            .map_with(&STRING, &STRING, |json, _, _| Ok(fix_json(&json)))
            .map_with(&STRING, &STRING, |json, _, _| Ok(fix_json(&json))),
    );

    // compression is switched on by the login phase only
    registry.cancel_outbound(Play, SET_COMPRESSION);

    for (old_id, new_id) in [
        (KEEP_ALIVE, 0x1F),
        (TIME_UPDATE, 0x44),
        (SPAWN_POSITION, 0x43),
        (UPDATE_HEALTH, 0x3E),
        (RESPAWN, 0x33),
        (CHANGE_GAME_STATE, 0x1E),
        (STATISTICS, 0x07),
        (PLAYER_ABILITIES, 0x2B),
        (TAB_COMPLETE, 0x0E),
        (SCOREBOARD_OBJECTIVE, 0x3F),
        (UPDATE_SCORE, 0x42),
        (DISPLAY_SCOREBOARD, 0x38),
        (PLUGIN_MESSAGE, 0x18),
        (COMBAT_EVENT, 0x2C),
        (CAMERA, 0x36),
        (RESOURCE_PACK_SEND, 0x32),
    ] {
        registry.register_outbound(Play, old_id, new_id, None);
    }

    // === Serverbound ===

    registry.cancel_inbound(Play, TELEPORT_CONFIRM);
    registry.cancel_inbound(Play, VEHICLE_MOVE);
    registry.cancel_inbound(Play, STEER_BOAT);

    registry.register_inbound(
        Play,
        CLIENT_TAB_COMPLETE,
        0x14,
        PacketRemapper::new()
            .map(&STRING)
            // "assume command" flag
            .map_to(&BOOLEAN, &NOTHING),
    );

    registry.register_inbound(
        Play,
        CLIENT_STATUS,
        0x16,
        PacketRemapper::new().map(&VAR_INT).handler(|ctx, conn| {
            if ctx.get(&VAR_INT, 0)? != STATUS_OPEN_INVENTORY {
                return Ok(());
            }
            conn.with::<EntityTracker, _>(|tracker, outbox| {
                if !tracker.is_blocking() {
                    return Ok(());
                }
                tracker.set_blocking(false);
                match tracker.entity_id() {
                    Some(own) => tracker.set_second_hand(own, None, outbox),
                    None => Ok(()),
                }
            })
        }),
    );

    registry.register_inbound(
        Play,
        CLIENT_SETTINGS,
        0x15,
        PacketRemapper::new()
            .map(&STRING)
            .map(&BYTE)
            // chat mode
            .map_to(&VAR_INT, &BYTE)
            .map(&BOOLEAN)
            .map(&UNSIGNED_BYTE)
            // main hand
            .map_to(&VAR_INT, &NOTHING),
    );

    registry.register_inbound(
        Play,
        USE_ENTITY,
        0x02,
        PacketRemapper::new()
            .map(&VAR_INT)
            .map(&VAR_INT)
            .handler(|ctx, _| {
                let action = ctx.get(&VAR_INT, 1)?;
                // interact at
                if action == 2 {
                    ctx.passthrough(&FLOAT)?;
                    ctx.passthrough(&FLOAT)?;
                    ctx.passthrough(&FLOAT)?;
                }
                if action == 0 || action == 2 {
                    let hand = ctx.read(&VAR_INT)?;
                    // 1.8 has no off hand; the main hand packet already did it
                    if hand == 1 {
                        ctx.cancel();
                    }
                }
                Ok(())
            }),
    );

    registry.register_inbound(
        Play,
        ENTITY_ACTION,
        0x0B,
        PacketRemapper::new()
            .map(&VAR_INT)
            .map(&VAR_INT)
            .handler(|ctx, _| {
                match ctx.get(&VAR_INT, 1)? {
                    // stop horse jump, start elytra flying
                    6 | 8 => ctx.cancel(),
                    // open horse inventory
                    7 => ctx.set(&VAR_INT, 1, 6)?,
                    _ => {}
                }
                Ok(())
            }),
    );

    registry.register_inbound(
        Play,
        CLIENT_HELD_ITEM,
        0x09,
        PacketRemapper::new().map(&SHORT).handler(|ctx, conn| {
            let slot = ctx.get(&SHORT, 0)?;
            tracker(conn).set_held_slot(slot);
            Ok(())
        }),
    );

    registry.register_inbound(
        Play,
        CLIENT_ANIMATION,
        0x0A,
        // hand
        PacketRemapper::new().map_to(&VAR_INT, &NOTHING),
    );

    for (old_id, new_id) in [
        (CLIENT_CHAT, 0x01),
        (CLIENT_PLUGIN_MESSAGE, 0x17),
        (CLIENT_KEEP_ALIVE, 0x00),
        (PLAYER_POSITION_ONLY, 0x04),
        (PLAYER_POSITION_LOOK, 0x06),
        (PLAYER_LOOK, 0x05),
        (PLAYER_GROUND, 0x03),
        (CLIENT_ABILITIES, 0x13),
        (STEER_VEHICLE, 0x0C),
        (RESOURCE_PACK_STATUS, 0x19),
        (SPECTATE, 0x18),
    ] {
        registry.register_inbound(Play, old_id, new_id, None);
    }
}

/// Advertise the client's own protocol so the server list shows it as compatible.
fn rewrite_status(json: &str, client_protocol: i32) -> String {
    let Ok(mut status) = serde_json::from_str::<Json>(json) else {
        debug!("Leaving unparsable status response alone");
        return json.to_string();
    };
    if client_protocol < 0 {
        return json.to_string();
    }
    match status.get_mut("version") {
        Some(Json::Object(version)) => {
            version.insert("protocol".to_string(), Json::from(client_protocol));
            status.to_string()
        }
        _ => json.to_string(),
    }
}

fn rewrite_player_list(ctx: &mut PacketContext, _conn: &mut UserConnection) -> TranslateResult<()> {
    let action = ctx.passthrough(&VAR_INT)?;
    let count = ctx.passthrough(&VAR_INT)?;
    for _ in 0..count {
        ctx.passthrough(&UUID)?;
        match action {
            // add player
            0 => {
                ctx.passthrough(&STRING)?;
                let properties = ctx.passthrough(&VAR_INT)?;
                for _ in 0..properties {
                    ctx.passthrough(&STRING)?;
                    ctx.passthrough(&STRING)?;
                    if ctx.passthrough(&BOOLEAN)? {
                        ctx.passthrough(&STRING)?;
                    }
                }
                ctx.passthrough(&VAR_INT)?;
                ctx.passthrough(&VAR_INT)?;
                passthrough_display_name(ctx)?;
            }
            // gamemode, latency
            1 | 2 => {
                ctx.passthrough(&VAR_INT)?;
            }
            3 => passthrough_display_name(ctx)?,
            _ => {}
        }
    }
    Ok(())
}

fn passthrough_display_name(ctx: &mut PacketContext) -> TranslateResult<()> {
    if ctx.passthrough(&BOOLEAN)? {
        let json = ctx.read(&STRING)?;
        ctx.write(&STRING, fix_json(&json));
    }
    Ok(())
}

/// Adds the 1.9 collision rule and keeps the auto team in step with the
/// teams the server assigns.
fn rewrite_teams(ctx: &mut PacketContext, conn: &mut UserConnection) -> TranslateResult<()> {
    let team = ctx.passthrough(&STRING)?;
    let mode = ctx.passthrough(&BYTE)?;

    if mode == 0 || mode == 2 {
        // display name, prefix, suffix, friendly fire, name tag visibility
        ctx.passthrough(&STRING)?;
        ctx.passthrough(&STRING)?;
        ctx.passthrough(&STRING)?;
        ctx.passthrough(&BYTE)?;
        ctx.passthrough(&STRING)?;
        let collision = if tracker(conn).config().prevent_collision {
            "never"
        } else {
            ""
        };
        ctx.write(&STRING, collision.to_string());
        ctx.passthrough(&BYTE)?;
    }

    let username = conn.info().username.clone();
    if mode == 0 || mode == 3 || mode == 4 {
        let players = ctx.passthrough(&STRING_ARRAY)?;
        let Some(name) = username else {
            return Ok(());
        };
        if !players.iter().any(|player| player.eq_ignore_ascii_case(&name)) {
            return Ok(());
        }
        if !tracker(conn).auto_team() {
            return Ok(());
        }
        if mode == 4 {
            // taken out of the server's team; rejoin ours once the removal is out
            conn.schedule(move |conn| rejoin_auto_team(conn, &name));
            return Ok(());
        }
        return conn.with::<EntityTracker, _>(|tracker, outbox| {
            tracker.send_team_packet(false, &name, outbox)?;
            tracker.set_current_team(team.as_str());
            Ok(())
        });
    }

    if mode == 1 {
        let Some(name) = username else {
            return Ok(());
        };
        conn.with::<EntityTracker, _>(|tracker, outbox| {
            if tracker.auto_team() && tracker.current_team() == Some(team.as_str()) {
                tracker.send_team_packet(true, &name, outbox)?;
                tracker.set_current_team(AUTO_TEAM_NAME);
            }
            Ok(())
        })?;
    }
    Ok(())
}

fn rejoin_auto_team(conn: &mut UserConnection, name: &str) {
    let result = conn.with::<EntityTracker, _>(|tracker, outbox| -> TranslateResult<()> {
        tracker.send_team_packet(true, name, outbox)?;
        tracker.set_current_team(AUTO_TEAM_NAME);
        Ok(())
    });
    if let Err(e) = result {
        warn!("Could not put {} back into the auto team: {}", name, e);
    }
}
