use serde::Deserialize;

/// Behaviour switches of the 1.9 -> 1.8 rule set. Loaded once, shared by `Arc`.
#[derive(Debug, Clone, Deserialize)]
pub struct ProtocolConfig {
    /// Show a shield in the off hand of players blocking with a sword.
    #[serde(default = "default_true")]
    pub shield_blocking: bool,
    /// Lift invisible small armor stands so hologram text stays in place.
    #[serde(default = "default_true")]
    pub hologram_patch: bool,
    #[serde(default = "default_hologram_y_offset")]
    pub hologram_y_offset: f64,
    /// Show withers and ender dragons as 1.9 boss bars.
    #[serde(default = "default_true")]
    pub bossbar_patch: bool,
    /// Don't update boss bar health (health updates flicker on 1.9 clients).
    #[serde(default)]
    pub bossbar_anti_flicker: bool,
    /// Teams disable player collision.
    #[serde(default = "default_true")]
    pub prevent_collision: bool,
    /// Show the 1.9 effect indicator for potion effects with particles.
    #[serde(default = "default_true")]
    pub new_effect_indicator: bool,
    /// Log metadata for untracked entities at debug instead of warn.
    #[serde(default)]
    pub suppress_unknown_entities: bool,
    /// Put each player in a team that never collides, unless the server
    /// assigns one.
    #[serde(default = "default_true")]
    pub auto_team: bool,
}

fn default_true() -> bool {
    true
}

fn default_hologram_y_offset() -> f64 {
    -1.0
}

impl Default for ProtocolConfig {
    fn default() -> Self {
        Self {
            shield_blocking: true,
            hologram_patch: true,
            hologram_y_offset: default_hologram_y_offset(),
            bossbar_patch: true,
            bossbar_anti_flicker: false,
            prevent_collision: true,
            new_effect_indicator: true,
            suppress_unknown_entities: false,
            auto_team: true,
        }
    }
}
