mod boss_bar;
mod entity_tracker;

pub use boss_bar::{BossBar, BossColor, BossStyle};
pub use entity_tracker::{EntityTracker, AUTO_TEAM_NAME};
