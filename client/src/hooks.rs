use crate::session::{ClientPlayer, SessionHooks};
use log::info;
use shared::AttackSide;

/// Stands in for a game: every tile is an object, and every callback is
/// written to the log.
///
/// Used by the headless client and by a host playing in its own match.
#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingHooks;

impl SessionHooks for LoggingHooks {
    type Object = (i32, i32);

    fn object_at(&self, tile_x: i32, tile_y: i32) -> Option<(i32, i32)> {
        Some((tile_x, tile_y))
    }

    fn load_level(&mut self, level_id: i32) {
        info!("Loading level {}", level_id);
    }

    fn on_collision_enter(&mut self, player: &ClientPlayer, object: &(i32, i32)) {
        info!("Player {} touched tile {:?}", player.id(), object);
    }

    fn on_collision_exit(&mut self, player: &ClientPlayer, object: &(i32, i32)) {
        info!("Player {} left tile {:?}", player.id(), object);
    }

    fn on_attack_change(&mut self, player: &ClientPlayer, side: AttackSide, active: bool) {
        info!(
            "Player {} {} {:?} attack",
            player.id(),
            if active { "started" } else { "stopped" },
            side
        );
    }

    fn on_hit(&mut self, local: &mut ClientPlayer, attacker: &ClientPlayer) {
        local.record.alive = false;
        info!("Knocked out by player {}", attacker.id());
    }

    fn on_player_left(&mut self, player: &ClientPlayer) {
        info!("Player {} is gone", player.id());
    }

    fn on_unable_to_connect(&mut self) {
        info!("Could not reach the server");
    }
}
