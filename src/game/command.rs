//! Command application - turns a player's latest input into velocity,
//! stamina, cooldown and kick impulses

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::config::GameConfig;
use crate::ws::protocol::{lenient_bool, lenient_f32};

use super::entity::{Ball, Player};
use super::geometry::{clamp, Vec2};

/// One decoded `input` message.
///
/// Every field decodes leniently: wrong types and missing fields become
/// `false` / `0.0` instead of failing the message.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InputCommand {
    #[serde(deserialize_with = "lenient_bool")]
    pub up: bool,
    #[serde(deserialize_with = "lenient_bool")]
    pub down: bool,
    #[serde(deserialize_with = "lenient_bool")]
    pub left: bool,
    #[serde(deserialize_with = "lenient_bool")]
    pub right: bool,
    #[serde(deserialize_with = "lenient_bool")]
    pub sprint: bool,
    #[serde(deserialize_with = "lenient_bool")]
    pub kick: bool,
    #[serde(deserialize_with = "lenient_f32")]
    pub aimx: f32,
    #[serde(deserialize_with = "lenient_f32")]
    pub aimy: f32,
}

impl InputCommand {
    /// Movement intent per axis, each in `{-1, 0, 1}`
    pub fn axis(&self) -> Vec2 {
        Vec2::new(
            self.right as i8 as f32 - self.left as i8 as f32,
            self.down as i8 as f32 - self.up as i8 as f32,
        )
    }

    pub fn aim(&self) -> Vec2 {
        Vec2::new(self.aimx, self.aimy)
    }
}

/// Latest-wins hand-off cell between a connection's reader and the tick loop.
///
/// Writers replace the whole command under the lock; the tick loop takes it
/// once per tick, so commands arriving between ticks coalesce.
#[derive(Debug, Clone, Default)]
pub struct PendingInput {
    slot: Arc<Mutex<Option<InputCommand>>>,
}

impl PendingInput {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn replace(&self, command: InputCommand) {
        *self.slot.lock() = Some(command);
    }

    pub fn take(&self) -> Option<InputCommand> {
        self.slot.lock().take()
    }
}

/// Result of evaluating the kick flag
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KickOutcome {
    /// No kick requested, or still cooling down
    None,
    /// Kick requested but the ball was out of reach; cooldown still consumed
    Whiffed,
    /// Impulse applied to the ball
    Struck,
}

/// Apply one command to `player` for a step of `dt` seconds.
///
/// Movement adds acceleration so friction governs deceleration. A kick
/// attempt resets the cooldown whether or not the ball was in reach.
pub fn apply_command(
    player: &mut Player,
    command: &InputCommand,
    ball: &mut Ball,
    config: &GameConfig,
    dt: f32,
) -> KickOutcome {
    let aim = command.aim();
    player.aim = if aim.x.is_finite() && aim.y.is_finite() {
        aim
    } else {
        Vec2::ZERO
    };
    player.sprint = command.sprint;
    player.kick = command.kick;

    let boosted = command.sprint && player.stamina > 0.0;
    let speed = if boosted {
        config.player_speed * config.sprint_multiplier
    } else {
        config.player_speed
    };
    let axis = command.axis();
    player.vel += axis * (speed * dt);

    let moving = axis != Vec2::ZERO;
    if command.sprint && moving {
        player.stamina -= config.stamina_drain * dt;
    } else {
        player.stamina += config.stamina_regen * dt;
    }
    player.stamina = clamp(player.stamina, 0.0, config.stamina_max);

    if !command.kick || player.cooldown > 0.0 {
        return KickOutcome::None;
    }

    player.cooldown = config.kick_cooldown;

    let to_ball = ball.pos - player.pos;
    let reach = config.kick_reach();
    if to_ball.length_squared() > reach * reach {
        return KickOutcome::Whiffed;
    }

    // Aim magnitude may be infinite for huge components; that still counts
    // as a deliberate aim
    let aimed = if player.aim.length() >= config.min_aim {
        player.aim.normalized()
    } else {
        None
    };
    let direction = aimed
        .or_else(|| to_ball.normalized())
        .unwrap_or(Vec2::new(1.0, 0.0));

    ball.vel += direction * config.kick_impulse;
    ball.last_touch = Some(player.id);
    KickOutcome::Struck
}

/// Count the kick cooldown down by one step, never below zero
pub fn decay_cooldown(player: &mut Player, dt: f32) {
    player.cooldown = (player.cooldown - dt).max(0.0);
}
