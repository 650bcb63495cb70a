//! Per-tick integration, wall and goal handling, player-ball contact

use crate::config::GameConfig;

use super::entity::{Ball, Player, Team};
use super::geometry::{clamp, Vec2};

/// What happened to the ball during its step
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BallStep {
    InPlay,
    /// The ball crossed an end line inside the goal opening
    Goal { scorer: Team },
}

/// Physics system for advancing players and the ball by one fixed step
pub struct PhysicsSystem;

impl PhysicsSystem {
    /// Friction, integration, then inelastic clamping to the field
    pub fn step_player(player: &mut Player, config: &GameConfig, dt: f32) {
        player.vel = player.vel * config.player_friction;
        player.pos += player.vel * dt;

        let r = config.player_radius;
        let (min_x, max_x) = (r, config.field_width - r);
        let (min_y, max_y) = (r, config.field_height - r);

        if player.pos.x < min_x || player.pos.x > max_x {
            player.pos.x = clamp(player.pos.x, min_x, max_x);
            player.vel.x = 0.0;
        }
        if player.pos.y < min_y || player.pos.y > max_y {
            player.pos.y = clamp(player.pos.y, min_y, max_y);
            player.vel.y = 0.0;
        }

        player.vel = player.vel.snap_small(config.velocity_epsilon);
    }

    /// Integrate the ball and handle the four boundaries.
    ///
    /// Returns early with [`BallStep::Goal`] when the ball leaves through an
    /// opening; the caller is expected to kick off before anything else
    /// touches the ball this tick.
    pub fn step_ball(ball: &mut Ball, config: &GameConfig, dt: f32) -> BallStep {
        ball.pos += ball.vel * dt;
        ball.vel = ball.vel * config.ball_friction;

        let r = config.ball_radius;
        let (goal_top, goal_bottom) = config.goal_span();
        let in_mouth = ball.pos.y > goal_top && ball.pos.y < goal_bottom;
        let restitution = config.wall_restitution;

        if ball.pos.x - r < 0.0 {
            if in_mouth {
                return BallStep::Goal { scorer: Team::Blue };
            }
            ball.pos.x = r;
            ball.vel.x = ball.vel.x.abs() * restitution;
        }
        if ball.pos.x + r > config.field_width {
            if in_mouth {
                return BallStep::Goal { scorer: Team::Red };
            }
            ball.pos.x = config.field_width - r;
            ball.vel.x = -ball.vel.x.abs() * restitution;
        }
        if ball.pos.y - r < 0.0 {
            ball.pos.y = r;
            ball.vel.y = ball.vel.y.abs() * restitution;
        }
        if ball.pos.y + r > config.field_height {
            ball.pos.y = config.field_height - r;
            ball.vel.y = -ball.vel.y.abs() * restitution;
        }

        BallStep::InPlay
    }

    /// Resolve circle overlaps between the ball and each player, in the
    /// order given.
    pub fn resolve_contacts<'a>(
        ball: &mut Ball,
        players: impl IntoIterator<Item = &'a Player>,
        config: &GameConfig,
    ) {
        let reach = config.ball_radius + config.player_radius;

        for player in players {
            let delta = ball.pos - player.pos;
            let dist_sq = delta.length_squared();
            if dist_sq >= reach * reach {
                continue;
            }

            let dist = dist_sq.sqrt();
            let normal = delta.normalized().unwrap_or(Vec2::new(1.0, 0.0));

            // Partial separation keeps multi-player pile-ups soft
            let overlap = reach - dist;
            ball.pos += normal * (overlap * config.collision_correction);

            let relative = ball.vel - player.vel;
            let into = relative.dot(normal);
            if into < 0.0 {
                ball.vel = ball.vel - normal * into;
            }

            ball.vel += player.vel * config.momentum_transfer;
            ball.last_touch = Some(player.id);
        }

        let r = config.ball_radius;
        ball.pos.x = clamp(ball.pos.x, r, config.field_width - r);
        ball.pos.y = clamp(ball.pos.y, r, config.field_height - r);
    }

    /// Snap near-zero ball velocity to rest
    pub fn settle_ball(ball: &mut Ball, config: &GameConfig) {
        ball.vel = ball.vel.snap_small(config.velocity_epsilon);
    }
}
