//! Snapshot building for network transmission

use serde::{Deserialize, Serialize};
use std::time::Instant;

use crate::util::time::unix_secs;

use super::entity::{PlayerId, Team};
use super::geometry::round_to;
use super::r#match::MatchState;

/// Read-only view of the match after a tick
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Snapshot {
    /// Server wall-clock time, seconds since the Unix epoch
    pub t: f64,
    /// `[width, height, goal_width, goal_height]`
    pub field: [f32; 4],
    /// `[red, blue]`
    pub score: [u32; 2],
    /// Whole seconds left in the round
    pub timer: u64,
    pub players: Vec<PlayerSnapshot>,
    pub ball: BallSnapshot,
    /// Current transient event, empty when expired
    pub event: String,
}

/// Player state in a snapshot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayerSnapshot {
    pub id: PlayerId,
    pub name: String,
    pub team: Team,
    pub x: f32,
    pub y: f32,
    pub vx: f32,
    pub vy: f32,
    pub stamina: f32,
    pub cooldown: f32,
    pub score: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BallSnapshot {
    pub x: f32,
    pub y: f32,
    pub vx: f32,
    pub vy: f32,
}

impl Snapshot {
    /// Capture `state` as of `now`, rounding for the wire
    pub fn capture(state: &MatchState, now: Instant) -> Self {
        let config = state.config();

        let players = state
            .players
            .values()
            .map(|p| PlayerSnapshot {
                id: p.id,
                name: p.name.clone(),
                team: p.team,
                x: round_to(p.pos.x, 2),
                y: round_to(p.pos.y, 2),
                vx: round_to(p.vel.x, 2),
                vy: round_to(p.vel.y, 2),
                stamina: round_to(p.stamina, 1),
                cooldown: round_to(p.cooldown, 2),
                score: p.score,
            })
            .collect();

        let ball = &state.ball;

        Self {
            t: unix_secs(),
            field: [
                config.field_width,
                config.field_height,
                config.goal_width,
                config.goal_height,
            ],
            score: [state.score.red, state.score.blue],
            timer: state.remaining_secs(now),
            players,
            ball: BallSnapshot {
                x: round_to(ball.pos.x, 2),
                y: round_to(ball.pos.y, 2),
                vx: round_to(ball.vel.x, 2),
                vy: round_to(ball.vel.y, 2),
            },
            event: state.event_text(now).to_string(),
        }
    }
}
