//! Player and ball records owned by the match

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::config::GameConfig;

use super::geometry::Vec2;

/// Stable player identity, assigned in join order
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PlayerId(pub u32);

impl fmt::Display for PlayerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The two sides of the pitch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Team {
    /// Defends the left goal, attacks to the right
    Red,
    /// Defends the right goal, attacks to the left
    Blue,
}

impl Team {
    pub fn label(self) -> &'static str {
        match self {
            Team::Red => "Red",
            Team::Blue => "Blue",
        }
    }
}

/// One connected participant (authoritative)
#[derive(Debug, Clone)]
pub struct Player {
    pub id: PlayerId,
    pub name: String,
    pub team: Team,

    pub pos: Vec2,
    pub vel: Vec2,

    // Most recently applied intent
    pub sprint: bool,
    pub kick: bool,
    pub aim: Vec2,

    /// Seconds until the next kick is allowed, never negative
    pub cooldown: f32,
    /// Always within `[0, stamina_max]`
    pub stamina: f32,
    /// Goals credited to this player
    pub score: u32,
}

impl Player {
    pub fn new(id: PlayerId, name: String, team: Team, pos: Vec2, config: &GameConfig) -> Self {
        Self {
            id,
            name,
            team,
            pos,
            vel: Vec2::ZERO,
            sprint: false,
            kick: false,
            aim: Vec2::ZERO,
            cooldown: 0.0,
            stamina: config.stamina_max,
            score: 0,
        }
    }
}

/// The single shared ball
#[derive(Debug, Clone)]
pub struct Ball {
    pub pos: Vec2,
    pub vel: Vec2,
    /// Last player to kick or touch the ball, credited on a goal
    pub last_touch: Option<PlayerId>,
}

impl Ball {
    pub fn at(pos: Vec2) -> Self {
        Self {
            pos,
            vel: Vec2::ZERO,
            last_touch: None,
        }
    }
}

/// Trim and bound a requested display name
pub fn sanitize_name(raw: &str, limit: usize) -> String {
    let name: String = raw.trim().chars().take(limit).collect();
    if name.is_empty() {
        "Player".to_string()
    } else {
        name
    }
}
