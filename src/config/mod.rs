//! Configuration module - environment variable parsing

use std::env;
use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;

/// Application configuration loaded from environment variables
#[derive(Clone, Debug)]
pub struct Config {
    /// Server binding address
    pub server_addr: SocketAddr,
    /// Log level (trace, debug, info, warn, error)
    pub log_level: String,
    /// Emit JSON log lines instead of the human-readable format
    pub log_json: bool,
    /// Allowed client origins for CORS (comma-separated), unrestricted when unset
    pub client_origin: Option<String>,
    /// Idle-read timeout before a connection is considered dead
    pub heartbeat: Duration,
    /// Match simulation settings
    pub game: GameConfig,
}

/// Upper bound on a round, keeps deadline arithmetic far from `Instant` overflow
const MAX_ROUND_SECONDS: u64 = 365 * 24 * 60 * 60;

/// Fixed simulation and room settings.
///
/// Distances are in field units, speeds in units per second, durations in
/// seconds. Friction and restitution are per-tick multipliers.
#[derive(Clone, Debug, PartialEq)]
pub struct GameConfig {
    pub tick_rate: u32,

    pub field_width: f32,
    pub field_height: f32,
    pub goal_width: f32,
    pub goal_height: f32,

    pub max_players: usize,
    pub win_goals: u32,
    pub round_seconds: u64,

    pub player_radius: f32,
    pub ball_radius: f32,

    pub player_speed: f32,
    pub sprint_multiplier: f32,
    pub player_friction: f32,
    pub ball_friction: f32,
    pub wall_restitution: f32,
    /// Fraction of the player/ball overlap removed per tick
    pub collision_correction: f32,
    /// Fraction of the player's velocity handed to the ball on contact
    pub momentum_transfer: f32,
    /// Velocity components below this snap to zero
    pub velocity_epsilon: f32,

    pub kick_margin: f32,
    pub kick_impulse: f32,
    pub kick_cooldown: f32,
    /// Aim vectors shorter than this fall back to the player-to-ball direction
    pub min_aim: f32,

    pub stamina_max: f32,
    pub stamina_drain: f32,
    pub stamina_regen: f32,

    /// How long the last notable event stays visible in snapshots
    pub event_display_secs: f32,
    pub spawn_jitter: f32,
    pub name_limit: usize,

    /// Seed for kickoff jitter; random when `None`
    pub seed: Option<u64>,
}

impl Default for GameConfig {
    fn default() -> Self {
        Self {
            tick_rate: 30,
            field_width: 1200.0,
            field_height: 700.0,
            goal_width: 20.0,
            goal_height: 220.0,
            max_players: 4,
            win_goals: 5,
            round_seconds: 180,
            player_radius: 18.0,
            ball_radius: 14.0,
            player_speed: 320.0,
            sprint_multiplier: 1.35,
            player_friction: 0.86,
            ball_friction: 0.985,
            wall_restitution: 0.7,
            collision_correction: 0.6,
            momentum_transfer: 0.25,
            velocity_epsilon: 4.0,
            kick_margin: 6.0,
            kick_impulse: 540.0,
            kick_cooldown: 0.6,
            min_aim: 0.2,
            stamina_max: 100.0,
            stamina_drain: 60.0,
            stamina_regen: 40.0,
            event_display_secs: 1.2,
            spawn_jitter: 20.0,
            name_limit: 12,
            seed: None,
        }
    }
}

impl GameConfig {
    /// Fixed simulation step in seconds
    pub fn dt(&self) -> f32 {
        1.0 / self.tick_rate as f32
    }

    pub fn tick_period(&self) -> Duration {
        Duration::from_secs_f64(1.0 / self.tick_rate as f64)
    }

    pub fn round_duration(&self) -> Duration {
        Duration::from_secs(self.round_seconds)
    }

    /// Vertical span `(top, bottom)` of the goal opening on both end lines
    pub fn goal_span(&self) -> (f32, f32) {
        let top = (self.field_height - self.goal_height) / 2.0;
        (top, top + self.goal_height)
    }

    /// Maximum centre distance at which a kick connects
    pub fn kick_reach(&self) -> f32 {
        self.player_radius + self.ball_radius + self.kick_margin
    }

    fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();
        let seed = match env::var("MATCH_SEED") {
            Ok(raw) => Some(parse_value("MATCH_SEED", &raw)?),
            Err(_) => None,
        };

        let game = Self {
            tick_rate: env_or("TICK_RATE", defaults.tick_rate)?,
            field_width: env_or("FIELD_WIDTH", defaults.field_width)?,
            field_height: env_or("FIELD_HEIGHT", defaults.field_height)?,
            goal_width: env_or("GOAL_WIDTH", defaults.goal_width)?,
            goal_height: env_or("GOAL_HEIGHT", defaults.goal_height)?,
            max_players: env_or("MAX_PLAYERS", defaults.max_players)?,
            win_goals: env_or("WIN_GOALS", defaults.win_goals)?,
            round_seconds: env_or("ROUND_SECONDS", defaults.round_seconds)?,
            seed,
            ..defaults
        };
        game.validate()?;
        Ok(game)
    }

    /// Reject settings the simulation cannot run with
    pub fn validate(&self) -> Result<(), ConfigError> {
        let dimensions = [
            self.field_width,
            self.field_height,
            self.goal_width,
            self.goal_height,
            self.player_radius,
            self.ball_radius,
        ];
        if dimensions.iter().any(|d| !d.is_finite() || *d <= 0.0) {
            return Err(ConfigError::Inconsistent("dimensions must be positive and finite"));
        }
        if self.tick_rate == 0 {
            return Err(ConfigError::Inconsistent("tick rate must be positive"));
        }
        if self.max_players == 0 {
            return Err(ConfigError::Inconsistent("room capacity must be positive"));
        }
        if self.win_goals == 0 {
            return Err(ConfigError::Inconsistent("win threshold must be positive"));
        }
        if self.round_seconds == 0 {
            return Err(ConfigError::Inconsistent("round duration must be positive"));
        }
        if self.round_seconds > MAX_ROUND_SECONDS {
            return Err(ConfigError::Inconsistent("round duration must be at most a year"));
        }
        if self.goal_height <= 0.0 || self.goal_height > self.field_height {
            return Err(ConfigError::Inconsistent("goal opening must fit the end line"));
        }
        let widest = self.player_radius.max(self.ball_radius) * 2.0;
        if widest >= self.field_width || widest >= self.field_height {
            return Err(ConfigError::Inconsistent("entities must fit inside the field"));
        }
        Ok(())
    }
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        let server_addr = if let Ok(port) = env::var("PORT") {
            format!("0.0.0.0:{}", port)
        } else {
            env::var("SERVER_ADDR").unwrap_or_else(|_| "0.0.0.0:8765".to_string())
        };

        let heartbeat_secs: u64 = env_or("HEARTBEAT_SECS", 15)?;
        if heartbeat_secs == 0 {
            return Err(ConfigError::Inconsistent("heartbeat must be positive"));
        }

        Ok(Self {
            server_addr: server_addr
                .parse()
                .map_err(|_| ConfigError::InvalidAddress)?,
            log_level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            log_json: matches!(env::var("LOG_FORMAT").as_deref(), Ok("json")),
            client_origin: env::var("CLIENT_ORIGIN").ok().filter(|s| !s.trim().is_empty()),
            heartbeat: Duration::from_secs(heartbeat_secs),
            game: GameConfig::from_env()?,
        })
    }
}

fn env_or<T: FromStr>(key: &'static str, default: T) -> Result<T, ConfigError> {
    match env::var(key) {
        Ok(raw) => parse_value(key, &raw),
        Err(_) => Ok(default),
    }
}

fn parse_value<T: FromStr>(key: &'static str, raw: &str) -> Result<T, ConfigError> {
    raw.trim().parse().map_err(|_| ConfigError::Invalid {
        key,
        value: raw.to_string(),
    })
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid value for {key}: {value:?}")]
    Invalid { key: &'static str, value: String },

    #[error("Invalid server address format")]
    InvalidAddress,

    #[error("Inconsistent configuration: {0}")]
    Inconsistent(&'static str),
}
