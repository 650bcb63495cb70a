//! Match state and round lifecycle

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info};

use crate::config::GameConfig;
use crate::ws::session::JoinError;

use super::command::{apply_command, decay_cooldown, InputCommand, KickOutcome};
use super::entity::{sanitize_name, Ball, Player, PlayerId, Team};
use super::geometry::{clamp, Vec2};
use super::physics::{BallStep, PhysicsSystem};

/// Goals per team for the current round
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Scoreboard {
    pub red: u32,
    pub blue: u32,
}

impl Scoreboard {
    fn credit(&mut self, team: Team) {
        match team {
            Team::Red => self.red += 1,
            Team::Blue => self.blue += 1,
        }
    }

    /// Winner by comparison, `None` on a draw
    pub fn leader(&self) -> Option<Team> {
        match self.red.cmp(&self.blue) {
            std::cmp::Ordering::Greater => Some(Team::Red),
            std::cmp::Ordering::Less => Some(Team::Blue),
            std::cmp::Ordering::Equal => None,
        }
    }
}

/// Outcome of a finished round
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RoundResult {
    pub winner: Option<Team>,
    pub final_score: Scoreboard,
}

impl RoundResult {
    pub fn text(&self) -> String {
        match self.winner {
            Some(team) => format!("{} wins!", team.label()),
            None => "Draw!".to_string(),
        }
    }
}

/// Lifecycle transitions taken during one tick
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TickReport {
    /// Scoring team when a goal triggered a kickoff
    pub goal: Option<Team>,
    /// Set when the round ended and was reset
    pub round: Option<RoundResult>,
    /// Players whose kick connected this tick
    pub kicks: Vec<PlayerId>,
}

/// Short-lived notable event shown in snapshots
#[derive(Debug, Clone)]
struct MatchEvent {
    text: String,
    at: Instant,
}

/// The single room's authoritative state: players, ball, score and timer
pub struct MatchState {
    config: Arc<GameConfig>,
    pub players: BTreeMap<PlayerId, Player>,
    pub ball: Ball,
    pub score: Scoreboard,
    pub round_deadline: Instant,
    pub tick: u64,
    event: Option<MatchEvent>,
    rng: ChaCha8Rng,
    next_id: u32,
}

impl MatchState {
    pub fn new(config: Arc<GameConfig>, now: Instant) -> Self {
        let seed = config.seed.unwrap_or_else(rand::random);
        let center = field_center(&config);
        let round_deadline = now + config.round_duration();

        Self {
            players: BTreeMap::new(),
            ball: Ball::at(center),
            score: Scoreboard::default(),
            round_deadline,
            tick: 0,
            event: None,
            rng: ChaCha8Rng::seed_from_u64(seed),
            next_id: 1,
            config,
        }
    }

    pub fn config(&self) -> &GameConfig {
        &self.config
    }

    /// Members per team as `(red, blue)`
    pub fn team_counts(&self) -> (usize, usize) {
        let red = self.players.values().filter(|p| p.team == Team::Red).count();
        (red, self.players.len() - red)
    }

    /// Team with fewer members, red on ties
    pub fn assign_team(&self) -> Team {
        let (red, blue) = self.team_counts();
        if red <= blue {
            Team::Red
        } else {
            Team::Blue
        }
    }

    pub fn is_full(&self) -> bool {
        self.players.len() >= self.config.max_players
    }

    /// Create a player on the smaller team, at its half's centre spot
    pub fn add_player(&mut self, name: &str) -> Result<&Player, JoinError> {
        if self.is_full() {
            return Err(JoinError::RoomFull);
        }

        let team = self.assign_team();
        let id = PlayerId(self.next_id);
        self.next_id += 1;

        let x = match team {
            Team::Red => self.config.field_width * 0.25,
            Team::Blue => self.config.field_width * 0.75,
        };
        let spawn = Vec2::new(x, self.config.field_height / 2.0);
        let name = sanitize_name(name, self.config.name_limit);
        let player = Player::new(id, name, team, spawn, &self.config);

        info!(player_id = %id, team = team.label(), "Player added to match");
        Ok(self.players.entry(id).or_insert(player))
    }

    pub fn remove_player(&mut self, id: PlayerId) -> Option<Player> {
        let player = self.players.remove(&id)?;
        if self.ball.last_touch == Some(id) {
            self.ball.last_touch = None;
        }
        Some(player)
    }

    /// Advance one fixed step: commands, physics, then lifecycle checks.
    ///
    /// `pending` yields each player's latest command; players without one
    /// get a neutral command.
    pub fn advance(
        &mut self,
        mut pending: impl FnMut(PlayerId) -> Option<InputCommand>,
        now: Instant,
    ) -> TickReport {
        let dt = self.config.dt();
        let mut report = TickReport::default();
        self.tick += 1;

        for player in self.players.values_mut() {
            decay_cooldown(player, dt);
            let command = pending(player.id).unwrap_or_default();
            match apply_command(player, &command, &mut self.ball, &self.config, dt) {
                KickOutcome::Struck => report.kicks.push(player.id),
                KickOutcome::Whiffed => {
                    debug!(player_id = %player.id, "Kick out of reach");
                }
                KickOutcome::None => {}
            }
        }
        if let Some(kicker) = report.kicks.last().and_then(|id| self.players.get(id)) {
            let text = format!("{} kicked!", kicker.name);
            self.set_event(text, now);
        }

        for player in self.players.values_mut() {
            PhysicsSystem::step_player(player, &self.config, dt);
        }

        match PhysicsSystem::step_ball(&mut self.ball, &self.config, dt) {
            BallStep::Goal { scorer } => {
                self.score_goal(scorer, now);
                report.goal = Some(scorer);
            }
            BallStep::InPlay => {
                PhysicsSystem::resolve_contacts(&mut self.ball, self.players.values(), &self.config);
                PhysicsSystem::settle_ball(&mut self.ball, &self.config);
            }
        }

        if self.round_over(now) {
            report.round = Some(self.end_round(now));
        }

        report
    }

    /// Credit `scorer` and kick off
    pub fn score_goal(&mut self, scorer: Team, now: Instant) {
        self.score.credit(scorer);

        if let Some(id) = self.ball.last_touch {
            if let Some(player) = self.players.get_mut(&id) {
                // Own goals credit nobody
                if player.team == scorer {
                    player.score += 1;
                }
            }
        }

        info!(
            team = scorer.label(),
            red = self.score.red,
            blue = self.score.blue,
            "Goal scored"
        );
        self.set_event(format!("GOAL! {} +1", scorer.label()), now);
        self.kickoff();
    }

    /// True once either team reached the threshold or the deadline passed
    pub fn round_over(&self, now: Instant) -> bool {
        let target = self.config.win_goals;
        self.score.red >= target || self.score.blue >= target || now >= self.round_deadline
    }

    /// Record the result, clear scores, restart the clock and kick off
    pub fn end_round(&mut self, now: Instant) -> RoundResult {
        let result = RoundResult {
            winner: self.score.leader(),
            final_score: self.score,
        };
        info!(
            red = result.final_score.red,
            blue = result.final_score.blue,
            "Round over: {}",
            result.text()
        );

        self.score = Scoreboard::default();
        self.round_deadline = now + self.config.round_duration();
        self.set_event(result.text(), now);
        self.kickoff();
        result
    }

    /// Reposition everyone to spawn slots with small jitter and park the
    /// ball at the centre spot
    pub fn kickoff(&mut self) {
        let w = self.config.field_width;
        let h = self.config.field_height;
        let red_slots = [(w * 0.25, h * 0.4), (w * 0.25, h * 0.6)];
        let blue_slots = [(w * 0.75, h * 0.4), (w * 0.75, h * 0.6)];
        let jitter = self.config.spawn_jitter;
        let r = self.config.player_radius;

        let (mut red_i, mut blue_i) = (0, 0);
        for player in self.players.values_mut() {
            let (sx, sy) = match player.team {
                Team::Red => {
                    red_i += 1;
                    red_slots[(red_i - 1) % red_slots.len()]
                }
                Team::Blue => {
                    blue_i += 1;
                    blue_slots[(blue_i - 1) % blue_slots.len()]
                }
            };
            let (jx, jy) = if jitter > 0.0 {
                (
                    self.rng.gen_range(-jitter..=jitter),
                    self.rng.gen_range(-jitter..=jitter),
                )
            } else {
                (0.0, 0.0)
            };
            player.pos = Vec2::new(clamp(sx + jx, r, w - r), clamp(sy + jy, r, h - r));
            player.vel = Vec2::ZERO;
            player.cooldown = 0.0;
        }

        self.ball = Ball::at(field_center(&self.config));
    }

    /// Whole seconds left in the round
    pub fn remaining_secs(&self, now: Instant) -> u64 {
        self.round_deadline
            .saturating_duration_since(now)
            .as_secs()
    }

    /// Current event text, empty once it has expired
    pub fn event_text(&self, now: Instant) -> &str {
        let display = Duration::from_secs_f32(self.config.event_display_secs);
        match &self.event {
            Some(event) if now.saturating_duration_since(event.at) < display => &event.text,
            _ => "",
        }
    }

    fn set_event(&mut self, text: String, at: Instant) {
        self.event = Some(MatchEvent { text, at });
    }
}

fn field_center(config: &GameConfig) -> Vec2 {
    Vec2::new(config.field_width / 2.0, config.field_height / 2.0)
}
