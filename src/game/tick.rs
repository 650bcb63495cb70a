//! Authoritative fixed-rate tick loop and the handle connections use to
//! reach it

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{mpsc, oneshot, watch, Notify};
use tokio::time::sleep_until;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::GameConfig;
use crate::ws::protocol::{encode, Frame, ServerMsg};
use crate::ws::session::{JoinError, Session, SessionRegistry};

use super::command::PendingInput;
use super::entity::{PlayerId, Team};
use super::r#match::MatchState;
use super::snapshot::Snapshot;

/// Membership changes, applied by the tick loop at the start of a tick
#[derive(Debug)]
pub enum RoomCommand {
    Join {
        name: String,
        connection_id: Uuid,
        outbound: mpsc::Sender<Frame>,
        closed: Arc<Notify>,
        reply: oneshot::Sender<Result<JoinTicket, JoinError>>,
    },
    Leave {
        player_id: PlayerId,
    },
}

/// What a connection receives once its join is accepted
#[derive(Debug, Clone)]
pub struct JoinTicket {
    pub player_id: PlayerId,
    pub team: Team,
    pub name: String,
    /// Where the connection writes its latest input
    pub pending: PendingInput,
}

/// Cloneable handle to the running room
#[derive(Clone)]
pub struct RoomHandle {
    commands: mpsc::Sender<RoomCommand>,
    pub sessions: Arc<SessionRegistry>,
    pub config: Arc<GameConfig>,
}

impl RoomHandle {
    /// Ask the tick loop for a player slot. The welcome frame is queued on
    /// `outbound` before this resolves.
    pub async fn join(
        &self,
        name: String,
        connection_id: Uuid,
        outbound: mpsc::Sender<Frame>,
        closed: Arc<Notify>,
    ) -> Result<JoinTicket, JoinError> {
        let (reply, response) = oneshot::channel();
        self.commands
            .send(RoomCommand::Join {
                name,
                connection_id,
                outbound,
                closed,
                reply,
            })
            .await
            .map_err(|_| JoinError::Unavailable)?;
        response.await.map_err(|_| JoinError::Unavailable)?
    }

    /// Release a player slot; a no-op if the room already dropped it
    pub async fn leave(&self, player_id: PlayerId) {
        if self
            .commands
            .send(RoomCommand::Leave { player_id })
            .await
            .is_err()
        {
            debug!(player_id = %player_id, "Room stopped before leave");
        }
    }

    pub fn connection_count(&self) -> usize {
        self.sessions.len()
    }
}

/// Owns the match and drives it at a fixed rate
pub struct TickScheduler {
    state: MatchState,
    commands: mpsc::Receiver<RoomCommand>,
    sessions: Arc<SessionRegistry>,
    inputs: BTreeMap<PlayerId, PendingInput>,
}

impl TickScheduler {
    pub fn new(config: Arc<GameConfig>) -> (Self, RoomHandle) {
        let (commands_tx, commands) = mpsc::channel(256);
        let sessions = Arc::new(SessionRegistry::new());

        let handle = RoomHandle {
            commands: commands_tx,
            sessions: sessions.clone(),
            config: config.clone(),
        };

        let scheduler = Self {
            state: MatchState::new(config, Instant::now()),
            commands,
            sessions,
            inputs: BTreeMap::new(),
        };

        (scheduler, handle)
    }

    pub fn state(&self) -> &MatchState {
        &self.state
    }

    /// Run until `shutdown` flips to true or its sender goes away. A tick in
    /// progress always completes.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        let period = self.state.config().tick_period();
        info!(tick_rate = self.state.config().tick_rate, "Match loop started");

        let mut next_tick = tokio::time::Instant::now() + period;
        loop {
            if *shutdown.borrow() {
                break;
            }

            tokio::select! {
                biased;
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                    continue;
                }
                _ = sleep_until(next_tick) => {}
            }

            self.tick(Instant::now());

            // Stay on the fixed timeline; if we fell behind, skip the missed
            // ticks and re-anchor on the current time
            next_tick += period;
            let now = tokio::time::Instant::now();
            if next_tick <= now {
                warn!(
                    tick = self.state.tick,
                    behind_ms = (now - next_tick).as_millis() as u64,
                    "Tick overran its budget"
                );
                next_tick = now + period;
            }
        }

        info!(tick = self.state.tick, "Match loop stopped");
    }

    /// One full tick: membership, simulation, snapshot, broadcast
    pub fn tick(&mut self, now: Instant) {
        self.process_commands();

        let inputs = &self.inputs;
        let report = self
            .state
            .advance(|id| inputs.get(&id).and_then(PendingInput::take), now);

        if let Some(scorer) = report.goal {
            self.broadcast(&ServerMsg::Toast {
                msg: format!("GOAL! {} +1", scorer.label()),
            });
        }
        if let Some(result) = report.round {
            self.broadcast(&ServerMsg::Toast { msg: result.text() });
        }

        let snapshot = Snapshot::capture(&self.state, now);
        self.broadcast(&ServerMsg::State { snapshot });
    }

    /// Drain queued joins and leaves
    fn process_commands(&mut self) {
        while let Ok(command) = self.commands.try_recv() {
            match command {
                RoomCommand::Join {
                    name,
                    connection_id,
                    outbound,
                    closed,
                    reply,
                } => self.handle_join(name, connection_id, outbound, closed, reply),
                RoomCommand::Leave { player_id } => self.drop_player(player_id),
            }
        }
    }

    fn handle_join(
        &mut self,
        name: String,
        connection_id: Uuid,
        outbound: mpsc::Sender<Frame>,
        closed: Arc<Notify>,
        reply: oneshot::Sender<Result<JoinTicket, JoinError>>,
    ) {
        let config = self.state.config();
        let field = [
            config.field_width,
            config.field_height,
            config.goal_width,
            config.goal_height,
        ];
        let tick_rate = config.tick_rate;

        let (player_id, team, name) = match self.state.add_player(&name) {
            Ok(player) => (player.id, player.team, player.name.clone()),
            Err(e) => {
                warn!(connection_id = %connection_id, reason = %e, "Join rejected");
                let _ = reply.send(Err(e));
                return;
            }
        };

        let pending = PendingInput::new();
        self.inputs.insert(player_id, pending.clone());

        let session = Session::new(connection_id, player_id, outbound, closed);
        let welcome = ServerMsg::Welcome {
            id: player_id,
            team,
            field,
            tick_rate,
        };
        let welcomed = encode(&welcome)
            .map(|frame| session.try_send(frame))
            .unwrap_or(false);
        self.sessions.register(session);

        let ticket = JoinTicket {
            player_id,
            team,
            name: name.clone(),
            pending,
        };
        if !welcomed || reply.send(Ok(ticket)).is_err() {
            // Never announced, so leave without a toast
            warn!(player_id = %player_id, "Connection gone before join completed");
            self.sessions.remove(player_id);
            self.inputs.remove(&player_id);
            self.state.remove_player(player_id);
            return;
        }

        info!(
            player_id = %player_id,
            connection_id = %connection_id,
            team = team.label(),
            players = self.state.players.len(),
            "Player joined"
        );
        self.broadcast(&ServerMsg::Toast {
            msg: format!("{} joined!", name),
        });
    }

    /// Remove a player and its session, announcing the departure
    fn drop_player(&mut self, player_id: PlayerId) {
        self.sessions.remove(player_id);
        self.inputs.remove(&player_id);

        if let Some(player) = self.state.remove_player(player_id) {
            info!(
                player_id = %player_id,
                players = self.state.players.len(),
                "Player left"
            );
            self.broadcast(&ServerMsg::Toast {
                msg: format!("{} left.", player.name),
            });
        }
    }

    /// Fan out to every session; any that cannot take the frame is dropped
    fn broadcast(&mut self, msg: &ServerMsg) {
        for player_id in self.sessions.broadcast(msg) {
            warn!(player_id = %player_id, "Dropping unresponsive connection");
            self.drop_player(player_id);
        }
    }
}
