//! Connection registry and per-tick fan-out

use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::{mpsc, Notify};
use tracing::{debug, error};
use uuid::Uuid;

use crate::game::entity::PlayerId;

use super::protocol::{encode, Frame, ServerMsg};

/// Outbound queue depth per connection. A client that falls this far behind
/// is treated as unresponsive.
pub const OUTBOUND_QUEUE: usize = 64;

/// Reasons a join attempt is refused
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum JoinError {
    #[error("room is full")]
    RoomFull,

    #[error("malformed join")]
    Malformed,

    #[error("server is shutting down")]
    Unavailable,
}

/// A registered connection's send half
#[derive(Debug)]
pub struct Session {
    pub connection_id: Uuid,
    pub player_id: PlayerId,
    outbound: mpsc::Sender<Frame>,
    closed: Arc<Notify>,
}

impl Session {
    pub fn new(
        connection_id: Uuid,
        player_id: PlayerId,
        outbound: mpsc::Sender<Frame>,
        closed: Arc<Notify>,
    ) -> Self {
        Self {
            connection_id,
            player_id,
            outbound,
            closed,
        }
    }

    /// Queue a frame without waiting; false when the queue is full or gone
    pub fn try_send(&self, frame: Frame) -> bool {
        self.outbound.try_send(frame).is_ok()
    }

    /// Tell the connection task to tear down
    fn close(&self) {
        self.closed.notify_one();
    }
}

/// All connections that currently own a player
pub struct SessionRegistry {
    sessions: DashMap<PlayerId, Session>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self {
            sessions: DashMap::new(),
        }
    }

    pub fn register(&self, session: Session) {
        self.sessions.insert(session.player_id, session);
    }

    /// Remove a session and signal its connection to close
    pub fn remove(&self, player_id: PlayerId) -> Option<Session> {
        let (_, session) = self.sessions.remove(&player_id)?;
        session.close();
        Some(session)
    }

    pub fn contains(&self, player_id: PlayerId) -> bool {
        self.sessions.contains_key(&player_id)
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Serialize once and queue on every registered connection.
    ///
    /// Returns the players whose queue rejected the frame; the caller owns
    /// their disconnect handling.
    pub fn broadcast(&self, msg: &ServerMsg) -> Vec<PlayerId> {
        match encode(msg) {
            Ok(frame) => self.broadcast_frame(frame),
            Err(e) => {
                error!(error = %e, "Failed to encode broadcast");
                Vec::new()
            }
        }
    }

    pub fn broadcast_frame(&self, frame: Frame) -> Vec<PlayerId> {
        // Snapshot membership so joins/leaves during fan-out cannot interfere
        let targets: Vec<(PlayerId, mpsc::Sender<Frame>)> = self
            .sessions
            .iter()
            .map(|entry| (*entry.key(), entry.value().outbound.clone()))
            .collect();

        let mut failed = Vec::new();
        for (player_id, outbound) in targets {
            if let Err(e) = outbound.try_send(frame.clone()) {
                debug!(player_id = %player_id, error = %e, "Broadcast delivery failed");
                failed.push(player_id);
            }
        }
        failed
    }
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session(id: u32, depth: usize) -> (Session, mpsc::Receiver<Frame>, Arc<Notify>) {
        let (tx, rx) = mpsc::channel(depth);
        let closed = Arc::new(Notify::new());
        (
            Session::new(Uuid::new_v4(), PlayerId(id), tx, closed.clone()),
            rx,
            closed,
        )
    }

    #[tokio::test]
    async fn broadcast_reaches_every_session() {
        let registry = SessionRegistry::new();
        let (a, mut rx_a, _) = session(1, 4);
        let (b, mut rx_b, _) = session(2, 4);
        registry.register(a);
        registry.register(b);

        let failed = registry.broadcast(&ServerMsg::Toast { msg: "hi".into() });
        assert!(failed.is_empty());

        let frame_a = rx_a.recv().await.unwrap();
        let frame_b = rx_b.recv().await.unwrap();
        assert_eq!(frame_a, frame_b);
        assert!(frame_a.contains("\"toast\""));
    }

    #[tokio::test]
    async fn full_queue_is_isolated() {
        let registry = SessionRegistry::new();
        let (slow, _rx_slow, _) = session(1, 1);
        let (fast, mut rx_fast, _) = session(2, 8);
        registry.register(slow);
        registry.register(fast);

        assert!(registry.broadcast(&ServerMsg::Toast { msg: "1".into() }).is_empty());
        let failed = registry.broadcast(&ServerMsg::Toast { msg: "2".into() });
        assert_eq!(failed, vec![PlayerId(1)]);

        assert!(rx_fast.recv().await.unwrap().contains("\"1\""));
        assert!(rx_fast.recv().await.unwrap().contains("\"2\""));
    }

    #[tokio::test]
    async fn closed_receiver_is_reported() {
        let registry = SessionRegistry::new();
        let (gone, rx, _) = session(5, 4);
        registry.register(gone);
        drop(rx);

        let failed = registry.broadcast(&ServerMsg::Toast { msg: "x".into() });
        assert_eq!(failed, vec![PlayerId(5)]);
    }

    #[tokio::test]
    async fn remove_notifies_connection() {
        let registry = SessionRegistry::new();
        let (s, _rx, closed) = session(9, 4);
        registry.register(s);
        assert!(registry.contains(PlayerId(9)));

        assert!(registry.remove(PlayerId(9)).is_some());
        assert!(registry.is_empty());
        // Permit is stored, so this resolves immediately
        closed.notified().await;

        assert!(registry.remove(PlayerId(9)).is_none());
    }
}
