//! Application state shared across routes

use std::sync::Arc;
use tokio::sync::watch;

use crate::config::Config;
use crate::game::tick::{RoomHandle, TickScheduler};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub room: RoomHandle,
    /// Flips to true when the server starts shutting down
    pub shutdown: watch::Receiver<bool>,
}

impl AppState {
    /// Build the state together with the scheduler that must be spawned to
    /// drive the room, and the sender that stops everything
    pub fn new(config: Config) -> (Self, TickScheduler, watch::Sender<bool>) {
        let config = Arc::new(config);
        let (scheduler, room) = TickScheduler::new(Arc::new(config.game.clone()));
        let (shutdown_tx, shutdown) = watch::channel(false);

        let state = Self {
            config,
            room,
            shutdown,
        };

        (state, scheduler, shutdown_tx)
    }
}
