//! Game simulation modules

pub mod command;
pub mod entity;
pub mod geometry;
pub mod r#match;
pub mod physics;
pub mod snapshot;
pub mod tick;

pub use command::{InputCommand, PendingInput};
pub use entity::{Ball, Player, PlayerId, Team};
pub use r#match::{MatchState, RoundResult, Scoreboard};
pub use snapshot::Snapshot;
pub use tick::{JoinTicket, RoomHandle, TickScheduler};
