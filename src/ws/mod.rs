//! WebSocket transport: wire protocol, sessions and the connection task

pub mod handler;
pub mod protocol;
pub mod session;

pub use handler::ws_handler;
pub use protocol::{ClientMsg, Frame, ServerMsg};
pub use session::{JoinError, SessionRegistry};
