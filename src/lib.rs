//! Sock Soccer Server - authoritative real-time multiplayer soccer
//!
//! A single room simulated at a fixed tick rate. Clients connect over
//! WebSocket, send their latest input, and receive a full snapshot every
//! tick.

pub mod app;
pub mod config;
pub mod game;
pub mod http;
pub mod util;
pub mod ws;
