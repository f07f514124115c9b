//! HexaQuiz server - authoritative session engine for hex-grid quiz battles
//!
//! Rooms run as independent tasks (see [`game::actor`]) driven by websocket
//! sessions. The pure room state machine lives in [`game::room`] and is usable
//! without any I/O.

pub mod app;
pub mod config;
pub mod game;
pub mod http;
pub mod questions;
pub mod util;
pub mod ws;
