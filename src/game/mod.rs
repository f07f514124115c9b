//! Game session engine

pub mod actor;
pub mod duel;
mod elimination;
pub mod grid;
pub mod hex;
pub mod player;
pub mod race;
pub mod registry;
pub mod room;
pub mod scheduler;
pub mod shrink;

pub use actor::{Outbound, RoomActor, RoomCommand, RoomHandle};
pub use duel::DuelKey;
pub use hex::Hex;
pub use registry::{RegistryError, RoomRegistry};
pub use room::{Envelope, Phase, Room, RoomError};
pub use scheduler::{Scheduler, TimerFired, TimerKey};
