//! Process-wide room registry
//!
//! Rooms are keyed by a short code. A code is reserved atomically when the
//! room is created and released when the room task exits.

use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use rand::Rng;
use tracing::info;

use crate::config::GameConfig;
use crate::questions::QuestionSource;
use crate::ws::protocol::GameMode;

use super::actor::{RoomActor, RoomHandle};
use super::room::RoomError;

/// Unambiguous uppercase letters (no I or O)
pub const ROOM_CODE_ALPHABET: &[u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZ";
pub const ROOM_CODE_LEN: usize = 4;

#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("Room not found!")]
    NotFound,

    /// The room task exited between lookup and delivery
    #[error("Room {0} is closed")]
    Closed(String),

    #[error(transparent)]
    Room(#[from] RoomError),
}

/// Registry of all open rooms
pub struct RoomRegistry {
    rooms: DashMap<String, RoomHandle>,
    config: Arc<GameConfig>,
    questions: Arc<dyn QuestionSource>,
}

impl RoomRegistry {
    pub fn new(config: Arc<GameConfig>, questions: Arc<dyn QuestionSource>) -> Self {
        Self {
            rooms: DashMap::new(),
            config,
            questions,
        }
    }

    /// Open a room under a fresh code and spawn its task. The code is
    /// released when the task finishes.
    pub fn create(self: &Arc<Self>, mode: GameMode) -> RoomHandle {
        loop {
            let code = generate_room_code(&mut rand::thread_rng());
            let slot = match self.rooms.entry(code.clone()) {
                Entry::Occupied(_) => continue,
                Entry::Vacant(slot) => slot,
            };

            let (actor, handle) = RoomActor::new(
                code.clone(),
                mode,
                Arc::clone(&self.config),
                rand::random::<u64>(),
                Arc::clone(&self.questions),
            );
            slot.insert(handle.clone());

            let registry = Arc::clone(self);
            tokio::spawn(async move {
                actor.run().await;
                registry.remove(&code);
                info!(room = %code, "Room removed from registry");
            });

            info!(room = %handle.code, mode = mode.as_str(), "Created room");
            return handle;
        }
    }

    /// Look up a room by a client-typed code
    pub fn get(&self, code: &str) -> Result<RoomHandle, RegistryError> {
        self.rooms
            .get(&normalize_code(code))
            .map(|r| r.value().clone())
            .ok_or(RegistryError::NotFound)
    }

    pub fn remove(&self, code: &str) -> Option<RoomHandle> {
        self.rooms.remove(code).map(|(_, h)| h)
    }

    pub fn active_rooms(&self) -> usize {
        self.rooms.len()
    }

    pub fn total_players(&self) -> usize {
        self.rooms.iter().map(|r| r.value().player_count()).sum()
    }
}

pub fn generate_room_code<R: Rng + ?Sized>(rng: &mut R) -> String {
    (0..ROOM_CODE_LEN)
        .map(|_| char::from(ROOM_CODE_ALPHABET[rng.gen_range(0..ROOM_CODE_ALPHABET.len())]))
        .collect()
}

pub fn normalize_code(raw: &str) -> String {
    raw.trim().to_uppercase()
}
