//! Player model

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::hex::Hex;
use crate::questions::Answer;

/// Longest display name kept
pub const MAX_NAME_LEN: usize = 16;

/// Collectible items (royale)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Item {
    /// Delayed-impact hex strike
    #[serde(alias = "destroy")]
    Missile,
}

/// Carried items
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Inventory {
    pub missile: u32,
}

impl Inventory {
    pub fn count(&self, item: Item) -> u32 {
        match item {
            Item::Missile => self.missile,
        }
    }

    pub fn add(&mut self, item: Item) {
        match item {
            Item::Missile => self.missile += 1,
        }
    }

    /// Consume one unit, returning false when none is carried
    pub fn take(&mut self, item: Item) -> bool {
        match item {
            Item::Missile if self.missile > 0 => {
                self.missile -= 1;
                true
            }
            Item::Missile => false,
        }
    }

    /// Move everything from `other` into `self`. Returns the number of items moved.
    pub fn absorb(&mut self, other: &mut Inventory) -> u32 {
        let moved = other.missile;
        self.missile += moved;
        other.missile = 0;
        moved
    }
}

/// A room member
#[derive(Debug, Clone)]
pub struct Player {
    /// Connection this player is bound to
    pub conn: Uuid,
    /// Stable index; re-derived only while the room is in lobby
    pub idx: usize,
    pub name: String,
    pub alive: bool,
    /// False once the connection has left the room
    pub connected: bool,
    pub pos: Hex,
    pub ready: bool,
    /// Move submitted for the current turn
    pub locked: bool,
    pub inventory: Inventory,
    pub pending_move: Option<Hex>,
    pub last_answer: Option<Answer>,
    /// Ladder progress
    pub step: u32,
    /// Final placement, assigned on elimination or victory
    pub placement: Option<u32>,
}

impl Player {
    pub fn new(conn: Uuid, idx: usize, name: String) -> Self {
        Self {
            conn,
            idx,
            name,
            alive: true,
            connected: true,
            pos: Hex::CENTER,
            ready: false,
            locked: false,
            inventory: Inventory::default(),
            pending_move: None,
            last_answer: None,
            step: 0,
            placement: None,
        }
    }

    /// Clear turn-scoped fields at the start of every turn
    pub fn reset_turn(&mut self) {
        self.locked = false;
        self.pending_move = None;
        self.last_answer = None;
    }

    /// Reset per-game state when a game starts
    pub fn reset_for_game(&mut self) {
        self.alive = true;
        self.pos = Hex::CENTER;
        self.inventory = Inventory::default();
        self.step = 0;
        self.placement = None;
        self.reset_turn();
    }
}

/// Trim and truncate a client-provided display name
pub fn sanitize_name(raw: Option<&str>) -> String {
    let trimmed = raw.map(str::trim).unwrap_or_default();
    if trimmed.is_empty() {
        return "Anon".to_string();
    }
    trimmed.chars().take(MAX_NAME_LEN).collect()
}
