//! WebSocket protocol message definitions
//! These are the wire types for client-server communication

use serde::{Deserialize, Serialize};

use crate::game::grid::HexCell;
use crate::game::hex::Hex;
use crate::game::player::{Inventory, Item};
use crate::questions::QuestionView;

/// Rulesets a room can be created with
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GameMode {
    /// Free movement, shrinking map, loot and missiles
    Royale,
    /// Synchronized move/answer turns toward the center
    Race,
    /// Synchronized questions on a step counter to a finish line
    Ladder,
    /// Free movement, first to the center wins. Unknown modes land here.
    #[default]
    #[serde(other)]
    Classic,
}

impl GameMode {
    pub fn has_map(self) -> bool {
        !matches!(self, GameMode::Ladder)
    }

    pub fn is_turn_based(self) -> bool {
        matches!(self, GameMode::Race | GameMode::Ladder)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            GameMode::Classic => "classic",
            GameMode::Royale => "royale",
            GameMode::Race => "race",
            GameMode::Ladder => "ladder",
        }
    }
}

/// Messages sent from client to server
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMsg {
    /// Create a room and join it as host
    CreateRoom {
        #[serde(default)]
        name: Option<String>,
        #[serde(default)]
        mode: GameMode,
    },

    /// Join an existing room by code
    JoinRoom {
        #[serde(default)]
        name: Option<String>,
        #[serde(default)]
        code: String,
    },

    /// Flip lobby readiness (classic)
    ToggleReady,

    /// Host starts the game
    StartGame,

    LeaveRoom,

    /// Claim an edge hex during the spawn phase
    SelectSpawn { q: i32, r: i32 },

    /// Free movement (classic, royale)
    Move { q: i32, r: i32 },

    /// Echo of a client-side position reset (classic, royale)
    Reset { q: i32, r: i32 },

    /// Intended move for the current turn (race)
    SubmitMove { q: i32, r: i32 },

    /// Answer to the open turn question (race, ladder)
    SubmitAnswer { answer: i32 },

    /// Answer to the open duel question
    DuelAnswer { answer: i32 },

    /// Consume an inventory item against a hex (royale)
    UseItem { item: Item, target: Hex },
}

/// Messages sent from server to client
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMsg {
    RoomCreated {
        code: String,
        mode: GameMode,
    },

    RoomJoined {
        code: String,
        mode: GameMode,
    },

    /// Lobby roster
    RoomUpdate {
        code: String,
        mode: GameMode,
        host_idx: usize,
        players: Vec<LobbyPlayer>,
    },

    RoomError {
        msg: String,
    },

    /// Spawn selection window opened
    SpawnPhase {
        grid: Vec<HexCell>,
        loot: Vec<LootDrop>,
        players: Vec<RosterEntry>,
        spawn_time: u64,
    },

    SpawnSelected {
        idx: usize,
        q: i32,
        r: i32,
        name: String,
    },

    SpawnError {
        msg: String,
    },

    /// Active play begins; personalised per recipient
    GameStart {
        mode: GameMode,
        grid: Vec<HexCell>,
        you: Option<Hex>,
        your_index: usize,
        players: Vec<RosterEntry>,
        loot: Vec<LootDrop>,
        shrink_interval: u64,
        ladder_steps: Option<u32>,
    },

    OppMove {
        idx: usize,
        q: i32,
        r: i32,
    },

    OppReset {
        idx: usize,
        q: i32,
        r: i32,
    },

    OppLeft {
        idx: usize,
        name: String,
    },

    MoveRejected {
        msg: String,
    },

    DuelStart {
        opp_name: String,
        opp_idx: usize,
        hex: Option<Hex>,
        question: QuestionView,
        seconds: u64,
    },

    /// Draw: a fresh question for the same duel
    DuelNext {
        question: QuestionView,
        round: u32,
        seconds: u64,
    },

    DuelResult {
        won: bool,
        hex: Option<Hex>,
        inventory: Inventory,
    },

    DuelEnded {
        winner_idx: usize,
        loser_idx: usize,
        hex: Option<Hex>,
    },

    ShrinkWarning {
        new_radius: u32,
        seconds: u64,
    },

    Shrink {
        new_radius: u32,
        falling_hexes: Vec<Hex>,
        eliminated: Vec<usize>,
    },

    ItemUsed {
        item: Item,
        inventory: Inventory,
    },

    ItemError {
        msg: String,
    },

    MissileLaunched {
        from_idx: usize,
        from: Hex,
        target: Hex,
        time: u64,
    },

    MissileImpact {
        target: Hex,
        by_idx: usize,
        victim_idx: Option<usize>,
    },

    MissileFizzle {
        target: Hex,
    },

    LootItem {
        item: Item,
        inventory: Inventory,
    },

    LootTaken {
        hex: Hex,
        by_idx: usize,
    },

    LootTransfer {
        inventory: Inventory,
    },

    /// Sent to the eliminated player
    Eliminated {
        reason: String,
        placement: u32,
        total: usize,
    },

    /// Broadcast to the room
    PlayerEliminated {
        idx: usize,
        reason: String,
        alive_count: usize,
        placement: u32,
    },

    Victory {
        reason: String,
    },

    Defeat {
        reason: String,
    },

    GameOver {
        winner_idx: i64,
        winner_name: String,
    },

    /// Race: pick a move among `targets`
    MovePhase {
        turn: u32,
        targets: Vec<Hex>,
        seconds: u64,
    },

    /// Race: answer to make the move happen
    QuestionPhase {
        turn: u32,
        question: QuestionView,
        seconds: u64,
    },

    TurnResult {
        turn: u32,
        correct: u8,
        players: Vec<TurnOutcome>,
    },

    LadderQuestion {
        turn: u32,
        question: QuestionView,
        seconds: u64,
    },

    LadderUpdate {
        turn: u32,
        correct: Option<u8>,
        positions: Vec<LadderPosition>,
    },
}

/// Player entry in the lobby roster
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LobbyPlayer {
    pub name: String,
    pub idx: usize,
    pub ready: bool,
}

/// Player entry in spawn/start rosters
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RosterEntry {
    pub name: String,
    pub idx: usize,
    pub start: Option<Hex>,
}

/// A hex carrying an item
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LootDrop {
    pub q: i32,
    pub r: i32,
    pub item: Item,
}

/// Where a player ended up after a race turn
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TurnOutcome {
    pub idx: usize,
    pub q: i32,
    pub r: i32,
    pub correct: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LadderPosition {
    pub idx: usize,
    pub step: u32,
}
