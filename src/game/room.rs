//! Room state and phase state machine
//!
//! A `Room` is owned by exactly one task (see [`super::actor`]); every mutation
//! happens inside [`Room::handle`], [`Room::leave`], [`Room::on_timer`] or the
//! start hooks, so no locking is needed. Outbound traffic is queued as
//! [`Envelope`]s and flushed by the owner after each call.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;

use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::GameConfig;
use crate::questions::{Question, QuestionDeck, QuestionRequest};
use crate::ws::protocol::{ClientMsg, GameMode, LobbyPlayer, LootDrop, RosterEntry, ServerMsg};

use super::duel::{Duel, DuelKey};
use super::grid::{assign_spawns, Grid, GridGenerator};
use super::hex::Hex;
use super::player::{sanitize_name, Item, Player};
use super::race::{TurnStage, TurnState};
use super::scheduler::{Scheduler, TimerFired, TimerKey};
use super::shrink::Missile;

/// Room lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Players join and ready up
    Lobby,
    /// Start accepted, question content being fetched
    Starting,
    /// Players claim edge hexes
    SpawnSelection,
    /// Game in progress
    Active,
    /// Terminal
    Ended,
}

/// An outbound message addressed to one connection
#[derive(Debug, Clone, PartialEq)]
pub struct Envelope {
    pub to: Uuid,
    pub msg: ServerMsg,
}

/// Lobby-level failures reported to the client as `room_error`
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RoomError {
    #[error("Room not found!")]
    NotFound,

    #[error("Room is full!")]
    Full,

    #[error("Game already started!")]
    AlreadyStarted,

    #[error("Only host can start!")]
    NotHost,

    #[error("Need at least 2 players!")]
    NotEnoughPlayers,

    #[error("Could not load questions: {0}")]
    Content(String),
}

/// Authoritative state of one room
pub struct Room {
    pub(super) code: String,
    pub(super) mode: GameMode,
    pub(super) phase: Phase,
    pub(super) config: Arc<GameConfig>,
    pub(super) rng: ChaCha8Rng,
    pub(super) players: Vec<Player>,
    pub(super) host_idx: usize,
    pub(super) grid: Option<Grid>,
    pub(super) alive_hexes: HashSet<Hex>,
    pub(super) loot: BTreeMap<Hex, Item>,
    pub(super) safe_radius: u32,
    pub(super) alive_count: usize,
    pub(super) spawn_claims: BTreeMap<usize, Hex>,
    pub(super) duels: HashMap<DuelKey, Duel>,
    pub(super) next_duel_id: u32,
    pub(super) missiles: HashMap<u64, Missile>,
    pub(super) next_missile_id: u64,
    pub(super) deck: QuestionDeck,
    pub(super) turn: TurnState,
    pub(super) scheduler: Scheduler,
    outbox: Vec<Envelope>,
    start_requested: bool,
}

impl Room {
    pub fn new(
        code: String,
        mode: GameMode,
        config: Arc<GameConfig>,
        seed: u64,
        scheduler: Scheduler,
    ) -> Self {
        let safe_radius = config.grid_radius;
        Self {
            code,
            mode,
            phase: Phase::Lobby,
            config,
            rng: ChaCha8Rng::seed_from_u64(seed),
            players: Vec::new(),
            host_idx: 0,
            grid: None,
            alive_hexes: HashSet::new(),
            loot: BTreeMap::new(),
            safe_radius,
            alive_count: 0,
            spawn_claims: BTreeMap::new(),
            duels: HashMap::new(),
            next_duel_id: 0,
            missiles: HashMap::new(),
            next_missile_id: 0,
            deck: QuestionDeck::default(),
            turn: TurnState::default(),
            scheduler,
            outbox: Vec::new(),
            start_requested: false,
        }
    }

    pub fn code(&self) -> &str {
        &self.code
    }

    pub fn mode(&self) -> GameMode {
        self.mode
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn host_idx(&self) -> usize {
        self.host_idx
    }

    pub fn players(&self) -> &[Player] {
        &self.players
    }

    pub fn player(&self, idx: usize) -> Option<&Player> {
        self.players.get(idx)
    }

    pub fn player_by_conn(&self, conn: Uuid) -> Option<usize> {
        self.players.iter().position(|p| p.conn == conn)
    }

    pub fn connected_count(&self) -> usize {
        self.players.iter().filter(|p| p.connected).count()
    }

    /// No connection is left in the room
    pub fn is_empty(&self) -> bool {
        self.connected_count() == 0
    }

    pub fn alive_count(&self) -> usize {
        self.alive_count
    }

    pub fn safe_radius(&self) -> u32 {
        self.safe_radius
    }

    pub fn grid(&self) -> Option<&Grid> {
        self.grid.as_ref()
    }

    pub fn alive_hexes(&self) -> &HashSet<Hex> {
        &self.alive_hexes
    }

    pub fn loot(&self) -> &BTreeMap<Hex, Item> {
        &self.loot
    }

    pub fn spawn_claims(&self) -> &BTreeMap<usize, Hex> {
        &self.spawn_claims
    }

    pub fn duel_count(&self) -> usize {
        self.duels.len()
    }

    pub fn duel(&self, key: DuelKey) -> Option<&Duel> {
        self.duels.get(&key)
    }

    /// Duel the player is currently contesting, if any
    pub fn duel_of(&self, idx: usize) -> Option<DuelKey> {
        self.duels.values().find(|d| d.involves(idx)).map(|d| d.key)
    }

    pub fn turn_number(&self) -> u32 {
        self.turn.number
    }

    pub fn turn_stage(&self) -> TurnStage {
        self.turn.stage
    }

    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    /// Take every message queued since the last drain
    pub fn drain_outbox(&mut self) -> Vec<Envelope> {
        std::mem::take(&mut self.outbox)
    }

    // ------------------------------------------------------------------
    // Outbound helpers
    // ------------------------------------------------------------------

    pub(super) fn send_to(&mut self, idx: usize, msg: ServerMsg) {
        let Some(conn) = self
            .players
            .get(idx)
            .filter(|p| p.connected)
            .map(|p| p.conn)
        else {
            return;
        };
        self.outbox.push(Envelope { to: conn, msg });
    }

    pub(super) fn broadcast_room(&mut self, msg: ServerMsg) {
        let conns: Vec<Uuid> = self
            .players
            .iter()
            .filter(|p| p.connected)
            .map(|p| p.conn)
            .collect();
        self.push_all(conns, msg);
    }

    pub(super) fn broadcast_alive(&mut self, msg: ServerMsg) {
        let conns: Vec<Uuid> = self
            .players
            .iter()
            .filter(|p| p.connected && p.alive)
            .map(|p| p.conn)
            .collect();
        self.push_all(conns, msg);
    }

    pub(super) fn broadcast_except(&mut self, idx: usize, msg: ServerMsg) {
        let conns: Vec<Uuid> = self
            .players
            .iter()
            .filter(|p| p.connected && p.idx != idx)
            .map(|p| p.conn)
            .collect();
        self.push_all(conns, msg);
    }

    fn push_all(&mut self, conns: Vec<Uuid>, msg: ServerMsg) {
        self.outbox
            .extend(conns.into_iter().map(|to| Envelope { to, msg: msg.clone() }));
    }

    fn send_room_update(&mut self) {
        let players = self
            .players
            .iter()
            .map(|p| LobbyPlayer {
                name: p.name.clone(),
                idx: p.idx,
                ready: p.ready,
            })
            .collect();
        self.broadcast_room(ServerMsg::RoomUpdate {
            code: self.code.clone(),
            mode: self.mode,
            host_idx: self.host_idx,
            players,
        });
    }

    fn send_room_error(&mut self, idx: usize, err: RoomError) {
        self.send_to(idx, ServerMsg::RoomError { msg: err.to_string() });
    }

    pub(super) fn reject_move(&mut self, idx: usize, msg: &str) {
        self.send_to(idx, ServerMsg::MoveRejected { msg: msg.to_string() });
    }

    pub(super) fn roster(&self, with_start: bool) -> Vec<RosterEntry> {
        self.players
            .iter()
            .map(|p| RosterEntry {
                name: p.name.clone(),
                idx: p.idx,
                start: with_start.then_some(p.pos),
            })
            .collect()
    }

    pub(super) fn loot_drops(&self) -> Vec<LootDrop> {
        self.loot
            .iter()
            .map(|(hex, item)| LootDrop {
                q: hex.q,
                r: hex.r,
                item: *item,
            })
            .collect()
    }

    pub(super) fn draw_question(&mut self, category: Option<&str>) -> Question {
        self.deck.draw(category)
    }

    /// Living player standing on `hex`
    pub fn occupant(&self, hex: Hex) -> Option<usize> {
        self.players
            .iter()
            .find(|p| p.alive && p.pos == hex)
            .map(|p| p.idx)
    }

    pub(super) fn alive_indices(&self) -> Vec<usize> {
        self.players
            .iter()
            .filter(|p| p.alive)
            .map(|p| p.idx)
            .collect()
    }

    // ------------------------------------------------------------------
    // Membership
    // ------------------------------------------------------------------

    /// Add a connection to the lobby
    pub fn join(&mut self, conn: Uuid, name: Option<&str>, created: bool) -> Result<usize, RoomError> {
        if self.phase != Phase::Lobby {
            return Err(RoomError::AlreadyStarted);
        }
        if let Some(idx) = self.player_by_conn(conn) {
            return Ok(idx);
        }
        if self.players.len() >= self.config.max_players {
            return Err(RoomError::Full);
        }

        let idx = self.players.len();
        self.players.push(Player::new(conn, idx, sanitize_name(name)));

        let confirm = if created {
            ServerMsg::RoomCreated {
                code: self.code.clone(),
                mode: self.mode,
            }
        } else {
            ServerMsg::RoomJoined {
                code: self.code.clone(),
                mode: self.mode,
            }
        };
        self.send_to(idx, confirm);
        self.send_room_update();

        info!(room = %self.code, player = idx, players = self.players.len(), "Player joined room");
        Ok(idx)
    }

    /// Remove a connection. Before the game starts the player is dropped and
    /// the lobby re-indexed; afterwards the player forfeits.
    pub fn leave(&mut self, conn: Uuid) {
        let Some(idx) = self.player_by_conn(conn) else {
            return;
        };

        match self.phase {
            Phase::Lobby | Phase::Starting => {
                self.players.remove(idx);
                for (i, p) in self.players.iter_mut().enumerate() {
                    p.idx = i;
                }
                self.host_idx = 0;
                self.send_room_update();
            }
            Phase::SpawnSelection | Phase::Active => {
                let name = self.players[idx].name.clone();
                self.players[idx].connected = false;
                self.spawn_claims.remove(&idx);
                self.broadcast_room(ServerMsg::OppLeft { idx, name });
                self.eliminate(idx, "Left the game", None);
                self.recheck_barriers();
            }
            Phase::Ended => {
                self.players[idx].connected = false;
            }
        }

        info!(room = %self.code, player = idx, phase = ?self.phase, "Player left room");

        if self.is_empty() {
            self.shutdown();
        }
    }

    /// Cancel everything still pending. The room is inert afterwards.
    pub fn shutdown(&mut self) {
        self.scheduler.cancel_all();
        self.duels.clear();
        self.missiles.clear();
        self.turn.stage = TurnStage::Idle;
        debug!(room = %self.code, "Room shut down");
    }

    // ------------------------------------------------------------------
    // Dispatch
    // ------------------------------------------------------------------

    /// Apply one gameplay message from `conn`
    pub fn handle(&mut self, conn: Uuid, msg: ClientMsg) {
        let Some(idx) = self.player_by_conn(conn) else {
            debug!(room = %self.code, conn = %conn, "Message from non-member");
            return;
        };
        let mode = self.mode;

        match (self.phase, msg) {
            (Phase::Ended, msg) => {
                debug!(room = %self.code, ?msg, "Room ended, ignoring message");
            }
            (Phase::Lobby, ClientMsg::ToggleReady) if mode == GameMode::Classic => {
                self.toggle_ready(idx);
            }
            (Phase::Lobby, ClientMsg::StartGame) => self.request_start(idx),
            (Phase::SpawnSelection, ClientMsg::SelectSpawn { q, r }) => {
                self.select_spawn(idx, Hex::new(q, r));
            }
            (Phase::Active, ClientMsg::SubmitMove { q, r } | ClientMsg::Move { q, r })
                if mode == GameMode::Race =>
            {
                self.submit_move(idx, Hex::new(q, r));
            }
            (Phase::Active, ClientMsg::Move { q, r }) if !mode.is_turn_based() => {
                self.free_move(idx, Hex::new(q, r));
            }
            (Phase::Active, ClientMsg::Reset { q, r }) if !mode.is_turn_based() => {
                self.broadcast_except(idx, ServerMsg::OppReset { idx, q, r });
            }
            (Phase::Active, ClientMsg::SubmitAnswer { answer }) if mode.is_turn_based() => {
                self.submit_answer(idx, answer);
            }
            (Phase::Active, ClientMsg::DuelAnswer { answer }) => self.duel_answer(idx, answer),
            (Phase::Active, ClientMsg::UseItem { item, target }) if mode == GameMode::Royale => {
                self.use_item(idx, item, target);
            }
            (phase, msg) => {
                debug!(room = %self.code, ?phase, ?msg, "Message not valid in this phase");
            }
        }
    }

    /// Deliver an expired timer
    pub fn on_timer(&mut self, fired: TimerFired) {
        if !self.scheduler.accept(fired) {
            debug!(room = %self.code, key = ?fired.key, "Stale timer ignored");
            return;
        }
        if self.phase == Phase::Ended {
            return;
        }

        match fired.key {
            TimerKey::SpawnWindow => self.finalize_spawns(),
            TimerKey::ShrinkWarning => self.warn_shrink(),
            TimerKey::Shrink => self.on_shrink_timer(),
            TimerKey::MoveWindow => self.close_move_window(),
            TimerKey::AnswerWindow => self.close_answer_window(),
            TimerKey::Duel(key) => self.resolve_duel_round(key),
            TimerKey::Missile(id) => self.missile_impact(id),
        }
    }

    /// Expire the pending timer under `key` right now. Returns false when
    /// nothing is pending.
    #[cfg(test)]
    pub(crate) fn expire(&mut self, key: TimerKey) -> bool {
        match self.scheduler.token(key) {
            Some(token) => {
                self.on_timer(token);
                true
            }
            None => false,
        }
    }

    // ------------------------------------------------------------------
    // Lobby → Starting
    // ------------------------------------------------------------------

    fn toggle_ready(&mut self, idx: usize) {
        self.players[idx].ready = !self.players[idx].ready;
        self.send_room_update();

        if self.players.len() >= 2 && self.players.iter().all(|p| p.ready) {
            self.begin_starting();
        }
    }

    fn request_start(&mut self, idx: usize) {
        if idx != self.host_idx {
            self.send_room_error(idx, RoomError::NotHost);
            return;
        }
        if self.players.len() < 2 {
            self.send_room_error(idx, RoomError::NotEnoughPlayers);
            return;
        }
        self.begin_starting();
    }

    fn begin_starting(&mut self) {
        self.phase = Phase::Starting;
        self.start_requested = true;
        info!(room = %self.code, mode = self.mode.as_str(), players = self.players.len(), "Game start requested");
    }

    /// Question content the owner must fetch before calling [`Room::start_game`]
    pub fn take_start_request(&mut self) -> Option<QuestionRequest> {
        if !std::mem::take(&mut self.start_requested) {
            return None;
        }
        Some(QuestionRequest {
            categories: self.config.categories.clone(),
            count: self.config.question_budget,
        })
    }

    /// Content acquisition failed: back to the lobby, nothing half-started
    pub fn abort_start(&mut self, err: RoomError) {
        if self.phase != Phase::Starting {
            return;
        }
        warn!(room = %self.code, error = %err, "Game start aborted");

        self.phase = Phase::Lobby;
        for p in &mut self.players {
            p.ready = false;
        }
        self.broadcast_room(ServerMsg::RoomError { msg: err.to_string() });
        self.send_room_update();
    }

    // ------------------------------------------------------------------
    // Starting → SpawnSelection (→ Active)
    // ------------------------------------------------------------------

    /// Begin the game with the fetched question content
    pub fn start_game(&mut self, questions: Vec<Question>) {
        if self.phase != Phase::Starting {
            return;
        }
        if self.players.len() < 2 {
            self.abort_start(RoomError::NotEnoughPlayers);
            return;
        }
        match QuestionDeck::new(questions) {
            Ok(deck) => self.deck = deck,
            Err(e) => {
                self.abort_start(RoomError::Content(e.to_string()));
                return;
            }
        }

        self.alive_count = self.players.len();
        for p in &mut self.players {
            p.reset_for_game();
        }
        self.duels.clear();
        self.missiles.clear();
        self.spawn_claims.clear();
        self.turn = TurnState::default();

        if !self.mode.has_map() {
            self.phase = Phase::Active;
            self.send_game_start();
            info!(room = %self.code, mode = self.mode.as_str(), players = self.players.len(), "Game started");
            self.begin_ladder_turn();
            return;
        }

        let config = Arc::clone(&self.config);
        let generator = GridGenerator::new(config.grid_radius, &config.categories)
            .with_loot_density(config.loot_density);
        let grid = generator.generate(&mut self.rng);
        self.loot = if self.mode == GameMode::Royale {
            generator.place_loot(&grid, &mut self.rng)
        } else {
            BTreeMap::new()
        };
        self.alive_hexes = grid.hexes().collect();
        self.safe_radius = grid.radius();

        let cells = grid.cells().to_vec();
        self.grid = Some(grid);
        self.phase = Phase::SpawnSelection;

        let msg = ServerMsg::SpawnPhase {
            grid: cells,
            loot: self.loot_drops(),
            players: self.roster(false),
            spawn_time: config.spawn_window.as_secs(),
        };
        self.broadcast_room(msg);
        self.scheduler.schedule(TimerKey::SpawnWindow, config.spawn_window);

        info!(room = %self.code, mode = self.mode.as_str(), players = self.players.len(), "Spawn phase started");
    }

    fn select_spawn(&mut self, idx: usize, hex: Hex) {
        if !self.players[idx].alive {
            return;
        }
        let on_edge = self.grid.as_ref().is_some_and(|g| g.is_edge(hex));
        if !on_edge {
            self.send_to(idx, ServerMsg::SpawnError { msg: "Must pick an edge hex!".to_string() });
            return;
        }
        let taken = self
            .spawn_claims
            .iter()
            .any(|(&owner, &claimed)| claimed == hex && owner != idx);
        if taken {
            self.send_to(idx, ServerMsg::SpawnError { msg: "Already taken!".to_string() });
            return;
        }

        self.spawn_claims.insert(idx, hex);
        let name = self.players[idx].name.clone();
        self.broadcast_room(ServerMsg::SpawnSelected {
            idx,
            q: hex.q,
            r: hex.r,
            name,
        });
    }

    /// Spawn window closed: place everyone and go active
    fn finalize_spawns(&mut self) {
        if self.phase != Phase::SpawnSelection {
            return;
        }
        let contenders = self.alive_indices();
        let spawns = match self.grid.as_ref() {
            Some(grid) => assign_spawns(grid, &contenders, &self.spawn_claims, &mut self.rng),
            None => return,
        };
        for (idx, hex) in spawns {
            self.players[idx].pos = hex;
        }

        self.phase = Phase::Active;
        self.send_game_start();
        info!(room = %self.code, mode = self.mode.as_str(), "Game active");

        match self.mode {
            GameMode::Royale => self.schedule_shrink_cycle(),
            GameMode::Race => self.begin_turn(),
            GameMode::Classic | GameMode::Ladder => {}
        }
    }

    fn send_game_start(&mut self) {
        let cells = self
            .grid
            .as_ref()
            .map(|g| g.cells().to_vec())
            .unwrap_or_default();
        let has_map = self.mode.has_map();
        let roster = self.roster(has_map);
        let loot = self.loot_drops();
        let shrink_interval = self.config.shrink_interval.as_secs();
        let ladder_steps = (!has_map).then_some(self.config.ladder_steps);

        for idx in 0..self.players.len() {
            let you = has_map.then_some(self.players[idx].pos);
            self.send_to(
                idx,
                ServerMsg::GameStart {
                    mode: self.mode,
                    grid: cells.clone(),
                    you,
                    your_index: idx,
                    players: roster.clone(),
                    loot: loot.clone(),
                    shrink_interval,
                    ladder_steps,
                },
            );
        }
    }

    // ------------------------------------------------------------------
    // Free movement (classic, royale)
    // ------------------------------------------------------------------

    fn free_move(&mut self, idx: usize, target: Hex) {
        if !self.players[idx].alive {
            return;
        }
        if self.duel_of(idx).is_some() {
            self.reject_move(idx, "Finish your duel first!");
            return;
        }
        if !self.grid.as_ref().is_some_and(|g| g.contains(target)) {
            self.reject_move(idx, "Not on the map!");
            return;
        }
        if self.mode == GameMode::Royale && !self.alive_hexes.contains(&target) {
            self.reject_move(idx, "Hex is gone!");
            return;
        }
        if self.duels.contains_key(&DuelKey::Hex(target)) {
            self.reject_move(idx, "Duel in progress!");
            return;
        }
        if let Some(occupant) = self.occupant(target).filter(|&o| o != idx) {
            self.start_duel(idx, occupant, DuelKey::Hex(target));
            return;
        }

        self.players[idx].pos = target;
        self.broadcast_except(
            idx,
            ServerMsg::OppMove {
                idx,
                q: target.q,
                r: target.r,
            },
        );

        match self.mode {
            GameMode::Classic if target.is_center() => self.finish_line_victory(idx, "center"),
            GameMode::Royale => self.claim_loot(idx, target),
            _ => {}
        }
    }

    pub(super) fn claim_loot(&mut self, idx: usize, hex: Hex) {
        let Some(item) = self.loot.remove(&hex) else {
            return;
        };
        self.players[idx].inventory.add(item);
        let inventory = self.players[idx].inventory;
        self.send_to(idx, ServerMsg::LootItem { item, inventory });
        self.broadcast_room(ServerMsg::LootTaken { hex, by_idx: idx });
    }
}
