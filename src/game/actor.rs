//! Room task
//!
//! One task per room owns the [`Room`] and processes its commands and timers
//! one at a time, so every state transition is serialized.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::GameConfig;
use crate::questions::{QuestionRequest, QuestionSource};
use crate::ws::protocol::{ClientMsg, GameMode, ServerMsg};

use super::registry::RegistryError;
use super::room::{Envelope, Room, RoomError};
use super::scheduler::{Scheduler, TimerFired};

/// Sender half of a connection's outbound queue
pub type Outbound = mpsc::UnboundedSender<ServerMsg>;

/// Work delivered to a room task
#[derive(Debug)]
pub enum RoomCommand {
    Join {
        conn: Uuid,
        name: Option<String>,
        created: bool,
        outbound: Outbound,
        reply: oneshot::Sender<Result<usize, RoomError>>,
    },
    Input {
        conn: Uuid,
        msg: ClientMsg,
    },
    Leave {
        conn: Uuid,
    },
}

/// Handle to a running room
#[derive(Clone, Debug)]
pub struct RoomHandle {
    pub code: String,
    pub mode: GameMode,
    tx: mpsc::Sender<RoomCommand>,
    player_count: Arc<AtomicUsize>,
}

impl RoomHandle {
    /// Connections currently in the room
    pub fn player_count(&self) -> usize {
        self.player_count.load(Ordering::Relaxed)
    }

    pub async fn join(
        &self,
        conn: Uuid,
        name: Option<String>,
        created: bool,
        outbound: Outbound,
    ) -> Result<usize, RegistryError> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(RoomCommand::Join {
                conn,
                name,
                created,
                outbound,
                reply,
            })
            .await
            .map_err(|_| RegistryError::Closed(self.code.clone()))?;

        let idx = rx
            .await
            .map_err(|_| RegistryError::Closed(self.code.clone()))??;
        Ok(idx)
    }

    /// Forward a gameplay message. False when the room is gone.
    pub async fn send(&self, conn: Uuid, msg: ClientMsg) -> bool {
        self.tx.send(RoomCommand::Input { conn, msg }).await.is_ok()
    }

    pub async fn leave(&self, conn: Uuid) {
        if self.tx.send(RoomCommand::Leave { conn }).await.is_err() {
            debug!(room = %self.code, conn = %conn, "Room already closed on leave");
        }
    }
}

/// The task owning one room
pub struct RoomActor {
    room: Room,
    commands: mpsc::Receiver<RoomCommand>,
    timers: mpsc::UnboundedReceiver<TimerFired>,
    connections: HashMap<Uuid, Outbound>,
    questions: Arc<dyn QuestionSource>,
    player_count: Arc<AtomicUsize>,
    closed: bool,
}

impl RoomActor {
    pub fn new(
        code: String,
        mode: GameMode,
        config: Arc<GameConfig>,
        seed: u64,
        questions: Arc<dyn QuestionSource>,
    ) -> (Self, RoomHandle) {
        let (tx, commands) = mpsc::channel(256);
        let (timer_tx, timers) = mpsc::unbounded_channel();
        let player_count = Arc::new(AtomicUsize::new(0));

        let handle = RoomHandle {
            code: code.clone(),
            mode,
            tx,
            player_count: player_count.clone(),
        };

        let actor = Self {
            room: Room::new(code, mode, config, seed, Scheduler::new(timer_tx)),
            commands,
            timers,
            connections: HashMap::new(),
            questions,
            player_count,
            closed: false,
        };

        (actor, handle)
    }

    /// Process commands and timers until the last connection leaves
    pub async fn run(mut self) {
        info!(room = %self.room.code(), mode = self.room.mode().as_str(), "Room opened");

        while !self.closed {
            tokio::select! {
                cmd = self.commands.recv() => match cmd {
                    Some(cmd) => self.apply(cmd),
                    None => break,
                },
                Some(fired) = self.timers.recv() => self.room.on_timer(fired),
            }
            self.flush();

            if let Some(request) = self.room.take_start_request() {
                self.load_questions(request).await;
                self.flush();
            }
        }

        self.room.shutdown();
        info!(room = %self.room.code(), "Room closed");
    }

    fn apply(&mut self, cmd: RoomCommand) {
        match cmd {
            RoomCommand::Join {
                conn,
                name,
                created,
                outbound,
                reply,
            } => {
                let result = self.room.join(conn, name.as_deref(), created);
                if result.is_ok() {
                    self.connections.insert(conn, outbound);
                }
                let _ = reply.send(result);
            }
            RoomCommand::Input { conn, msg } => self.room.handle(conn, msg),
            RoomCommand::Leave { conn } => {
                self.room.leave(conn);
                self.connections.remove(&conn);
                self.closed = self.room.is_empty();
            }
        }
        self.player_count
            .store(self.room.connected_count(), Ordering::Relaxed);
    }

    async fn load_questions(&mut self, request: QuestionRequest) {
        debug!(room = %self.room.code(), count = request.count, "Fetching questions");

        match self.questions.fetch(request).await {
            Ok(questions) => {
                info!(room = %self.room.code(), count = questions.len(), "Questions loaded");
                self.room.start_game(questions);
            }
            Err(e) => {
                warn!(room = %self.room.code(), error = %e, "Question fetch failed");
                self.room.abort_start(RoomError::Content(e.to_string()));
            }
        }
    }

    fn flush(&mut self) {
        for Envelope { to, msg } in self.room.drain_outbox() {
            let delivered = self
                .connections
                .get(&to)
                .is_some_and(|tx| tx.send(msg).is_ok());
            if !delivered {
                debug!(room = %self.room.code(), conn = %to, "Dropped message for closed connection");
            }
        }
    }
}
