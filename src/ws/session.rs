//! Per-connection session: room membership and message routing

use std::sync::Arc;

use tracing::{debug, info};
use uuid::Uuid;

use crate::game::{Outbound, RegistryError, RoomHandle, RoomRegistry};
use crate::ws::protocol::{ClientMsg, ServerMsg};

/// Room membership of one connection
pub struct Session {
    conn: Uuid,
    registry: Arc<RoomRegistry>,
    outbound: Outbound,
    room: Option<RoomHandle>,
}

impl Session {
    pub fn new(conn: Uuid, registry: Arc<RoomRegistry>, outbound: Outbound) -> Self {
        Self {
            conn,
            registry,
            outbound,
            room: None,
        }
    }

    pub fn conn(&self) -> Uuid {
        self.conn
    }

    pub fn room_code(&self) -> Option<&str> {
        self.room.as_ref().map(|r| r.code.as_str())
    }

    /// Lobby messages are handled here, everything else goes to the room
    pub async fn handle(&mut self, msg: ClientMsg) {
        match msg {
            ClientMsg::CreateRoom { name, mode } => {
                self.leave().await;
                let handle = self.registry.create(mode);
                match handle.join(self.conn, name, true, self.outbound.clone()).await {
                    Ok(_) => self.room = Some(handle),
                    Err(e) => {
                        self.registry.remove(&handle.code);
                        self.send_error(&e);
                    }
                }
            }
            ClientMsg::JoinRoom { name, code } => {
                self.leave().await;
                let joined = match self.registry.get(&code) {
                    Ok(handle) => handle
                        .join(self.conn, name, false, self.outbound.clone())
                        .await
                        .map(|_| handle),
                    Err(e) => Err(e),
                };
                match joined {
                    Ok(handle) => {
                        info!(conn = %self.conn, room = %handle.code, "Joined room");
                        self.room = Some(handle);
                    }
                    Err(e) => {
                        debug!(conn = %self.conn, code = %code, error = %e, "Join refused");
                        self.send_error(&e);
                    }
                }
            }
            ClientMsg::LeaveRoom => self.leave().await,
            msg => match &self.room {
                Some(room) => {
                    if !room.send(self.conn, msg).await {
                        debug!(conn = %self.conn, room = %room.code, "Room gone, dropping membership");
                        self.room = None;
                    }
                }
                None => debug!(conn = %self.conn, ?msg, "Message outside a room"),
            },
        }
    }

    /// Leave the current room, if any
    pub async fn leave(&mut self) {
        if let Some(room) = self.room.take() {
            room.leave(self.conn).await;
            info!(conn = %self.conn, room = %room.code, "Left room");
        }
    }

    fn send_error(&self, err: &RegistryError) {
        let _ = self.outbound.send(ServerMsg::RoomError { msg: err.to_string() });
    }
}
