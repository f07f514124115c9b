//! WebSocket upgrade handler

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::Response,
};
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::app::AppState;
use crate::util::rate_limit::PlayerRateLimiter;
use crate::ws::protocol::{ClientMsg, ServerMsg};
use crate::ws::session::Session;

/// WebSocket upgrade handler
pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    let conn = Uuid::new_v4();
    debug!(conn = %conn, "WebSocket upgrade");
    ws.on_upgrade(move |socket| handle_socket(socket, conn, state))
}

/// Handle the upgraded WebSocket connection
async fn handle_socket(socket: WebSocket, conn: Uuid, state: AppState) {
    info!(conn = %conn, "New WebSocket connection");

    let (ws_sink, ws_stream) = socket.split();
    let (outbound, outbound_rx) = mpsc::unbounded_channel();
    let session = Session::new(conn, state.registry.clone(), outbound);

    run_session(session, ws_sink, ws_stream, outbound_rx).await;

    info!(conn = %conn, "WebSocket connection closed");
}

/// Run the WebSocket session with read/write split
async fn run_session(
    mut session: Session,
    mut ws_sink: SplitSink<WebSocket, Message>,
    mut ws_stream: SplitStream<WebSocket>,
    mut outbound_rx: mpsc::UnboundedReceiver<ServerMsg>,
) {
    let conn = session.conn();
    let rate_limiter = PlayerRateLimiter::new();

    // Writer task: room events -> WebSocket
    let writer_handle = tokio::spawn(async move {
        while let Some(msg) = outbound_rx.recv().await {
            if let Err(e) = send_msg(&mut ws_sink, &msg).await {
                debug!(conn = %conn, error = %e, "WebSocket send failed");
                break;
            }
        }
    });

    // Reader loop: WebSocket -> session
    while let Some(result) = ws_stream.next().await {
        match result {
            Ok(Message::Text(text)) => {
                if !rate_limiter.check_input() {
                    warn!(conn = %conn, "Rate limited input message");
                    continue;
                }

                match serde_json::from_str::<ClientMsg>(&text) {
                    Ok(msg) => session.handle(msg).await,
                    Err(e) => {
                        debug!(conn = %conn, error = %e, "Dropped unparsable client message");
                    }
                }
            }
            Ok(Message::Binary(_)) => {
                debug!(conn = %conn, "Received binary message, ignoring");
            }
            Ok(Message::Ping(_)) | Ok(Message::Pong(_)) => {}
            Ok(Message::Close(_)) => {
                info!(conn = %conn, room = ?session.room_code(), "Client initiated close");
                break;
            }
            Err(e) => {
                error!(conn = %conn, error = %e, "WebSocket error");
                break;
            }
        }
    }

    // Disconnect is a leave
    session.leave().await;
    writer_handle.abort();
}

/// Send a message over WebSocket
async fn send_msg(sink: &mut SplitSink<WebSocket, Message>, msg: &ServerMsg) -> Result<(), String> {
    let json = serde_json::to_string(msg).map_err(|e| e.to_string())?;
    sink.send(Message::Text(json))
        .await
        .map_err(|e| e.to_string())
}
