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
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch, Notify};
use tokio::time::{timeout, timeout_at, Instant};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::app::AppState;
use crate::game::tick::JoinTicket;
use crate::util::rate_limit::ConnectionRateLimiter;
use crate::ws::protocol::{decode, encode, ClientMsg, Frame, ProtocolError, ServerMsg};
use crate::ws::session::{JoinError, OUTBOUND_QUEUE};

type WsSink = SplitSink<WebSocket, Message>;
type WsStream = SplitStream<WebSocket>;

/// WebSocket upgrade handler
pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

/// Outcome of waiting for the first message
enum Handshake {
    Join(String),
    Rejected(JoinError),
    Gone,
}

/// Handle the upgraded WebSocket connection
async fn handle_socket(socket: WebSocket, state: AppState) {
    let connection_id = Uuid::new_v4();
    let heartbeat = state.config.heartbeat;
    debug!(connection_id = %connection_id, "New WebSocket connection");

    let (mut ws_sink, mut ws_stream) = socket.split();

    let name = match read_join(&mut ws_stream, heartbeat).await {
        Handshake::Join(name) => name,
        Handshake::Rejected(e) => {
            warn!(connection_id = %connection_id, reason = %e, "Handshake rejected");
            reject(&mut ws_sink, &e).await;
            return;
        }
        Handshake::Gone => {
            debug!(connection_id = %connection_id, "Connection closed before join");
            return;
        }
    };

    let (outbound_tx, outbound_rx) = mpsc::channel::<Frame>(OUTBOUND_QUEUE);
    let closed = Arc::new(Notify::new());

    // The welcome frame is already queued once this resolves
    let ticket = match state
        .room
        .join(name, connection_id, outbound_tx.clone(), closed.clone())
        .await
    {
        Ok(ticket) => ticket,
        Err(e) => {
            reject(&mut ws_sink, &e).await;
            return;
        }
    };

    info!(
        connection_id = %connection_id,
        player_id = %ticket.player_id,
        name = %ticket.name,
        "Session started"
    );

    let mut writer = tokio::spawn(write_loop(ws_sink, outbound_rx, heartbeat / 2));
    let mut shutdown = state.shutdown.clone();

    tokio::select! {
        _ = read_loop(&mut ws_stream, &ticket, &outbound_tx, heartbeat) => {}
        _ = &mut writer => {
            debug!(player_id = %ticket.player_id, "Writer finished");
        }
        _ = closed.notified() => {
            debug!(player_id = %ticket.player_id, "Session closed by server");
        }
        _ = wait_for_shutdown(&mut shutdown) => {
            debug!(player_id = %ticket.player_id, "Closing for shutdown");
        }
    }

    writer.abort();
    state.room.leave(ticket.player_id).await;

    info!(
        connection_id = %connection_id,
        player_id = %ticket.player_id,
        "WebSocket connection closed"
    );
}

/// Wait for the first text frame and require it to be a join.
///
/// The whole handshake shares one heartbeat-long deadline; control frames do
/// not extend it.
async fn read_join(stream: &mut WsStream, heartbeat: Duration) -> Handshake {
    let deadline = Instant::now() + heartbeat;
    loop {
        let message = match timeout_at(deadline, stream.next()).await {
            Ok(Some(Ok(message))) => message,
            Ok(Some(Err(_))) | Ok(None) | Err(_) => return Handshake::Gone,
        };

        match message {
            Message::Text(text) => {
                return match decode(&text) {
                    Ok(ClientMsg::Join { name }) => Handshake::Join(name),
                    _ => Handshake::Rejected(JoinError::Malformed),
                };
            }
            Message::Binary(_) => return Handshake::Rejected(JoinError::Malformed),
            Message::Close(_) => return Handshake::Gone,
            Message::Ping(_) | Message::Pong(_) => {}
        }
    }
}

/// Send a reject and close; used before a session exists
async fn reject(sink: &mut WsSink, error: &JoinError) {
    let msg = ServerMsg::Reject {
        reason: error.to_string(),
    };
    if let Ok(frame) = encode(&msg) {
        let _ = sink.send(Message::Text(frame.to_string())).await;
    }
    let _ = sink.close().await;
}

/// Drain the outbound queue into the socket and keep the client pinged
async fn write_loop(mut sink: WsSink, mut outbound: mpsc::Receiver<Frame>, ping_every: Duration) {
    let mut ping = tokio::time::interval(ping_every);
    ping.tick().await;

    loop {
        tokio::select! {
            frame = outbound.recv() => {
                let Some(frame) = frame else { break };
                if let Err(e) = sink.send(Message::Text(frame.to_string())).await {
                    debug!(error = %e, "WebSocket send failed");
                    break;
                }
            }
            _ = ping.tick() => {
                if sink.send(Message::Ping(Vec::new())).await.is_err() {
                    break;
                }
            }
        }
    }

    let _ = sink.close().await;
}

/// Reader loop: socket -> pending input and direct replies.
///
/// Any frame, including pongs, counts as traffic for the heartbeat.
async fn read_loop(
    stream: &mut WsStream,
    ticket: &JoinTicket,
    outbound: &mpsc::Sender<Frame>,
    heartbeat: Duration,
) {
    let player_id = ticket.player_id;
    let rate_limiter = ConnectionRateLimiter::new();

    loop {
        let message = match timeout(heartbeat, stream.next()).await {
            Ok(Some(Ok(message))) => message,
            Ok(Some(Err(e))) => {
                debug!(player_id = %player_id, error = %e, "WebSocket error");
                break;
            }
            Ok(None) => break,
            Err(_) => {
                warn!(player_id = %player_id, "Heartbeat elapsed, dropping connection");
                break;
            }
        };

        match message {
            Message::Text(text) => {
                if !rate_limiter.check() {
                    warn!(player_id = %player_id, "Rate limited inbound message");
                    continue;
                }

                match decode(&text) {
                    Ok(ClientMsg::Input(command)) => ticket.pending.replace(command),
                    Ok(ClientMsg::Ping { t }) => {
                        debug!(player_id = %player_id, "Ping");
                        reply(outbound, &ServerMsg::Pong { t });
                    }
                    Ok(ClientMsg::Join { .. }) => {
                        reply(outbound, &ProtocolError::AlreadyJoined.to_msg());
                    }
                    Err(e) => {
                        warn!(player_id = %player_id, error = %e, "Failed to parse client message");
                        reply(outbound, &e.to_msg());
                    }
                }
            }
            Message::Binary(_) => {
                warn!(player_id = %player_id, "Received binary message");
                reply(outbound, &ProtocolError::UnexpectedBinary.to_msg());
            }
            Message::Ping(_) | Message::Pong(_) => {}
            Message::Close(_) => {
                debug!(player_id = %player_id, "Client initiated close");
                break;
            }
        }
    }
}

/// Queue a direct reply; a full queue is left for the broadcast path to judge
fn reply(outbound: &mpsc::Sender<Frame>, msg: &ServerMsg) {
    match encode(msg) {
        Ok(frame) => {
            if outbound.try_send(frame).is_err() {
                debug!("Reply dropped, outbound queue unavailable");
            }
        }
        Err(e) => warn!(error = %e, "Failed to encode reply"),
    }
}

async fn wait_for_shutdown(shutdown: &mut watch::Receiver<bool>) {
    let _ = shutdown.wait_for(|stopping| *stopping).await;
}
