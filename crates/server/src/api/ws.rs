//! WebSocket upgrade and per-client pumps.
//!
//! Upgrading requires a one-shot ticket issued over the authenticated HTTP
//! API; the ticket is consumed (deleted) during the handshake. Each client
//! then runs a read pump with a pong deadline and a write pump that forwards
//! hub messages and pings.

use std::time::Duration;

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Query, State,
    },
    response::{IntoResponse, Response},
};
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use jobdesk_core::hub::{Client, SystemStatus, WsEvent, CLIENT_BUFFER};

use super::response::ApiError;
use crate::metrics::{WS_CONNECTIONS_ACTIVE, WS_CONNECTIONS_TOTAL};
use crate::state::AppState;

/// Missing pongs for longer than this terminate the connection.
const PONG_WAIT: Duration = Duration::from_secs(60);
/// Pings go out at 9/10 of the pong deadline.
const PING_PERIOD: Duration = Duration::from_secs(54);

#[derive(Debug, Deserialize)]
pub struct WsQuery {
    pub ticket: String,
}

pub async fn ws_handler(
    ws: WebSocketUpgrade,
    Query(query): Query<WsQuery>,
    State(state): State<Arc<AppState>>,
) -> Response {
    // Resolve and delete the ticket before upgrading; an expired or unknown
    // ticket never reaches the socket layer.
    let user_id = match state.auth().consume_ws_ticket(&query.ticket) {
        Ok(user_id) => user_id,
        Err(e) => return ApiError::from(e).into_response(),
    };

    ws.on_upgrade(move |socket| handle_socket(socket, state, user_id))
}

async fn handle_socket(socket: WebSocket, state: Arc<AppState>, user_id: i64) {
    let (mut sender, mut receiver) = socket.split();

    let client_id = uuid::Uuid::new_v4().to_string();
    let (tx, mut rx) = mpsc::channel::<String>(CLIENT_BUFFER);

    WS_CONNECTIONS_TOTAL.inc();
    WS_CONNECTIONS_ACTIVE.inc();
    info!(
        "WebSocket client connected: client_id={} user_id={}",
        client_id, user_id
    );

    state
        .hub()
        .register(Client {
            id: client_id.clone(),
            user_id,
            tx: tx.clone(),
        })
        .await;

    // Greet the client with the current system flags.
    let is_editing = state.system().edit_mode().unwrap_or_else(|e| {
        warn!("Failed to read edit mode for new client: {}", e);
        false
    });
    let greeting = WsEvent::ConnectionEstablished {
        system_status: SystemStatus { is_editing },
    };
    if let Ok(text) = serde_json::to_string(&greeting) {
        let _ = tx.send(text).await;
    }
    // The hub's sender must be the only one left: the channel closing is how
    // an eviction disconnects this client.
    drop(tx);

    // Write pump: forward hub messages, ping periodically. The hub closes
    // the channel to disconnect this client.
    let write_task = tokio::spawn(async move {
        let mut ping = tokio::time::interval(PING_PERIOD);
        ping.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                msg = rx.recv() => match msg {
                    Some(text) => {
                        if sender.send(Message::Text(text.into())).await.is_err() {
                            break;
                        }
                    }
                    None => {
                        let _ = sender.send(Message::Close(None)).await;
                        break;
                    }
                },
                _ = ping.tick() => {
                    if sender.send(Message::Ping(Vec::new().into())).await.is_err() {
                        break;
                    }
                }
            }
        }
    });

    // Read pump: any frame resets the deadline; silence means a dead peer.
    loop {
        match tokio::time::timeout(PONG_WAIT, receiver.next()).await {
            Err(_) => {
                debug!("WebSocket client {} missed pong deadline", client_id);
                break;
            }
            Ok(None) => break,
            Ok(Some(Err(e))) => {
                warn!("WebSocket receive error: {}", e);
                break;
            }
            Ok(Some(Ok(Message::Close(_)))) => {
                debug!("WebSocket client {} requested close", client_id);
                break;
            }
            Ok(Some(Ok(Message::Text(text)))) => {
                state.hub().incoming(client_id.clone(), text.to_string()).await;
            }
            Ok(Some(Ok(_))) => {
                // Pings are answered by axum; pongs only reset the deadline.
            }
        }
    }

    state.hub().unregister(client_id.clone()).await;
    write_task.abort();
    WS_CONNECTIONS_ACTIVE.dec();
    info!("WebSocket client disconnected: client_id={}", client_id);
}
