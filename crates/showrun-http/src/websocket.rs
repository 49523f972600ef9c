//! WebSocket relay for store updates.
//!
//! Each client gets its own runtime subscription: a full sync of every
//! slice on connect, then only the slices that change. Messages are
//! `{ "tag": "...", "payload": ... }`.

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::IntoResponse,
};
use crossbeam_channel::RecvTimeoutError;
use futures::{SinkExt, StreamExt};
use showrun_core::StoreUpdate;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

use crate::AppState;

/// How often the bridge checks whether the client went away.
const BRIDGE_POLL: Duration = Duration::from_millis(250);

/// WebSocket upgrade handler.
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

/// Handle a WebSocket connection.
async fn handle_socket(socket: WebSocket, state: Arc<AppState>) {
    let updates = match state.handle.subscribe() {
        Ok(rx) => rx,
        Err(e) => {
            log::warn!("[HTTP] WebSocket subscription failed: {}", e);
            return;
        }
    };
    let (mut sender, mut receiver) = socket.split();
    let (tx, mut rx) = mpsc::channel::<StoreUpdate>(256);

    // the runtime channel blocks, so it gets its own thread
    let bridge = tokio::task::spawn_blocking(move || {
        while !tx.is_closed() {
            match updates.recv_timeout(BRIDGE_POLL) {
                Ok(update) => {
                    if tx.blocking_send(update).is_err() {
                        break;
                    }
                }
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => break,
            }
        }
    });

    let send_task = tokio::spawn(async move {
        while let Some(update) = rx.recv().await {
            let msg = match serde_json::to_string(&update) {
                Ok(msg) => msg,
                Err(e) => {
                    log::warn!("[HTTP] Failed to encode {:?}: {}", update.tag, e);
                    continue;
                }
            };
            if sender.send(Message::Text(msg)).await.is_err() {
                break;
            }
        }
    });

    // inbound messages carry nothing, read until the client closes
    while let Some(msg) = receiver.next().await {
        if matches!(msg, Err(_) | Ok(Message::Close(_))) {
            break;
        }
    }

    send_task.abort();
    let _ = bridge.await;
    log::debug!("[HTTP] WebSocket client disconnected");
}
