//! Realtime status feed over WebSocket.
//!
//! # Data Flow
//! ```text
//! NotificationRelay → BroadcastSink → per-connection receiver → text frame
//! ```
//!
//! Lagging clients skip missed updates; the feed is best-effort.

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::Response,
};
use std::sync::Arc;
use tokio::sync::broadcast::{self, error::RecvError};

use crate::http::server::AppState;

pub async fn events_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    // Subscribe before the upgrade completes so no update slips in between.
    let updates = state.sink.subscribe();
    ws.on_upgrade(move |socket| stream_updates(socket, updates))
}

async fn stream_updates(mut socket: WebSocket, mut updates: broadcast::Receiver<Arc<str>>) {
    tracing::debug!("Realtime subscriber connected");
    loop {
        tokio::select! {
            update = updates.recv() => match update {
                Ok(json) => {
                    if socket.send(Message::Text(json.to_string().into())).await.is_err() {
                        break;
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "Realtime subscriber lagging, updates skipped");
                }
                Err(RecvError::Closed) => break,
            },
            incoming = socket.recv() => match incoming {
                Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                Some(Ok(_)) => {}
            },
        }
    }
    tracing::debug!("Realtime subscriber disconnected");
}
