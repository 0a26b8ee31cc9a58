//! Realtime WebSocket endpoint.
//!
//! Clients connect, send a `join` event to bind their identity, then
//! exchange JSON event frames until they hang up.

use std::sync::Arc;

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::Response,
};
use futures::{SinkExt, StreamExt};
use shorebird_realtime::ConnectionSession;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::server::AppState;

/// Outbound events queued per connection before backpressure kicks in.
const OUTBOUND_BUFFER: usize = 256;

/// GET /ws
///
/// Upgrades the HTTP connection and hands it to the event router.
pub async fn websocket_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
) -> Response {
    debug!("WebSocket connection request");
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: Arc<AppState>) {
    let (mut ws_sender, mut ws_receiver) = socket.split();
    let (outbound_tx, mut outbound_rx) = mpsc::channel(OUTBOUND_BUFFER);
    let mut session = ConnectionSession::new(outbound_tx);
    info!(connection = %session.id(), "WebSocket connection established");

    // Pump server events out to the socket. The task ends once every
    // sender clone is gone, which happens after the session is unbound.
    let pump = tokio::spawn(async move {
        while let Some(event) = outbound_rx.recv().await {
            let text = match serde_json::to_string(&event) {
                Ok(text) => text,
                Err(e) => {
                    warn!(error = %e, "Failed to encode outbound event");
                    continue;
                }
            };
            if let Err(e) = ws_sender.send(Message::Text(text)).await {
                debug!(error = %e, "Outbound socket closed");
                break;
            }
        }
    });

    while let Some(msg) = ws_receiver.next().await {
        match msg {
            Ok(Message::Text(text)) => {
                state.event_router.handle_frame(&mut session, &text).await;
            }
            Ok(Message::Binary(_)) => {
                warn!("Ignoring binary frame");
            }
            Ok(Message::Ping(_)) | Ok(Message::Pong(_)) => {
                // Keepalive frames are answered by the protocol layer.
            }
            Ok(Message::Close(_)) => {
                debug!(connection = %session.id(), "Close requested");
                break;
            }
            Err(e) => {
                debug!(connection = %session.id(), error = %e, "WebSocket error");
                break;
            }
        }
    }

    state.event_router.disconnect(&session).await;
    info!(connection = %session.id(), "WebSocket connection closed");

    // Dropping the session releases the last outbound sender; the pump
    // drains what is queued and exits.
    drop(session);
    let _ = pump.await;
}
