//! Axum WebSocket upgrade handler.

use std::net::SocketAddr;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{ConnectInfo, State};
use axum::response::IntoResponse;
use futures_util::{SinkExt, StreamExt, future};

use super::messages::Frame;
use super::session::{Inbound, serve_connection};
use crate::app_state::AppState;
use crate::error::HubError;

/// `GET /ws` — Upgrade HTTP connection to WebSocket.
///
/// Each text frame carries exactly one JSON message.
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    State(state): State<AppState>,
) -> impl IntoResponse {
    let max_frame_bytes = state.limits.max_frame_bytes;
    ws.max_message_size(max_frame_bytes)
        .on_upgrade(move |socket| run_websocket(socket, peer, state))
}

/// Adapts a WebSocket into the transport-agnostic session loop.
async fn run_websocket(socket: WebSocket, peer: SocketAddr, state: AppState) {
    let (ws_tx, ws_rx) = socket.split();

    let inbound = ws_rx.map(|msg| match msg {
        Ok(Message::Text(text)) => Ok(Inbound::Frame(text.to_string())),
        Ok(Message::Binary(bytes)) => Ok(match String::from_utf8(bytes.to_vec()) {
            Ok(text) => Inbound::Frame(text),
            Err(_) => Inbound::Malformed("binary frame is not valid UTF-8".to_string()),
        }),
        Ok(Message::Ping(_) | Message::Pong(_)) => Ok(Inbound::Idle),
        Ok(Message::Close(_)) => Ok(Inbound::Closed),
        Err(err) => Err(HubError::Transport(err.to_string())),
    });

    let outbound = ws_tx
        .sink_map_err(|err| HubError::Transport(err.to_string()))
        .with(|frame: Frame| future::ready(Ok::<_, HubError>(Message::text(frame.to_string()))));

    serve_connection(state, peer.to_string(), inbound, outbound).await;
}
