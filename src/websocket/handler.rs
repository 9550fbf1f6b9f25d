use axum::{
    extract::{
        ws::{Message, WebSocket},
        State, WebSocketUpgrade,
    },
    response::Response,
};
use futures::StreamExt;

use crate::hub::Hub;
use crate::server::AppState;

use super::keepalive::KeepaliveConfig;
use super::session::Session;

/// WebSocket upgrade handler
#[tracing::instrument(name = "ws.upgrade", skip(ws, state))]
pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    let keepalive = state.settings.websocket.keepalive();
    let hub = state.hub.clone();

    ws.max_message_size(state.settings.websocket.max_message_size)
        .on_upgrade(move |socket| handle_socket(socket, hub, keepalive))
}

/// Handle an established WebSocket connection
#[tracing::instrument(name = "ws.connection", skip_all, fields(otel.kind = "server"))]
async fn handle_socket(mut socket: WebSocket, hub: Hub, keepalive: KeepaliveConfig) {
    let session = match Session::open(&hub, keepalive).await {
        Ok(session) => session,
        Err(e) => {
            tracing::warn!(error = %e, "Connection rejected");
            let _ = socket.send(Message::Close(None)).await;
            return;
        }
    };

    tracing::info!(session_id = %session.id(), "WebSocket connection established");

    let (sink, stream) = socket.split();
    session.run(sink, stream).await;
}
