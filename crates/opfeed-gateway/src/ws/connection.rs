use axum::{
    extract::{ws::Message, ws::WebSocket, State, WebSocketUpgrade},
    response::IntoResponse,
};
use futures_util::{future, StreamExt};
use opfeed_core::config::MAX_EVENT_BYTES;
use opfeed_core::types::ConnId;
use opfeed_fanout::{Session, SessionConfig};
use std::sync::Arc;
use tracing::{info, warn};

use crate::app::AppState;
use crate::ws::send::WsTransport;

/// Axum handler: upgrades HTTP to WebSocket at GET /ws.
///
/// A failed upgrade never reaches the session, so it leaves no registry entry.
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    ws.max_message_size(MAX_EVENT_BYTES)
        .on_failed_upgrade(|e| warn!(error = %e, "WS upgrade failed"))
        .on_upgrade(|socket| run_connection(socket, state))
}

/// Per-connection session: lives until the viewer leaves, a write fails,
/// or the server shuts down.
async fn run_connection(socket: WebSocket, state: Arc<AppState>) {
    let conn_id = ConnId::new();
    info!(conn_id = %conn_id, "new WS connection");

    let (tx, rx) = socket.split();
    // viewers are read-only; their messages are ignored, a close frame or
    // read error ends the session
    let inbound = rx.take_while(|msg| {
        future::ready(matches!(msg, Ok(m) if !matches!(m, Message::Close(_))))
    });

    let session = Session::new(
        conn_id,
        Arc::clone(&state.registry),
        SessionConfig::from(&state.config.fanout),
        state.shutdown.child_token(),
    );
    session.run(WsTransport::new(tx), inbound).await;
}
