use axum::{
    Router,
    extract::{State, WebSocketUpgrade},
    response::IntoResponse,
    routing::get,
};

use crate::{services::session_service, state::SharedState};

/// Per-frame size cap; the library closes sockets that exceed it.
const MAX_MESSAGE_BYTES: usize = 100 * 1024;

/// Upgrade the HTTP connection into a client WebSocket session.
pub async fn ws_handler(
    State(state): State<SharedState>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    ws.max_message_size(MAX_MESSAGE_BYTES)
        .on_upgrade(move |socket| session_service::handle_socket(state, socket))
}

/// Configure the WebSocket endpoint. The fallback route makes the upgrade
/// path-independent.
pub fn router() -> Router<SharedState> {
    Router::<SharedState>::new()
        .route("/ws", get(ws_handler))
        .fallback(get(ws_handler))
}
