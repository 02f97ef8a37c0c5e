use axum::Router;

use crate::state::SharedState;

pub mod websocket;

/// Compose the route tree and wire in the shared state.
pub fn router(state: SharedState) -> Router<()> {
    websocket::router().with_state(state)
}
