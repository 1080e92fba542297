//! Control Plane: the downstream WebSocket protocol and the admin HTTP
//! surface, composed into one `axum::Router` over the shared [`crate::core::Core`].

pub mod http;
pub mod protocol;
pub mod ws;

use std::sync::Arc;

use axum::extract::State;
use axum::extract::ws::WebSocketUpgrade;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;

use crate::core::Core;

/// Build the full router: the downstream `/ws` WebSocket endpoint plus every
/// admin HTTP route.
pub fn router(core: Arc<Core>) -> Router {
    Router::new()
        .route("/ws", get(ws_upgrade))
        .with_state(core.clone())
        .merge(http::router(core))
}

async fn ws_upgrade(State(core): State<Arc<Core>>, upgrade: WebSocketUpgrade) -> impl IntoResponse {
    upgrade.on_upgrade(move |socket| ws::handle_socket(socket, core))
}
