//! Command server: the far end of the console's socket.
//!
//! The WebSocket endpoint at `/` accepts token-tagged requests, runs at
//! most one child process per connection, and streams its output back.

pub mod connection;
pub mod handler;
pub mod process;

use axum::Router;
use axum::routing::get;
use tower_http::trace::TraceLayer;

use crate::app_state::AppState;

/// Builds the server router.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/", get(handler::ws_handler))
        .route("/health", get(handler::health_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
