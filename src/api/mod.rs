//! REST API layer: route handlers, DTOs, and router composition.
//!
//! Feed endpoints are mounted under `/api/v1`; `/health` and `/ws` sit at
//! the root.

pub mod dto;
pub mod handlers;
pub mod openapi;

use axum::Router;
use axum::routing::get;

use crate::app_state::AppState;
use crate::ws::handler::ws_handler;

/// Builds the complete API router with all REST endpoints.
pub fn build_router() -> Router<AppState> {
    Router::new()
        .nest("/api/v1", handlers::routes())
        .merge(handlers::system::routes())
}

/// Builds the REST and WebSocket routes bound to `state`, without
/// middleware layers.
pub fn build_app(state: AppState) -> Router {
    Router::new()
        .merge(build_router())
        .route("/ws", get(ws_handler))
        .with_state(state)
}
