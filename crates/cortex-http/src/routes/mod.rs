//! Route handlers, organized by resource, merged into one router here the
//! way `dashflow-registry/src/api/routes/mod.rs` assembles its own.

pub mod chat;
pub mod engines;
pub mod events;
pub mod health;
pub mod inference;
pub mod threads;

use axum::routing::get;
use axum::Router;

use crate::state::AppState;

/// Routes that require CORS/auth: everything except `/healthz`.
pub fn api_router() -> Router<AppState> {
    Router::new()
        .route("/v1/chat/completions", axum::routing::post(chat::chat_completions))
        .route("/v1/embeddings", axum::routing::post(chat::embeddings))
        .route("/events", get(events::events))
        .merge(inference::routes())
        .merge(engines::routes())
        .merge(threads::routes())
}

pub fn health_router() -> Router<AppState> {
    health::routes()
}
