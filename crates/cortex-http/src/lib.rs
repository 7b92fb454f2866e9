//! The HTTP Surface (C8): an axum router composing every other control-plane
//! crate behind OpenAI-compatible inference endpoints plus the engine,
//! thread, and event management API.
//!
//! Grounded on `dashflow-registry/src/api/{server,middleware,state}.rs` for
//! the router/middleware/state shape, and `dashflow-langserve/src/handler.rs`
//! for the SSE streaming pattern.

pub mod error;
pub mod middleware;
pub mod routes;
pub mod server;
pub mod state;

#[cfg(test)]
mod test_support;

pub use server::{ApiConfig, ApiServer};
pub use state::{AppState, ServerConfig};
