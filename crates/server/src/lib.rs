//! HTTP API server for hangar.
//!
//! This crate provides the HTTP surface over the revisioning engine:
//! - Project creation and listing
//! - Block uploads and commits
//! - Project state, diffs, restore and history
//! - Download plans and signed block retrieval
//! - Admin endpoints (tokens, permissions)

pub mod auth;
pub mod bootstrap;
pub mod envelope;
pub mod error;
pub mod extract;
pub mod handlers;
pub mod metrics;
pub mod routes;
pub mod state;

pub use auth::TraceId;
pub use error::ApiError;
pub use routes::create_router;
pub use state::AppState;
