//! HTTP server
//!
//! Builds the axum router over shared state and runs the serve loop.

pub mod config;
pub mod routes;

pub use config::ServerConfig;
pub use routes::{router, serve, serve_until, AppState};
