//! Axum-based HTTP ingress for the notification bot.

pub mod api;
pub mod error;

pub use api::{build_router, serve, AppState};
pub use error::ApiError;
