//! Route definitions

use std::sync::Arc;

use axum::{
    routing::{get, post},
    Router,
};

use super::handlers::{blend, chat, health, status, AppState};
use crate::backend::{Blender, Generator};

/// Create the API router
pub fn api_routes<B, G>() -> Router<Arc<AppState<B, G>>>
where
    B: Blender,
    G: Generator<Config = String>,
{
    Router::new()
        // Health and residency
        .route("/health", get(health))
        .route("/status", get(status::<B, G>))
        // Rank / fuse
        .route("/", post(blend::<B, G>))
        // Streaming chat
        .route("/api/llama", post(chat::<B, G>))
}
