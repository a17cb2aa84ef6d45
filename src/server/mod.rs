//! HTTP server for ranking, fusion and streaming chat
//!
//! Endpoints:
//! - `POST /` rank / fuse / rank_and_fuse on the resident ranker and fuser
//! - `POST /api/llama` streamed chat with the prompt echo removed
//! - `GET /health`, `GET /status`

mod handlers;
mod routes;
mod streaming;

use std::sync::Arc;

use anyhow::Result;
use axum::extract::DefaultBodyLimit;
use axum::http::HeaderValue;
use axum::Router;
use tokio::net::TcpListener;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::backend::{Blender, Generator};
use crate::config::ServerConfig;

pub use handlers::{AppState, JsonBody, StatusResponse};
pub use routes::api_routes;
pub use streaming::create_chat_stream;

/// Build the application router with the configured layers
pub fn router<B, G>(state: Arc<AppState<B, G>>, config: &ServerConfig) -> Router
where
    B: Blender,
    G: Generator<Config = String>,
{
    let mut app = api_routes::<B, G>().layer(DefaultBodyLimit::max(config.max_body_size));

    if config.cors_enabled {
        let origins = if config.cors_origins.is_empty() {
            AllowOrigin::from(Any)
        } else {
            AllowOrigin::list(
                config
                    .cors_origins
                    .iter()
                    .filter_map(|origin| match origin.parse::<HeaderValue>() {
                        Ok(value) => Some(value),
                        Err(_) => {
                            tracing::warn!("Ignoring invalid CORS origin {:?}", origin);
                            None
                        }
                    }),
            )
        };
        let cors = CorsLayer::new()
            .allow_origin(origins)
            .allow_methods(Any)
            .allow_headers(Any);
        app = app.layer(cors);
    }

    if config.request_logging {
        app = app.layer(TraceLayer::new_for_http());
    }

    app.with_state(state)
}

/// Start the HTTP server and serve until Ctrl-C
pub async fn start<B, G>(state: Arc<AppState<B, G>>, config: ServerConfig) -> Result<()>
where
    B: Blender,
    G: Generator<Config = String>,
{
    let app = router(Arc::clone(&state), &config);

    let addr = config.addr();
    let listener = TcpListener::bind(&addr).await?;

    tracing::info!("Server listening on http://{}", addr);
    tracing::info!("API endpoints:");
    tracing::info!("  GET  /health - Health check");
    tracing::info!("  GET  /status - Resident models");
    tracing::info!("  POST / - Rank / fuse candidates");
    tracing::info!("  POST /api/llama - Streaming chat");

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("Shutting down");
        })
        .await?;

    state.dispatcher.residency().unload().await;
    state.chat.residency().unload().await;

    Ok(())
}
