//! HTTP request handlers

use std::sync::Arc;

use axum::{
    body::{Body, Bytes},
    extract::{FromRequest, Request, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use futures::StreamExt;
use serde::de::DeserializeOwned;
use serde::Serialize;

use super::streaming::create_chat_stream;
use crate::backend::{Blender, Generator, TextStream};
use crate::chat::{ChatPayload, ChatService};
use crate::engine::{BlendPayload, Dispatcher, ResidencyStatus};
use crate::error::BlendError;

/// Shared application state
pub struct AppState<B: Blender, G: Generator<Config = String>> {
    pub dispatcher: Dispatcher<B>,
    pub chat: ChatService<G>,
}

impl<B: Blender, G: Generator<Config = String>> AppState<B, G> {
    pub fn new(dispatcher: Dispatcher<B>, chat: ChatService<G>) -> Self {
        Self { dispatcher, chat }
    }
}

/// JSON body extractor.
///
/// A non-JSON content type or unparseable bytes are rejected with 415; JSON
/// that does not fit `T` is rejected with 400.
pub struct JsonBody<T>(pub T);

fn is_json(headers: &HeaderMap) -> bool {
    headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(';').next())
        .map(|mime| mime.trim().eq_ignore_ascii_case("application/json"))
        .unwrap_or(false)
}

#[axum::async_trait]
impl<T, S> FromRequest<S> for JsonBody<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = Response;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        if !is_json(req.headers()) {
            let content_type = req
                .headers()
                .get(header::CONTENT_TYPE)
                .and_then(|v| v.to_str().ok())
                .unwrap_or("none")
                .to_string();
            tracing::debug!("Rejecting body with content type {}", content_type);
            return Err(BlendError::UnsupportedEncoding(content_type).into_response());
        }

        let bytes = Bytes::from_request(req, state)
            .await
            .map_err(IntoResponse::into_response)?;
        let value: serde_json::Value = serde_json::from_slice(&bytes).map_err(|e| {
            tracing::debug!("Rejecting malformed JSON body: {}", e);
            BlendError::UnsupportedEncoding(format!("malformed JSON body: {}", e)).into_response()
        })?;
        // valid JSON with fields of the wrong type is a bad request, not a bad encoding
        serde_json::from_value(value).map(JsonBody).map_err(|e| {
            tracing::debug!("Rejecting JSON body with wrong field types: {}", e);
            BlendError::shape(format!("request body: {}", e)).into_response()
        })
    }
}

/// Health check endpoint
pub async fn health() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}

#[derive(Serialize)]
pub struct ResidencyReport {
    pub state: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ranker: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fuser: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub loaded_at: Option<String>,
    pub loads: u64,
}

#[derive(Serialize)]
pub struct GeneratorReport {
    pub state: &'static str,
    pub model: String,
    pub loads: u64,
}

#[derive(Serialize)]
pub struct StatusResponse {
    #[serde(flatten)]
    pub blend: ResidencyReport,
    pub generator: GeneratorReport,
}

fn state_name<C>(status: &ResidencyStatus<C>) -> &'static str {
    match status {
        ResidencyStatus::Empty => "empty",
        ResidencyStatus::Loading => "loading",
        ResidencyStatus::Loaded { .. } => "loaded",
    }
}

/// Residency snapshot
pub async fn status<B, G>(State(state): State<Arc<AppState<B, G>>>) -> Json<StatusResponse>
where
    B: Blender,
    G: Generator<Config = String>,
{
    let residency = state.dispatcher.residency();
    let blend_status = residency.status().await;
    let mut blend = ResidencyReport {
        state: state_name(&blend_status),
        ranker: None,
        fuser: None,
        loaded_at: None,
        loads: residency.loads(),
    };
    if let ResidencyStatus::Loaded {
        configuration,
        loaded_at,
    } = blend_status
    {
        blend.ranker = Some(configuration.ranker);
        blend.fuser = Some(configuration.fuser);
        blend.loaded_at = Some(loaded_at.to_rfc3339());
    }

    let generator = state.chat.residency();
    let generator = GeneratorReport {
        state: state_name(&generator.status().await),
        model: state.chat.model().to_string(),
        loads: generator.loads(),
    };

    Json(StatusResponse { blend, generator })
}

/// Rank / fuse endpoint
pub async fn blend<B, G>(
    State(state): State<Arc<AppState<B, G>>>,
    JsonBody(payload): JsonBody<BlendPayload>,
) -> Response
where
    B: Blender,
    G: Generator<Config = String>,
{
    match state.dispatcher.handle_payload(payload).await {
        Ok(envelope) => (StatusCode::OK, Json(envelope)).into_response(),
        Err(e) => {
            tracing::warn!("Blend request failed: {}", e);
            e.into_response()
        }
    }
}

fn wants_sse(headers: &HeaderMap) -> bool {
    headers
        .get(header::ACCEPT)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.contains("text/event-stream"))
        .unwrap_or(false)
}

/// Streaming chat endpoint
pub async fn chat<B, G>(
    State(state): State<Arc<AppState<B, G>>>,
    headers: HeaderMap,
    JsonBody(payload): JsonBody<ChatPayload>,
) -> Response
where
    B: Blender,
    G: Generator<Config = String>,
{
    let stream = match state.chat.stream(payload).await {
        Ok(stream) => stream,
        Err(e) => {
            tracing::warn!("Chat request failed: {}", e);
            return e.into_response();
        }
    };

    if wants_sse(&headers) {
        let id = format!("chat-{}", uuid::Uuid::new_v4());
        return create_chat_stream(id, state.chat.model().to_string(), stream).into_response();
    }

    plain_text_stream(stream)
}

fn plain_text_stream(stream: TextStream) -> Response {
    let body = stream.map(|item| {
        if let Err(e) = &item {
            tracing::error!("Generation failed mid-stream: {}", e);
        }
        item
    });

    (
        [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
        Body::from_stream(body),
    )
        .into_response()
}
