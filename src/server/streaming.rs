use axum::response::sse::{Event, Sse};
use futures::stream::{Stream, StreamExt};
use serde::Serialize;
use std::convert::Infallible;

use crate::backend::TextStream;

/// Chat streaming chunk
#[derive(Serialize)]
pub struct ChatStreamChunk {
    pub id: String,
    pub object: String,
    pub created: i64,
    pub model: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finish_reason: Option<String>,
}

/// Create SSE stream for echo-filtered chat output
pub fn create_chat_stream(
    id: String,
    model: String,
    chunks: TextStream,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let stream = async_stream::stream! {
        let created = chrono::Utc::now().timestamp();
        let mut chunks = chunks;
        let mut finish_reason = "stop";

        while let Some(item) = chunks.next().await {
            match item {
                Ok(text) => {
                    let chunk = ChatStreamChunk {
                        id: id.clone(),
                        object: "chat.chunk".to_string(),
                        created,
                        model: model.clone(),
                        text: Some(text),
                        finish_reason: None,
                    };
                    let data = serde_json::to_string(&chunk).unwrap_or_default();
                    yield Ok(Event::default().data(data));
                }
                Err(e) => {
                    tracing::error!("Generation failed mid-stream: {}", e);
                    yield Ok(Event::default().event("error").data(e.to_string()));
                    finish_reason = "error";
                    break;
                }
            }
        }

        // Final chunk
        let final_chunk = ChatStreamChunk {
            id: id.clone(),
            object: "chat.chunk".to_string(),
            created,
            model: model.clone(),
            text: None,
            finish_reason: Some(finish_reason.to_string()),
        };

        let data = serde_json::to_string(&final_chunk).unwrap_or_default();
        yield Ok(Event::default().data(data));

        yield Ok(Event::default().data("[DONE]"));
    };

    Sse::new(stream)
}
