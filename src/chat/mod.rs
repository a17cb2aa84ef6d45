//! Streaming chat over an instruction-tuned generator
//!
//! A chat request carries earlier turns, a query and a template name. The
//! service renders the prompt, leases the resident generator, and returns its
//! output with the echoed prompt filtered out.

mod echo;
mod template;

pub use echo::{filter_stream, EchoFilter};
pub use template::{format_history, HistoryEntry, PromptTemplate, Role};

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::backend::{Generator, TextStream};
use crate::config::GenerationConfig;
use crate::engine::ResidencyManager;
use crate::error::{BlendError, Result};
use crate::model::LoadPurpose;

fn default_model_type() -> String {
    "llama".to_string()
}

/// Conversation history, either inline or as a JSON-encoded string
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum History {
    Entries(Vec<HistoryEntry>),
    Encoded(String),
}

impl Default for History {
    fn default() -> Self {
        History::Entries(Vec::new())
    }
}

impl History {
    pub fn into_entries(self) -> Result<Vec<HistoryEntry>> {
        match self {
            History::Entries(entries) => Ok(entries),
            History::Encoded(text) if text.trim().is_empty() => Ok(Vec::new()),
            History::Encoded(text) => serde_json::from_str(&text).map_err(|e| {
                BlendError::UnsupportedEncoding(format!("history is not a JSON array: {}", e))
            }),
        }
    }
}

/// Chat request body
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatPayload {
    /// Earlier turns
    #[serde(default)]
    pub message: History,

    #[serde(default)]
    pub query: String,

    /// Prompt template name
    #[serde(default = "default_model_type")]
    pub model_type: String,
}

/// Prompt rendering plus echo-filtered generation
pub struct ChatService<G: Generator<Config = String>> {
    residency: Arc<ResidencyManager<G>>,
    model: String,
    system_prompt: String,
}

impl<G: Generator<Config = String>> ChatService<G> {
    pub fn new(residency: Arc<ResidencyManager<G>>, config: &GenerationConfig) -> Self {
        Self {
            residency,
            model: config.model.clone(),
            system_prompt: config.system_prompt.clone(),
        }
    }

    pub fn residency(&self) -> &Arc<ResidencyManager<G>> {
        &self.residency
    }

    /// Generator model this service loads
    pub fn model(&self) -> &str {
        &self.model
    }

    /// Validate `payload` and start a filtered generation stream
    pub async fn stream(&self, payload: ChatPayload) -> Result<TextStream> {
        if payload.query.is_empty() {
            return Err(BlendError::EmptyQuery);
        }
        let template: PromptTemplate = payload.model_type.parse()?;
        let history = payload.message.into_entries()?;

        let prompt = template.render(&self.system_prompt, &history, &payload.query);
        tracing::debug!("Formatted prompt:\n{}", prompt);

        let handle = self
            .residency
            .ensure_resident(&self.model, LoadPurpose::Generate)
            .await?;
        let raw = self.residency.loader().generate_stream(handle, prompt);

        Ok(filter_stream(raw, template.echo_marker(&payload.query)))
    }
}
