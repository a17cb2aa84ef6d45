//! Text generation settings for the streaming chat endpoint

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Configuration for streamed text generation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationConfig {
    /// Generator model id, resolved by the backend
    #[serde(default = "default_model")]
    pub model: String,

    /// System prompt wrapped into every template
    #[serde(default = "default_system_prompt")]
    pub system_prompt: String,

    /// Maximum total sequence length (prompt + generated)
    #[serde(default = "default_max_length")]
    pub max_length: usize,

    /// Delay between streamed chunks in milliseconds (None = as fast as produced)
    #[serde(default)]
    pub pacing_ms: Option<u64>,
}

fn default_model() -> String {
    "meta-llama/Llama-2-7b-chat-hf".to_string()
}

fn default_system_prompt() -> String {
    "You are a helpful assistant.".to_string()
}

fn default_max_length() -> usize {
    8096
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            model: default_model(),
            system_prompt: default_system_prompt(),
            max_length: default_max_length(),
            pacing_ms: None,
        }
    }
}

impl GenerationConfig {
    /// Pacing between chunks, if any
    pub fn pacing(&self) -> Option<Duration> {
        self.pacing_ms
            .filter(|ms| *ms > 0)
            .map(Duration::from_millis)
    }
}
