//! Prompt templates for instruction-tuned chat models

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::BlendError;

/// Speaker of a history entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    #[serde(alias = "AI")]
    Assistant,
    /// Anything else; left out of the prompt
    #[serde(other)]
    Other,
}

/// One earlier turn of the conversation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub role: Role,
    #[serde(default)]
    pub message: String,
}

impl HistoryEntry {
    pub fn new(role: Role, message: impl Into<String>) -> Self {
        Self {
            role,
            message: message.into(),
        }
    }
}

/// Prompt layout selected by the request's `model_type`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PromptTemplate {
    /// Llama 2 chat: `[INST]<<SYS>>...<</SYS>>...[/INST]`
    Llama,
    /// Llama 3 with special tokens stripped from the output
    Llama3,
}

impl FromStr for PromptTemplate {
    type Err = BlendError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "llama" => Ok(PromptTemplate::Llama),
            "llama3" => Ok(PromptTemplate::Llama3),
            other => Err(BlendError::UnknownTemplate(other.to_string())),
        }
    }
}

impl fmt::Display for PromptTemplate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PromptTemplate::Llama => f.write_str("llama"),
            PromptTemplate::Llama3 => f.write_str("llama3"),
        }
    }
}

/// Serialise history as `User: ...` / `assistant: ...` lines
pub fn format_history(history: &[HistoryEntry]) -> String {
    let mut formatted = String::new();
    for entry in history {
        match entry.role {
            Role::User => formatted.push_str(&format!("User: {}\n", entry.message)),
            Role::Assistant => formatted.push_str(&format!("assistant: {}\n", entry.message)),
            Role::Other => {}
        }
    }
    formatted
}

impl PromptTemplate {
    /// Build the full prompt for `query`
    pub fn render(&self, system_prompt: &str, history: &[HistoryEntry], query: &str) -> String {
        let history = format_history(history);
        match self {
            PromptTemplate::Llama => format!(
                "[INST]<<SYS>>\n{}\n<</SYS>>\n\nContext: {}\n\nUser: {}[/INST]",
                system_prompt, history, query
            ),
            PromptTemplate::Llama3 => format!(
                "system {}userContext: {}\nUser: {}assistant",
                system_prompt, history, query
            ),
        }
    }

    /// Text that ends the echoed prompt in the model's raw output
    pub fn echo_marker(&self, query: &str) -> String {
        match self {
            PromptTemplate::Llama => "[/INST]".to_string(),
            PromptTemplate::Llama3 => format!("User: {}assistant", query),
        }
    }
}
