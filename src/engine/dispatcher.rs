//! Request dispatcher
//!
//! Validates a blend request, asks the residency manager for a matching
//! handle, runs the requested operation and shapes the response envelope.

use std::sync::Arc;
use std::time::Instant;

use axum::http::StatusCode;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::residency::ResidencyManager;
use crate::backend::Blender;
use crate::error::{BlendError, Result};
use crate::model::{Mode, ModelConfiguration, Ranking};

fn default_mode() -> Value {
    Value::String(Mode::Rank.as_str().to_string())
}

fn default_candidates() -> Vec<Vec<String>> {
    vec![Vec::new()]
}

/// Blend request as sent over the wire
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct BlendPayload {
    /// Ranker/fuser pair; the configured default when absent
    #[serde(default)]
    pub model_name: Option<ModelConfiguration>,

    /// Kept as raw JSON so `null` or a number is reported as an unknown mode
    #[serde(default = "default_mode")]
    pub mode: Value,

    #[serde(default)]
    pub inputs: Vec<String>,

    #[serde(default = "default_candidates")]
    pub candidates_texts: Vec<Vec<String>>,
}

/// A validated blend request.
///
/// Can only be built with one non-empty candidate list per input.
#[derive(Debug, Clone)]
pub struct BlendRequest {
    mode: Mode,
    configuration: ModelConfiguration,
    inputs: Vec<String>,
    candidates: Vec<Vec<String>>,
}

impl BlendRequest {
    pub fn new(
        mode: Mode,
        configuration: ModelConfiguration,
        inputs: Vec<String>,
        candidates: Vec<Vec<String>>,
    ) -> Result<Self> {
        if inputs.len() != candidates.len() {
            return Err(BlendError::shape(format!(
                "{} inputs but {} candidate lists",
                inputs.len(),
                candidates.len()
            )));
        }
        if inputs.is_empty() {
            return Err(BlendError::shape("no inputs given"));
        }
        if let Some(i) = candidates.iter().position(|c| c.is_empty()) {
            return Err(BlendError::shape(format!("input {} has no candidates", i)));
        }

        Ok(Self {
            mode,
            configuration,
            inputs,
            candidates,
        })
    }

    /// Validate a wire payload, filling in `default_model` when it names none
    pub fn from_payload(payload: BlendPayload, default_model: &ModelConfiguration) -> Result<Self> {
        // mode first: an unknown mode is reported even when the shape is also wrong
        let mode: Mode = match &payload.mode {
            Value::String(mode) => mode.parse()?,
            other => return Err(BlendError::InvalidMode(other.to_string())),
        };
        let configuration = payload
            .model_name
            .unwrap_or_else(|| default_model.clone());
        Self::new(mode, configuration, payload.inputs, payload.candidates_texts)
    }
}

/// `{status, message, ranks?, fuse_generations?}` response body
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    pub status: u16,
    pub message: String,

    /// Ranking of the first input's candidates
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ranks: Option<Ranking>,

    /// Fused text for the first input
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fuse_generations: Option<String>,
}

impl Envelope {
    pub fn success() -> Self {
        Self {
            status: StatusCode::OK.as_u16(),
            message: "Success".to_string(),
            ranks: None,
            fuse_generations: None,
        }
    }

    pub fn error(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status: status.as_u16(),
            message: message.into(),
            ranks: None,
            fuse_generations: None,
        }
    }

    fn with_ranks(mut self, ranks: Ranking) -> Self {
        self.ranks = Some(ranks);
        self
    }

    fn with_fused(mut self, fused: String) -> Self {
        self.fuse_generations = Some(fused);
        self
    }
}

/// Routes validated requests to the resident blender
pub struct Dispatcher<B: Blender> {
    residency: Arc<ResidencyManager<B>>,
    top_k: usize,
    default_model: ModelConfiguration,
}

impl<B: Blender> Dispatcher<B> {
    pub fn new(residency: Arc<ResidencyManager<B>>) -> Self {
        Self {
            residency,
            top_k: 2,
            default_model: ModelConfiguration::default(),
        }
    }

    /// Number of top-ranked candidates fed to the fuser
    pub fn with_top_k(mut self, top_k: usize) -> Self {
        self.top_k = top_k;
        self
    }

    /// Configuration used when a request names none
    pub fn with_default_model(mut self, model: ModelConfiguration) -> Self {
        self.default_model = model;
        self
    }

    pub fn residency(&self) -> &Arc<ResidencyManager<B>> {
        &self.residency
    }

    /// Validate and run a wire payload
    pub async fn handle_payload(&self, payload: BlendPayload) -> Result<Envelope> {
        let request = BlendRequest::from_payload(payload, &self.default_model)?;
        self.handle(request).await
    }

    /// Run a validated request
    pub async fn handle(&self, request: BlendRequest) -> Result<Envelope> {
        let mode = request.mode;
        let handle = self
            .residency
            .ensure_resident(&request.configuration, mode.purpose())
            .await?;
        let blender = self.residency.loader();

        let start = Instant::now();
        let envelope = match mode {
            Mode::Rank => {
                let ranks = blender
                    .rank(&handle, &request.inputs, &request.candidates)
                    .await?;
                tracing::info!("Ranked {} input(s) in {:.2?}", ranks.len(), start.elapsed());
                Envelope::success().with_ranks(first(ranks, "ranking")?)
            }
            Mode::Fuse | Mode::RankAndFuse => {
                let result = blender
                    .rank_and_fuse(&handle, &request.inputs, &request.candidates, self.top_k)
                    .await?;
                tracing::info!(
                    "Ranked and fused {} input(s) (top {}) in {:.2?}",
                    result.fused.len(),
                    self.top_k,
                    start.elapsed()
                );

                let fused = first(result.fused, "fused text")?;
                let envelope = Envelope::success().with_fused(fused);
                if mode == Mode::RankAndFuse {
                    envelope.with_ranks(first(result.ranks, "ranking")?)
                } else {
                    envelope
                }
            }
        };

        Ok(envelope)
    }
}

fn first<T>(items: Vec<T>, what: &str) -> Result<T> {
    items
        .into_iter()
        .next()
        .ok_or_else(|| BlendError::backend(format!("backend returned no {}", what)))
}
