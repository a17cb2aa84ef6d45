//! Error handling for blendr
//!
//! Every failure a request can hit maps to one [`BlendError`] variant, and every
//! variant maps to an HTTP status code and a `{status, message}` envelope.

use std::path::PathBuf;
use std::time::Duration;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use thiserror::Error;

use crate::engine::Envelope;

/// Main error type for residency, dispatch and streaming
#[derive(Error, Debug)]
pub enum BlendError {
    /// A model directory or required file is missing from the model cache
    #[error("Model path {} not found.", path.display())]
    ConfigurationNotFound { path: PathBuf },

    /// Model metadata exists but is unreadable or lacks required fields
    #[error("Ranker config {} is invalid: {reason}", path.display())]
    ConfigurationInvalid { path: PathBuf, reason: String },

    /// Request body was not sent as JSON, or its bytes do not parse as JSON
    #[error("Unsupported Media Type: {0}")]
    UnsupportedEncoding(String),

    /// `mode` is not one of `rank`, `fuse`, `rank_and_fuse`
    #[error("Mode is unknown: {0}")]
    InvalidMode(String),

    /// `inputs` and `candidates_texts` do not line up, or a field has the
    /// wrong JSON type
    #[error("Shape mismatch: {0}")]
    ShapeMismatch(String),

    /// Chat request without a query
    #[error("Missing query parameter")]
    EmptyQuery,

    /// Chat request naming a prompt template that does not exist
    #[error("Unsupported model type: {0}")]
    UnknownTemplate(String),

    /// Loading a configuration took longer than the configured bound
    #[error("Loading {configuration} timed out after {}s", timeout.as_secs())]
    LoadTimeout {
        configuration: String,
        timeout: Duration,
    },

    /// Too many requests already queued behind a load
    #[error("Model residency is busy ({waiting} requests waiting)")]
    ResidencyBusy { waiting: usize },

    /// Opaque failure reported by the inference backend
    #[error("Backend failure: {0}")]
    BackendFailure(String),
}

/// Result type alias for convenience
pub type Result<T> = std::result::Result<T, BlendError>;

impl BlendError {
    /// Create a backend failure
    pub fn backend<S: Into<String>>(message: S) -> Self {
        Self::BackendFailure(message.into())
    }

    /// Create a shape mismatch error
    pub fn shape<S: Into<String>>(message: S) -> Self {
        Self::ShapeMismatch(message.into())
    }

    /// Create a configuration-invalid error
    pub fn invalid_config<P: Into<PathBuf>, S: Into<String>>(path: P, reason: S) -> Self {
        Self::ConfigurationInvalid {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// HTTP status code for this error
    pub fn status_code(&self) -> StatusCode {
        match self {
            BlendError::ConfigurationNotFound { .. } => StatusCode::NOT_FOUND,
            BlendError::ConfigurationInvalid { .. } => StatusCode::BAD_REQUEST,
            BlendError::UnsupportedEncoding(_) => StatusCode::UNSUPPORTED_MEDIA_TYPE,
            BlendError::InvalidMode(_)
            | BlendError::ShapeMismatch(_)
            | BlendError::EmptyQuery
            | BlendError::UnknownTemplate(_) => StatusCode::BAD_REQUEST,
            BlendError::ResidencyBusy { .. } => StatusCode::SERVICE_UNAVAILABLE,
            BlendError::LoadTimeout { .. } => StatusCode::GATEWAY_TIMEOUT,
            BlendError::BackendFailure(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for BlendError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let envelope = Envelope::error(status, self.to_string());
        (status, Json(envelope)).into_response()
    }
}
