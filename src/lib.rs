//! Blendr - rank and fuse LLM outputs behind an HTTP API
//!
//! Blendr keeps one ranker/fuser pair resident and serves rank, fuse and
//! rank-then-fuse requests against it, reloading only when a request names a
//! different pair. A second endpoint streams chat output from an
//! instruction-tuned generator with the echoed prompt removed.
//!
//! # Architecture
//!
//! - **backend**: inference capability traits plus a self-contained demo backend
//! - **engine**: model residency and request dispatch
//! - **chat**: prompt templates and the prompt-echo filter
//! - **server** / **cli**: HTTP and command-line surfaces
//!
//! # Example
//!
//! ```bash
//! # Fetch a ranker and a fuser into the cache
//! blendr pull llm-blender/PairRM
//! blendr pull llm-blender/gen_fuser_770m
//!
//! # Start server with the pair already loaded
//! blendr serve --ranker llm-blender/PairRM --fuser llm-blender/gen_fuser_770m
//!
//! # List cached models
//! blendr list
//! ```

pub mod backend;
pub mod chat;
pub mod cli;
pub mod config;
pub mod engine;
pub mod error;
pub mod model;
pub mod server;

// Re-export key types
pub use config::{BlendrConfig, GenerationConfig, ServerConfig};
pub use engine::{Dispatcher, Envelope, ResidencyManager, ResidencyStatus};
pub use error::{BlendError, Result};
pub use model::{Mode, ModelConfiguration};
