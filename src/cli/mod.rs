//! CLI commands
//!
//! `serve` runs the HTTP server; `list`, `check` and `pull` manage the
//! model cache it loads from.

mod check;
mod list;
mod pull;
mod serve;

pub use check::check;
pub use list::list;
pub use pull::pull;
pub use serve::{serve, ServeOptions};

use std::path::{Path, PathBuf};

use anyhow::Result;
use clap::{Parser, Subcommand};

use crate::config::BlendrConfig;

/// Blendr - rank and fuse LLM outputs behind an HTTP API
#[derive(Parser)]
#[command(name = "blendr")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Configuration file (.yaml, .yml or .json)
    #[arg(long, short, global = true)]
    pub config: Option<PathBuf>,

    /// Model cache directory (overrides config and BLENDR_MODEL_DIR)
    #[arg(long, global = true)]
    pub model_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start the blend server
    Serve {
        /// Port to listen on
        #[arg(long)]
        port: Option<u16>,

        /// Host to bind to
        #[arg(long)]
        host: Option<String>,

        /// Ranker to load before accepting requests (requires --fuser)
        #[arg(long, requires = "fuser")]
        ranker: Option<String>,

        /// Fuser to load before accepting requests (requires --ranker)
        #[arg(long, requires = "ranker")]
        fuser: Option<String>,

        /// Upper bound on a single model load in seconds (0 = unbounded)
        #[arg(long)]
        load_timeout_secs: Option<u64>,

        /// Requests allowed to queue behind a load before new ones get 503
        #[arg(long)]
        max_waiting: Option<usize>,
    },

    /// List models in the cache
    List {
        /// Show ranker metadata
        #[arg(long, short)]
        verbose: bool,
    },

    /// Check that a ranker/fuser pair is loadable from the cache
    Check {
        /// Ranker id, e.g. llm-blender/PairRM
        #[arg(long)]
        ranker: Option<String>,

        /// Fuser id, e.g. llm-blender/gen_fuser_770m
        #[arg(long)]
        fuser: Option<String>,
    },

    /// Pull a model repository from HuggingFace Hub into the cache
    Pull {
        /// Repository ID (e.g., "llm-blender/PairRM")
        repo: String,

        /// Download a single file instead of the whole repository
        #[arg(long)]
        file: Option<String>,
    },
}

/// Load configuration and apply the global `--model-dir` override
pub fn load_config(config: Option<&Path>, model_dir: Option<PathBuf>) -> Result<BlendrConfig> {
    let mut config = BlendrConfig::load(config)?;
    if let Some(dir) = model_dir {
        config.residency.model_dir = dir;
    }
    Ok(config)
}
