//! Configuration system for blendr
//!
//! A single [`BlendrConfig`] file (YAML or JSON) carries server, residency,
//! blending and generation settings. Every section has defaults, so an empty
//! file is a valid configuration.

mod blend;
mod generation;
mod residency;
mod server;

pub use blend::BlendConfig;
pub use generation::GenerationConfig;
pub use residency::{ResidencyConfig, MODEL_DIR_ENV};
pub use server::ServerConfig;

use std::path::Path;

use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};

/// Blendr configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BlendrConfig {
    /// Server settings
    #[serde(default)]
    pub server: ServerConfig,

    /// Model cache and load bounds
    #[serde(default)]
    pub residency: ResidencyConfig,

    /// Rank/fuse settings
    #[serde(default)]
    pub blend: BlendConfig,

    /// Streaming generation settings
    #[serde(default)]
    pub generation: GenerationConfig,
}

impl BlendrConfig {
    /// Load configuration from a YAML file
    pub fn from_yaml<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        Self::from_yaml_str(&content)
    }

    /// Parse configuration from YAML text
    pub fn from_yaml_str(content: &str) -> Result<Self> {
        // serde_yaml rejects a fully empty document for a struct
        if content.trim().is_empty() {
            return Ok(Self::default());
        }
        let config: Self = serde_yaml::from_str(content)?;
        Ok(config)
    }

    /// Load configuration from a JSON file
    pub fn from_json<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        let config: Self = serde_json::from_str(&content)?;
        Ok(config)
    }

    /// Load configuration, picking the format from the file extension
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        match path.extension().and_then(|e| e.to_str()) {
            Some("yaml") | Some("yml") => Self::from_yaml(path),
            Some("json") => Self::from_json(path),
            other => Err(anyhow!(
                "unsupported config format {:?} for {}; use .yaml, .yml or .json",
                other.unwrap_or(""),
                path.display()
            )),
        }
    }

    /// Load from an optional path, then apply environment overrides
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => Self::from_path(path)?,
            None => Self::default(),
        };
        config.residency.apply_env();
        Ok(config)
    }
}
