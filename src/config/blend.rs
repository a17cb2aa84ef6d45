//! Ranking/fusion settings

use serde::{Deserialize, Serialize};

use crate::model::ModelConfiguration;

/// Settings for the rank/fuse endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlendConfig {
    /// Number of top-ranked candidates handed to the fuser
    #[serde(default = "default_top_k")]
    pub top_k: usize,

    /// Configuration used when a request omits `model_name`
    #[serde(default)]
    pub default_model: ModelConfiguration,
}

fn default_top_k() -> usize {
    2
}

impl Default for BlendConfig {
    fn default() -> Self {
        Self {
            top_k: default_top_k(),
            default_model: ModelConfiguration::default(),
        }
    }
}
