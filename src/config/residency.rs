//! Model residency settings

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Environment variable overriding [`ResidencyConfig::model_dir`]
pub const MODEL_DIR_ENV: &str = "BLENDR_MODEL_DIR";

/// Where models live and how loads are bounded
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResidencyConfig {
    /// Root of the model cache; ranker and fuser ids are paths below it
    #[serde(default = "default_model_dir")]
    pub model_dir: PathBuf,

    /// Upper bound on a single load, in seconds (0 = unbounded)
    #[serde(default = "default_load_timeout")]
    pub load_timeout_secs: u64,

    /// Requests allowed to wait on the residency lock before new ones are
    /// rejected. `None` queues without bound.
    #[serde(default)]
    pub max_waiting: Option<usize>,
}

fn default_model_dir() -> PathBuf {
    PathBuf::from("./llm_blender/model")
}

fn default_load_timeout() -> u64 {
    600 // 10 minutes
}

impl Default for ResidencyConfig {
    fn default() -> Self {
        Self {
            model_dir: default_model_dir(),
            load_timeout_secs: default_load_timeout(),
            max_waiting: None,
        }
    }
}

impl ResidencyConfig {
    /// Load timeout, `None` when disabled
    pub fn load_timeout(&self) -> Option<Duration> {
        (self.load_timeout_secs > 0).then(|| Duration::from_secs(self.load_timeout_secs))
    }

    /// Apply `BLENDR_MODEL_DIR` if it is set
    pub fn apply_env(&mut self) {
        if let Ok(dir) = std::env::var(MODEL_DIR_ENV) {
            self.model_dir = PathBuf::from(dir);
        }
    }
}
