//! On-disk model cache
//!
//! Ranker and fuser ids are relative paths below the cache root, e.g.
//! `llm-blender/PairRM`. A usable ranker directory carries a `config.json`
//! naming its `ranker_type`, `model_type` and `model_name`.

use std::path::{Component, Path, PathBuf};

use serde::{Deserialize, Serialize};

use super::ModelConfiguration;
use crate::error::{BlendError, Result};

/// Metadata file every ranker directory must carry
pub const RANKER_CONFIG_FILE: &str = "config.json";

const REQUIRED_RANKER_FIELDS: [&str; 3] = ["ranker_type", "model_type", "model_name"];

/// Parsed ranker `config.json`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankerManifest {
    pub ranker_type: String,
    pub model_type: String,
    pub model_name: String,
    /// Everything else in the file, passed through to the backend
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// A configuration checked against the cache
#[derive(Debug, Clone)]
pub struct ResolvedModels {
    pub ranker_path: PathBuf,
    pub fuser_path: PathBuf,
    pub ranker: RankerManifest,
}

/// A model directory found while scanning the cache
#[derive(Debug, Clone)]
pub struct StoredModel {
    /// Id relative to the cache root, `/`-separated
    pub id: String,
    pub path: PathBuf,
    /// Whether the directory passes the ranker metadata check
    pub ranker: Option<RankerManifest>,
}

/// Model cache rooted at a directory
#[derive(Debug, Clone)]
pub struct ModelStore {
    root: PathBuf,
}

impl ModelStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Check that both halves of `config` exist and the ranker metadata is valid.
    ///
    /// Missing directories or files yield `ConfigurationNotFound`; unreadable
    /// or incomplete metadata yields `ConfigurationInvalid`.
    pub fn resolve(&self, config: &ModelConfiguration) -> Result<ResolvedModels> {
        let ranker_path = self.model_path(&config.ranker)?;
        let fuser_path = self.model_path(&config.fuser)?;

        if !ranker_path.exists() {
            return Err(BlendError::ConfigurationNotFound { path: ranker_path });
        }
        if !fuser_path.exists() {
            return Err(BlendError::ConfigurationNotFound { path: fuser_path });
        }

        let ranker = read_ranker_manifest(&ranker_path.join(RANKER_CONFIG_FILE))?;

        Ok(ResolvedModels {
            ranker_path,
            fuser_path,
            ranker,
        })
    }

    /// Map a model id to its directory, refusing ids that escape the cache
    fn model_path(&self, id: &str) -> Result<PathBuf> {
        let relative = Path::new(id);
        let escapes = id.is_empty()
            || relative
                .components()
                .any(|c| !matches!(c, Component::Normal(_)));
        if escapes {
            return Err(BlendError::invalid_config(
                relative,
                "model id must be a relative path inside the model cache",
            ));
        }
        Ok(self.root.join(relative))
    }

    /// List model directories, descending one level into organisation
    /// directories such as `llm-blender/`.
    pub fn list(&self) -> std::io::Result<Vec<StoredModel>> {
        let mut models = Vec::new();
        if !self.root.exists() {
            return Ok(models);
        }

        for entry in std::fs::read_dir(&self.root)? {
            let path = entry?.path();
            if !path.is_dir() {
                continue;
            }
            if is_model_dir(&path) {
                models.push(self.stored(path));
                continue;
            }
            for nested in std::fs::read_dir(&path)? {
                let nested = nested?.path();
                if nested.is_dir() && is_model_dir(&nested) {
                    models.push(self.stored(nested));
                }
            }
        }

        models.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(models)
    }

    fn stored(&self, path: PathBuf) -> StoredModel {
        let id = path
            .strip_prefix(&self.root)
            .unwrap_or(&path)
            .components()
            .map(|c| c.as_os_str().to_string_lossy().into_owned())
            .collect::<Vec<_>>()
            .join("/");
        let ranker = read_ranker_manifest(&path.join(RANKER_CONFIG_FILE)).ok();
        StoredModel { id, path, ranker }
    }
}

/// A directory holding at least one regular file counts as a model
fn is_model_dir(path: &Path) -> bool {
    std::fs::read_dir(path)
        .map(|entries| {
            entries
                .filter_map(|e| e.ok())
                .any(|e| e.path().is_file())
        })
        .unwrap_or(false)
}

fn read_ranker_manifest(path: &Path) -> Result<RankerManifest> {
    if !path.exists() {
        return Err(BlendError::ConfigurationNotFound {
            path: path.to_path_buf(),
        });
    }

    let content = std::fs::read_to_string(path)
        .map_err(|e| BlendError::invalid_config(path, format!("unreadable: {}", e)))?;
    let value: serde_json::Value = serde_json::from_str(&content)
        .map_err(|e| BlendError::invalid_config(path, format!("malformed JSON: {}", e)))?;

    let missing: Vec<&str> = REQUIRED_RANKER_FIELDS
        .iter()
        .copied()
        .filter(|key| value.get(key).is_none())
        .collect();
    if !missing.is_empty() {
        return Err(BlendError::invalid_config(
            path,
            format!("missing required parameters: {}", missing.join(", ")),
        ));
    }

    serde_json::from_value(value)
        .map_err(|e| BlendError::invalid_config(path, format!("wrong field type: {}", e)))
}
