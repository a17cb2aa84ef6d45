//! Backend capability
//!
//! The residency manager and dispatcher only talk to inference engines
//! through these traits:
//! - [`ModelLoader`]: turns a configuration into a loaded handle
//! - [`Blender`]: ranks candidates and fuses the top-ranked ones
//! - [`Generator`]: streams generated text for a prompt

pub mod demo;
#[cfg(test)]
pub(crate) mod testing;

pub use demo::{DemoBlender, DemoGenerator};

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use futures::stream::BoxStream;

use crate::error::Result;
use crate::model::{LoadPurpose, ModelConfiguration, RankAndFuse, Ranking};

/// One-shot stream of generated text chunks
pub type TextStream = BoxStream<'static, Result<String>>;

/// Loads model resources for a configuration
#[async_trait]
pub trait ModelLoader: Send + Sync + 'static {
    /// Identity of what gets loaded; equal configurations share a handle
    type Config: Clone + PartialEq + fmt::Debug + fmt::Display + Send + Sync + 'static;

    /// Loaded resources. Dropping the last reference releases them.
    type Handle: Send + Sync + 'static;

    /// Load `config`, initialising eagerly what `purpose` needs
    async fn load(&self, config: &Self::Config, purpose: LoadPurpose) -> Result<Self::Handle>;
}

/// Ranking and fusion over a loaded ranker/fuser pair
#[async_trait]
pub trait Blender: ModelLoader<Config = ModelConfiguration> {
    /// Rank each input's candidates
    async fn rank(
        &self,
        handle: &Self::Handle,
        inputs: &[String],
        candidates: &[Vec<String>],
    ) -> Result<Vec<Ranking>>;

    /// Rank each input's candidates and fuse the `top_k` best, in one pass
    async fn rank_and_fuse(
        &self,
        handle: &Self::Handle,
        inputs: &[String],
        candidates: &[Vec<String>],
        top_k: usize,
    ) -> Result<RankAndFuse>;
}

/// Token-by-token text generation
pub trait Generator: ModelLoader {
    /// Start generating for `prompt`.
    ///
    /// The stream holds `handle` for as long as it runs; dropping the stream
    /// abandons generation.
    fn generate_stream(&self, handle: Arc<Self::Handle>, prompt: String) -> TextStream;
}
