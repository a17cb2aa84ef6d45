//! Recording backend doubles for tests

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_stream::stream;
use async_trait::async_trait;
use futures::StreamExt;

use super::{Blender, Generator, ModelLoader, TextStream};
use crate::error::{BlendError, Result};
use crate::model::{
    ranking_from_scores, top_k, LoadPurpose, ModelConfiguration, RankAndFuse, Ranking,
};

/// Counts every backend call and can be told to fail or stall.
///
/// Ranks candidates by length, longest first, and fuses by joining the
/// selected candidates with `" | "`.
#[derive(Default)]
pub struct RecordingBlender {
    pub loads: AtomicUsize,
    pub ranks: AtomicUsize,
    pub fuses: AtomicUsize,
    /// Handles dropped so far
    pub released: Arc<AtomicUsize>,
    /// Configurations whose load reports `ConfigurationNotFound`
    missing: Mutex<HashSet<ModelConfiguration>>,
    load_delay: Mutex<Option<Duration>>,
    fail_inference: AtomicBool,
    purposes: Mutex<Vec<LoadPurpose>>,
}

pub struct RecordedHandle {
    pub configuration: ModelConfiguration,
    pub serial: usize,
    released: Arc<AtomicUsize>,
}

impl Drop for RecordedHandle {
    fn drop(&mut self) {
        self.released.fetch_add(1, Ordering::SeqCst);
    }
}

impl RecordingBlender {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn mark_missing(&self, config: &ModelConfiguration) {
        self.missing.lock().unwrap().insert(config.clone());
    }

    pub fn set_load_delay(&self, delay: Duration) {
        *self.load_delay.lock().unwrap() = Some(delay);
    }

    pub fn fail_inference(&self, fail: bool) {
        self.fail_inference.store(fail, Ordering::SeqCst);
    }

    pub fn loads(&self) -> usize {
        self.loads.load(Ordering::SeqCst)
    }

    pub fn ranks(&self) -> usize {
        self.ranks.load(Ordering::SeqCst)
    }

    pub fn fuses(&self) -> usize {
        self.fuses.load(Ordering::SeqCst)
    }

    pub fn released(&self) -> usize {
        self.released.load(Ordering::SeqCst)
    }

    pub fn purposes(&self) -> Vec<LoadPurpose> {
        self.purposes.lock().unwrap().clone()
    }

    fn check_inference(&self) -> Result<()> {
        if self.fail_inference.load(Ordering::SeqCst) {
            return Err(BlendError::backend("CUDA out of memory"));
        }
        Ok(())
    }
}

fn rank_by_length(texts: &[String]) -> Ranking {
    let scores: Vec<f64> = texts.iter().map(|t| t.len() as f64).collect();
    ranking_from_scores(&scores)
}

#[async_trait]
impl ModelLoader for RecordingBlender {
    type Config = ModelConfiguration;
    type Handle = RecordedHandle;

    async fn load(&self, config: &ModelConfiguration, purpose: LoadPurpose) -> Result<RecordedHandle> {
        let serial = self.loads.fetch_add(1, Ordering::SeqCst) + 1;
        self.purposes.lock().unwrap().push(purpose);

        let delay = *self.load_delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        if self.missing.lock().unwrap().contains(config) {
            return Err(BlendError::ConfigurationNotFound {
                path: format!("/models/{}", config.ranker).into(),
            });
        }

        Ok(RecordedHandle {
            configuration: config.clone(),
            serial,
            released: Arc::clone(&self.released),
        })
    }
}

#[async_trait]
impl Blender for RecordingBlender {
    async fn rank(
        &self,
        _handle: &RecordedHandle,
        _inputs: &[String],
        candidates: &[Vec<String>],
    ) -> Result<Vec<Ranking>> {
        self.ranks.fetch_add(1, Ordering::SeqCst);
        self.check_inference()?;
        Ok(candidates.iter().map(|c| rank_by_length(c)).collect())
    }

    async fn rank_and_fuse(
        &self,
        _handle: &RecordedHandle,
        _inputs: &[String],
        candidates: &[Vec<String>],
        top_k_count: usize,
    ) -> Result<RankAndFuse> {
        self.fuses.fetch_add(1, Ordering::SeqCst);
        self.check_inference()?;

        let ranks: Vec<Ranking> = candidates.iter().map(|c| rank_by_length(c)).collect();
        let fused = ranks
            .iter()
            .zip(candidates)
            .map(|(ranking, texts)| {
                top_k(ranking, top_k_count)
                    .into_iter()
                    .map(|i| texts[i].as_str())
                    .collect::<Vec<_>>()
                    .join(" | ")
            })
            .collect();
        Ok(RankAndFuse { fused, ranks })
    }
}

/// Generator that replays fixed chunks regardless of the prompt
pub struct ScriptedGenerator {
    chunks: Vec<String>,
    /// Keep each stream open after the last chunk until it is dropped
    hold_open: bool,
    pub loads: AtomicUsize,
    pub purposes: Mutex<Vec<LoadPurpose>>,
    pub prompts: Mutex<Vec<String>>,
    /// Streams handed out and not yet dropped
    open_streams: Arc<AtomicUsize>,
}

/// Decrements the open stream count when a stream is dropped
struct OpenStream(Arc<AtomicUsize>);

impl Drop for OpenStream {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

impl ScriptedGenerator {
    pub fn new(chunks: &[&str]) -> Arc<Self> {
        Arc::new(Self::scripted(chunks, false))
    }

    /// Streams never end on their own; the caller has to drop them
    pub fn holding(chunks: &[&str]) -> Arc<Self> {
        Arc::new(Self::scripted(chunks, true))
    }

    fn scripted(chunks: &[&str], hold_open: bool) -> Self {
        Self {
            chunks: chunks.iter().map(|c| c.to_string()).collect(),
            hold_open,
            loads: AtomicUsize::new(0),
            purposes: Mutex::new(Vec::new()),
            prompts: Mutex::new(Vec::new()),
            open_streams: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn last_prompt(&self) -> Option<String> {
        self.prompts.lock().unwrap().last().cloned()
    }

    pub fn open_streams(&self) -> usize {
        self.open_streams.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ModelLoader for ScriptedGenerator {
    type Config = String;
    type Handle = String;

    async fn load(&self, config: &String, purpose: LoadPurpose) -> Result<String> {
        self.loads.fetch_add(1, Ordering::SeqCst);
        self.purposes.lock().unwrap().push(purpose);
        Ok(config.clone())
    }
}

impl Generator for ScriptedGenerator {
    fn generate_stream(&self, _handle: Arc<String>, prompt: String) -> TextStream {
        self.prompts.lock().unwrap().push(prompt);
        self.open_streams.fetch_add(1, Ordering::SeqCst);
        let guard = OpenStream(Arc::clone(&self.open_streams));
        let chunks = self.chunks.clone();
        let hold_open = self.hold_open;
        stream! {
            let _guard = guard;
            for chunk in chunks {
                yield Ok(chunk);
            }
            if hold_open {
                futures::future::pending::<()>().await;
            }
        }
        .boxed()
    }
}
