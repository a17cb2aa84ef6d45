//! Self-contained demo backend
//!
//! Validates configurations against the real model cache layout but replaces
//! the neural ranker/fuser/generator with cheap deterministic stand-ins, so the
//! server can be exercised end to end without GPUs or weights.

use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use async_stream::stream;
use async_trait::async_trait;
use futures::StreamExt;
use rand::seq::SliceRandom;
use tokio::sync::OnceCell;

use super::{Blender, Generator, ModelLoader, TextStream};
use crate::error::{BlendError, Result};
use crate::model::{
    ranking_from_scores, top_k, LoadPurpose, ModelConfiguration, ModelStore, RankAndFuse,
    Ranking, ResolvedModels,
};

/// Answers the demo generator picks from
const SENTENCES: &[&str] = &[
    "The quick brown fox jumps over the lazy dog.",
    "The five boxing wizards jump quickly.",
    "Pack my box with five dozen liquor jugs.",
    "How razorback-jumping frogs can level six piqued gymnasts!",
    "Cozy lummox gives smart squid who asks for job pen.",
    "The jay, pig, fox, zebra, and my wolves quack!",
    "Sympathizing would fix Quaker objectives.",
    "A wizard's job is to vex chumps quickly in fog.",
    "By Jove, my quick study of lexicography won a prize!",
    "Waltz, bad nymph, for quick jigs vex!",
];

/// Characters per chunk when echoing the prompt back
const ECHO_CHUNK_CHARS: usize = 7;

/// Ranker/fuser stand-in backed by a [`ModelStore`]
pub struct DemoBlender {
    store: ModelStore,
}

/// A configuration "loaded" by [`DemoBlender`]
pub struct DemoBlendHandle {
    configuration: ModelConfiguration,
    models: ResolvedModels,
    fuser: OnceCell<PathBuf>,
}

impl DemoBlendHandle {
    pub fn configuration(&self) -> &ModelConfiguration {
        &self.configuration
    }

    /// Whether the fuser half has been initialised
    pub fn fuser_ready(&self) -> bool {
        self.fuser.initialized()
    }

    async fn fuser(&self) -> &PathBuf {
        self.fuser
            .get_or_init(|| async {
                tracing::info!("Initialising fuser {} on first use", self.configuration.fuser);
                self.models.fuser_path.clone()
            })
            .await
    }
}

impl DemoBlender {
    pub fn new(store: ModelStore) -> Self {
        Self { store }
    }
}

#[async_trait]
impl ModelLoader for DemoBlender {
    type Config = ModelConfiguration;
    type Handle = DemoBlendHandle;

    async fn load(&self, config: &ModelConfiguration, purpose: LoadPurpose) -> Result<DemoBlendHandle> {
        let models = self.store.resolve(config)?;
        tracing::debug!(
            "Ranker {} is a {} ({})",
            config.ranker,
            models.ranker.ranker_type,
            models.ranker.model_name
        );

        let fuser = match purpose {
            LoadPurpose::RankOnly => OnceCell::new(),
            LoadPurpose::FuseCapable | LoadPurpose::Generate => {
                OnceCell::new_with(Some(models.fuser_path.clone()))
            }
        };

        Ok(DemoBlendHandle {
            configuration: config.clone(),
            models,
            fuser,
        })
    }
}

#[async_trait]
impl Blender for DemoBlender {
    async fn rank(
        &self,
        _handle: &DemoBlendHandle,
        inputs: &[String],
        candidates: &[Vec<String>],
    ) -> Result<Vec<Ranking>> {
        Ok(inputs
            .iter()
            .zip(candidates)
            .map(|(input, texts)| rank_by_overlap(input, texts))
            .collect())
    }

    async fn rank_and_fuse(
        &self,
        handle: &DemoBlendHandle,
        inputs: &[String],
        candidates: &[Vec<String>],
        top_k_count: usize,
    ) -> Result<RankAndFuse> {
        if top_k_count == 0 {
            return Err(BlendError::backend("fusion needs at least one candidate (top_k = 0)"));
        }
        handle.fuser().await;

        let mut fused = Vec::with_capacity(inputs.len());
        let mut ranks = Vec::with_capacity(inputs.len());
        for (input, texts) in inputs.iter().zip(candidates) {
            let ranking = rank_by_overlap(input, texts);
            let selected: Vec<&str> = top_k(&ranking, top_k_count)
                .into_iter()
                .map(|i| texts[i].as_str())
                .collect();
            fused.push(fuse_sentences(&selected));
            ranks.push(ranking);
        }

        Ok(RankAndFuse { fused, ranks })
    }
}

fn words(text: &str) -> HashSet<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .map(|w| w.to_lowercase())
        .collect()
}

/// Score candidates by word overlap with the input, with a small bonus for
/// vocabulary breadth.
fn rank_by_overlap(input: &str, candidates: &[String]) -> Ranking {
    let input_words = words(input);
    let scores: Vec<f64> = candidates
        .iter()
        .map(|candidate| {
            let candidate_words = words(candidate);
            let overlap = candidate_words.intersection(&input_words).count() as f64;
            overlap + 0.01 * candidate_words.len() as f64
        })
        .collect();
    ranking_from_scores(&scores)
}

/// Merge texts sentence by sentence, keeping the first copy of each sentence
fn fuse_sentences(texts: &[&str]) -> String {
    let mut seen = HashSet::new();
    let mut merged = Vec::new();

    for text in texts {
        for sentence in split_sentences(text) {
            if seen.insert(sentence.to_lowercase()) {
                merged.push(sentence);
            }
        }
    }

    merged.join(" ")
}

fn split_sentences(text: &str) -> Vec<&str> {
    let mut sentences = Vec::new();
    let mut start = 0;
    for (i, c) in text.char_indices() {
        if matches!(c, '.' | '!' | '?') {
            let end = i + c.len_utf8();
            let sentence = text[start..end].trim();
            if !sentence.is_empty() {
                sentences.push(sentence);
            }
            start = end;
        }
    }
    let rest = text[start..].trim();
    if !rest.is_empty() {
        sentences.push(rest);
    }
    sentences
}

/// Instruction-tuned generator stand-in.
///
/// Like a causal LM streamed without prompt stripping, it first echoes the
/// prompt, then produces its answer word by word.
pub struct DemoGenerator {
    pacing: Option<Duration>,
    max_length: usize,
}

/// A generator model "loaded" by [`DemoGenerator`]
pub struct DemoGeneratorHandle {
    model: String,
}

impl DemoGeneratorHandle {
    pub fn model(&self) -> &str {
        &self.model
    }
}

impl DemoGenerator {
    pub fn new(max_length: usize) -> Self {
        Self {
            pacing: None,
            max_length,
        }
    }

    /// Wait `pacing` before each streamed chunk
    pub fn with_pacing(mut self, pacing: Option<Duration>) -> Self {
        self.pacing = pacing;
        self
    }
}

#[async_trait]
impl ModelLoader for DemoGenerator {
    type Config = String;
    type Handle = DemoGeneratorHandle;

    async fn load(&self, config: &String, _purpose: LoadPurpose) -> Result<DemoGeneratorHandle> {
        if config.trim().is_empty() {
            return Err(BlendError::invalid_config(
                "generation.model",
                "generator model id is empty",
            ));
        }
        Ok(DemoGeneratorHandle {
            model: config.clone(),
        })
    }
}

impl Generator for DemoGenerator {
    fn generate_stream(&self, handle: Arc<DemoGeneratorHandle>, prompt: String) -> TextStream {
        let pacing = self.pacing;
        let answer = SENTENCES
            .choose(&mut rand::thread_rng())
            .copied()
            .unwrap_or(SENTENCES[0]);
        let budget = self
            .max_length
            .saturating_sub(prompt.split_whitespace().count());

        stream! {
            tracing::debug!("Generating with {}", handle.model());
            for chunk in chunk_chars(&prompt, ECHO_CHUNK_CHARS) {
                if let Some(delay) = pacing {
                    tokio::time::sleep(delay).await;
                }
                yield Ok(chunk);
            }
            for word in answer.split_whitespace().take(budget) {
                if let Some(delay) = pacing {
                    tokio::time::sleep(delay).await;
                }
                yield Ok(format!(" {}", word));
            }
        }
        .boxed()
    }
}

/// Split `text` into chunks of at most `size` characters
fn chunk_chars(text: &str, size: usize) -> Vec<String> {
    let chars: Vec<char> = text.chars().collect();
    chars
        .chunks(size.max(1))
        .map(|chunk| chunk.iter().collect())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{is_permutation, RANKER_CONFIG_FILE};

    fn demo_store() -> (tempfile::TempDir, ModelStore) {
        let dir = tempfile::tempdir().unwrap();
        let ranker = dir.path().join("R1");
        std::fs::create_dir_all(&ranker).unwrap();
        std::fs::write(
            ranker.join(RANKER_CONFIG_FILE),
            r#"{"ranker_type": "pairranker", "model_type": "deberta", "model_name": "microsoft/deberta-v3-large"}"#,
        )
        .unwrap();
        std::fs::create_dir_all(dir.path().join("F1")).unwrap();
        let store = ModelStore::new(dir.path());
        (dir, store)
    }

    fn strings(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[tokio::test]
    async fn test_load_checks_store() {
        let (_dir, store) = demo_store();
        let blender = DemoBlender::new(store);

        let handle = blender
            .load(&ModelConfiguration::new("R1", "F1"), LoadPurpose::RankOnly)
            .await
            .unwrap();
        assert_eq!(handle.configuration(), &ModelConfiguration::new("R1", "F1"));

        let err = blender
            .load(&ModelConfiguration::new("R1", "missing"), LoadPurpose::RankOnly)
            .await
            .err()
            .unwrap();
        assert!(matches!(err, BlendError::ConfigurationNotFound { .. }));
    }

    #[tokio::test]
    async fn test_rank_prefers_overlap() {
        let (_dir, store) = demo_store();
        let blender = DemoBlender::new(store);
        let handle = blender
            .load(&ModelConfiguration::new("R1", "F1"), LoadPurpose::RankOnly)
            .await
            .unwrap();

        let inputs = strings(&["What color is the sky?"]);
        let candidates = vec![strings(&[
            "Bananas are yellow.",
            "The sky is blue on a clear day.",
            "Sky.",
        ])];
        let ranks = blender.rank(&handle, &inputs, &candidates).await.unwrap();
        assert_eq!(ranks.len(), 1);
        assert!(is_permutation(&ranks[0]));
        assert_eq!(ranks[0][1], 1);
    }

    #[tokio::test]
    async fn test_rank_only_load_initialises_fuser_lazily() {
        let (_dir, store) = demo_store();
        let blender = DemoBlender::new(store);
        let config = ModelConfiguration::new("R1", "F1");

        let handle = blender.load(&config, LoadPurpose::RankOnly).await.unwrap();
        assert!(!handle.fuser_ready());

        let inputs = strings(&["hello"]);
        let candidates = vec![strings(&["hello there.", "goodbye."])];
        blender
            .rank_and_fuse(&handle, &inputs, &candidates, 2)
            .await
            .unwrap();
        assert!(handle.fuser_ready());

        let eager = blender.load(&config, LoadPurpose::FuseCapable).await.unwrap();
        assert!(eager.fuser_ready());
    }

    #[tokio::test]
    async fn test_rank_and_fuse_uses_top_k_of_ranking() {
        let (_dir, store) = demo_store();
        let blender = DemoBlender::new(store);
        let handle = blender
            .load(&ModelConfiguration::new("R1", "F1"), LoadPurpose::FuseCapable)
            .await
            .unwrap();

        let inputs = strings(&["rust borrow checker"]);
        let candidates = vec![strings(&[
            "Unrelated text.",
            "The borrow checker enforces ownership. Rust is safe.",
            "Rust has a borrow checker. Rust is safe.",
        ])];
        let out = blender
            .rank_and_fuse(&handle, &inputs, &candidates, 2)
            .await
            .unwrap();

        let best_two = top_k(&out.ranks[0], 2);
        assert!(!best_two.contains(&0));
        assert!(!out.fused[0].contains("Unrelated"));
        // shared sentence appears once
        assert_eq!(out.fused[0].matches("Rust is safe.").count(), 1);
    }

    #[tokio::test]
    async fn test_rank_and_fuse_rejects_zero_top_k() {
        let (_dir, store) = demo_store();
        let blender = DemoBlender::new(store);
        let handle = blender
            .load(&ModelConfiguration::new("R1", "F1"), LoadPurpose::FuseCapable)
            .await
            .unwrap();
        let err = blender
            .rank_and_fuse(&handle, &strings(&["q"]), &[strings(&["a"])], 0)
            .await
            .unwrap_err();
        assert!(matches!(err, BlendError::BackendFailure(_)));
    }

    #[test]
    fn test_split_sentences() {
        assert_eq!(
            split_sentences("One. Two! Three? tail"),
            vec!["One.", "Two!", "Three?", "tail"]
        );
        assert!(split_sentences("   ").is_empty());
    }

    #[test]
    fn test_chunk_chars_respects_char_boundaries() {
        let chunks = chunk_chars("héllo wörld", 3);
        assert_eq!(chunks.concat(), "héllo wörld");
        assert!(chunks.iter().all(|c| c.chars().count() <= 3));
    }

    #[tokio::test]
    async fn test_generator_echoes_prompt_then_answers() {
        let generator = DemoGenerator::new(8096);
        let handle = Arc::new(
            generator
                .load(&"demo-llama".to_string(), LoadPurpose::Generate)
                .await
                .unwrap(),
        );

        let prompt = "[INST]hi[/INST]".to_string();
        let chunks: Vec<String> = generator
            .generate_stream(handle, prompt.clone())
            .map(|r| r.unwrap())
            .collect()
            .await;
        let text = chunks.concat();

        assert!(text.starts_with(&prompt));
        let answer = text[prompt.len()..].trim_start();
        assert!(SENTENCES.contains(&answer), "unexpected answer {answer:?}");
    }

    #[tokio::test]
    async fn test_generator_rejects_empty_model() {
        let generator = DemoGenerator::new(16);
        assert!(generator
            .load(&String::new(), LoadPurpose::Generate)
            .await
            .is_err());
    }
}
