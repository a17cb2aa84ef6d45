//! Request-facing model types
//!
//! A [`ModelConfiguration`] names the ranker/fuser pair that should be
//! resident; [`Mode`] names the operation a request wants run on it.

mod store;

pub use store::{ModelStore, RankerManifest, ResolvedModels, StoredModel, RANKER_CONFIG_FILE};

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::BlendError;

/// Identifies which ranker and fuser should be resident.
///
/// Two configurations are equal iff both identifiers match exactly.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ModelConfiguration {
    pub ranker: String,
    pub fuser: String,
}

impl ModelConfiguration {
    pub fn new(ranker: impl Into<String>, fuser: impl Into<String>) -> Self {
        Self {
            ranker: ranker.into(),
            fuser: fuser.into(),
        }
    }
}

impl Default for ModelConfiguration {
    fn default() -> Self {
        Self::new("llm-blender/PairRM", "llm-blender/gen_fuser_770m")
    }
}

impl fmt::Display for ModelConfiguration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}+{}", self.ranker, self.fuser)
    }
}

/// What a load is for, so the backend knows what to initialise eagerly
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadPurpose {
    /// Only the ranker is needed up front
    RankOnly,
    /// Ranker and fuser are both needed up front
    FuseCapable,
    /// Text generation; there is no ranker/fuser split
    Generate,
}

/// Inference operation requested by a client
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Rank,
    Fuse,
    RankAndFuse,
}

impl Mode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Mode::Rank => "rank",
            Mode::Fuse => "fuse",
            Mode::RankAndFuse => "rank_and_fuse",
        }
    }

    /// What the resident configuration must be able to do for this mode
    pub fn purpose(&self) -> LoadPurpose {
        match self {
            Mode::Rank => LoadPurpose::RankOnly,
            Mode::Fuse | Mode::RankAndFuse => LoadPurpose::FuseCapable,
        }
    }
}

impl FromStr for Mode {
    type Err = BlendError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "rank" => Ok(Mode::Rank),
            "fuse" => Ok(Mode::Fuse),
            "rank_and_fuse" => Ok(Mode::RankAndFuse),
            other => Err(BlendError::InvalidMode(other.to_string())),
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Ranks of one input's candidates, in candidate order.
///
/// `ranking[i]` is the 1-based position of candidate `i` (1 = best), so a
/// valid ranking is a permutation of `1..=n`.
pub type Ranking = Vec<usize>;

/// Output of a single rank-then-fuse backend call
#[derive(Debug, Clone, PartialEq)]
pub struct RankAndFuse {
    /// One fused text per input
    pub fused: Vec<String>,
    /// The rankings the fusion selected its top-K from, one per input
    pub ranks: Vec<Ranking>,
}

/// Convert per-candidate scores (higher is better) into a [`Ranking`].
///
/// Ties keep candidate order: the earlier candidate gets the better rank.
pub fn ranking_from_scores(scores: &[f64]) -> Ranking {
    let mut order: Vec<usize> = (0..scores.len()).collect();
    order.sort_by(|&a, &b| {
        scores[b]
            .partial_cmp(&scores[a])
            .unwrap_or(std::cmp::Ordering::Equal)
            .then(a.cmp(&b))
    });

    let mut ranks = vec![0; scores.len()];
    for (position, candidate) in order.into_iter().enumerate() {
        ranks[candidate] = position + 1;
    }
    ranks
}

/// Candidate indices of the `k` best-ranked candidates, best first
pub fn top_k(ranking: &[usize], k: usize) -> Vec<usize> {
    let mut order: Vec<usize> = (0..ranking.len()).collect();
    order.sort_by_key(|&i| ranking[i]);
    order.truncate(k);
    order
}

/// Whether `ranking` is a permutation of `1..=ranking.len()`
pub fn is_permutation(ranking: &[usize]) -> bool {
    let mut seen = vec![false; ranking.len()];
    for &rank in ranking {
        if rank == 0 || rank > ranking.len() || seen[rank - 1] {
            return false;
        }
        seen[rank - 1] = true;
    }
    true
}
