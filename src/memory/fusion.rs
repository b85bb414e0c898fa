//! Reciprocal Rank Fusion over the keyword, semantic and image candidate lists.
//!
//! Each list is ranked by its own source-local score, and those scores live on
//! incompatible scales (an uncapped keyword heuristic vs. cosine similarities), so fusion
//! only looks at list positions: a memory at 1-based rank `r` in a list gains
//! `1 / (k + r)`. Memories found by several sources accumulate one term per source.
//! Per-source raw scores are carried through for display, never summed.

use std::collections::HashMap;

use serde::Serialize;

use crate::memory::types::MemoryRecord;

/// Default RRF smoothing constant.
pub const RRF_K: f64 = 60.0;

/// Which retrieval source produced a candidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchSource {
    Keyword,
    Semantic,
    Image,
}

impl MatchSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Keyword => "keyword",
            Self::Semantic => "semantic",
            Self::Image => "image",
        }
    }
}

impl std::fmt::Display for MatchSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Image file reference attached to image-source matches.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ImageRef {
    pub image_path: Option<String>,
    pub filename: Option<String>,
}

/// One memory as returned by one source, with that source's local score.
#[derive(Debug, Clone)]
pub struct Candidate {
    pub record: MemoryRecord,
    pub source: MatchSource,
    pub score: f64,
    pub image: Option<ImageRef>,
}

/// The three per-source lists handed to [`fuse`], each sorted best-first.
#[derive(Debug, Default)]
pub struct RankedCandidates {
    pub keyword: Vec<Candidate>,
    pub semantic: Vec<Candidate>,
    pub image: Vec<Candidate>,
}

impl RankedCandidates {
    pub fn is_empty(&self) -> bool {
        self.keyword.is_empty() && self.semantic.is_empty() && self.image.is_empty()
    }
}

/// A fused, query-scoped view of a memory.
#[derive(Debug, Clone, Serialize)]
pub struct FusedResult {
    #[serde(flatten)]
    pub memory: MemoryRecord,
    pub match_types: Vec<MatchSource>,
    pub keyword_score: f64,
    pub semantic_score: f64,
    pub image_score: f64,
    pub hybrid_score: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filename: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
}

impl FusedResult {
    fn seed(record: &MemoryRecord) -> Self {
        Self {
            memory: record.clone(),
            match_types: Vec::new(),
            keyword_score: 0.0,
            semantic_score: 0.0,
            image_score: 0.0,
            hybrid_score: 0.0,
            image_path: None,
            filename: None,
            image_url: None,
        }
    }

    fn absorb(&mut self, candidate: &Candidate, rank: usize, k: f64) {
        self.hybrid_score += 1.0 / (k + rank as f64);
        self.match_types.push(candidate.source);

        let slot = match candidate.source {
            MatchSource::Keyword => &mut self.keyword_score,
            MatchSource::Semantic => &mut self.semantic_score,
            MatchSource::Image => &mut self.image_score,
        };
        *slot = slot.max(candidate.score);

        if let (MatchSource::Image, Some(image)) = (candidate.source, &candidate.image) {
            self.image_path = image.image_path.clone();
            self.filename = image.filename.clone();
        }
    }
}

/// Fuse the three ranked lists and return the top `limit` results.
///
/// Results are ordered by descending `hybrid_score`. Equal scores keep first-encounter
/// order (keyword list, then semantic, then image).
pub fn fuse(lists: &RankedCandidates, k: f64, limit: usize) -> Vec<FusedResult> {
    let mut slots: HashMap<i64, usize> = HashMap::new();
    let mut fused: Vec<FusedResult> = Vec::new();

    for list in [&lists.keyword, &lists.semantic, &lists.image] {
        for (idx, candidate) in list.iter().enumerate() {
            let slot = *slots.entry(candidate.record.id).or_insert_with(|| {
                fused.push(FusedResult::seed(&candidate.record));
                fused.len() - 1
            });
            fused[slot].absorb(candidate, idx + 1, k);
        }
    }

    // stable: ties stay in encounter order
    fused.sort_by(|a, b| {
        b.hybrid_score
            .partial_cmp(&a.hybrid_score)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    fused.truncate(limit);
    fused
}
