//! Query orchestration: validate, retrieve, filter, rank, fuse, annotate.
//!
//! [`HybridSearcher`] holds the three [`CandidateSource`]s and runs the ones a
//! [`SearchMode`] selects concurrently, each under its own timeout. A failed or timed-out
//! source is logged and contributes nothing. The type filter is applied to every list
//! before ranking so excluded memories never take a rank slot, then keyword hits are
//! ordered by [`keyword_score`] and vector hits by similarity before [`fuse`] runs.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;

use crate::config::{AskConfig, MemoirConfig, RetrievalConfig};
use crate::memory::fusion::{fuse, Candidate, FusedResult, MatchSource, RankedCandidates};
use crate::memory::scoring::{keyword_score, query_terms};
use crate::memory::sources::{CandidateSource, SourceError, SourceHit, SourceQuery};
use crate::memory::types::{MemoryRecord, MemoryType};

/// Which candidate sources a query consults.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchMode {
    #[default]
    Hybrid,
    Keyword,
    Semantic,
    Image,
}

impl SearchMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Hybrid => "hybrid",
            Self::Keyword => "keyword",
            Self::Semantic => "semantic",
            Self::Image => "image",
        }
    }

    pub fn uses(&self, source: MatchSource) -> bool {
        match self {
            Self::Hybrid => true,
            Self::Keyword => source == MatchSource::Keyword,
            Self::Semantic => source == MatchSource::Semantic,
            Self::Image => source == MatchSource::Image,
        }
    }
}

impl std::fmt::Display for SearchMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for SearchMode {
    type Err = SearchError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "hybrid" => Ok(Self::Hybrid),
            "keyword" => Ok(Self::Keyword),
            "semantic" => Ok(Self::Semantic),
            "image" => Ok(Self::Image),
            _ => Err(SearchError::InvalidSearchType(s.to_string())),
        }
    }
}

/// Client input errors, raised before any retrieval runs.
#[derive(Debug, thiserror::Error)]
pub enum SearchError {
    #[error("Invalid memory_type: {0:?}")]
    InvalidMemoryType(String),
    #[error("Invalid memory_types: {0:?}")]
    InvalidMemoryTypes(String),
    #[error("Invalid search_type: {0:?} (expected hybrid, keyword, semantic or image)")]
    InvalidSearchType(String),
    #[error("limit must be between 1 and {max}, got {limit}")]
    InvalidLimit { limit: usize, max: usize },
    #[error("question is required")]
    EmptyQuestion,
}

fn parse_one_type(raw: &str) -> Option<MemoryType> {
    raw.trim().to_lowercase().parse().ok()
}

/// Parse a list of type names. Blank entries are dropped; an empty result is invalid.
pub fn parse_type_list<'a, I>(raw: I) -> Result<BTreeSet<MemoryType>, SearchError>
where
    I: IntoIterator<Item = &'a str>,
{
    let names: Vec<&str> = raw.into_iter().filter(|t| !t.trim().is_empty()).collect();
    let joined = names.join(",");
    if names.is_empty() {
        return Err(SearchError::InvalidMemoryTypes(joined));
    }
    names
        .into_iter()
        .map(|t| parse_one_type(t).ok_or_else(|| SearchError::InvalidMemoryTypes(joined.clone())))
        .collect()
}

/// Resolve the optional type filter. A single `memory_type` wins over the
/// comma-separated `memory_types`; neither means no filter.
pub fn parse_type_filter(
    memory_type: Option<&str>,
    memory_types: Option<&str>,
) -> Result<Option<BTreeSet<MemoryType>>, SearchError> {
    if let Some(raw) = memory_type {
        let t = parse_one_type(raw).ok_or_else(|| SearchError::InvalidMemoryType(raw.to_string()))?;
        return Ok(Some(BTreeSet::from([t])));
    }
    match memory_types {
        Some(raw) => parse_type_list(raw.split(',')).map(Some),
        None => Ok(None),
    }
}

/// Retrieval knobs for one endpoint.
#[derive(Debug, Clone)]
pub struct SearchProfile {
    pub max_limit: usize,
    pub semantic_threshold: f64,
    pub image_threshold: f64,
    pub semantic_candidate_factor: usize,
    pub image_candidate_factor: usize,
    pub phrase_fallback: bool,
}

impl SearchProfile {
    /// Profile for `search_memories`.
    pub fn search(config: &RetrievalConfig) -> Self {
        Self {
            max_limit: config.max_limit,
            semantic_threshold: config.semantic_threshold,
            image_threshold: config.image_threshold,
            semantic_candidate_factor: config.semantic_candidate_factor,
            image_candidate_factor: config.image_candidate_factor,
            phrase_fallback: false,
        }
    }

    /// Profile for `ask`: wider recall, lower thresholds.
    pub fn ask(config: &AskConfig) -> Self {
        Self {
            max_limit: config.max_limit,
            semantic_threshold: config.semantic_threshold,
            image_threshold: config.image_threshold,
            semantic_candidate_factor: config.semantic_candidate_factor,
            image_candidate_factor: config.image_candidate_factor,
            phrase_fallback: true,
        }
    }

    pub fn check_limit(&self, limit: usize) -> Result<usize, SearchError> {
        if (1..=self.max_limit).contains(&limit) {
            Ok(limit)
        } else {
            Err(SearchError::InvalidLimit {
                limit,
                max: self.max_limit,
            })
        }
    }
}

/// A validated query.
#[derive(Debug, Clone)]
pub struct SearchRequest {
    pub query: String,
    pub owner: i64,
    pub limit: usize,
    pub mode: SearchMode,
    pub types: Option<BTreeSet<MemoryType>>,
}

/// Per-source candidate counts after the type filter, before fusion.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Breakdown {
    pub keyword_matches: usize,
    pub semantic_matches: usize,
    pub image_matches: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct SearchOutcome {
    pub results: Vec<FusedResult>,
    pub breakdown: Breakdown,
}

/// Runs queries against the three candidate sources and fuses the results.
pub struct HybridSearcher {
    keyword: Arc<dyn CandidateSource>,
    semantic: Arc<dyn CandidateSource>,
    image: Arc<dyn CandidateSource>,
    rrf_k: f64,
    source_timeout: Duration,
    image_url_prefix: String,
}

impl HybridSearcher {
    pub fn new(
        keyword: Arc<dyn CandidateSource>,
        semantic: Arc<dyn CandidateSource>,
        image: Arc<dyn CandidateSource>,
        config: &MemoirConfig,
    ) -> Self {
        Self {
            keyword,
            semantic,
            image,
            rrf_k: config.retrieval.rrf_k as f64,
            source_timeout: Duration::from_millis(config.retrieval.source_timeout_ms),
            image_url_prefix: config.storage.image_url_prefix.trim_end_matches('/').to_string(),
        }
    }

    pub async fn search(
        &self,
        request: &SearchRequest,
        profile: &SearchProfile,
    ) -> Result<SearchOutcome, SearchError> {
        let limit = profile.check_limit(request.limit)?;

        let base = SourceQuery {
            text: request.query.clone(),
            owner: request.owner,
            limit,
            types: request.types.clone(),
            min_similarity: 0.0,
            phrase_fallback: profile.phrase_fallback,
        };
        let semantic_query = SourceQuery {
            limit: limit.saturating_mul(profile.semantic_candidate_factor.max(1)),
            min_similarity: profile.semantic_threshold,
            ..base.clone()
        };
        let image_query = SourceQuery {
            limit: limit.saturating_mul(profile.image_candidate_factor.max(1)),
            min_similarity: profile.image_threshold,
            ..base.clone()
        };

        let (keyword, semantic, image) = tokio::join!(
            self.collect(MatchSource::Keyword, &self.keyword, &base, request.mode),
            self.collect(MatchSource::Semantic, &self.semantic, &semantic_query, request.mode),
            self.collect(MatchSource::Image, &self.image, &image_query, request.mode),
        );

        let keyword = filter_types(keyword, request.types.as_ref());
        let semantic = filter_types(semantic, request.types.as_ref());
        let image = filter_types(image, request.types.as_ref());

        let breakdown = Breakdown {
            keyword_matches: keyword.len(),
            semantic_matches: semantic.len(),
            image_matches: image.len(),
        };

        let lists = RankedCandidates {
            keyword: rank_keyword(keyword, &request.query),
            semantic: rank_by_similarity(semantic, MatchSource::Semantic),
            image: rank_by_similarity(image, MatchSource::Image),
        };

        let mut results = fuse(&lists, self.rrf_k, limit);
        for result in &mut results {
            result.image_url = self.image_url_for(&result.memory);
        }

        tracing::info!(
            mode = %request.mode,
            keyword = breakdown.keyword_matches,
            semantic = breakdown.semantic_matches,
            image = breakdown.image_matches,
            returned = results.len(),
            "search complete"
        );

        Ok(SearchOutcome { results, breakdown })
    }

    /// Query one source if the mode selects it. Errors and timeouts degrade to no hits.
    async fn collect(
        &self,
        kind: MatchSource,
        source: &Arc<dyn CandidateSource>,
        query: &SourceQuery,
        mode: SearchMode,
    ) -> Vec<SourceHit> {
        if !mode.uses(kind) {
            return vec![];
        }

        let outcome = match tokio::time::timeout(self.source_timeout, source.search(query)).await {
            Ok(result) => result,
            Err(_) => Err(SourceError::Timeout(self.source_timeout)),
        };

        match outcome {
            Ok(hits) => hits,
            Err(e) => {
                tracing::warn!(source = %kind, error = %e, "candidate source failed, continuing without it");
                vec![]
            }
        }
    }

    /// Relative URL for image memories that carry a stored filename.
    pub fn image_url_for(&self, memory: &MemoryRecord) -> Option<String> {
        if memory.memory_type != MemoryType::Image {
            return None;
        }
        memory
            .metadata
            .filename
            .as_deref()
            .filter(|f| !f.is_empty())
            .map(|f| format!("{}/{f}", self.image_url_prefix))
    }
}

fn filter_types(hits: Vec<SourceHit>, types: Option<&BTreeSet<MemoryType>>) -> Vec<SourceHit> {
    match types {
        Some(types) => hits
            .into_iter()
            .filter(|h| types.contains(&h.record.memory_type))
            .collect(),
        None => hits,
    }
}

/// Score keyword hits against the query terms and order them best first.
fn rank_keyword(hits: Vec<SourceHit>, query: &str) -> Vec<Candidate> {
    let terms = query_terms(query);
    let mut ranked: Vec<Candidate> = hits
        .into_iter()
        .map(|hit| {
            let score = keyword_score(&hit.record.search_blob(), &terms);
            Candidate {
                record: hit.record,
                source: MatchSource::Keyword,
                score,
                image: None,
            }
        })
        .collect();
    sort_desc(&mut ranked);
    ranked
}

fn rank_by_similarity(hits: Vec<SourceHit>, source: MatchSource) -> Vec<Candidate> {
    let mut ranked: Vec<Candidate> = hits
        .into_iter()
        .map(|hit| Candidate {
            record: hit.record,
            source,
            score: hit.similarity.unwrap_or(0.0),
            image: hit.image,
        })
        .collect();
    sort_desc(&mut ranked);
    ranked
}

/// Stable descending sort on the source-local score.
fn sort_desc(candidates: &mut [Candidate]) {
    candidates.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
}
