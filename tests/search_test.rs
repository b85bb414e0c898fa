mod helpers;

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::{Duration, Instant};

use helpers::{
    image_hit, keyword_hit, record, vector_hit, FailingSource, SlowSource, StaticSource,
};
use memoir::config::MemoirConfig;
use memoir::memory::fusion::MatchSource;
use memoir::memory::search::{
    HybridSearcher, SearchError, SearchMode, SearchProfile, SearchRequest,
};
use memoir::memory::sources::CandidateSource;
use memoir::memory::types::MemoryType;

fn searcher(
    keyword: Arc<dyn CandidateSource>,
    semantic: Arc<dyn CandidateSource>,
    image: Arc<dyn CandidateSource>,
) -> HybridSearcher {
    HybridSearcher::new(keyword, semantic, image, &MemoirConfig::default())
}

fn request(query: &str, limit: usize) -> SearchRequest {
    SearchRequest {
        query: query.to_string(),
        owner: 1,
        limit,
        mode: SearchMode::Hybrid,
        types: None,
    }
}

fn profile() -> SearchProfile {
    SearchProfile::search(&MemoirConfig::default().retrieval)
}

#[tokio::test]
async fn type_filter_applies_before_fusion() {
    // keyword returns [X(image), Y(text)]; filtering to text must leave Y at rank 1
    let keyword = StaticSource::new(vec![
        keyword_hit(record(1, MemoryType::Image, "beach beach beach")),
        keyword_hit(record(2, MemoryType::Text, "beach")),
    ]);
    let s = searcher(keyword, StaticSource::empty(), StaticSource::empty());

    let mut req = request("beach", 1);
    req.types = Some(BTreeSet::from([MemoryType::Text]));
    let outcome = s.search(&req, &profile()).await.unwrap();

    assert_eq!(outcome.results.len(), 1);
    assert_eq!(outcome.results[0].memory.id, 2);
    assert!((outcome.results[0].hybrid_score - 1.0 / 61.0).abs() < 1e-12);
    assert_eq!(outcome.breakdown.keyword_matches, 1);
}

#[tokio::test]
async fn failing_source_degrades_to_remaining_sources() {
    let semantic = StaticSource::new(vec![vector_hit(record(5, MemoryType::Text, "tea"), 0.8)]);
    let s = searcher(Arc::new(FailingSource), semantic, Arc::new(FailingSource));

    let outcome = s.search(&request("tea", 10), &profile()).await.unwrap();
    assert_eq!(outcome.results.len(), 1);
    assert_eq!(outcome.results[0].memory.id, 5);
    assert_eq!(outcome.results[0].match_types, vec![MatchSource::Semantic]);
    assert_eq!(outcome.breakdown.keyword_matches, 0);
    assert_eq!(outcome.breakdown.semantic_matches, 1);
}

#[tokio::test]
async fn all_sources_failing_is_empty_not_error() {
    let s = searcher(
        Arc::new(FailingSource),
        Arc::new(FailingSource),
        Arc::new(FailingSource),
    );
    let outcome = s.search(&request("anything", 10), &profile()).await.unwrap();
    assert!(outcome.results.is_empty());
}

#[tokio::test]
async fn slow_source_times_out() {
    let mut config = MemoirConfig::default();
    config.retrieval.source_timeout_ms = 50;
    let keyword = StaticSource::new(vec![keyword_hit(record(1, MemoryType::Text, "late train"))]);
    let s = HybridSearcher::new(
        keyword,
        Arc::new(SlowSource(Duration::from_secs(30))),
        StaticSource::empty(),
        &config,
    );

    let started = Instant::now();
    let outcome = s.search(&request("train", 10), &profile()).await.unwrap();
    assert!(started.elapsed() < Duration::from_secs(10));
    assert_eq!(outcome.results.len(), 1);
    assert_eq!(outcome.breakdown.semantic_matches, 0);
}

#[tokio::test]
async fn mode_selects_which_sources_run() {
    let keyword = StaticSource::new(vec![keyword_hit(record(1, MemoryType::Text, "a"))]);
    let semantic = StaticSource::new(vec![vector_hit(record(2, MemoryType::Text, "b"), 0.9)]);
    let image = StaticSource::empty();
    let s = searcher(keyword.clone(), semantic.clone(), image.clone());

    let mut req = request("a", 10);
    req.mode = SearchMode::Semantic;
    let outcome = s.search(&req, &profile()).await.unwrap();

    assert_eq!(keyword.call_count(), 0);
    assert_eq!(semantic.call_count(), 1);
    assert_eq!(image.call_count(), 0);
    assert_eq!(outcome.results.len(), 1);
    assert_eq!(outcome.results[0].memory.id, 2);
}

#[tokio::test]
async fn invalid_limit_rejected_before_retrieval() {
    let keyword = StaticSource::empty();
    let s = searcher(keyword.clone(), StaticSource::empty(), StaticSource::empty());

    let err = s.search(&request("x", 0), &profile()).await.unwrap_err();
    assert!(matches!(err, SearchError::InvalidLimit { limit: 0, max: 500 }));
    let err = s.search(&request("x", 501), &profile()).await.unwrap_err();
    assert!(matches!(err, SearchError::InvalidLimit { .. }));
    assert_eq!(keyword.call_count(), 0);
}

#[tokio::test]
async fn keyword_hits_are_reranked_by_score() {
    // source order is recency; the scorer should lift the better match
    let keyword = StaticSource::new(vec![
        keyword_hit(record(1, MemoryType::Text, "went for a walk, saw some rustic barns")),
        keyword_hit(record(2, MemoryType::Text, "rust meetup: rust async talk")),
    ]);
    let s = searcher(keyword, StaticSource::empty(), StaticSource::empty());

    let outcome = s.search(&request("rust", 10), &profile()).await.unwrap();
    assert_eq!(outcome.results[0].memory.id, 2);
    assert!(outcome.results[0].keyword_score > outcome.results[1].keyword_score);
}

#[tokio::test]
async fn vector_hits_are_sorted_by_similarity() {
    let semantic = StaticSource::new(vec![
        vector_hit(record(1, MemoryType::Text, "a"), 0.55),
        vector_hit(record(2, MemoryType::Text, "b"), 0.95),
    ]);
    let s = searcher(StaticSource::empty(), semantic, StaticSource::empty());

    let outcome = s.search(&request("q", 10), &profile()).await.unwrap();
    assert_eq!(outcome.results[0].memory.id, 2);
    assert!((outcome.results[0].semantic_score - 0.95).abs() < 1e-12);
}

#[tokio::test]
async fn image_results_get_urls() {
    let image = StaticSource::new(vec![image_hit(
        record(9, MemoryType::Image, "sunset over the pier"),
        0.41,
        "pier.jpg",
    )]);
    let keyword = StaticSource::new(vec![keyword_hit(record(3, MemoryType::Text, "pier fishing"))]);
    let s = searcher(keyword, StaticSource::empty(), image);

    let outcome = s.search(&request("pier", 10), &profile()).await.unwrap();
    let img = outcome.results.iter().find(|r| r.memory.id == 9).unwrap();
    assert_eq!(img.image_url.as_deref(), Some("/api/v1/images/pier.jpg"));
    assert_eq!(img.filename.as_deref(), Some("pier.jpg"));
    assert_eq!(img.image_path.as_deref(), Some("/data/images/pier.jpg"));

    let text = outcome.results.iter().find(|r| r.memory.id == 3).unwrap();
    assert!(text.image_url.is_none());
}

#[tokio::test]
async fn profiles_size_candidate_pools() {
    let keyword = StaticSource::empty();
    let semantic = StaticSource::empty();
    let image = StaticSource::empty();
    let s = searcher(keyword.clone(), semantic.clone(), image.clone());
    let config = MemoirConfig::default();

    s.search(&request("q", 10), &SearchProfile::search(&config.retrieval))
        .await
        .unwrap();
    s.search(&request("q", 10), &SearchProfile::ask(&config.ask))
        .await
        .unwrap();

    let kw = keyword.calls.lock().unwrap();
    let sem = semantic.calls.lock().unwrap();
    let img = image.calls.lock().unwrap();

    assert_eq!(kw[0].limit, 10);
    assert!(!kw[0].phrase_fallback);
    assert_eq!(sem[0].limit, 20);
    assert!((sem[0].min_similarity - 0.5).abs() < 1e-12);
    assert_eq!(img[0].limit, 20);
    assert!((img[0].min_similarity - 0.35).abs() < 1e-12);

    assert!(kw[1].phrase_fallback);
    assert_eq!(sem[1].limit, 30);
    assert!((sem[1].min_similarity - 0.10).abs() < 1e-12);
    assert_eq!(img[1].limit, 20);
}
