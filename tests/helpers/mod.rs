#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use memoir::config::MemoirConfig;
use memoir::context::AppContext;
use memoir::db;
use memoir::embedding::{EmbeddingProvider, IMAGE_EMBEDDING_DIM, TEXT_EMBEDDING_DIM};
use memoir::memory::fusion::ImageRef;
use memoir::memory::sources::{CandidateSource, SourceError, SourceHit, SourceQuery};
use memoir::memory::store::{store_memory, NewMemory};
use memoir::memory::types::{MemoryMetadata, MemoryRecord, MemoryType};
use memoir::narrative::{NarrativeError, Narrator};
use rusqlite::Connection;

/// Open a fresh in-memory database with schema and migrations applied.
pub fn test_db() -> Connection {
    db::open_memory_database().unwrap()
}

/// Deterministic unit vector of `dims` entries with a spike at `seed`.
pub fn spike(dims: usize, seed: usize) -> Vec<f32> {
    let mut v = vec![0.0f32; dims];
    v[seed % dims] = 1.0;
    v
}

pub fn text_embedding(seed: usize) -> Vec<f32> {
    spike(TEXT_EMBEDDING_DIM, seed)
}

pub fn image_embedding(seed: usize) -> Vec<f32> {
    spike(IMAGE_EMBEDDING_DIM, seed)
}

/// Unit vector mixing spikes `a` and `b`; cosine to either spike is `1/sqrt(2)`.
pub fn blend(dims: usize, a: usize, b: usize) -> Vec<f32> {
    let mut v = vec![0.0f32; dims];
    let w = std::f32::consts::FRAC_1_SQRT_2;
    v[a % dims] = w;
    v[b % dims] = w;
    v
}

/// Insert a memory directly via the store module. Returns the memory ID.
pub fn insert_memory(
    conn: &mut Connection,
    user_id: i64,
    raw_text: &str,
    memory_type: MemoryType,
    text_emb: Option<&[f32]>,
    image_emb: Option<&[f32]>,
) -> i64 {
    let mut memory = NewMemory::text(user_id, raw_text);
    memory.memory_type = memory_type;
    store_memory(conn, &memory, text_emb, image_emb).unwrap().id
}

/// Insert an image memory with a stored filename.
pub fn insert_image(conn: &mut Connection, user_id: i64, caption: &str, filename: &str, emb: &[f32]) -> i64 {
    let mut memory = NewMemory::text(user_id, caption);
    memory.memory_type = MemoryType::Image;
    memory.metadata.filename = Some(filename.to_string());
    memory.metadata.image_path = Some(format!("/data/images/{filename}"));
    store_memory(conn, &memory, None, Some(emb)).unwrap().id
}

/// In-memory record for fusion and orchestrator tests.
pub fn record(id: i64, memory_type: MemoryType, text: &str) -> MemoryRecord {
    MemoryRecord {
        id,
        user_id: 1,
        raw_text: text.to_string(),
        processed_text: None,
        memory_type,
        timestamp: "2026-01-01T00:00:00.000000Z".into(),
        metadata: MemoryMetadata::default(),
        entities: vec![],
        sentiments: vec![],
    }
}

pub fn keyword_hit(record: MemoryRecord) -> SourceHit {
    SourceHit {
        record,
        similarity: None,
        image: None,
    }
}

pub fn vector_hit(record: MemoryRecord, similarity: f64) -> SourceHit {
    SourceHit {
        record,
        similarity: Some(similarity),
        image: None,
    }
}

pub fn image_hit(mut record: MemoryRecord, similarity: f64, filename: &str) -> SourceHit {
    record.metadata.filename = Some(filename.to_string());
    SourceHit {
        record,
        similarity: Some(similarity),
        image: Some(ImageRef {
            image_path: Some(format!("/data/images/{filename}")),
            filename: Some(filename.to_string()),
        }),
    }
}

/// Source that returns a fixed list and records how often it was called.
pub struct StaticSource {
    hits: Vec<SourceHit>,
    pub calls: Mutex<Vec<SourceQuery>>,
}

impl StaticSource {
    pub fn new(hits: Vec<SourceHit>) -> Arc<Self> {
        Arc::new(Self {
            hits,
            calls: Mutex::new(Vec::new()),
        })
    }

    pub fn empty() -> Arc<Self> {
        Self::new(vec![])
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

#[async_trait]
impl CandidateSource for StaticSource {
    async fn search(&self, query: &SourceQuery) -> Result<Vec<SourceHit>, SourceError> {
        self.calls.lock().unwrap().push(query.clone());
        Ok(self.hits.clone())
    }
}

/// Source that always errors.
pub struct FailingSource;

#[async_trait]
impl CandidateSource for FailingSource {
    async fn search(&self, _query: &SourceQuery) -> Result<Vec<SourceHit>, SourceError> {
        Err(SourceError::Storage("disk on fire".into()))
    }
}

/// Source that sleeps past any reasonable timeout.
pub struct SlowSource(pub Duration);

#[async_trait]
impl CandidateSource for SlowSource {
    async fn search(&self, _query: &SourceQuery) -> Result<Vec<SourceHit>, SourceError> {
        tokio::time::sleep(self.0).await;
        Ok(vec![])
    }
}

/// Embedder with canned vectors per input text; unknown texts get `fallback`.
pub struct FakeEmbedder {
    dims: usize,
    vectors: HashMap<String, Vec<f32>>,
    fallback: Option<Vec<f32>>,
}

impl FakeEmbedder {
    pub fn new(dims: usize) -> Self {
        Self {
            dims,
            vectors: HashMap::new(),
            fallback: None,
        }
    }

    pub fn with(mut self, text: &str, vector: Vec<f32>) -> Self {
        self.vectors.insert(text.to_string(), vector);
        self
    }

    pub fn with_fallback(mut self, vector: Vec<f32>) -> Self {
        self.fallback = Some(vector);
        self
    }
}

#[async_trait]
impl EmbeddingProvider for FakeEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let vector = self
            .vectors
            .get(text)
            .or(self.fallback.as_ref())
            .cloned()
            .ok_or_else(|| anyhow::anyhow!("embedding service unavailable"))?;
        anyhow::ensure!(vector.len() == self.dims, "unexpected embedding size: {}", vector.len());
        Ok(vector)
    }

    fn model(&self) -> &str {
        "fake"
    }
}

/// Narrator that records prompts and returns a canned answer.
pub struct FakeNarrator {
    answer: Result<String, String>,
    pub prompts: Mutex<Vec<(String, String)>>,
}

impl FakeNarrator {
    pub fn answering(answer: &str) -> Arc<Self> {
        Arc::new(Self {
            answer: Ok(answer.to_string()),
            prompts: Mutex::new(Vec::new()),
        })
    }

    pub fn failing(status: &str) -> Arc<Self> {
        Arc::new(Self {
            answer: Err(status.to_string()),
            prompts: Mutex::new(Vec::new()),
        })
    }
}

#[async_trait]
impl Narrator for FakeNarrator {
    async fn answer(&self, system_prompt: &str, user_prompt: &str) -> Result<String, NarrativeError> {
        self.prompts
            .lock()
            .unwrap()
            .push((system_prompt.to_string(), user_prompt.to_string()));
        self.answer.clone().map_err(|message| NarrativeError::Status {
            status: 503,
            message,
        })
    }
}

/// App context over an in-memory database with fake embedders and narrator.
pub fn test_context(
    conn: Connection,
    text: FakeEmbedder,
    image: FakeEmbedder,
    narrator: Arc<FakeNarrator>,
) -> AppContext {
    AppContext::assemble(
        conn,
        Arc::new(text),
        Arc::new(image),
        narrator,
        MemoirConfig::default(),
        None,
    )
}
