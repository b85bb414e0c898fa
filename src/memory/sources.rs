//! Candidate sources: the three retrieval paths feeding fusion.
//!
//! Each source answers a [`SourceQuery`] for one owner with a list of [`SourceHit`]s in
//! its own order. [`KeywordSource`] matches query terms with `LIKE` over processed text,
//! raw text and entity names, newest first. [`VectorSource`] embeds the query and runs a
//! sqlite-vec KNN over either the text or the image vec0 table, keeping hits above a
//! similarity threshold. [`similar_to_memory`] reuses the text KNN with a stored vector
//! in place of an embedded query.
//!
//! SQLite work runs on the blocking pool; failures come back as [`SourceError`] so the
//! orchestrator can decide to degrade instead of fail.

use std::collections::BTreeSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use rusqlite::types::Value;
use rusqlite::{params, Connection, OptionalExtension};

use crate::embedding::EmbeddingProvider;
use crate::memory::fusion::ImageRef;
use crate::memory::scoring::query_terms;
use crate::memory::store::{fetch_records, query_records, RECORD_COLUMNS};
use crate::memory::types::{MemoryRecord, MemoryType};

/// What a source is asked for.
#[derive(Debug, Clone)]
pub struct SourceQuery {
    pub text: String,
    pub owner: i64,
    pub limit: usize,
    /// Allowed memory types; `None` means all.
    pub types: Option<BTreeSet<MemoryType>>,
    /// Minimum cosine similarity for vector sources. Ignored by keyword search.
    pub min_similarity: f64,
    /// Keyword only: retry with the whole query as one phrase when no term matched.
    pub phrase_fallback: bool,
}

impl SourceQuery {
    pub fn allows(&self, memory_type: MemoryType) -> bool {
        self.types.as_ref().is_none_or(|t| t.contains(&memory_type))
    }
}

/// One memory returned by a source.
#[derive(Debug, Clone)]
pub struct SourceHit {
    pub record: MemoryRecord,
    /// Cosine similarity for vector sources; `None` for keyword hits.
    pub similarity: Option<f64>,
    pub image: Option<ImageRef>,
}

impl SourceHit {
    fn keyword(record: MemoryRecord) -> Self {
        Self {
            record,
            similarity: None,
            image: None,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    #[error("storage error: {0}")]
    Storage(String),
    #[error("embedding error: {0}")]
    Embedding(String),
    #[error("source timed out after {0:?}")]
    Timeout(Duration),
    #[error("source task failed: {0}")]
    Task(String),
}

/// A retrieval path that yields candidates for fusion.
#[async_trait]
pub trait CandidateSource: Send + Sync {
    async fn search(&self, query: &SourceQuery) -> Result<Vec<SourceHit>, SourceError>;
}

/// Run a closure against the shared connection on the blocking pool.
async fn with_conn<T, F>(db: &Arc<Mutex<Connection>>, f: F) -> Result<T, SourceError>
where
    T: Send + 'static,
    F: FnOnce(&Connection) -> anyhow::Result<T> + Send + 'static,
{
    let db = Arc::clone(db);
    tokio::task::spawn_blocking(move || {
        let conn = db
            .lock()
            .map_err(|e| SourceError::Storage(format!("db lock poisoned: {e}")))?;
        f(&conn).map_err(|e| SourceError::Storage(format!("{e:#}")))
    })
    .await
    .map_err(|e| SourceError::Task(e.to_string()))?
}

// ── Keyword ───────────────────────────────────────────────────────────────────

/// Term search over processed text, raw text and entity names.
pub struct KeywordSource {
    db: Arc<Mutex<Connection>>,
}

impl KeywordSource {
    pub fn new(db: Arc<Mutex<Connection>>) -> Self {
        Self { db }
    }
}

#[async_trait]
impl CandidateSource for KeywordSource {
    async fn search(&self, query: &SourceQuery) -> Result<Vec<SourceHit>, SourceError> {
        let terms: Vec<String> = query_terms(&query.text).into_iter().collect();
        if terms.is_empty() || query.limit == 0 {
            return Ok(vec![]);
        }

        let phrase = query.text.trim().to_lowercase();
        let fallback = query.phrase_fallback && terms.len() > 1;
        let owner = query.owner;
        let limit = query.limit;
        let types = query.types.clone();

        let records = with_conn(&self.db, move |conn| {
            let found = keyword_query(conn, owner, &terms, types.as_ref(), limit)?;
            if found.is_empty() && fallback {
                tracing::debug!("keyword terms matched nothing, trying phrase");
                return keyword_query(conn, owner, &[phrase], types.as_ref(), limit);
            }
            Ok(found)
        })
        .await?;

        Ok(records.into_iter().map(SourceHit::keyword).collect())
    }
}

/// Escape `LIKE` wildcards so terms match literally.
fn like_pattern(term: &str) -> String {
    let mut escaped = String::with_capacity(term.len() + 2);
    escaped.push('%');
    for c in term.chars() {
        if matches!(c, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped.push('%');
    escaped
}

fn keyword_query(
    conn: &Connection,
    owner: i64,
    terms: &[String],
    types: Option<&BTreeSet<MemoryType>>,
    limit: usize,
) -> anyhow::Result<Vec<MemoryRecord>> {
    let mut values = vec![Value::Integer(owner)];
    let mut sql = format!(
        "SELECT {RECORD_COLUMNS} FROM memories m WHERE m.user_id = ?1 AND m.deleted_at IS NULL"
    );

    if let Some(types) = types {
        let mut slots = Vec::with_capacity(types.len());
        for t in types {
            values.push(Value::Text(t.as_str().to_string()));
            slots.push(format!("?{}", values.len()));
        }
        sql.push_str(&format!(" AND m.type IN ({})", slots.join(", ")));
    }

    let mut conditions = Vec::with_capacity(terms.len());
    for term in terms {
        values.push(Value::Text(like_pattern(term)));
        let p = values.len();
        conditions.push(format!(
            "(unicode_lower(COALESCE(m.processed_text, '')) LIKE ?{p} ESCAPE '\\' \
             OR unicode_lower(m.raw_text) LIKE ?{p} ESCAPE '\\' \
             OR EXISTS (SELECT 1 FROM entities e WHERE e.memory_id = m.id \
                        AND unicode_lower(e.entity) LIKE ?{p} ESCAPE '\\'))"
        ));
    }
    sql.push_str(&format!(" AND ({})", conditions.join(" OR ")));

    values.push(Value::Integer(limit as i64));
    sql.push_str(&format!(
        " ORDER BY m.timestamp DESC, m.id DESC LIMIT ?{}",
        values.len()
    ));

    query_records(conn, &sql, &values)
}

// ── Vector ────────────────────────────────────────────────────────────────────

/// Which vec0 table a [`VectorSource`] searches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum VectorIndex {
    Text,
    Image,
}

impl VectorIndex {
    fn table(&self) -> &'static str {
        match self {
            Self::Text => "memories_vec",
            Self::Image => "memories_image_vec",
        }
    }
}

/// KNN over one of the vec0 tables, with the query embedded by `embedder`.
pub struct VectorSource {
    db: Arc<Mutex<Connection>>,
    embedder: Arc<dyn EmbeddingProvider>,
    index: VectorIndex,
}

impl VectorSource {
    /// Sentence-embedding search over `memories_vec`.
    pub fn semantic(db: Arc<Mutex<Connection>>, embedder: Arc<dyn EmbeddingProvider>) -> Self {
        Self {
            db,
            embedder,
            index: VectorIndex::Text,
        }
    }

    /// CLIP text-to-image search over `memories_image_vec`.
    pub fn image(db: Arc<Mutex<Connection>>, embedder: Arc<dyn EmbeddingProvider>) -> Self {
        Self {
            db,
            embedder,
            index: VectorIndex::Image,
        }
    }
}

#[async_trait]
impl CandidateSource for VectorSource {
    async fn search(&self, query: &SourceQuery) -> Result<Vec<SourceHit>, SourceError> {
        if query.text.trim().is_empty() || query.limit == 0 {
            return Ok(vec![]);
        }

        let embedding = self
            .embedder
            .embed(&query.text)
            .await
            .map_err(|e| SourceError::Embedding(format!("{e:#}")))?;

        let q = query.clone();
        let index = self.index;
        with_conn(&self.db, move |conn| {
            vector_query(conn, index, &embedding, &q)
        })
        .await
    }
}

fn vector_query(
    conn: &Connection,
    index: VectorIndex,
    embedding: &[f32],
    query: &SourceQuery,
) -> anyhow::Result<Vec<SourceHit>> {
    let embedding_bytes = super::embedding_to_bytes(embedding);

    // vec0 KNN is not owner-aware; ownership and liveness are checked on fetch.
    let mut stmt = conn.prepare(&format!(
        "SELECT rowid, distance FROM {} WHERE embedding MATCH ?1 ORDER BY distance LIMIT ?2",
        index.table()
    ))?;
    let neighbours: Vec<(i64, f64)> = stmt
        .query_map(params![embedding_bytes, query.limit as i64], |row| {
            Ok((row.get(0)?, row.get(1)?))
        })?
        .collect::<Result<_, _>>()?;

    let close: Vec<(i64, f64)> = neighbours
        .into_iter()
        .map(|(id, d)| (id, super::l2_distance_to_cosine(d)))
        .filter(|(_, sim)| *sim >= query.min_similarity)
        .collect();
    if close.is_empty() {
        return Ok(vec![]);
    }

    let ids: Vec<i64> = close.iter().map(|(id, _)| *id).collect();
    let mut records = fetch_records(conn, &ids, query.owner)?;

    let mut hits = Vec::with_capacity(close.len());
    for (id, similarity) in close {
        let Some(record) = records.remove(&id) else {
            continue;
        };
        if !query.allows(record.memory_type) {
            continue;
        }
        let image = match index {
            VectorIndex::Image => Some(ImageRef {
                image_path: record.metadata.image_path.clone(),
                filename: record.metadata.filename.clone(),
            }),
            VectorIndex::Text => None,
        };
        hits.push(SourceHit {
            record,
            similarity: Some(similarity),
            image,
        });
    }

    tracing::debug!(
        table = index.table(),
        hits = hits.len(),
        threshold = query.min_similarity,
        "vector search complete"
    );
    Ok(hits)
}

/// Nearest neighbours of a stored memory's text embedding, excluding the memory itself.
///
/// Returns `None` when `memory_id` is not a live memory of `owner`, and no hits when it
/// was stored without a text vector.
pub fn similar_to_memory(
    conn: &Connection,
    memory_id: i64,
    owner: i64,
    limit: usize,
) -> anyhow::Result<Option<Vec<SourceHit>>> {
    if fetch_records(conn, &[memory_id], owner)?.is_empty() {
        return Ok(None);
    }

    let stored: Option<Vec<u8>> = conn
        .query_row(
            "SELECT embedding FROM memories_vec WHERE rowid = ?1",
            [memory_id],
            |row| row.get(0),
        )
        .optional()?;
    let Some(bytes) = stored else {
        tracing::debug!(memory_id, "memory has no text embedding");
        return Ok(Some(vec![]));
    };
    if limit == 0 {
        return Ok(Some(vec![]));
    }

    let embedding = super::bytes_to_embedding(&bytes);
    let query = SourceQuery {
        text: String::new(),
        owner,
        limit: limit + 1,
        types: None,
        min_similarity: f64::MIN,
        phrase_fallback: false,
    };

    let mut hits = vector_query(conn, VectorIndex::Text, &embedding, &query)?;
    hits.retain(|h| h.record.id != memory_id);
    hits.truncate(limit);
    Ok(Some(hits))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn like_pattern_escapes_wildcards() {
        assert_eq!(like_pattern("50%"), "%50\\%%");
        assert_eq!(like_pattern("a_b"), "%a\\_b%");
        assert_eq!(like_pattern("c:\\x"), "%c:\\\\x%");
        assert_eq!(like_pattern("plain"), "%plain%");
    }

    #[test]
    fn query_allows_all_types_without_filter() {
        let mut q = SourceQuery {
            text: "x".into(),
            owner: 1,
            limit: 10,
            types: None,
            min_similarity: 0.0,
            phrase_fallback: false,
        };
        assert!(MemoryType::ALL.iter().all(|t| q.allows(*t)));

        q.types = Some([MemoryType::Voice].into_iter().collect());
        assert!(q.allows(MemoryType::Voice));
        assert!(!q.allows(MemoryType::Text));
    }
}
