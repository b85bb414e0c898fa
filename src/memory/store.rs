//! Write path and record reads.
//!
//! [`store_memory`] inserts a memory with its entities, sentiments and embedding vectors in
//! one transaction and writes an audit log entry. The read helpers ([`get_memory`],
//! [`list_memories`], [`fetch_records`], [`query_records`]) all decode rows through one
//! place so metadata parsing and annotation loading happen exactly once per row.

use std::collections::HashMap;

use anyhow::{bail, Result};
use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Connection, Transaction};
use serde::Serialize;

use crate::embedding::{IMAGE_EMBEDDING_DIM, TEXT_EMBEDDING_DIM};
use crate::memory::types::{Entity, MemoryMetadata, MemoryRecord, MemoryType, Sentiment};

/// A memory to be written, with annotations produced upstream.
#[derive(Debug, Clone)]
pub struct NewMemory {
    pub user_id: i64,
    pub raw_text: String,
    pub processed_text: Option<String>,
    pub memory_type: MemoryType,
    /// RFC 3339 timestamp; defaults to now.
    pub timestamp: Option<String>,
    pub metadata: MemoryMetadata,
    pub entities: Vec<Entity>,
    pub sentiments: Vec<Sentiment>,
}

impl NewMemory {
    pub fn text(user_id: i64, raw_text: impl Into<String>) -> Self {
        Self {
            user_id,
            raw_text: raw_text.into(),
            processed_text: None,
            memory_type: MemoryType::Text,
            timestamp: None,
            metadata: MemoryMetadata::default(),
            entities: Vec::new(),
            sentiments: Vec::new(),
        }
    }

    /// Text that gets embedded: processed text if present and non-blank, else raw text.
    pub fn embedding_text(&self) -> &str {
        match self.processed_text.as_deref() {
            Some(p) if !p.trim().is_empty() => p,
            _ => &self.raw_text,
        }
    }
}

/// Result returned from a store operation.
#[derive(Debug, Serialize)]
pub struct StoreMemoryResult {
    pub id: i64,
    #[serde(rename = "type")]
    pub memory_type: MemoryType,
    pub timestamp: String,
    /// `false` when the memory was stored without a text vector (keyword search only).
    pub text_embedded: bool,
    pub image_embedded: bool,
}

/// Full write path: memory row → entities → sentiments → vectors → audit log.
pub fn store_memory(
    conn: &mut Connection,
    memory: &NewMemory,
    text_embedding: Option<&[f32]>,
    image_embedding: Option<&[f32]>,
) -> Result<StoreMemoryResult> {
    if memory.raw_text.trim().is_empty() {
        bail!("raw_text must not be empty");
    }
    if let Some(e) = text_embedding {
        anyhow::ensure!(
            e.len() == TEXT_EMBEDDING_DIM,
            "text embedding has {} dimensions, expected {TEXT_EMBEDDING_DIM}",
            e.len()
        );
    }
    if let Some(e) = image_embedding {
        anyhow::ensure!(
            e.len() == IMAGE_EMBEDDING_DIM,
            "image embedding has {} dimensions, expected {IMAGE_EMBEDDING_DIM}",
            e.len()
        );
    }

    let timestamp = match &memory.timestamp {
        Some(ts) => normalize_timestamp(ts)?,
        None => super::now_timestamp(),
    };

    let tx = conn.transaction()?;

    let id = insert_memory(&tx, memory, &timestamp)?;
    insert_entities(&tx, id, &memory.entities)?;
    insert_sentiments(&tx, id, &memory.sentiments)?;

    if let Some(e) = text_embedding {
        insert_vec(&tx, "memories_vec", id, e)?;
    }
    if let Some(e) = image_embedding {
        insert_vec(&tx, "memories_image_vec", id, e)?;
    }

    write_audit_log(
        &tx,
        "create",
        id,
        memory.user_id,
        Some(&serde_json::json!({"type": memory.memory_type.as_str()})),
    )?;

    tx.commit()?;

    Ok(StoreMemoryResult {
        id,
        memory_type: memory.memory_type,
        timestamp,
        text_embedded: text_embedding.is_some(),
        image_embedded: image_embedding.is_some(),
    })
}

/// Parse any RFC 3339 timestamp and re-emit it in the stored UTC form.
pub fn normalize_timestamp(ts: &str) -> Result<String> {
    let parsed = chrono::DateTime::parse_from_rfc3339(ts)
        .map_err(|e| anyhow::anyhow!("invalid timestamp {ts:?}: {e}"))?;
    Ok(parsed
        .with_timezone(&chrono::Utc)
        .to_rfc3339_opts(chrono::SecondsFormat::Micros, true))
}

fn insert_memory(conn: &Transaction, memory: &NewMemory, timestamp: &str) -> Result<i64> {
    let now = super::now_timestamp();
    let metadata_json = if memory.metadata.is_empty() {
        None
    } else {
        Some(serde_json::to_string(&memory.metadata)?)
    };

    conn.execute(
        "INSERT INTO memories (user_id, raw_text, processed_text, type, timestamp, metadata, created_at, updated_at) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?7)",
        params![
            memory.user_id,
            memory.raw_text,
            memory.processed_text,
            memory.memory_type.as_str(),
            timestamp,
            metadata_json,
            now,
        ],
    )?;

    Ok(conn.last_insert_rowid())
}

fn insert_entities(conn: &Transaction, memory_id: i64, entities: &[Entity]) -> Result<()> {
    if entities.is_empty() {
        return Ok(());
    }
    let mut stmt = conn.prepare(
        "INSERT INTO entities (memory_id, entity, entity_type, confidence, start_pos, end_pos) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
    )?;
    for e in entities {
        stmt.execute(params![
            memory_id,
            e.entity,
            e.entity_type,
            e.confidence,
            e.start,
            e.end
        ])?;
    }
    Ok(())
}

fn insert_sentiments(conn: &Transaction, memory_id: i64, sentiments: &[Sentiment]) -> Result<()> {
    let mut stmt = conn.prepare(
        "INSERT INTO sentiments (memory_id, sentiment_score, sentiment_label, confidence) \
         VALUES (?1, ?2, ?3, ?4)",
    )?;
    for s in sentiments {
        stmt.execute(params![memory_id, s.score, s.label, s.confidence])?;
    }
    Ok(())
}

/// Insert an embedding into a vec0 table, keyed by memory id.
fn insert_vec(conn: &Transaction, table: &str, memory_id: i64, embedding: &[f32]) -> Result<()> {
    let embedding_bytes = super::embedding_to_bytes(embedding);
    conn.execute(
        &format!("INSERT INTO {table} (rowid, embedding) VALUES (?1, ?2)"),
        params![memory_id, embedding_bytes],
    )?;
    Ok(())
}

/// Write an entry to the memory_log audit table.
pub(crate) fn write_audit_log(
    conn: &Connection,
    operation: &str,
    memory_id: i64,
    user_id: i64,
    details: Option<&serde_json::Value>,
) -> Result<()> {
    let details_json = details.map(|d| d.to_string());
    conn.execute(
        "INSERT INTO memory_log (operation, memory_id, user_id, details, created_at) \
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![operation, memory_id, user_id, details_json, super::now_timestamp()],
    )?;
    Ok(())
}

// ── Reads ─────────────────────────────────────────────────────────────────────

/// Columns every record query must select, in this order.
pub(crate) const RECORD_COLUMNS: &str =
    "m.id, m.user_id, m.raw_text, m.processed_text, m.type, m.timestamp, m.metadata";

struct RawRow {
    id: i64,
    user_id: i64,
    raw_text: String,
    processed_text: Option<String>,
    memory_type: String,
    timestamp: String,
    metadata: Option<String>,
}

impl RawRow {
    fn decode(self) -> Result<MemoryRecord, String> {
        let memory_type = self.memory_type.parse::<MemoryType>()?;
        Ok(MemoryRecord {
            id: self.id,
            user_id: self.user_id,
            raw_text: self.raw_text,
            processed_text: self.processed_text,
            memory_type,
            timestamp: self.timestamp,
            metadata: MemoryMetadata::decode(self.metadata.as_deref()),
            entities: Vec::new(),
            sentiments: Vec::new(),
        })
    }
}

/// Run a query selecting [`RECORD_COLUMNS`] and decode the rows, in query order.
///
/// Rows that cannot be decoded are skipped with a warning rather than failing the
/// whole read. Entities and sentiments are loaded for the surviving rows.
pub fn query_records(conn: &Connection, sql: &str, values: &[Value]) -> Result<Vec<MemoryRecord>> {
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt.query_map(params_from_iter(values.iter()), |row| {
        Ok(RawRow {
            id: row.get(0)?,
            user_id: row.get(1)?,
            raw_text: row.get(2)?,
            processed_text: row.get(3)?,
            memory_type: row.get(4)?,
            timestamp: row.get(5)?,
            metadata: row.get(6)?,
        })
    })?;

    let mut records = Vec::new();
    for row in rows {
        let decoded = row.map_err(|e| e.to_string()).and_then(RawRow::decode);
        match decoded {
            Ok(record) => records.push(record),
            Err(e) => tracing::warn!(error = %e, "skipping malformed memory row"),
        }
    }

    load_annotations(conn, &mut records)?;
    Ok(records)
}

/// Batch-fetch live records owned by `user_id`, keyed by id.
pub fn fetch_records(
    conn: &Connection,
    ids: &[i64],
    user_id: i64,
) -> Result<HashMap<i64, MemoryRecord>> {
    if ids.is_empty() {
        return Ok(HashMap::new());
    }

    let placeholders: Vec<String> = (2..=ids.len() + 1).map(|i| format!("?{i}")).collect();
    let sql = format!(
        "SELECT {RECORD_COLUMNS} FROM memories m \
         WHERE m.user_id = ?1 AND m.deleted_at IS NULL AND m.id IN ({})",
        placeholders.join(", ")
    );

    let mut values = vec![Value::Integer(user_id)];
    values.extend(ids.iter().map(|id| Value::Integer(*id)));

    let records = query_records(conn, &sql, &values)?;
    Ok(records.into_iter().map(|r| (r.id, r)).collect())
}

/// Fetch a single live memory owned by `user_id`.
pub fn get_memory(conn: &Connection, memory_id: i64, user_id: i64) -> Result<Option<MemoryRecord>> {
    Ok(fetch_records(conn, &[memory_id], user_id)?.remove(&memory_id))
}

/// List live memories for `user_id`, newest first.
pub fn list_memories(
    conn: &Connection,
    user_id: i64,
    limit: usize,
    offset: usize,
    memory_type: Option<MemoryType>,
) -> Result<Vec<MemoryRecord>> {
    let mut sql = format!(
        "SELECT {RECORD_COLUMNS} FROM memories m WHERE m.user_id = ?1 AND m.deleted_at IS NULL"
    );
    let mut values = vec![Value::Integer(user_id)];
    if let Some(t) = memory_type {
        sql.push_str(" AND m.type = ?2");
        values.push(Value::Text(t.as_str().to_string()));
    }
    let next = values.len() + 1;
    sql.push_str(&format!(
        " ORDER BY m.timestamp DESC, m.id DESC LIMIT ?{next} OFFSET ?{}",
        next + 1
    ));
    values.push(Value::Integer(limit as i64));
    values.push(Value::Integer(offset as i64));

    query_records(conn, &sql, &values)
}

/// Attach entities and sentiments to already decoded records.
fn load_annotations(conn: &Connection, records: &mut [MemoryRecord]) -> Result<()> {
    if records.is_empty() {
        return Ok(());
    }

    let index: HashMap<i64, usize> = records
        .iter()
        .enumerate()
        .map(|(i, r)| (r.id, i))
        .collect();
    let placeholders: Vec<String> = (1..=records.len()).map(|i| format!("?{i}")).collect();
    let in_clause = placeholders.join(", ");
    let ids: Vec<Value> = records.iter().map(|r| Value::Integer(r.id)).collect();

    let mut stmt = conn.prepare(&format!(
        "SELECT memory_id, entity, entity_type, confidence, start_pos, end_pos \
         FROM entities WHERE memory_id IN ({in_clause}) ORDER BY id"
    ))?;
    let entities = stmt
        .query_map(params_from_iter(ids.iter()), |row| {
            Ok((
                row.get::<_, i64>(0)?,
                Entity {
                    entity: row.get(1)?,
                    entity_type: row.get(2)?,
                    confidence: row.get(3)?,
                    start: row.get(4)?,
                    end: row.get(5)?,
                },
            ))
        })?
        .collect::<Result<Vec<_>, _>>()?;
    for (memory_id, entity) in entities {
        if let Some(&i) = index.get(&memory_id) {
            records[i].entities.push(entity);
        }
    }

    let mut stmt = conn.prepare(&format!(
        "SELECT memory_id, sentiment_score, sentiment_label, confidence \
         FROM sentiments WHERE memory_id IN ({in_clause}) ORDER BY id"
    ))?;
    let sentiments = stmt
        .query_map(params_from_iter(ids.iter()), |row| {
            Ok((
                row.get::<_, i64>(0)?,
                Sentiment {
                    score: row.get(1)?,
                    label: row.get(2)?,
                    confidence: row.get(3)?,
                },
            ))
        })?
        .collect::<Result<Vec<_>, _>>()?;
    for (memory_id, sentiment) in sentiments {
        if let Some(&i) = index.get(&memory_id) {
            records[i].sentiments.push(sentiment);
        }
    }

    Ok(())
}
