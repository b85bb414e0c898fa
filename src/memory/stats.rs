use anyhow::Result;
use rusqlite::{params, Connection};
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::Path;

use crate::memory::types::MemoryType;

/// Per-owner memory store statistics.
#[derive(Debug, Serialize)]
pub struct StatsResponse {
    pub user_id: i64,
    pub total_memories: u64,
    pub active_memories: u64,
    pub deleted_memories: u64,
    /// Live memories per type; every type is present.
    pub by_type: BTreeMap<String, u64>,
    pub entity_count: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mean_sentiment: Option<f64>,
    pub db_size_bytes: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub oldest_memory: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub newest_memory: Option<String>,
}

/// Compute statistics for one owner.
///
/// `db_path` is used for file size calculation; pass None for in-memory databases.
pub fn memory_stats(conn: &Connection, user_id: i64, db_path: Option<&Path>) -> Result<StatsResponse> {
    let (total, active) = count_memories(conn, user_id)?;
    let by_type = count_by_type(conn, user_id)?;
    let (entity_count, mean_sentiment) = annotation_summary(conn, user_id)?;
    let (oldest, newest) = memory_time_range(conn, user_id)?;

    let db_size_bytes = db_path
        .and_then(|p| std::fs::metadata(p).ok())
        .map(|m| m.len())
        .unwrap_or(0);

    Ok(StatsResponse {
        user_id,
        total_memories: total,
        active_memories: active,
        deleted_memories: total - active,
        by_type,
        entity_count,
        mean_sentiment,
        db_size_bytes,
        oldest_memory: oldest,
        newest_memory: newest,
    })
}

/// Total and live counts.
fn count_memories(conn: &Connection, user_id: i64) -> Result<(u64, u64)> {
    let (total, active): (i64, i64) = conn.query_row(
        "SELECT COUNT(*), COALESCE(SUM(deleted_at IS NULL), 0) FROM memories WHERE user_id = ?1",
        params![user_id],
        |row| Ok((row.get(0)?, row.get(1)?)),
    )?;
    Ok((total as u64, active as u64))
}

fn count_by_type(conn: &Connection, user_id: i64) -> Result<BTreeMap<String, u64>> {
    let mut map: BTreeMap<String, u64> = MemoryType::ALL
        .iter()
        .map(|t| (t.as_str().to_string(), 0))
        .collect();

    let mut stmt = conn.prepare(
        "SELECT type, COUNT(*) FROM memories \
         WHERE user_id = ?1 AND deleted_at IS NULL GROUP BY type",
    )?;
    let rows: Vec<(String, i64)> = stmt
        .query_map(params![user_id], |row| Ok((row.get(0)?, row.get(1)?)))?
        .collect::<Result<Vec<_>, _>>()?;

    for (t, count) in rows {
        map.insert(t, count as u64);
    }
    Ok(map)
}

/// Entity count and mean sentiment score over live memories.
fn annotation_summary(conn: &Connection, user_id: i64) -> Result<(u64, Option<f64>)> {
    let entities: i64 = conn.query_row(
        "SELECT COUNT(*) FROM entities e JOIN memories m ON m.id = e.memory_id \
         WHERE m.user_id = ?1 AND m.deleted_at IS NULL",
        params![user_id],
        |row| row.get(0),
    )?;
    let mean: Option<f64> = conn.query_row(
        "SELECT AVG(s.sentiment_score) FROM sentiments s JOIN memories m ON m.id = s.memory_id \
         WHERE m.user_id = ?1 AND m.deleted_at IS NULL",
        params![user_id],
        |row| row.get(0),
    )?;
    Ok((entities as u64, mean))
}

/// Oldest and newest live memory timestamps.
fn memory_time_range(conn: &Connection, user_id: i64) -> Result<(Option<String>, Option<String>)> {
    let range = conn.query_row(
        "SELECT MIN(timestamp), MAX(timestamp) FROM memories \
         WHERE user_id = ?1 AND deleted_at IS NULL",
        params![user_id],
        |row| Ok((row.get(0)?, row.get(1)?)),
    )?;
    Ok(range)
}
