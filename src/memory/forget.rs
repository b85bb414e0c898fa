//! Soft delete and restore.
//!
//! Deleting a memory sets `deleted_at`; every read path filters on
//! `deleted_at IS NULL`, so a deleted memory drops out of listing and all three
//! candidate sources at once. Vectors stay in place so a restore is instant.

use anyhow::Result;
use rusqlite::{params, Connection, OptionalExtension};
use serde::Serialize;

use super::store::write_audit_log;

/// Result returned from a delete or restore.
#[derive(Debug, Serialize)]
pub struct ForgetResult {
    pub id: i64,
    /// `true` after a delete, `false` after a restore.
    pub deleted: bool,
}

/// Soft delete a live memory owned by `user_id`.
///
/// Returns `None` if no such live memory exists.
pub fn soft_delete_memory(
    conn: &mut Connection,
    memory_id: i64,
    user_id: i64,
    reason: Option<&str>,
) -> Result<Option<ForgetResult>> {
    let tx = conn.transaction()?;
    let now = super::now_timestamp();

    let changed = tx.execute(
        "UPDATE memories SET deleted_at = ?1, updated_at = ?1 \
         WHERE id = ?2 AND user_id = ?3 AND deleted_at IS NULL",
        params![now, memory_id, user_id],
    )?;
    if changed == 0 {
        return Ok(None);
    }

    let details = serde_json::json!({ "reason": reason });
    write_audit_log(&tx, "delete", memory_id, user_id, Some(&details))?;
    tx.commit()?;

    tracing::info!(memory_id, user_id, "memory deleted");
    Ok(Some(ForgetResult {
        id: memory_id,
        deleted: true,
    }))
}

/// Restore a soft-deleted memory owned by `user_id`.
///
/// Returns `None` if the memory does not exist, belongs to someone else, or is not deleted.
pub fn restore_memory(
    conn: &mut Connection,
    memory_id: i64,
    user_id: i64,
) -> Result<Option<ForgetResult>> {
    let tx = conn.transaction()?;

    let deleted_at: Option<Option<String>> = tx
        .query_row(
            "SELECT deleted_at FROM memories WHERE id = ?1 AND user_id = ?2",
            params![memory_id, user_id],
            |row| row.get(0),
        )
        .optional()?;
    let Some(Some(deleted_at)) = deleted_at else {
        return Ok(None);
    };

    tx.execute(
        "UPDATE memories SET deleted_at = NULL, updated_at = ?1 WHERE id = ?2",
        params![super::now_timestamp(), memory_id],
    )?;
    let details = serde_json::json!({ "deleted_at": deleted_at });
    write_audit_log(&tx, "restore", memory_id, user_id, Some(&details))?;
    tx.commit()?;

    tracing::info!(memory_id, user_id, "memory restored");
    Ok(Some(ForgetResult {
        id: memory_id,
        deleted: false,
    }))
}
