//! SQL DDL for all memoir tables.
//!
//! Defines `memories`, `entities`, `sentiments`, `memory_log`, `schema_meta`,
//! and the two vec0 tables: `memories_vec` (text embeddings) and
//! `memories_image_vec` (CLIP image embeddings). Both vec0 tables key rows by
//! the memory id via `rowid`. All DDL uses `IF NOT EXISTS`.

use rusqlite::Connection;

use crate::embedding::{IMAGE_EMBEDDING_DIM, TEXT_EMBEDDING_DIM};

const SCHEMA_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS memories (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    user_id INTEGER NOT NULL,
    raw_text TEXT NOT NULL,
    processed_text TEXT,
    type TEXT NOT NULL CHECK(type IN ('text','voice','image')),
    timestamp TEXT NOT NULL,
    metadata TEXT,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    deleted_at TEXT
);

CREATE INDEX IF NOT EXISTS idx_memories_user_id ON memories(user_id);
CREATE INDEX IF NOT EXISTS idx_memories_type ON memories(type);
CREATE INDEX IF NOT EXISTS idx_memories_timestamp ON memories(timestamp);

CREATE TABLE IF NOT EXISTS entities (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    memory_id INTEGER NOT NULL REFERENCES memories(id) ON DELETE CASCADE,
    entity TEXT NOT NULL,
    entity_type TEXT NOT NULL,
    confidence REAL NOT NULL DEFAULT 0.0,
    start_pos INTEGER,
    end_pos INTEGER
);

CREATE INDEX IF NOT EXISTS idx_entities_memory_id ON entities(memory_id);
CREATE INDEX IF NOT EXISTS idx_entities_type ON entities(entity_type);

CREATE TABLE IF NOT EXISTS sentiments (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    memory_id INTEGER NOT NULL REFERENCES memories(id) ON DELETE CASCADE,
    sentiment_score REAL NOT NULL,
    sentiment_label TEXT NOT NULL,
    confidence REAL NOT NULL DEFAULT 0.0
);

CREATE INDEX IF NOT EXISTS idx_sentiments_memory_id ON sentiments(memory_id);

-- Audit log
CREATE TABLE IF NOT EXISTS memory_log (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    operation TEXT NOT NULL CHECK(operation IN ('create','delete','restore')),
    memory_id INTEGER NOT NULL,
    user_id INTEGER NOT NULL,
    details TEXT,
    created_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS schema_meta (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL
);
"#;

/// vec0 virtual tables must be created separately (sqlite-vec syntax).
fn vec_tables_sql() -> String {
    format!(
        "CREATE VIRTUAL TABLE IF NOT EXISTS memories_vec USING vec0(\n\
         \x20   embedding FLOAT[{TEXT_EMBEDDING_DIM}]\n\
         );\n\
         CREATE VIRTUAL TABLE IF NOT EXISTS memories_image_vec USING vec0(\n\
         \x20   embedding FLOAT[{IMAGE_EMBEDDING_DIM}]\n\
         );\n"
    )
}

/// Initialize all schema tables. Idempotent (uses IF NOT EXISTS).
pub fn init_schema(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(SCHEMA_SQL)?;
    conn.execute_batch(&vec_tables_sql())?;

    conn.execute(
        "INSERT OR IGNORE INTO schema_meta (key, value) VALUES ('schema_version', '1')",
        [],
    )?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn schema_creates_all_tables() {
        crate::db::load_sqlite_vec();
        let conn = Connection::open_in_memory().unwrap();
        init_schema(&conn).unwrap();

        let tables: Vec<String> = conn
            .prepare("SELECT name FROM sqlite_master WHERE type='table' ORDER BY name")
            .unwrap()
            .query_map([], |row| row.get(0))
            .unwrap()
            .collect::<Result<Vec<_>, _>>()
            .unwrap();

        for expected in [
            "memories",
            "entities",
            "sentiments",
            "memory_log",
            "schema_meta",
            "memories_vec",
            "memories_image_vec",
        ] {
            assert!(tables.contains(&expected.to_string()), "missing table {expected}");
        }

        let version: String = conn
            .query_row("SELECT vec_version()", [], |r| r.get(0))
            .unwrap();
        assert!(!version.is_empty());
    }

    #[test]
    fn schema_is_idempotent() {
        crate::db::load_sqlite_vec();
        let conn = Connection::open_in_memory().unwrap();
        init_schema(&conn).unwrap();
        init_schema(&conn).unwrap();
    }

    #[test]
    fn type_check_rejects_unknown_types() {
        crate::db::load_sqlite_vec();
        let conn = Connection::open_in_memory().unwrap();
        init_schema(&conn).unwrap();
        let result = conn.execute(
            "INSERT INTO memories (user_id, raw_text, type, timestamp, created_at, updated_at) \
             VALUES (1, 'x', 'video', 't', 't', 't')",
            [],
        );
        assert!(result.is_err());
    }
}
