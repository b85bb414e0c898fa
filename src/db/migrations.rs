//! Forward-only schema migration framework.
//!
//! Tracks the schema version in `schema_meta` and runs sequential migrations
//! to bring the database up to [`CURRENT_SCHEMA_VERSION`].

use rusqlite::Connection;

/// The schema version that the current binary expects.
pub const CURRENT_SCHEMA_VERSION: u32 = 2;

/// `schema_meta` key for the model behind `memories_vec`.
pub const TEXT_MODEL_KEY: &str = "text_embedding_model";
/// `schema_meta` key for the model behind `memories_image_vec`.
pub const IMAGE_MODEL_KEY: &str = "image_embedding_model";

/// Get the current schema version from the database.
pub fn get_schema_version(conn: &Connection) -> rusqlite::Result<u32> {
    conn.query_row(
        "SELECT value FROM schema_meta WHERE key = 'schema_version'",
        [],
        |row| {
            let val: String = row.get(0)?;
            Ok(val.parse::<u32>().unwrap_or(0))
        },
    )
}

fn update_schema_version(conn: &Connection, version: u32) -> rusqlite::Result<()> {
    conn.execute(
        "UPDATE schema_meta SET value = ?1 WHERE key = 'schema_version'",
        [version.to_string()],
    )?;
    Ok(())
}

/// Get a stored embedding model identifier (`TEXT_MODEL_KEY` or `IMAGE_MODEL_KEY`).
pub fn get_embedding_model(conn: &Connection, key: &str) -> rusqlite::Result<Option<String>> {
    match conn.query_row(
        "SELECT value FROM schema_meta WHERE key = ?1",
        [key],
        |row| row.get::<_, String>(0),
    ) {
        Ok(val) => Ok(Some(val)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e),
    }
}

pub fn set_embedding_model(conn: &Connection, key: &str, model: &str) -> rusqlite::Result<()> {
    conn.execute(
        "INSERT OR REPLACE INTO schema_meta (key, value) VALUES (?1, ?2)",
        [key, model],
    )?;
    Ok(())
}

/// How a configured embedding model relates to the one recorded for its vec0 table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModelCheck {
    /// The configured model is already recorded.
    Unchanged,
    /// The configured model was recorded: nothing was on record, or the table held no vectors.
    Recorded,
    /// The table holds vectors from `stored`, which differs from the configured model.
    Changed { stored: String },
}

/// Record `model` under `key` unless `table` already holds vectors from another model.
pub fn reconcile_embedding_model(
    conn: &Connection,
    key: &str,
    table: &str,
    model: &str,
) -> rusqlite::Result<ModelCheck> {
    let stored = get_embedding_model(conn, key)?;
    if stored.as_deref() == Some(model) {
        return Ok(ModelCheck::Unchanged);
    }

    let has_vectors: bool = conn.query_row(
        &format!("SELECT EXISTS (SELECT 1 FROM {table})"),
        [],
        |row| row.get(0),
    )?;

    match stored {
        Some(stored) if has_vectors => Ok(ModelCheck::Changed { stored }),
        _ => {
            set_embedding_model(conn, key, model)?;
            Ok(ModelCheck::Recorded)
        }
    }
}

/// Run any pending forward-only migrations. Each migration runs in a transaction.
pub fn run_migrations(conn: &Connection) -> rusqlite::Result<()> {
    let mut version = get_schema_version(conn)?;
    tracing::debug!(schema_version = version, target = CURRENT_SCHEMA_VERSION, "checking migrations");

    while version < CURRENT_SCHEMA_VERSION {
        let next = version + 1;
        tracing::info!(from = version, to = next, "running migration");

        conn.execute_batch("BEGIN")?;
        let step = match next {
            2 => migrate_v1_to_v2(conn),
            _ => {
                tracing::error!(version = next, "unknown migration target");
                conn.execute_batch("ROLLBACK")?;
                break;
            }
        };
        if let Err(e) = step.and_then(|_| update_schema_version(conn, next)) {
            conn.execute_batch("ROLLBACK")?;
            return Err(e);
        }
        conn.execute_batch("COMMIT")?;
        version = next;
    }

    Ok(())
}

/// Migration v1 → v2: record which models produced the stored vectors.
///
/// v1 databases were only ever written with these two models. On a fresh database
/// the entries are replaced by the configured models on first open, see
/// [`reconcile_embedding_model`].
fn migrate_v1_to_v2(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute(
        "INSERT OR IGNORE INTO schema_meta (key, value) VALUES (?1, 'all-MiniLM-L6-v2')",
        [TEXT_MODEL_KEY],
    )?;
    conn.execute(
        "INSERT OR IGNORE INTO schema_meta (key, value) VALUES (?1, 'clip-ViT-B-32')",
        [IMAGE_MODEL_KEY],
    )?;
    Ok(())
}
