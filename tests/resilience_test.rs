mod helpers;

use memoir::db;
use memoir::memory::store::{store_memory, NewMemory};
use tempfile::TempDir;

#[test]
fn open_creates_new_db_at_nonexistent_path() {
    let tmp = TempDir::new().unwrap();
    let db_path = tmp.path().join("subdir").join("new.db");
    assert!(!db_path.exists());

    let conn = db::open_database(&db_path).unwrap();
    assert!(db_path.exists());

    let count: i64 = conn
        .query_row("SELECT COUNT(*) FROM memories", [], |row| row.get(0))
        .unwrap();
    assert_eq!(count, 0);
}

#[test]
fn health_check_counts_memories() {
    let mut conn = helpers::test_db();
    let report = db::check_database_health(&conn).unwrap();
    assert!(report.integrity_ok);
    assert_eq!(report.schema_version, db::migrations::CURRENT_SCHEMA_VERSION);
    assert!(!report.sqlite_vec_version.is_empty());
    assert_eq!(report.memory_count, 0);

    store_memory(&mut conn, &NewMemory::text(1, "one"), None, None).unwrap();
    store_memory(&mut conn, &NewMemory::text(2, "two"), None, None).unwrap();
    assert_eq!(db::check_database_health(&conn).unwrap().memory_count, 2);
}

#[test]
fn busy_timeout_is_set() {
    let tmp = TempDir::new().unwrap();
    let conn = db::open_database(tmp.path().join("test.db")).unwrap();

    let timeout: i64 = conn
        .pragma_query_value(None, "busy_timeout", |row| row.get(0))
        .unwrap();
    assert_eq!(timeout, 5000);
}

#[test]
fn data_persists_across_reopen() {
    let tmp = TempDir::new().unwrap();
    let path = tmp.path().join("memoir.db");

    let id = {
        let mut conn = db::open_database(&path).unwrap();
        store_memory(&mut conn, &NewMemory::text(1, "still here tomorrow"), None, None)
            .unwrap()
            .id
    };

    let conn = db::open_database(&path).unwrap();
    let record = memoir::memory::store::get_memory(&conn, id, 1).unwrap().unwrap();
    assert_eq!(record.raw_text, "still here tomorrow");
}

#[test]
fn rejects_mismatched_vector_dimensions() {
    let mut conn = helpers::test_db();
    let short = vec![0.1f32; 16];
    let err = store_memory(&mut conn, &NewMemory::text(1, "bad vector"), Some(&short), None);
    assert!(err.is_err());

    let count: i64 = conn
        .query_row("SELECT COUNT(*) FROM memories", [], |row| row.get(0))
        .unwrap();
    assert_eq!(count, 0);
}
