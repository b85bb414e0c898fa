mod helpers;

use memoir::db;
use memoir::db::migrations::{
    get_embedding_model, get_schema_version, run_migrations, set_embedding_model,
    CURRENT_SCHEMA_VERSION, IMAGE_MODEL_KEY, TEXT_MODEL_KEY,
};

#[test]
fn fresh_db_migrates_to_current_version() {
    let conn = helpers::test_db();
    assert_eq!(get_schema_version(&conn).unwrap(), CURRENT_SCHEMA_VERSION);
    assert!(get_embedding_model(&conn, TEXT_MODEL_KEY).unwrap().is_some());
    assert!(get_embedding_model(&conn, IMAGE_MODEL_KEY).unwrap().is_some());
}

#[test]
fn v1_database_upgrades_in_place() {
    db::load_sqlite_vec();
    let mut conn = rusqlite::Connection::open_in_memory().unwrap();
    conn.pragma_update(None, "foreign_keys", "ON").unwrap();
    db::schema::init_schema(&conn).unwrap();
    assert_eq!(get_schema_version(&conn).unwrap(), 1);

    let id = helpers::insert_memory(
        &mut conn, 1, "written before the upgrade", memoir::memory::types::MemoryType::Text, None, None,
    );

    run_migrations(&conn).unwrap();
    assert_eq!(get_schema_version(&conn).unwrap(), CURRENT_SCHEMA_VERSION);
    assert!(memoir::memory::store::get_memory(&conn, id, 1).unwrap().is_some());
}

#[test]
fn recorded_model_survives_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("memoir.db");

    {
        let conn = db::open_database(&path).unwrap();
        set_embedding_model(&conn, TEXT_MODEL_KEY, "bge-small-en").unwrap();
    }

    let conn = db::open_database(&path).unwrap();
    assert_eq!(get_schema_version(&conn).unwrap(), CURRENT_SCHEMA_VERSION);
    assert_eq!(
        get_embedding_model(&conn, TEXT_MODEL_KEY).unwrap().as_deref(),
        Some("bge-small-en")
    );
}

#[test]
fn configured_models_are_recorded_on_first_open() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = memoir::config::MemoirConfig::default();
    config.storage.db_path = dir.path().join("memoir.db").to_string_lossy().into_owned();
    config.embedding.text_model = "bge-small-en".into();

    {
        let ctx = memoir::context::AppContext::from_config(config.clone()).unwrap();
        let mut conn = ctx.db.lock().unwrap();
        assert_eq!(
            get_embedding_model(&conn, TEXT_MODEL_KEY).unwrap().as_deref(),
            Some("bge-small-en")
        );
        assert_eq!(
            get_embedding_model(&conn, IMAGE_MODEL_KEY).unwrap().as_deref(),
            Some("clip-ViT-B-32")
        );
        helpers::insert_memory(
            &mut conn,
            1,
            "embedded with bge",
            memoir::memory::types::MemoryType::Text,
            Some(&helpers::text_embedding(0)),
            None,
        );
    }

    config.embedding.text_model = "nomic-embed-text".into();
    let ctx = memoir::context::AppContext::from_config(config).unwrap();
    let conn = ctx.db.lock().unwrap();
    assert_eq!(
        get_embedding_model(&conn, TEXT_MODEL_KEY).unwrap().as_deref(),
        Some("bge-small-en")
    );
}
