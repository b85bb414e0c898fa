//! Process-wide application state, built once at startup.
//!
//! [`AppContext`] owns the database handle, the embedders, the searcher and the narrator.
//! The HTTP router and the MCP tools share one `Arc<AppContext>`; nothing is global.

use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use anyhow::{Context, Result};
use rusqlite::Connection;

use crate::config::MemoirConfig;
use crate::db;
use crate::db::migrations::ModelCheck;
use crate::embedding::{self, EmbeddingProvider};
use crate::memory::search::{HybridSearcher, SearchProfile};
use crate::memory::sources::{KeywordSource, VectorSource};
use crate::memory::store::{self, NewMemory, StoreMemoryResult};
use crate::narrative::{ChatCompletionsNarrator, Narrator};

pub struct AppContext {
    pub db: Arc<Mutex<Connection>>,
    pub text_embedder: Arc<dyn EmbeddingProvider>,
    pub searcher: HybridSearcher,
    pub narrator: Arc<dyn Narrator>,
    pub search_profile: SearchProfile,
    pub ask_profile: SearchProfile,
    pub config: Arc<MemoirConfig>,
    /// `None` for in-memory databases.
    pub db_path: Option<PathBuf>,
}

impl AppContext {
    /// Open the configured database and wire up the HTTP-backed collaborators.
    pub fn from_config(config: MemoirConfig) -> Result<Self> {
        let db_path = config.resolved_db_path();
        let conn = db::open_database(&db_path)?;
        tracing::info!(db = %db_path.display(), "database ready");

        let text_embedder: Arc<dyn EmbeddingProvider> =
            Arc::new(embedding::create_text_provider(&config.embedding)?);
        let image_embedder: Arc<dyn EmbeddingProvider> =
            Arc::new(embedding::create_image_text_provider(&config.embedding)?);
        record_embedding_models(&conn, text_embedder.as_ref(), image_embedder.as_ref())?;
        let narrator: Arc<dyn Narrator> = Arc::new(
            ChatCompletionsNarrator::new(&config.narrative)
                .context("failed to build narrative client")?,
        );
        if config.narrative.api_key.is_none() {
            tracing::warn!("GROQ_API_KEY is not set, ask requests will fail");
        }

        Ok(Self::assemble(
            conn,
            text_embedder,
            image_embedder,
            narrator,
            config,
            Some(db_path),
        ))
    }

    /// Build a context from parts. Tests use this with in-memory databases and fakes.
    pub fn assemble(
        conn: Connection,
        text_embedder: Arc<dyn EmbeddingProvider>,
        image_embedder: Arc<dyn EmbeddingProvider>,
        narrator: Arc<dyn Narrator>,
        config: MemoirConfig,
        db_path: Option<PathBuf>,
    ) -> Self {
        let db = Arc::new(Mutex::new(conn));
        let searcher = HybridSearcher::new(
            Arc::new(KeywordSource::new(Arc::clone(&db))),
            Arc::new(VectorSource::semantic(Arc::clone(&db), Arc::clone(&text_embedder))),
            Arc::new(VectorSource::image(Arc::clone(&db), image_embedder)),
            &config,
        );

        Self {
            search_profile: SearchProfile::search(&config.retrieval),
            ask_profile: SearchProfile::ask(&config.ask),
            db,
            text_embedder,
            searcher,
            narrator,
            config: Arc::new(config),
            db_path,
        }
    }

    /// Run a closure against the database on the blocking pool.
    pub async fn with_db<T, F>(&self, f: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut Connection) -> Result<T> + Send + 'static,
    {
        let db = Arc::clone(&self.db);
        tokio::task::spawn_blocking(move || {
            let mut conn = db
                .lock()
                .map_err(|e| anyhow::anyhow!("db lock poisoned: {e}"))?;
            f(&mut conn)
        })
        .await
        .context("database task failed")?
    }

    /// Embed and store a memory. An embedding failure stores the memory without a
    /// text vector; it stays reachable through keyword search.
    pub async fn store(
        &self,
        memory: NewMemory,
        image_embedding: Option<Vec<f32>>,
    ) -> Result<StoreMemoryResult> {
        let text_embedding = match self.text_embedder.embed(memory.embedding_text()).await {
            Ok(v) => Some(v),
            Err(e) => {
                tracing::warn!(error = %format!("{e:#}"), "embedding failed, storing without vector");
                None
            }
        };

        let result = self
            .with_db(move |conn| {
                store::store_memory(
                    conn,
                    &memory,
                    text_embedding.as_deref(),
                    image_embedding.as_deref(),
                )
            })
            .await?;

        tracing::info!(
            id = result.id,
            memory_type = %result.memory_type,
            text_embedded = result.text_embedded,
            "memory stored"
        );
        Ok(result)
    }
}

/// Record the embedders' models in `schema_meta`, warning when existing vectors came
/// from a different model.
fn record_embedding_models(
    conn: &Connection,
    text: &dyn EmbeddingProvider,
    image: &dyn EmbeddingProvider,
) -> Result<()> {
    let pairs = [
        (db::migrations::TEXT_MODEL_KEY, "memories_vec", text.model()),
        (db::migrations::IMAGE_MODEL_KEY, "memories_image_vec", image.model()),
    ];
    for (key, table, configured) in pairs {
        let check = db::migrations::reconcile_embedding_model(conn, key, table, configured)
            .with_context(|| format!("failed to record {key}"))?;
        match check {
            ModelCheck::Changed { stored } => tracing::warn!(
                key,
                stored = %stored,
                configured,
                "embedding model changed, existing vectors may not be comparable"
            ),
            ModelCheck::Recorded => tracing::debug!(key, model = configured, "embedding model recorded"),
            ModelCheck::Unchanged => {}
        }
    }
    Ok(())
}
