pub mod ask_memories;
pub mod memory_stats;
pub mod search_memories;
pub mod store_memory;

use std::sync::Arc;

use ask_memories::AskMemoriesParams;
use memory_stats::MemoryStatsParams;
use rmcp::handler::server::tool::ToolRouter;
use rmcp::handler::server::wrapper::Parameters;
use rmcp::{tool, tool_handler, tool_router, ServerHandler};
use search_memories::SearchMemoriesParams;
use store_memory::StoreMemoryParams;

use memoir::context::AppContext;
use memoir::memory::ask::{self, AskRequest};
use memoir::memory::search::{parse_type_filter, parse_type_list, SearchMode, SearchRequest};
use memoir::memory::store::{self, NewMemory};
use memoir::memory::types::{MemoryMetadata, MemoryType};

/// The memoir MCP tool handler. Holds the shared [`AppContext`] and acts for
/// `storage.default_user_id`, since stdio clients carry no owner header.
#[derive(Clone)]
pub struct MemoirTools {
    tool_router: ToolRouter<Self>,
    ctx: Arc<AppContext>,
}

fn parse_mode(raw: Option<&str>) -> Result<SearchMode, String> {
    raw.map_or(Ok(SearchMode::Hybrid), |m| m.parse().map_err(|e| format!("{e}")))
}

#[tool_router]
impl MemoirTools {
    pub fn new(ctx: Arc<AppContext>) -> Self {
        Self {
            tool_router: Self::tool_router(),
            ctx,
        }
    }

    fn owner(&self) -> i64 {
        self.ctx.config.storage.default_user_id
    }

    /// Store a new memory.
    #[tool(description = "Store a personal memory. Types: text (typed note), voice (transcript), image (caption).")]
    async fn store_memory(
        &self,
        Parameters(params): Parameters<StoreMemoryParams>,
    ) -> Result<String, String> {
        if params.raw_text.trim().is_empty() {
            return Err("raw_text must not be empty".into());
        }
        let memory_type = match params.r#type.as_deref() {
            Some(t) => t.trim().to_lowercase().parse::<MemoryType>()?,
            None => MemoryType::Text,
        };
        let timestamp = params
            .timestamp
            .as_deref()
            .map(store::normalize_timestamp)
            .transpose()
            .map_err(|e| e.to_string())?;
        let metadata: MemoryMetadata = match params.metadata {
            Some(v) => serde_json::from_value(v).map_err(|e| format!("invalid metadata: {e}"))?,
            None => MemoryMetadata::default(),
        };

        tracing::info!(
            text_len = params.raw_text.len(),
            memory_type = %memory_type,
            "store_memory called"
        );

        let memory = NewMemory {
            user_id: self.owner(),
            raw_text: params.raw_text,
            processed_text: params.processed_text,
            memory_type,
            timestamp,
            metadata,
            entities: vec![],
            sentiments: vec![],
        };

        let result = self
            .ctx
            .store(memory, None)
            .await
            .map_err(|e| format!("store failed: {e:#}"))?;

        serde_json::to_string(&result).map_err(|e| format!("serialization failed: {e}"))
    }

    /// Hybrid search over stored memories.
    #[tool(description = "Search memories by natural language query. Keyword, semantic and image matches are fused by reciprocal rank.")]
    async fn search_memories(
        &self,
        Parameters(params): Parameters<SearchMemoriesParams>,
    ) -> Result<String, String> {
        let mode = parse_mode(params.search_type.as_deref())?;
        let types =
            parse_type_filter(None, params.memory_types.as_deref()).map_err(|e| e.to_string())?;

        tracing::info!(query = %params.query, mode = %mode, "search_memories called");

        let request = SearchRequest {
            query: params.query,
            owner: self.owner(),
            limit: params
                .limit
                .unwrap_or(self.ctx.config.retrieval.default_limit),
            mode,
            types,
        };
        let outcome = self
            .ctx
            .searcher
            .search(&request, &self.ctx.search_profile)
            .await
            .map_err(|e| e.to_string())?;

        Ok(serde_json::json!({
            "memories": outcome.results,
            "total_found": outcome.results.len(),
            "breakdown": outcome.breakdown,
        })
        .to_string())
    }

    /// Answer a question from stored memories.
    #[tool(description = "Answer a question using only the user's stored memories as context.")]
    async fn ask_memories(
        &self,
        Parameters(params): Parameters<AskMemoriesParams>,
    ) -> Result<String, String> {
        let mode = parse_mode(params.search_type.as_deref())?;
        let types = params
            .memory_types
            .as_ref()
            .map(|list| parse_type_list(list.iter().map(String::as_str)))
            .transpose()
            .map_err(|e| e.to_string())?;

        let request = AskRequest {
            question: params.question,
            owner: self.owner(),
            limit: params.limit.unwrap_or(self.ctx.config.ask.default_limit),
            mode,
            types,
        };
        let response = ask::ask(
            &self.ctx.searcher,
            self.ctx.narrator.as_ref(),
            &self.ctx.ask_profile,
            request,
        )
        .await
        .map_err(|e| e.to_string())?;

        serde_json::to_string(&response).map_err(|e| format!("serialization failed: {e}"))
    }

    /// Get statistics about the memory store.
    #[tool(description = "Get memory store statistics: counts by type, deleted memories, entities, sentiment, storage size.")]
    async fn memory_stats(
        &self,
        Parameters(params): Parameters<MemoryStatsParams>,
    ) -> Result<String, String> {
        let owner = params.user_id.unwrap_or_else(|| self.owner());
        let db_path = self.ctx.db_path.clone();
        let stats = self
            .ctx
            .with_db(move |conn| {
                memoir::memory::stats::memory_stats(conn, owner, db_path.as_deref())
            })
            .await
            .map_err(|e| format!("stats failed: {e:#}"))?;

        serde_json::to_string(&stats).map_err(|e| format!("serialization failed: {e}"))
    }
}

#[tool_handler]
impl ServerHandler for MemoirTools {
    fn get_info(&self) -> rmcp::model::ServerInfo {
        rmcp::model::ServerInfo {
            instructions: Some(
                "memoir is a personal memory store. Use store_memory to save notes, \
                 search_memories to find them, and ask_memories to answer questions from them."
                    .into(),
            ),
            capabilities: rmcp::model::ServerCapabilities::builder()
                .enable_tools()
                .build(),
            ..Default::default()
        }
    }
}
