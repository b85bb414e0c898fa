//! Route handlers. Each handler validates its input up front, then calls into
//! [`AppContext`]; database work goes through [`AppContext::with_db`].

use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Serialize};

use super::{ApiError, Owner};
use crate::context::AppContext;
use crate::db;
use crate::embedding::IMAGE_EMBEDDING_DIM;
use crate::memory::ask::{self, AskRequest, AskResponse};
use crate::memory::forget::{self, ForgetResult};
use crate::memory::fusion::FusedResult;
use crate::memory::search::{parse_type_filter, parse_type_list, Breakdown, SearchMode, SearchRequest};
use crate::memory::sources;
use crate::memory::stats::{self, StatsResponse};
use crate::memory::store::{self, NewMemory, StoreMemoryResult};
use crate::memory::timeline::{self, Timeframe, TimelineSummary};
use crate::memory::types::{Entity, MemoryMetadata, MemoryRecord, MemoryType, Sentiment};

type ApiResult<T> = Result<Json<T>, ApiError>;

// ── Health ────────────────────────────────────────────────────────────────────

pub(super) async fn health(State(ctx): State<Arc<AppContext>>) -> (StatusCode, Json<serde_json::Value>) {
    let report = ctx
        .with_db(|conn| db::check_database_health(conn))
        .await;

    match report {
        Ok(report) if report.integrity_ok => (
            StatusCode::OK,
            Json(serde_json::json!({
                "status": "ok",
                "service": "memoir",
                "version": env!("CARGO_PKG_VERSION"),
                "database": report,
            })),
        ),
        Ok(report) => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(serde_json::json!({
                "status": "degraded",
                "service": "memoir",
                "version": env!("CARGO_PKG_VERSION"),
                "database": report,
            })),
        ),
        Err(e) => {
            tracing::error!(error = %format!("{e:#}"), "health check failed");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(serde_json::json!({
                    "status": "error",
                    "service": "memoir",
                    "version": env!("CARGO_PKG_VERSION"),
                    "detail": format!("{e:#}"),
                })),
            )
        }
    }
}

// ── Search ────────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub(super) struct SearchParams {
    #[serde(default)]
    query: String,
    limit: Option<usize>,
    search_type: Option<String>,
    memory_type: Option<String>,
    memory_types: Option<String>,
}

#[derive(Debug, Serialize)]
pub(super) struct SearchResponse {
    query: String,
    search_type: SearchMode,
    memory_type: Option<String>,
    memory_types: Option<String>,
    memories: Vec<FusedResult>,
    total_found: usize,
    breakdown: Breakdown,
}

pub(super) async fn search_memories(
    State(ctx): State<Arc<AppContext>>,
    Owner(owner): Owner,
    Query(params): Query<SearchParams>,
) -> ApiResult<SearchResponse> {
    let mode = match params.search_type.as_deref() {
        Some(raw) => raw.parse::<SearchMode>()?,
        None => SearchMode::Hybrid,
    };
    let types = parse_type_filter(params.memory_type.as_deref(), params.memory_types.as_deref())?;
    let limit = ctx
        .search_profile
        .check_limit(params.limit.unwrap_or(ctx.config.retrieval.default_limit))?;

    let request = SearchRequest {
        query: params.query.clone(),
        owner,
        limit,
        mode,
        types,
    };
    let outcome = ctx.searcher.search(&request, &ctx.search_profile).await?;

    Ok(Json(SearchResponse {
        query: params.query,
        search_type: mode,
        memory_type: params.memory_type,
        memory_types: params.memory_types,
        total_found: outcome.results.len(),
        memories: outcome.results,
        breakdown: outcome.breakdown,
    }))
}

// ── Ask ───────────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub(super) struct AskBody {
    #[serde(default)]
    question: String,
    limit: Option<usize>,
    search_type: Option<String>,
    memory_type: Option<String>,
    memory_types: Option<Vec<String>>,
}

pub(super) async fn ask(
    State(ctx): State<Arc<AppContext>>,
    Owner(owner): Owner,
    Json(body): Json<AskBody>,
) -> ApiResult<AskResponse> {
    let mode = match body.search_type.as_deref() {
        Some(raw) => raw.parse::<SearchMode>()?,
        None => SearchMode::Hybrid,
    };
    let types = match (&body.memory_type, &body.memory_types) {
        (Some(single), _) => parse_type_filter(Some(single.as_str()), None)?,
        (None, Some(list)) => Some(parse_type_list(list.iter().map(String::as_str))?),
        (None, None) => None,
    };

    let request = AskRequest {
        question: body.question,
        owner,
        limit: body.limit.unwrap_or(ctx.config.ask.default_limit),
        mode,
        types,
    };
    let response = ask::ask(&ctx.searcher, ctx.narrator.as_ref(), &ctx.ask_profile, request).await?;
    Ok(Json(response))
}

// ── Memories ──────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub(super) struct CreateMemoryBody {
    raw_text: String,
    processed_text: Option<String>,
    #[serde(rename = "type")]
    memory_type: Option<String>,
    timestamp: Option<String>,
    #[serde(default)]
    metadata: MemoryMetadata,
    #[serde(default)]
    entities: Vec<Entity>,
    #[serde(default)]
    sentiments: Vec<Sentiment>,
    /// Precomputed CLIP embedding for image memories.
    image_embedding: Option<Vec<f32>>,
}

pub(super) async fn create_memory(
    State(ctx): State<Arc<AppContext>>,
    Owner(owner): Owner,
    Json(body): Json<CreateMemoryBody>,
) -> Result<(StatusCode, Json<StoreMemoryResult>), ApiError> {
    if body.raw_text.trim().is_empty() {
        return Err(ApiError::BadRequest("raw_text must not be empty".into()));
    }
    let memory_type = match body.memory_type.as_deref() {
        Some(raw) => raw
            .trim()
            .to_lowercase()
            .parse::<MemoryType>()
            .map_err(ApiError::BadRequest)?,
        None => MemoryType::Text,
    };
    let timestamp = body
        .timestamp
        .as_deref()
        .map(store::normalize_timestamp)
        .transpose()
        .map_err(|e| ApiError::BadRequest(e.to_string()))?;
    if let Some(e) = &body.image_embedding {
        if memory_type != MemoryType::Image {
            return Err(ApiError::BadRequest(
                "image_embedding is only accepted for image memories".into(),
            ));
        }
        if e.len() != IMAGE_EMBEDDING_DIM {
            return Err(ApiError::BadRequest(format!(
                "image_embedding must have {IMAGE_EMBEDDING_DIM} dimensions, got {}",
                e.len()
            )));
        }
    }

    let memory = NewMemory {
        user_id: owner,
        raw_text: body.raw_text,
        processed_text: body.processed_text,
        memory_type,
        timestamp,
        metadata: body.metadata,
        entities: body.entities,
        sentiments: body.sentiments,
    };
    let result = ctx.store(memory, body.image_embedding).await?;
    Ok((StatusCode::CREATED, Json(result)))
}

/// A stored memory with its presentation URL.
#[derive(Debug, Serialize)]
pub(super) struct MemoryView {
    #[serde(flatten)]
    memory: MemoryRecord,
    #[serde(skip_serializing_if = "Option::is_none")]
    image_url: Option<String>,
}

impl MemoryView {
    fn new(ctx: &AppContext, memory: MemoryRecord) -> Self {
        let image_url = ctx.searcher.image_url_for(&memory);
        Self { memory, image_url }
    }
}

#[derive(Debug, Deserialize)]
pub(super) struct ListParams {
    limit: Option<usize>,
    #[serde(default)]
    offset: usize,
    memory_type: Option<String>,
}

#[derive(Debug, Serialize)]
pub(super) struct ListResponse {
    memories: Vec<MemoryView>,
    count: usize,
    limit: usize,
    offset: usize,
}

pub(super) async fn list_memories(
    State(ctx): State<Arc<AppContext>>,
    Owner(owner): Owner,
    Query(params): Query<ListParams>,
) -> ApiResult<ListResponse> {
    let limit = ctx
        .search_profile
        .check_limit(params.limit.unwrap_or(ctx.config.retrieval.default_limit))?;
    let memory_type = parse_type_filter(params.memory_type.as_deref(), None)?
        .and_then(|set| set.into_iter().next());
    let offset = params.offset;

    let records = ctx
        .with_db(move |conn| store::list_memories(conn, owner, limit, offset, memory_type))
        .await?;
    let memories: Vec<MemoryView> = records
        .into_iter()
        .map(|m| MemoryView::new(&ctx, m))
        .collect();

    Ok(Json(ListResponse {
        count: memories.len(),
        memories,
        limit,
        offset,
    }))
}

pub(super) async fn get_memory(
    State(ctx): State<Arc<AppContext>>,
    Owner(owner): Owner,
    Path(id): Path<i64>,
) -> ApiResult<MemoryView> {
    let record = ctx
        .with_db(move |conn| store::get_memory(conn, id, owner))
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("memory {id} not found")))?;
    Ok(Json(MemoryView::new(&ctx, record)))
}

pub(super) async fn delete_memory(
    State(ctx): State<Arc<AppContext>>,
    Owner(owner): Owner,
    Path(id): Path<i64>,
) -> ApiResult<ForgetResult> {
    ctx.with_db(move |conn| forget::soft_delete_memory(conn, id, owner, None))
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::NotFound(format!("memory {id} not found")))
}

pub(super) async fn restore_memory(
    State(ctx): State<Arc<AppContext>>,
    Owner(owner): Owner,
    Path(id): Path<i64>,
) -> ApiResult<ForgetResult> {
    ctx.with_db(move |conn| forget::restore_memory(conn, id, owner))
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::NotFound(format!("no deleted memory {id}")))
}

// ── Browsing ──────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub(super) struct TimelineParams {
    timeframe: Option<String>,
    limit: Option<usize>,
}

pub(super) async fn timeline_summary(
    State(ctx): State<Arc<AppContext>>,
    Owner(owner): Owner,
    Query(params): Query<TimelineParams>,
) -> ApiResult<TimelineSummary> {
    let timeframe = match params.timeframe.as_deref() {
        Some(raw) => raw.parse::<Timeframe>().map_err(ApiError::BadRequest)?,
        None => Timeframe::Weekly,
    };
    let limit = ctx
        .search_profile
        .check_limit(params.limit.unwrap_or(ctx.config.retrieval.max_limit))?;

    let mut summary = ctx
        .with_db(move |conn| timeline::timeline_summary(conn, owner, timeframe, limit))
        .await?;
    for entry in summary.groups.iter_mut().flat_map(|g| g.memories.iter_mut()) {
        entry.image_url = ctx.searcher.image_url_for(&entry.memory);
    }
    Ok(Json(summary))
}

#[derive(Debug, Deserialize)]
pub(super) struct SimilarParams {
    limit: Option<usize>,
}

#[derive(Debug, Serialize)]
pub(super) struct SimilarMemory {
    #[serde(flatten)]
    view: MemoryView,
    similarity: f64,
}

#[derive(Debug, Serialize)]
pub(super) struct SimilarResponse {
    memory_id: i64,
    similar_memories: Vec<SimilarMemory>,
    count: usize,
}

pub(super) async fn similar_memories(
    State(ctx): State<Arc<AppContext>>,
    Owner(owner): Owner,
    Path(id): Path<i64>,
    Query(params): Query<SimilarParams>,
) -> ApiResult<SimilarResponse> {
    let limit = ctx.search_profile.check_limit(params.limit.unwrap_or(5))?;

    let hits = ctx
        .with_db(move |conn| sources::similar_to_memory(conn, id, owner, limit))
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("memory {id} not found")))?;
    let similar_memories: Vec<SimilarMemory> = hits
        .into_iter()
        .map(|hit| SimilarMemory {
            similarity: hit.similarity.unwrap_or(0.0),
            view: MemoryView::new(&ctx, hit.record),
        })
        .collect();

    Ok(Json(SimilarResponse {
        memory_id: id,
        count: similar_memories.len(),
        similar_memories,
    }))
}

pub(super) async fn stats(
    State(ctx): State<Arc<AppContext>>,
    Owner(owner): Owner,
) -> ApiResult<StatsResponse> {
    let db_path = ctx.db_path.clone();
    let stats = ctx
        .with_db(move |conn| stats::memory_stats(conn, owner, db_path.as_deref()))
        .await?;
    Ok(Json(stats))
}
