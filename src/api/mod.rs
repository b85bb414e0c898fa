//! HTTP API for the memory store.
//!
//! All memory routes live under `/api/v1` and act for the owner named by the
//! `x-user-id` header. `/health` sits outside the prefix and needs no owner.

mod error;
mod handlers;

use std::sync::Arc;

use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use axum::routing::{get, post};
use axum::Router;

use crate::context::AppContext;

pub use error::ApiError;

/// Header carrying the owner id.
pub const USER_HEADER: &str = "x-user-id";

/// The authenticated owner of a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Owner(pub i64);

impl<S> FromRequestParts<S> for Owner
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .headers
            .get(USER_HEADER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse::<i64>().ok())
            .map(Owner)
            .ok_or(ApiError::Unauthorized)
    }
}

/// Build the router with all routes.
pub fn create_router(ctx: Arc<AppContext>) -> Router {
    let v1 = Router::new()
        .route("/search_memories", get(handlers::search_memories))
        .route("/ask", post(handlers::ask))
        .route(
            "/memories",
            post(handlers::create_memory).get(handlers::list_memories),
        )
        .route(
            "/memories/{id}",
            get(handlers::get_memory).delete(handlers::delete_memory),
        )
        .route("/memories/{id}/restore", post(handlers::restore_memory))
        .route("/timeline_summary", get(handlers::timeline_summary))
        .route("/similar_memories/{id}", get(handlers::similar_memories))
        .route("/stats", get(handlers::stats));

    Router::new()
        .route("/health", get(handlers::health))
        .nest("/api/v1", v1)
        .with_state(ctx)
}
