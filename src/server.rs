//! Server entry points for the REST API and the MCP stdio transport.
//!
//! Both build one [`AppContext`] from config and share it with their handlers.

use std::sync::Arc;

use anyhow::{Context, Result};
use rmcp::ServiceExt;

use memoir::api;
use memoir::config::MemoirConfig;
use memoir::context::AppContext;

use crate::tools::MemoirTools;

/// Start the REST API on `server.host:server.port`.
pub async fn serve_http(config: MemoirConfig) -> Result<()> {
    let bind_addr = format!("{}:{}", config.server.host, config.server.port);

    let ctx = Arc::new(AppContext::from_config(config)?);
    let router = api::create_router(ctx);

    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("failed to bind {bind_addr}"))?;
    tracing::info!(addr = %bind_addr, "memoir API listening at http://{bind_addr}/api/v1");

    axum::serve(listener, router)
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "failed to listen for ctrl-c");
            }
            tracing::info!("shutting down HTTP server");
        })
        .await?;

    Ok(())
}

/// Start the MCP server over stdio transport.
pub async fn serve_stdio(config: MemoirConfig) -> Result<()> {
    tracing::info!("starting memoir MCP server on stdio");

    let ctx = Arc::new(AppContext::from_config(config)?);

    let tools = MemoirTools::new(ctx);
    let transport = rmcp::transport::stdio();

    let server = tools.serve(transport).await?;
    tracing::info!("MCP server running, waiting for client");

    server.waiting().await?;
    tracing::info!("MCP server shut down");

    Ok(())
}
