mod cli;
mod server;
mod tools;

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use memoir::config::MemoirConfig;

#[derive(Parser)]
#[command(name = "memoir", version, about = "Personal memory store with hybrid retrieval")]
struct Cli {
    /// Config file (defaults to ~/.memoir/config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Start the REST API
    Serve,
    /// Start the MCP server (stdio transport)
    Mcp,
    /// Search memories from the terminal
    Search {
        query: String,
        /// Maximum number of results
        #[arg(long)]
        limit: Option<usize>,
        /// hybrid, keyword, semantic or image
        #[arg(long, default_value = "hybrid")]
        mode: String,
        /// Comma-separated type filter, e.g. text,voice
        #[arg(long = "types")]
        memory_types: Option<String>,
    },
    /// Show memory statistics
    Stats,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => MemoirConfig::load_from(path)?,
        None => MemoirConfig::load()?,
    };

    // stderr keeps stdout clean for MCP JSON-RPC
    let filter = EnvFilter::try_new(&config.server.log_level)
        .unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Command::Serve => server::serve_http(config).await?,
        Command::Mcp => server::serve_stdio(config).await?,
        Command::Search {
            query,
            limit,
            mode,
            memory_types,
        } => cli::search::search(config, &query, limit, &mode, memory_types.as_deref()).await?,
        Command::Stats => cli::stats::stats(&config)?,
    }

    Ok(())
}
