//! Personal memory store with hybrid retrieval.
//!
//! memoir keeps text, voice and image notes (with their entities and sentiment) in SQLite
//! and answers queries by fusing three independent candidate lists:
//!
//! | Source | Matches on | Local score |
//! |--------|-----------|-------------|
//! | **Keyword** | query terms in text and entity names | term/position heuristic, `[0, 10]` |
//! | **Semantic** | sentence embeddings (384 dims) | cosine similarity |
//! | **Image** | CLIP embeddings (512 dims) | cosine similarity |
//!
//! The local scores live on incompatible scales, so the lists are merged with Reciprocal
//! Rank Fusion, which only looks at each memory's position in each list.
//!
//! # Architecture
//!
//! - **Storage**: SQLite with [sqlite-vec](https://github.com/asg017/sqlite-vec) vec0 tables
//! - **Embeddings**: OpenAI-compatible HTTP embedding service
//! - **Answers**: OpenAI-compatible chat completions (Groq by default)
//! - **Transport**: REST over axum, MCP over stdio
//!
//! # Modules
//!
//! - [`config`]: TOML config with environment overrides
//! - [`db`]: schema, migrations and health checks
//! - [`embedding`]: text-to-vector providers
//! - [`memory`]: storage, candidate sources, scoring, fusion, search and ask
//! - [`narrative`]: answer generation
//! - [`context`]: process-wide state built once at startup
//! - [`api`]: HTTP routes

pub mod api;
pub mod config;
pub mod context;
pub mod db;
pub mod embedding;
pub mod memory;
pub mod narrative;
