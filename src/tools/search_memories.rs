//! MCP `search_memories` tool parameter definition.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Parameters for the `search_memories` MCP tool.
#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct SearchMemoriesParams {
    /// Natural language query.
    #[schemars(description = "Natural language query to search memories")]
    pub query: String,

    /// Maximum number of fused results (1–500). Defaults to the configured limit.
    #[schemars(description = "Maximum number of results to return (1-500). Defaults to 50.")]
    pub limit: Option<usize>,

    #[schemars(description = "Which sources to use: 'hybrid' (default), 'keyword', 'semantic' or 'image'")]
    pub search_type: Option<String>,

    /// Comma-separated type filter applied before fusion.
    #[schemars(description = "Optional comma-separated type filter, e.g. 'text,voice'")]
    pub memory_types: Option<String>,
}
