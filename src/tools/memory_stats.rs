//! MCP `memory_stats` tool parameter definition.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Parameters for the `memory_stats` MCP tool.
#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct MemoryStatsParams {
    /// Owner to report on; defaults to the configured user.
    #[schemars(description = "Optional user id to report on. Defaults to the configured user.")]
    pub user_id: Option<i64>,
}
