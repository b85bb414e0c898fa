use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct AskMemoriesParams {
    #[schemars(description = "Question to answer from the stored memories")]
    pub question: String,

    #[schemars(description = "How many memories to retrieve as context (1-30). Defaults to 8.")]
    pub limit: Option<usize>,

    #[schemars(description = "Which sources to use: 'hybrid' (default), 'keyword', 'semantic' or 'image'")]
    pub search_type: Option<String>,

    #[schemars(description = "Optional list of memory types to draw from: 'text', 'voice', 'image'")]
    pub memory_types: Option<Vec<String>>,
}
