use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct StoreMemoryParams {
    #[schemars(description = "The note as the user wrote or said it")]
    pub raw_text: String,

    #[schemars(description = "Optional cleaned-up text; embedded instead of raw_text when given")]
    pub processed_text: Option<String>,

    #[schemars(description = "Memory type: 'text', 'voice' (transcript) or 'image' (caption). Defaults to 'text'.")]
    pub r#type: Option<String>,

    #[schemars(description = "Optional RFC 3339 timestamp. Defaults to now.")]
    pub timestamp: Option<String>,

    #[schemars(description = "Optional JSON metadata, e.g. {\"filename\": \"beach.jpg\"} for images")]
    pub metadata: Option<serde_json::Value>,
}
