//! Core memory type definitions.
//!
//! Defines [`MemoryType`] (the three ingestion channels), [`MemoryRecord`] (a full stored
//! note with its extracted entities and sentiment), and [`MemoryMetadata`], the typed view
//! of the free-form metadata column. Metadata is decoded once, here, when a row is read.

use serde::{Deserialize, Serialize};

/// How a memory entered the system.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MemoryType {
    /// Typed note.
    Text,
    /// Transcribed audio note.
    Voice,
    /// Captioned image.
    Image,
}

impl MemoryType {
    pub const ALL: [MemoryType; 3] = [MemoryType::Text, MemoryType::Voice, MemoryType::Image];

    /// SQL-compatible string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Voice => "voice",
            Self::Image => "image",
        }
    }
}

impl std::fmt::Display for MemoryType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for MemoryType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "text" => Ok(Self::Text),
            "voice" => Ok(Self::Voice),
            "image" => Ok(Self::Image),
            _ => Err(format!("unknown memory type: {s}")),
        }
    }
}

/// Typed view of the `metadata` column.
///
/// Known keys get their own fields; anything else is preserved in `extra` and
/// serialized back alongside them.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MemoryMetadata {
    /// Stored image file name, used to build the image URL.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filename: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_path: Option<String>,
    /// Generated caption for image memories.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub caption: Option<String>,
    /// Client or device that submitted the memory.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl MemoryMetadata {
    /// Decode the stored metadata column.
    ///
    /// Accepts a JSON object, or a JSON string that itself contains an object
    /// (double-encoded rows). Anything else decodes to empty metadata.
    pub fn decode(raw: Option<&str>) -> Self {
        let Some(raw) = raw else {
            return Self::default();
        };
        let value = match serde_json::from_str::<serde_json::Value>(raw) {
            Ok(serde_json::Value::String(inner)) => serde_json::from_str(&inner).ok(),
            Ok(value) => Some(value),
            Err(_) => None,
        };
        match value {
            Some(value @ serde_json::Value::Object(_)) => {
                serde_json::from_value(value).unwrap_or_else(|e| {
                    tracing::debug!(error = %e, "metadata has unexpected field types");
                    Self::default()
                })
            }
            _ => Self::default(),
        }
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

/// A named entity extracted from the memory text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    #[serde(alias = "text")]
    pub entity: String,
    #[serde(rename = "type", alias = "label", alias = "entity_type")]
    pub entity_type: String,
    #[serde(default)]
    pub confidence: f64,
    #[serde(default, skip_serializing)]
    pub start: Option<i64>,
    #[serde(default, skip_serializing)]
    pub end: Option<i64>,
}

/// A sentiment annotation for the memory text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sentiment {
    #[serde(alias = "sentiment_score")]
    pub score: f64,
    #[serde(alias = "sentiment_label")]
    pub label: String,
    #[serde(default)]
    pub confidence: f64,
}

/// A stored memory with its annotations, as read by the retrieval paths.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MemoryRecord {
    pub id: i64,
    pub user_id: i64,
    pub raw_text: String,
    pub processed_text: Option<String>,
    #[serde(rename = "type")]
    pub memory_type: MemoryType,
    /// RFC 3339 UTC timestamp.
    pub timestamp: String,
    pub metadata: MemoryMetadata,
    pub entities: Vec<Entity>,
    pub sentiments: Vec<Sentiment>,
}

impl MemoryRecord {
    /// Text blob searched by the keyword scorer: processed text, then raw text.
    pub fn search_blob(&self) -> String {
        format!(
            "{} {}",
            self.processed_text.as_deref().unwrap_or(""),
            self.raw_text
        )
    }
}
