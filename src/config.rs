use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::info;

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct MemoirConfig {
    pub server: ServerConfig,
    pub storage: StorageConfig,
    pub embedding: EmbeddingConfig,
    pub retrieval: RetrievalConfig,
    pub ask: AskConfig,
    pub narrative: NarrativeConfig,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub log_level: String,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct StorageConfig {
    pub db_path: String,
    /// Owner used by the MCP tools and the CLI, which have no auth header.
    pub default_user_id: i64,
    pub image_url_prefix: String,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct EmbeddingConfig {
    /// Base URL of an OpenAI-compatible embedding service (`{endpoint}/embeddings`).
    pub endpoint: String,
    pub api_key: Option<String>,
    pub text_model: String,
    /// CLIP model whose text encoder shares the space of the stored image embeddings.
    pub image_model: String,
    pub timeout_secs: u64,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct RetrievalConfig {
    pub rrf_k: usize,
    pub default_limit: usize,
    pub max_limit: usize,
    pub semantic_threshold: f64,
    pub image_threshold: f64,
    pub semantic_candidate_factor: usize,
    pub image_candidate_factor: usize,
    pub source_timeout_ms: u64,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct AskConfig {
    pub default_limit: usize,
    pub max_limit: usize,
    pub semantic_threshold: f64,
    pub image_threshold: f64,
    pub semantic_candidate_factor: usize,
    pub image_candidate_factor: usize,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct NarrativeConfig {
    pub base_url: String,
    pub model: String,
    pub api_key: Option<String>,
    pub timeout_secs: u64,
    pub max_tokens: u32,
    pub temperature: f32,
}

impl Default for MemoirConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            storage: StorageConfig::default(),
            embedding: EmbeddingConfig::default(),
            retrieval: RetrievalConfig::default(),
            ask: AskConfig::default(),
            narrative: NarrativeConfig::default(),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".into(),
            port: 8000,
            log_level: "info".into(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        let db_path = default_memoir_dir()
            .join("memory.db")
            .to_string_lossy()
            .into_owned();
        Self {
            db_path,
            default_user_id: 1,
            image_url_prefix: "/api/v1/images".into(),
        }
    }
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            endpoint: "http://127.0.0.1:8081/v1".into(),
            api_key: None,
            text_model: "all-MiniLM-L6-v2".into(),
            image_model: "clip-ViT-B-32".into(),
            timeout_secs: 30,
        }
    }
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            rrf_k: 60,
            default_limit: 50,
            max_limit: 500,
            semantic_threshold: 0.5,
            image_threshold: 0.35,
            semantic_candidate_factor: 2,
            image_candidate_factor: 2,
            source_timeout_ms: 10_000,
        }
    }
}

impl Default for AskConfig {
    fn default() -> Self {
        Self {
            default_limit: 8,
            max_limit: 30,
            semantic_threshold: 0.10,
            image_threshold: 0.0,
            semantic_candidate_factor: 3,
            image_candidate_factor: 2,
        }
    }
}

impl Default for NarrativeConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.groq.com/openai/v1".into(),
            model: "llama-3.1-8b-instant".into(),
            api_key: None,
            timeout_secs: 60,
            max_tokens: 350,
            temperature: 0.3,
        }
    }
}

/// Returns `~/.memoir/`
pub fn default_memoir_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".memoir")
}

/// Returns the default config file path: `~/.memoir/config.toml`
pub fn default_config_path() -> PathBuf {
    default_memoir_dir().join("config.toml")
}

impl MemoirConfig {
    /// Load config from TOML file (if it exists) then apply env var overrides.
    pub fn load() -> Result<Self> {
        Self::load_from(default_config_path())
    }

    /// Load from a specific path, then apply env var overrides.
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let mut config = if path.exists() {
            let contents =
                std::fs::read_to_string(path).context("failed to read config file")?;
            toml::from_str(&contents).context("failed to parse config TOML")?
        } else {
            info!("no config file at {}, using defaults", path.display());
            MemoirConfig::default()
        };

        config.apply_env_overrides();
        Ok(config)
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(val) = std::env::var("MEMOIR_DB") {
            self.storage.db_path = val;
        }
        if let Ok(val) = std::env::var("MEMOIR_LOG_LEVEL") {
            self.server.log_level = val;
        }
        if let Ok(val) = std::env::var("MEMOIR_HOST") {
            self.server.host = val;
        }
        if let Ok(val) = std::env::var("MEMOIR_PORT") {
            match val.parse() {
                Ok(port) => self.server.port = port,
                Err(_) => tracing::warn!(value = %val, "ignoring invalid MEMOIR_PORT"),
            }
        }
        if let Ok(val) = std::env::var("MEMOIR_EMBEDDING_URL") {
            self.embedding.endpoint = val;
        }
        if let Ok(val) = std::env::var("GROQ_API_KEY") {
            self.narrative.api_key = Some(val);
        }
        if let Ok(val) = std::env::var("GROQ_BASE_URL") {
            self.narrative.base_url = val;
        }
        if let Ok(val) = std::env::var("GROQ_MODEL") {
            self.narrative.model = val;
        }
    }

    /// Resolve the database path, expanding `~` if needed.
    pub fn resolved_db_path(&self) -> PathBuf {
        expand_tilde(&self.storage.db_path)
    }
}

pub fn expand_tilde(path: &str) -> PathBuf {
    match (path.strip_prefix("~/"), dirs::home_dir()) {
        (Some(rest), Some(home)) => home.join(rest),
        _ => PathBuf::from(path),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let config = MemoirConfig::default();
        assert_eq!(config.server.port, 8000);
        assert_eq!(config.server.log_level, "info");
        assert_eq!(config.storage.default_user_id, 1);
        assert_eq!(config.retrieval.rrf_k, 60);
        assert_eq!(config.retrieval.max_limit, 500);
        assert_eq!(config.ask.max_limit, 30);
        assert!(config.storage.db_path.ends_with("memory.db"));
    }

    #[test]
    fn parse_toml_config() {
        let toml_str = r#"
[server]
log_level = "debug"
port = 9100

[storage]
db_path = "/tmp/test.db"

[retrieval]
semantic_threshold = 0.6
"#;
        let config: MemoirConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.server.log_level, "debug");
        assert_eq!(config.server.port, 9100);
        assert_eq!(config.storage.db_path, "/tmp/test.db");
        assert!((config.retrieval.semantic_threshold - 0.6).abs() < 1e-9);
        // defaults still apply for unset fields
        assert_eq!(config.retrieval.rrf_k, 60);
        assert!((config.retrieval.image_threshold - 0.35).abs() < 1e-9);
        assert_eq!(config.narrative.model, "llama-3.1-8b-instant");
    }

    #[test]
    fn env_overrides_apply() {
        let mut config = MemoirConfig::default();
        std::env::set_var("MEMOIR_DB", "/tmp/override.db");
        std::env::set_var("MEMOIR_PORT", "9999");
        std::env::set_var("MEMOIR_LOG_LEVEL", "trace");

        config.apply_env_overrides();

        assert_eq!(config.storage.db_path, "/tmp/override.db");
        assert_eq!(config.server.port, 9999);
        assert_eq!(config.server.log_level, "trace");

        std::env::remove_var("MEMOIR_DB");
        std::env::remove_var("MEMOIR_PORT");
        std::env::remove_var("MEMOIR_LOG_LEVEL");
    }

    #[test]
    fn missing_file_falls_back_to_defaults() {
        let tmp = tempfile::TempDir::new().unwrap();
        let config = MemoirConfig::load_from(tmp.path().join("absent.toml")).unwrap();
        assert_eq!(config.retrieval.default_limit, 50);
    }
}
