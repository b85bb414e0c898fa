//! HTTP embedding provider for OpenAI-compatible `/embeddings` endpoints.
//!
//! The embedding models themselves run in a separate service; this client sends
//! `{"model", "input"}` and reads `data[*].embedding` back, checking the dimension
//! count and L2-normalizing so that sqlite-vec L2 distances map onto cosine similarity.

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::{l2_normalize, EmbeddingProvider};
use crate::config::EmbeddingConfig;

pub struct HttpEmbeddingProvider {
    client: reqwest::Client,
    url: String,
    api_key: Option<String>,
    model: String,
    dimensions: usize,
}

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a [&'a str],
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingDatum>,
}

#[derive(Deserialize)]
struct EmbeddingDatum {
    #[serde(default)]
    index: Option<usize>,
    embedding: Vec<f32>,
}

impl HttpEmbeddingProvider {
    pub fn new(config: &EmbeddingConfig, model: &str, dimensions: usize) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .context("failed to build embedding HTTP client")?;

        Ok(Self {
            client,
            url: format!("{}/embeddings", config.endpoint.trim_end_matches('/')),
            api_key: config.api_key.clone(),
            model: model.to_string(),
            dimensions,
        })
    }
}

#[async_trait]
impl EmbeddingProvider for HttpEmbeddingProvider {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let texts = [text];
        let mut request = self.client.post(&self.url).json(&EmbeddingRequest {
            model: &self.model,
            input: &texts,
        });
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request
            .send()
            .await
            .with_context(|| format!("embedding request to {} failed", self.url))?;

        anyhow::ensure!(
            response.status().is_success(),
            "embedding service returned HTTP {}",
            response.status()
        );

        let body: EmbeddingResponse = response
            .json()
            .await
            .context("failed to decode embedding response")?;

        parse_embeddings(body, texts.len(), self.dimensions)?
            .into_iter()
            .next()
            .context("embedding service returned no vectors")
    }

    fn model(&self) -> &str {
        &self.model
    }
}

/// Order vectors by `index` (when present), check shape, and normalize.
fn parse_embeddings(
    mut body: EmbeddingResponse,
    expected: usize,
    dimensions: usize,
) -> Result<Vec<Vec<f32>>> {
    anyhow::ensure!(
        body.data.len() == expected,
        "embedding service returned {} vectors for {expected} inputs",
        body.data.len()
    );

    body.data.sort_by_key(|d| d.index.unwrap_or(0));

    body.data
        .into_iter()
        .map(|d| {
            anyhow::ensure!(
                d.embedding.len() == dimensions,
                "unexpected embedding size: {}, expected {dimensions}",
                d.embedding.len()
            );
            Ok(l2_normalize(&d.embedding))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn response(json: &str) -> EmbeddingResponse {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn parse_orders_by_index_and_normalizes() {
        let body = response(
            r#"{"data": [
                {"index": 1, "embedding": [0.0, 2.0]},
                {"index": 0, "embedding": [3.0, 4.0]}
            ]}"#,
        );
        let vectors = parse_embeddings(body, 2, 2).unwrap();
        assert!((vectors[0][0] - 0.6).abs() < 1e-6);
        assert!((vectors[1][1] - 1.0).abs() < 1e-6);
    }

    #[test]
    fn parse_rejects_wrong_dimensions() {
        let body = response(r#"{"data": [{"embedding": [1.0, 0.0, 0.0]}]}"#);
        let err = parse_embeddings(body, 1, 2).unwrap_err();
        assert!(err.to_string().contains("unexpected embedding size"));
    }

    #[test]
    fn parse_rejects_missing_vectors() {
        let body = response(r#"{"data": []}"#);
        assert!(parse_embeddings(body, 1, 2).is_err());
    }

    #[test]
    fn url_is_joined_without_double_slash() {
        let config = EmbeddingConfig {
            endpoint: "http://localhost:9000/v1/".into(),
            ..EmbeddingConfig::default()
        };
        let provider = HttpEmbeddingProvider::new(&config, "m", 4).unwrap();
        assert_eq!(provider.url, "http://localhost:9000/v1/embeddings");
    }
}
