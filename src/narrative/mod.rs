//! Answer generation from retrieved memories.
//!
//! [`Narrator`] turns a system prompt and a user prompt into one answer string.
//! [`ChatCompletionsNarrator`] implements it against any OpenAI-compatible
//! `/chat/completions` endpoint (Groq by default).

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::config::NarrativeConfig;

/// Answer used when the model returns no choices or an empty message.
pub const NO_ANSWER: &str = "I don't know.";

#[derive(Debug, thiserror::Error)]
pub enum NarrativeError {
    #[error("GROQ_API_KEY is not set")]
    MissingApiKey,
    #[error("narrative HTTP {status}: {message}")]
    Status { status: u16, message: String },
    #[error("narrative request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("failed to decode narrative response: {0}")]
    Decode(String),
}

/// Produces a natural-language answer.
#[async_trait]
pub trait Narrator: Send + Sync {
    async fn answer(&self, system_prompt: &str, user_prompt: &str) -> Result<String, NarrativeError>;
}

pub struct ChatCompletionsNarrator {
    client: reqwest::Client,
    url: String,
    api_key: Option<String>,
    model: String,
    max_tokens: u32,
    temperature: f32,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    temperature: f32,
    max_tokens: u32,
    messages: [ChatMessage<'a>; 2],
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    #[serde(default)]
    message: Option<ChoiceMessage>,
}

#[derive(Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

impl ChatCompletionsNarrator {
    pub fn new(config: &NarrativeConfig) -> Result<Self, NarrativeError> {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            client,
            url: format!("{}/chat/completions", config.base_url.trim_end_matches('/')),
            api_key: config.api_key.clone().filter(|k| !k.is_empty()),
            model: config.model.clone(),
            max_tokens: config.max_tokens,
            temperature: config.temperature,
        })
    }
}

#[async_trait]
impl Narrator for ChatCompletionsNarrator {
    async fn answer(&self, system_prompt: &str, user_prompt: &str) -> Result<String, NarrativeError> {
        let api_key = self.api_key.as_deref().ok_or(NarrativeError::MissingApiKey)?;

        let request = ChatRequest {
            model: &self.model,
            temperature: self.temperature,
            max_tokens: self.max_tokens,
            messages: [
                ChatMessage {
                    role: "system",
                    content: system_prompt,
                },
                ChatMessage {
                    role: "user",
                    content: user_prompt,
                },
            ],
        };

        let response = self
            .client
            .post(&self.url)
            .bearer_auth(api_key)
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(NarrativeError::Status {
                status: status.as_u16(),
                message: error_message(&body),
            });
        }

        let parsed: ChatResponse =
            serde_json::from_str(&body).map_err(|e| NarrativeError::Decode(e.to_string()))?;
        tracing::debug!(model = %self.model, choices = parsed.choices.len(), "narrative response");
        Ok(first_answer(parsed))
    }
}

/// Prefer `error.message`, then `message`, then the raw body.
fn error_message(body: &str) -> String {
    let Ok(value) = serde_json::from_str::<serde_json::Value>(body) else {
        return body.to_string();
    };
    value
        .pointer("/error/message")
        .or_else(|| value.get("message"))
        .and_then(|m| m.as_str())
        .map(str::to_string)
        .unwrap_or_else(|| body.to_string())
}

fn first_answer(response: ChatResponse) -> String {
    response
        .choices
        .into_iter()
        .next()
        .and_then(|c| c.message)
        .and_then(|m| m.content)
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| NO_ANSWER.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_choices_mean_no_answer() {
        let parsed: ChatResponse = serde_json::from_str(r#"{"choices": []}"#).unwrap();
        assert_eq!(first_answer(parsed), NO_ANSWER);
        let parsed: ChatResponse = serde_json::from_str(r#"{}"#).unwrap();
        assert_eq!(first_answer(parsed), NO_ANSWER);
    }

    #[test]
    fn first_choice_is_trimmed() {
        let parsed: ChatResponse = serde_json::from_str(
            r#"{"choices": [{"message": {"content": "  You went to Lisbon.\n"}}]}"#,
        )
        .unwrap();
        assert_eq!(first_answer(parsed), "You went to Lisbon.");
    }

    #[test]
    fn error_message_prefers_nested_error() {
        assert_eq!(error_message(r#"{"error": {"message": "rate limited"}}"#), "rate limited");
        assert_eq!(error_message(r#"{"message": "bad model"}"#), "bad model");
        assert_eq!(error_message("gateway timeout"), "gateway timeout");
    }

    #[tokio::test]
    async fn missing_key_fails_before_any_request() {
        let narrator = ChatCompletionsNarrator::new(&NarrativeConfig::default()).unwrap();
        let err = narrator.answer("sys", "user").await.unwrap_err();
        assert!(matches!(err, NarrativeError::MissingApiKey));
    }
}
