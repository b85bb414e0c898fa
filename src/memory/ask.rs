//! Question answering over retrieved memories.
//!
//! Runs the hybrid search with the ask profile, turns the fused results into a
//! compact context block and hands it to a [`Narrator`].

use std::collections::BTreeSet;

use serde::Serialize;

use crate::memory::fusion::FusedResult;
use crate::memory::search::{
    HybridSearcher, SearchError, SearchMode, SearchProfile, SearchRequest,
};
use crate::memory::types::MemoryType;
use crate::narrative::{NarrativeError, Narrator};

pub const SYSTEM_PROMPT: &str = "You are a memory assistant.\n\
Answer the user's question using ONLY the retrieved memories.\n\
Do not quote or repeat the memories verbatim.\n\
First, infer the emotional tone of the retrieved memories (sad vs neutral/happy).\n\
If the tone is sad, respond with empathy and brief encouragement.\n\
If the tone is neutral or happy, respond politely and directly.\n\
If the answer is not present, say 'I don't know.'";

#[derive(Debug, Clone)]
pub struct AskRequest {
    pub question: String,
    pub owner: i64,
    pub limit: usize,
    pub mode: SearchMode,
    pub types: Option<BTreeSet<MemoryType>>,
}

#[derive(Debug, Serialize)]
pub struct AskResponse {
    pub question: String,
    pub answer: String,
    /// Ids of the memories given to the narrator, in fused order.
    pub memory_ids: Vec<i64>,
}

#[derive(Debug, thiserror::Error)]
pub enum AskError {
    #[error(transparent)]
    Invalid(#[from] SearchError),
    #[error(transparent)]
    Narrative(#[from] NarrativeError),
}

/// One context line per memory: `- (id=N, type=T) text`.
pub fn context_line(result: &FusedResult) -> String {
    let memory = &result.memory;
    let raw = memory.raw_text.trim();
    let text = if raw.is_empty() {
        memory.processed_text.as_deref().unwrap_or("").trim()
    } else {
        raw
    };
    let text = match (memory.memory_type, text.is_empty()) {
        (MemoryType::Image, false) => format!("Image memory caption: {text}"),
        (MemoryType::Image, true) => "Image memory".to_string(),
        (MemoryType::Voice, false) => format!("Voice memory transcript: {text}"),
        (MemoryType::Voice, true) => "Voice memory".to_string(),
        (MemoryType::Text, _) => text.to_string(),
    };
    format!("- (id={}, type={}) {text}", memory.id, memory.memory_type)
}

pub fn user_prompt(question: &str, results: &[FusedResult]) -> String {
    let lines: Vec<String> = results.iter().map(context_line).collect();
    format!("Question: {question}\n\nRetrieved memories:\n{}", lines.join("\n"))
}

/// Retrieve, then narrate. Retrieval never fails on source errors; the narrator can.
pub async fn ask(
    searcher: &HybridSearcher,
    narrator: &dyn Narrator,
    profile: &SearchProfile,
    request: AskRequest,
) -> Result<AskResponse, AskError> {
    let question = request.question.trim().to_string();
    if question.is_empty() {
        return Err(SearchError::EmptyQuestion.into());
    }

    let search = SearchRequest {
        query: question.clone(),
        owner: request.owner,
        limit: request.limit,
        mode: request.mode,
        types: request.types,
    };
    let outcome = searcher.search(&search, profile).await?;
    let memory_ids = outcome.results.iter().map(|r| r.memory.id).collect();

    let prompt = user_prompt(&question, &outcome.results);
    let answer = narrator.answer(SYSTEM_PROMPT, &prompt).await.map_err(|e| {
        tracing::error!(error = %e, "narrative request failed");
        e
    })?;

    Ok(AskResponse {
        question,
        answer,
        memory_ids,
    })
}
