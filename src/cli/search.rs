use anyhow::Result;

use memoir::config::MemoirConfig;
use memoir::context::AppContext;
use memoir::memory::search::{parse_type_filter, SearchMode, SearchRequest};

use super::preview;

/// Run a hybrid search from the terminal as the default user.
pub async fn search(
    config: MemoirConfig,
    query: &str,
    limit: Option<usize>,
    mode: &str,
    memory_types: Option<&str>,
) -> Result<()> {
    let mode: SearchMode = mode.parse()?;
    let types = parse_type_filter(None, memory_types)?;
    let owner = config.storage.default_user_id;
    let limit = limit.unwrap_or(config.retrieval.default_limit);

    let ctx = AppContext::from_config(config)?;
    let request = SearchRequest {
        query: query.to_string(),
        owner,
        limit,
        mode,
        types,
    };
    let outcome = ctx.searcher.search(&request, &ctx.search_profile).await?;

    let b = outcome.breakdown;
    println!(
        "Candidates: keyword {}, semantic {}, image {}",
        b.keyword_matches, b.semantic_matches, b.image_matches
    );

    if outcome.results.is_empty() {
        println!("No results found.");
        return Ok(());
    }

    println!("Found {} result(s)\n", outcome.results.len());

    for (i, result) in outcome.results.iter().enumerate() {
        let sources: Vec<&str> = result.match_types.iter().map(|m| m.as_str()).collect();
        println!(
            "  {}. [{}] #{} {} (hybrid: {:.4}, via {})",
            i + 1,
            result.memory.memory_type,
            result.memory.id,
            result.memory.timestamp,
            result.hybrid_score,
            sources.join("+"),
        );
        println!("     {}", preview(&result.memory.raw_text, 120));
        if let Some(url) = &result.image_url {
            println!("     {url}");
        }
        println!();
    }

    Ok(())
}
