use anyhow::Result;

use memoir::config::MemoirConfig;
use memoir::memory::types::MemoryType;

/// Display memory statistics for the default user.
pub fn stats(config: &MemoirConfig) -> Result<()> {
    let db_path = config.resolved_db_path();
    let conn = memoir::db::open_database(&db_path)?;
    let owner = config.storage.default_user_id;

    let response = memoir::memory::stats::memory_stats(&conn, owner, Some(&db_path))?;

    println!("Memory Statistics (user {owner})");
    println!("{}", "=".repeat(40));
    println!("  Total memories:      {}", response.total_memories);
    println!("  Active:              {}", response.active_memories);
    println!("  Deleted:             {}", response.deleted_memories);
    println!();

    println!("By Type:");
    for t in MemoryType::ALL {
        let count = response.by_type.get(t.as_str()).copied().unwrap_or(0);
        println!("  {:<12} {}", t, count);
    }
    println!();

    println!("Entities:              {}", response.entity_count);
    if let Some(mean) = response.mean_sentiment {
        println!("Mean sentiment:        {mean:.3}");
    }
    println!("Database size:         {} bytes", response.db_size_bytes);

    if let Some(ref oldest) = response.oldest_memory {
        println!("Oldest memory:         {oldest}");
    }
    if let Some(ref newest) = response.newest_memory {
        println!("Newest memory:         {newest}");
    }

    Ok(())
}
