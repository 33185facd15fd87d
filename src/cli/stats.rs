use anyhow::Result;

use weirwood::config::WeirwoodConfig;

/// Display row counts in the terminal.
pub fn stats(config: &WeirwoodConfig) -> Result<()> {
    let db_path = config.resolved_db_path();
    let conn = weirwood::db::open_database(&db_path, config.llm.embedding_dimensions)?;

    let response = weirwood::store::stats::collect_stats(&conn)?;

    println!("Weirwood Statistics");
    println!("{}", "=".repeat(40));
    println!("  Users:               {}", response.users);
    println!("  Chats:               {}", response.chats);
    println!("  Messages:            {}", response.messages);
    println!("  Memories:            {}", response.memories);
    println!();

    println!("Messages by role:");
    for role in &["user", "model", "system"] {
        let count = response.messages_by_role.get(*role).copied().unwrap_or(0);
        println!("  {:<12} {}", role, count);
    }

    if let Some(ref oldest) = response.oldest_message {
        println!();
        println!("Oldest message:        {oldest}");
    }
    if let Some(ref newest) = response.newest_message {
        println!("Newest message:        {newest}");
    }

    Ok(())
}
