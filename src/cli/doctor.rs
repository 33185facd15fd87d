//! CLI `doctor` command: run database diagnostics and print a health report.

use anyhow::{Context, Result};

use weirwood::config::WeirwoodConfig;
use weirwood::db;

pub fn doctor(config: &WeirwoodConfig) -> Result<()> {
    let db_path = config.resolved_db_path();

    if !db_path.exists() {
        println!("Database: not found at {}", db_path.display());
        println!("Run `weirwood serve` once to create it.");
        return Ok(());
    }

    let file_size = std::fs::metadata(&db_path).map(|m| m.len()).unwrap_or(0);

    let conn = db::open_database(&db_path, config.llm.embedding_dimensions)
        .context("failed to open database (may be corrupt)")?;
    let report = db::check_database_health(&conn).context("failed to run health check")?;

    println!("Weirwood Health Report");
    println!("======================");
    println!();
    println!("Database:          {}", db_path.display());
    println!("File size:         {}", format_bytes(file_size));
    println!("Schema version:    {}", report.schema_version);
    println!("sqlite-vec:        {}", report.sqlite_vec_version);
    println!();
    println!("Embeddings:");
    println!("  Stored model:    {}", report.embedding_model.as_deref().unwrap_or("(not set)"));
    println!("  Configured:      {}", config.llm.embedding_model);
    match report.embedding_dimensions {
        Some(dims) if dims != config.llm.embedding_dimensions => println!(
            "  WARNING: store holds {dims}-d vectors, config asks for {}. The server will refuse to start.",
            config.llm.embedding_dimensions
        ),
        Some(dims) => println!("  Dimensions:      {dims} (match)"),
        None => println!("  Dimensions:      (not recorded)"),
    }
    println!();
    println!("Row counts:");
    println!("  Users:           {}", report.user_count);
    println!("  Chats:           {}", report.chat_count);
    println!("  Messages:        {}", report.message_count);
    println!("  Memories:        {}", report.memory_count);
    println!();
    if report.integrity_ok {
        println!("Integrity check:   PASSED");
    } else {
        println!("Integrity check:   FAILED ({})", report.integrity_details);
        println!();
        println!("Restore from a backup: cp backup.db {}", db_path.display());
    }

    Ok(())
}

fn format_bytes(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{bytes} B")
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    }
}
