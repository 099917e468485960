//! Commands that modify the store

use anyhow::{Context, Result};
use colored::Colorize;
use logvault::record::parse_timestamp;
use logvault::LogBook;
use tracing::info;

use super::logs::tag_label;

/// Execute the write command
pub async fn write(book: &LogBook, tag: &str, color: &str, trace: &str, message: &str) -> Result<()> {
    if !book.save_log(tag, color, trace, message).await {
        anyhow::bail!("Entry was not stored (backend: {})", book.backend_name());
    }
    book.flush().await;
    println!("{}", format!("✓ Stored entry in {}", tag_label(tag)).green());
    Ok(())
}

/// Execute the delete command
pub async fn delete(book: &LogBook, tag: &str, id: i64, to: Option<i64>) -> Result<()> {
    if let Some(stop) = to {
        if stop < id {
            anyhow::bail!("--to {} is below the first id {}", stop, id);
        }
        let removed = book.delete_log_range(tag, id, stop).await;
        println!(
            "{}",
            format!("✓ Deleted {} entries of {} with ids {}..={}", removed, tag_label(tag), id, stop).green()
        );
        return Ok(());
    }

    let removed = book.delete_log(tag, id).await;
    if removed == 0 {
        println!("{}", format!("No entry #{} in {}", id, tag_label(tag)).yellow());
    } else {
        println!("{}", format!("✓ Deleted entry #{}", id).green());
    }
    Ok(())
}

/// Execute the prune command; `None` prunes every tag
pub async fn prune(book: &LogBook, tag: Option<&str>, before: &str) -> Result<()> {
    let boundary = parse_timestamp(before)
        .with_context(|| format!("Invalid timestamp '{}', expected YYYY-MM-DD HH:MM:SS[.mmm]", before))?;

    let (removed, scope) = match tag {
        Some(tag) => (book.delete_tag_logs(tag, boundary).await, tag_label(tag)),
        None => (book.delete_logs(boundary).await, "all tags"),
    };
    info!(scope = %scope, removed, "Pruned log entries");
    println!(
        "{}",
        format!("✓ Deleted {} entries of {} before {}", removed, scope, before).green()
    );
    Ok(())
}

/// Execute the clear command
pub async fn clear(book: &LogBook, tag: &str) -> Result<()> {
    let removed = book.clear_tag_logs(tag).await;
    println!(
        "{}",
        format!("✓ Cleared {} ({} entries removed)", tag_label(tag), removed).green()
    );
    Ok(())
}

/// Execute the clear-all command
pub async fn clear_all(book: &LogBook, confirmed: bool) -> Result<()> {
    if !confirmed {
        eprintln!("{}", "This removes every entry of every tag.".yellow());
        eprintln!("Re-run with --yes to confirm.");
        return Ok(());
    }

    if !book.clear_logs().await {
        anyhow::bail!("Failed to clear the {} backend", book.backend_name());
    }
    println!("{}", "✓ All log entries removed".green());
    Ok(())
}
