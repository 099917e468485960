//! Read-only commands: show, tail and count

use anyhow::Result;
use colored::Colorize;
use comfy_table::{presets::UTF8_FULL, Cell, Color as CellColor, ContentArrangement, Table};
use logvault::record::format_timestamp;
use logvault::{Color, LogBook, LogRecord};

/// Display tag name, `(default)` for the empty tag
pub fn tag_label(tag: &str) -> &str {
    if tag.is_empty() {
        "(default)"
    } else {
        tag
    }
}

/// Execute the show command
pub async fn show(book: &LogBook, tag: &str, page: u32, count: u32, format: &str) -> Result<()> {
    let result = book.get_logs(tag, page, count).await;

    let Some(logs) = result.logs else {
        eprintln!(
            "{}",
            format!("Could not read logs of {} from the {} backend", tag_label(tag), book.backend_name()).red()
        );
        return Ok(());
    };

    match format {
        "json" => {
            println!("{}", serde_json::to_string_pretty(&logs)?);
        }
        _ => {
            println!(
                "{}",
                format!(
                    "{}: page {} ({} of {} entries)",
                    tag_label(tag),
                    page,
                    logs.len(),
                    result.total
                )
                .bold()
            );
            println!();
            display_logs_text(&logs);
        }
    }

    Ok(())
}

/// Execute the tail command
pub async fn tail(book: &LogBook, tag: &str, bytes: i64, format: &str) -> Result<()> {
    let logs = book.tail_logs(tag, bytes).await;

    if logs.is_empty() {
        println!("{}", "No logs found".yellow());
        return Ok(());
    }

    match format {
        "json" => println!("{}", serde_json::to_string_pretty(&logs)?),
        _ => display_logs_text(&logs),
    }
    Ok(())
}

/// Execute the count command
pub async fn count(book: &LogBook, tags: &[String]) -> Result<()> {
    let default_tag = [String::new()];
    let tags = if tags.is_empty() { &default_tag[..] } else { tags };

    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(vec![
        Cell::new("TAG").fg(CellColor::Cyan),
        Cell::new("ENTRIES").fg(CellColor::Cyan),
    ]);

    for tag in tags {
        let total = book.total_count(tag).await;
        table.add_row(vec![Cell::new(tag_label(tag)), Cell::new(total)]);
    }

    println!("Backend: {}", book.backend_name().bold());
    println!("{table}");
    Ok(())
}

/// Display records in human-friendly text format, colored by their marker
fn display_logs_text(logs: &[LogRecord]) {
    for log in logs {
        let message = match Color::parse(&log.color) {
            Some(color) => log.message.color(console_color(color)),
            None => log.message.normal(),
        };
        let id = if log.id > 0 {
            format!("#{} ", log.id)
        } else {
            String::new()
        };

        println!(
            "{} {}{} {}",
            format_timestamp(&log.created_at).dimmed(),
            id.dimmed(),
            log.trace.cyan(),
            message
        );
    }
}

fn console_color(color: Color) -> colored::Color {
    match color {
        Color::Black => colored::Color::Black,
        Color::White => colored::Color::White,
        Color::Red => colored::Color::Red,
        Color::Green => colored::Color::Green,
        Color::Yellow => colored::Color::Yellow,
        Color::Blue => colored::Color::Blue,
        Color::Magenta => colored::Color::Magenta,
        Color::Cyan => colored::Color::Cyan,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tag_label() {
        assert_eq!(tag_label(""), "(default)");
        assert_eq!(tag_label("api"), "api");
    }

    #[test]
    fn test_console_color() {
        assert_eq!(console_color(Color::Red), colored::Color::Red);
        assert_eq!(console_color(Color::Cyan), colored::Color::Cyan);
    }
}
