use anyhow::Result;
use colored::Colorize;
use comfy_table::{presets::UTF8_FULL, Cell, Color, ContentArrangement, Table};
use logvault::config::{self, Config};
use tracing::info;

/// Execute the config show command
///
/// Displays the effective configuration with the connection password masked
pub fn show(path: Option<&str>) -> Result<()> {
    info!("Loading configuration for display");

    let cfg = config::load_config(path)?;
    let sanitized = sanitize_secrets(&cfg);

    println!("{}", "Current Configuration:".green().bold());
    println!();

    let toml_string = toml::to_string_pretty(&sanitized)?;
    println!("{}", toml_string);
    Ok(())
}

/// Execute the config validate command
pub fn validate(path: Option<&str>) -> Result<()> {
    println!("{}", "Validating configuration...".yellow());

    let cfg = config::load_config(path)?;

    println!("{}", "✓ Configuration is valid".green());
    println!();

    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(vec![
        Cell::new("SETTING").fg(Color::Cyan),
        Cell::new("VALUE").fg(Color::Cyan),
    ]);
    table.add_row(vec!["Backend", cfg.store.backend.as_str()]);
    table.add_row(vec![
        "Default limit".to_string(),
        limit_label(cfg.store.default_limit),
    ]);
    table.add_row(vec![
        "Tag overrides".to_string(),
        cfg.store.tag_limits.len().to_string(),
    ]);
    table.add_row(vec!["Persist own logs", if cfg.logging.persist { "yes" } else { "no" }]);
    println!("{table}");

    info!("Configuration validation successful");
    Ok(())
}

fn limit_label(limit: i64) -> String {
    if limit <= 0 {
        "unbounded".to_string()
    } else {
        limit.to_string()
    }
}

fn sanitize_secrets(cfg: &Config) -> Config {
    let mut sanitized = cfg.clone();
    sanitized.store.url = mask_url_password(&cfg.store.url);
    sanitized
}

/// Mask the password of a connection URL
///
/// Example: "mysql://app:s3cret@db/logs" -> "mysql://app:***@db/logs"
fn mask_url_password(url: &str) -> String {
    let Some(scheme_end) = url.find("://") else {
        return url.to_string();
    };
    let rest = &url[scheme_end + 3..];
    let Some(at) = rest.find('@') else {
        return url.to_string();
    };
    let userinfo = &rest[..at];
    match userinfo.find(':') {
        Some(colon) => format!(
            "{}{}:***{}",
            &url[..scheme_end + 3],
            &userinfo[..colon],
            &rest[at..]
        ),
        None => url.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mask_url_password() {
        assert_eq!(
            mask_url_password("mysql://app:s3cret@db:3306/logs"),
            "mysql://app:***@db:3306/logs"
        );
        assert_eq!(mask_url_password("postgres://app@db/logs"), "postgres://app@db/logs");
        assert_eq!(mask_url_password("sqlite:./data/log.db"), "sqlite:./data/log.db");
    }

    #[test]
    fn test_limit_label() {
        assert_eq!(limit_label(0), "unbounded");
        assert_eq!(limit_label(500), "500");
    }
}
