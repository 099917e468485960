use anyhow::{Context, Result};
use clap::Parser;

mod cli;
mod commands;

use logvault::{config, init_tracing, open_store, CaptureWriter};

#[tokio::main]
async fn main() -> Result<()> {
    let args = cli::Cli::parse();
    let config_path = args.config.as_deref();

    // Commands that never touch the store
    match args.get_command() {
        cli::Commands::Version => {
            println!("logvault v{}", env!("CARGO_PKG_VERSION"));
            return Ok(());
        }
        cli::Commands::Config { action } => {
            init_tracing(&config::LoggingConfig::default());
            return match action {
                cli::ConfigCommands::Show => commands::config::show(config_path),
                cli::ConfigCommands::Validate => commands::config::validate(config_path),
            };
        }
        _ => {}
    }

    let cfg = config::load_config(config_path).context("Failed to load configuration")?;
    let tracing_handle = init_tracing(&cfg.logging);
    let book = open_store(&cfg).await.context("Failed to open log store")?;

    let capture = cfg
        .logging
        .persist
        .then(|| CaptureWriter::spawn(book.clone()));
    if let Some(capture) = &capture {
        tracing_handle.attach_capture(capture.clone());
    }

    let result = match args.get_command() {
        cli::Commands::Show(show) => {
            commands::logs::show(&book, &show.tag, show.page, show.count, &show.format).await
        }
        cli::Commands::Tail { tag, bytes, format } => {
            commands::logs::tail(&book, &tag, bytes, &format).await
        }
        cli::Commands::Count { tag } => commands::logs::count(&book, &tag).await,
        cli::Commands::Write {
            tag,
            color,
            trace,
            message,
        } => commands::admin::write(&book, &tag, &color, &trace, &message).await,
        cli::Commands::Delete { tag, id, to } => commands::admin::delete(&book, &tag, id, to).await,
        cli::Commands::Prune { tag, before } => {
            commands::admin::prune(&book, tag.as_deref(), &before).await
        }
        cli::Commands::Clear { tag } => commands::admin::clear(&book, &tag).await,
        cli::Commands::ClearAll { yes } => commands::admin::clear_all(&book, yes).await,
        cli::Commands::Version | cli::Commands::Config { .. } => Ok(()),
    };

    if let Some(capture) = capture {
        capture.flush().await;
    }
    book.close().await;

    result
}
