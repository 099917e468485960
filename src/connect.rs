//! Building the configured store
//!
//! The only place that opens connections or folders. Adapters receive ready
//! pools and never tune them.

use sqlx::mysql::{MySqlConnectOptions, MySqlPoolOptions};
use sqlx::postgres::{PgConnectOptions, PgPoolOptions};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use crate::config::{Config, StoreBackend, StoreConfig};
use crate::error::{Result, StoreError};
use crate::logbook::LogBook;
use crate::rotation::Limits;
use crate::store::{
    FileLogStore, FileStoreOptions, LogStore, MySqlLogStore, PostgresLogStore, SqliteLogStore,
};

const ACQUIRE_TIMEOUT: Duration = Duration::from_secs(30);

/// Open the backend selected by `cfg.store`
///
/// `backend = "none"` yields a disabled book.
pub async fn open_store(cfg: &Config) -> Result<LogBook> {
    let store: Arc<dyn LogStore> = match cfg.store.backend {
        StoreBackend::None => {
            tracing::info!("Log store disabled");
            return Ok(LogBook::disabled());
        }
        StoreBackend::File => {
            let options = FileStoreOptions::new(&cfg.file.folder, cfg.file.name.clone())
                .with_flush_interval(cfg.file.flush_interval())
                .with_buffer_size(cfg.file.buffer_size);
            Arc::new(FileLogStore::open(options)?)
        }
        StoreBackend::Sqlite => Arc::new(SqliteLogStore::new(
            connect_sqlite(&cfg.store).await?,
            cfg.store.table_layout,
            limits(&cfg.store),
        )),
        StoreBackend::Mysql => {
            let options = MySqlConnectOptions::from_str(&cfg.store.url)?;
            let pool = MySqlPoolOptions::new()
                .max_connections(cfg.store.max_connections)
                .acquire_timeout(ACQUIRE_TIMEOUT)
                .connect_with(options)
                .await?;
            Arc::new(MySqlLogStore::new(pool, cfg.store.table_layout, limits(&cfg.store)))
        }
        StoreBackend::Postgres => {
            let options = PgConnectOptions::from_str(&cfg.store.url)?;
            let pool = PgPoolOptions::new()
                .max_connections(cfg.store.max_connections)
                .acquire_timeout(ACQUIRE_TIMEOUT)
                .connect_with(options)
                .await?;
            Arc::new(PostgresLogStore::new(pool, cfg.store.table_layout, limits(&cfg.store)))
        }
    };

    tracing::info!(
        backend = store.backend(),
        default_limit = cfg.store.default_limit,
        "Log store opened"
    );
    Ok(LogBook::new(store))
}

fn limits(cfg: &StoreConfig) -> Arc<Limits> {
    Arc::new(Limits::new(cfg.default_limit, cfg.tag_limits.clone()))
}

fn is_memory_url(url: &str) -> bool {
    url.contains(":memory:") || url.contains("mode=memory")
}

async fn connect_sqlite(cfg: &StoreConfig) -> Result<sqlx::SqlitePool> {
    if is_memory_url(&cfg.url) {
        // Each connection to an in-memory database is its own database.
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect(&cfg.url)
            .await?;
        return Ok(pool);
    }

    let options = SqliteConnectOptions::from_str(&cfg.url)?
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Wal)
        .busy_timeout(Duration::from_secs(30))
        .pragma("synchronous", "NORMAL");

    if let Some(parent) = Path::new(options.get_filename()).parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent).map_err(|e| {
                StoreError::Config(format!("cannot create {}: {}", parent.display(), e))
            })?;
        }
    }

    let pool = SqlitePoolOptions::new()
        .max_connections(cfg.max_connections)
        .acquire_timeout(ACQUIRE_TIMEOUT)
        .connect_with(options)
        .await?;
    Ok(pool)
}
