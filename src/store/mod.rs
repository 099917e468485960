//! Log store backends
//!
//! Every backend implements [`LogStore`]. The relational adapters share the
//! rotation policy from [`crate::rotation`] and the schema-repair helper in
//! [`sql`]; each keeps its dialect's SQL text to itself.
//!
//! | Backend    | Rotation | Paging | Tail read |
//! |------------|----------|--------|-----------|
//! | `file`     | no       | no     | yes       |
//! | `sqlite`   | yes      | yes    | no        |
//! | `mysql`    | yes      | yes    | no        |
//! | `postgres` | yes      | yes    | no        |

pub mod file;
pub mod mysql;
pub mod postgres;
pub mod sql;
pub mod sqlite;

use async_trait::async_trait;
use chrono::NaiveDateTime;
use std::sync::Arc;

use crate::error::{Result, StoreError};
use crate::record::{LogRecord, NewLog};
use crate::rotation::Limits;

pub use file::{FileLogStore, FileStoreOptions};
pub use mysql::MySqlLogStore;
pub use postgres::PostgresLogStore;
pub use sql::TableLayout;
pub use sqlite::SqliteLogStore;

/// Operations every log backend provides
#[async_trait]
pub trait LogStore: Send + Sync {
    /// Short backend name used in diagnostics (`file`, `sqlite`, ...)
    fn backend(&self) -> &'static str;

    /// Capacity limits, for backends that rotate
    fn limits(&self) -> Option<&Arc<Limits>> {
        None
    }

    /// Store one entry, applying the rotation policy where supported
    async fn save_log(&self, log: &NewLog) -> Result<()>;

    /// Remove one row; returns rows removed (0 or 1)
    async fn delete_log(&self, tag: &str, id: i64) -> Result<u64>;

    /// Remove rows of `tag` with `start <= id <= stop`
    async fn delete_log_range(&self, tag: &str, start: i64, stop: i64) -> Result<u64>;

    /// Remove rows of `tag` created strictly before `before`
    async fn delete_tag_logs(&self, tag: &str, before: NaiveDateTime) -> Result<u64>;

    /// Remove rows of every tag created strictly before `before`
    async fn delete_logs(&self, before: NaiveDateTime) -> Result<u64>;

    /// Remove every row of `tag`
    async fn clear_tag_logs(&self, tag: &str) -> Result<u64>;

    /// Remove every row of every tag and restart ids at 1
    async fn clear_logs(&self) -> Result<()>;

    /// One page of `tag`, newest first, starting at `page * count`
    async fn fetch_logs(&self, tag: &str, page: u32, count: u32) -> Result<Vec<LogRecord>>;

    /// Number of rows stored for `tag`
    async fn total_count(&self, tag: &str) -> Result<u64>;

    /// Approximately the last `approx_bytes` of `tag`, oldest first
    async fn tail_logs(&self, _tag: &str, _approx_bytes: i64) -> Result<Vec<LogRecord>> {
        Err(StoreError::Unsupported {
            backend: self.backend(),
            operation: "tail_logs",
        })
    }

    /// Push buffered entries to durable storage
    async fn flush(&self) -> Result<()> {
        Ok(())
    }

    /// Stop accepting operations; idempotent
    async fn close(&self) -> Result<()>;
}
