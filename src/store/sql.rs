//! Pieces shared by the relational adapters
//!
//! - [`TableLayout`]: one shared `log` table, or one table per tag
//! - [`SchemaState`]: which tables this process already created
//! - [`with_schema`]: run a statement, creating the table lazily and
//!   repairing it once if the database reports it missing

use dashmap::DashSet;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::error::{Result, StoreError};
use crate::record::check_name_tag;

/// Name of the shared table, and of the default tag's table in per-tag layout
pub const BASE_TABLE: &str = "log";

/// How rows are distributed over tables
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TableLayout {
    /// All tags in table `log`, partitioned by the `tag` column
    #[default]
    Shared,
    /// Legacy layout: `log` for the default tag, `log_<tag>` for the others
    PerTag,
}

impl TableLayout {
    pub fn table_for(&self, tag: &str) -> Result<String> {
        match self {
            Self::Shared => Ok(BASE_TABLE.to_string()),
            Self::PerTag if tag.is_empty() => Ok(BASE_TABLE.to_string()),
            Self::PerTag => {
                check_name_tag(tag, false)?;
                Ok(format!("{}_{}", BASE_TABLE, tag))
            }
        }
    }

    /// Whether `table` belongs to this layout's set of log tables
    pub fn owns_table(&self, table: &str) -> bool {
        match self {
            Self::Shared => table == BASE_TABLE,
            Self::PerTag => {
                table == BASE_TABLE
                    || table
                        .strip_prefix("log_")
                        .is_some_and(|suffix| check_name_tag(suffix, false).is_ok() && !suffix.is_empty())
            }
        }
    }
}

/// Index name for `table`; index names are schema-wide in SQLite and PostgreSQL
pub fn index_name(table: &str) -> String {
    format!("idx_{}_tag_created_at", table)
}

/// Row offset of a page, clamped to `i64::MAX`
pub fn page_offset(page: u32, count: u32) -> i64 {
    i64::from(page).saturating_mul(i64::from(count))
}

/// Tables known to exist, plus the closed flag of the adapter
#[derive(Debug, Default)]
pub struct SchemaState {
    ready: DashSet<String>,
    closed: AtomicBool,
}

impl SchemaState {
    pub fn is_ready(&self, table: &str) -> bool {
        self.ready.contains(table)
    }

    pub fn mark_ready(&self, table: &str) {
        self.ready.insert(table.to_string());
    }

    pub fn forget(&self, table: &str) {
        self.ready.remove(table);
    }

    pub fn forget_all(&self) {
        self.ready.clear();
    }

    pub fn close(&self) {
        self.closed.store(true, Ordering::Release);
    }

    pub fn check_open(&self) -> Result<()> {
        if self.closed.load(Ordering::Acquire) {
            Err(StoreError::Closed)
        } else {
            Ok(())
        }
    }
}

/// Dialect hooks needed for lazy creation and self-repair
pub trait Schema: Send + Sync {
    fn schema_state(&self) -> &SchemaState;

    /// Create `table` and its `(tag, created_at)` index if absent
    fn create_table(&self, table: &str) -> impl Future<Output = std::result::Result<(), sqlx::Error>> + Send;

    /// Whether `err` is this dialect's "table does not exist"
    fn is_missing_table(err: &sqlx::Error) -> bool;
}

/// Run `op` against `table`
///
/// The table is created on first use. If `op` fails because the table is
/// gone (dropped externally, or lost with an in-memory database), it is
/// recreated and `op` is retried exactly once.
pub async fn with_schema<S, T, F, Fut>(store: &S, table: &str, op: F) -> Result<T>
where
    S: Schema,
    F: Fn() -> Fut + Send + Sync,
    Fut: Future<Output = std::result::Result<T, sqlx::Error>> + Send,
    T: Send,
{
    let state = store.schema_state();
    state.check_open()?;

    if !state.is_ready(table) {
        store.create_table(table).await?;
        state.mark_ready(table);
    }

    match op().await {
        Err(err) if S::is_missing_table(&err) => {
            tracing::warn!(table = %table, error = %err, "Log table missing, recreating");
            state.forget(table);
            store.create_table(table).await?;
            state.mark_ready(table);
            Ok(op().await?)
        }
        other => Ok(other?),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shared_layout_uses_one_table() {
        let layout = TableLayout::Shared;
        assert_eq!(layout.table_for("").unwrap(), "log");
        assert_eq!(layout.table_for("any tag at all").unwrap(), "log");
        assert!(layout.owns_table("log"));
        assert!(!layout.owns_table("log_audit"));
    }

    #[test]
    fn test_per_tag_layout() {
        let layout = TableLayout::PerTag;
        assert_eq!(layout.table_for("").unwrap(), "log");
        assert_eq!(layout.table_for("audit").unwrap(), "log_audit");
        assert!(matches!(
            layout.table_for("a;drop"),
            Err(StoreError::InvalidTag(_))
        ));
        assert!(layout.owns_table("log_audit"));
        assert!(!layout.owns_table("log_"));
        assert!(!layout.owns_table("logs"));
    }

    #[test]
    fn test_page_offset() {
        assert_eq!(page_offset(0, 10), 0);
        assert_eq!(page_offset(3, 25), 75);
        assert_eq!(page_offset(u32::MAX, 1), i64::from(u32::MAX));
        assert_eq!(page_offset(u32::MAX, u32::MAX), i64::MAX);
    }

    #[test]
    fn test_schema_state_closed() {
        let state = SchemaState::default();
        assert!(state.check_open().is_ok());
        state.mark_ready("log");
        assert!(state.is_ready("log"));
        state.forget_all();
        assert!(!state.is_ready("log"));
        state.close();
        assert!(matches!(state.check_open(), Err(StoreError::Closed)));
    }

    #[test]
    fn test_layout_deserializes_snake_case() {
        let layout: TableLayout = serde_json::from_str("\"per_tag\"").unwrap();
        assert_eq!(layout, TableLayout::PerTag);
    }
}
