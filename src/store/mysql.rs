//! MySQL adapter
//!
//! MySQL accepts `ORDER BY ... LIMIT` directly on `UPDATE` and `DELETE`, so
//! the oldest rows are addressed without a subquery (MySQL also refuses a
//! subquery on the table being modified).

use async_trait::async_trait;
use chrono::NaiveDateTime;
use sqlx::mysql::{MySqlPool, MySqlRow};
use sqlx::Row;
use std::sync::Arc;

use super::sql::{self, with_schema, Schema, SchemaState, TableLayout};
use super::LogStore;
use crate::error::{Result, StoreError};
use crate::record::{LogRecord, NewLog};
use crate::rotation::{Limits, RingTable, Rotation};

/// SQLSTATE for ER_NO_SUCH_TABLE (error 1146)
const NO_SUCH_TABLE: &str = "42S02";

/// Log store on an externally supplied MySQL pool
pub struct MySqlLogStore {
    pool: MySqlPool,
    layout: TableLayout,
    rotation: Rotation,
    schema: SchemaState,
}

impl MySqlLogStore {
    pub fn new(pool: MySqlPool, layout: TableLayout, limits: Arc<Limits>) -> Self {
        Self {
            pool,
            layout,
            rotation: Rotation::new(limits),
            schema: SchemaState::default(),
        }
    }

    /// Table and index in one statement; MySQL index names are per table
    fn create_table_sql(table: &str) -> String {
        format!(
            "CREATE TABLE IF NOT EXISTS {table} (
                id BIGINT PRIMARY KEY AUTO_INCREMENT,
                tag VARCHAR(255) NOT NULL DEFAULT '',
                log TEXT NOT NULL,
                trace VARCHAR(255) NOT NULL,
                color VARCHAR(16) NOT NULL DEFAULT '',
                created_at DATETIME(3) NOT NULL DEFAULT CURRENT_TIMESTAMP(3),
                INDEX idx_tag_created_at (tag, created_at)
            )"
        )
    }

    fn delete_oldest_sql(table: &str) -> String {
        format!("DELETE FROM {table} WHERE tag = ? ORDER BY created_at, id LIMIT ?")
    }

    fn overwrite_oldest_sql(table: &str) -> String {
        format!(
            "UPDATE {table} SET color = ?, trace = ?, log = ?, created_at = ?
             WHERE tag = ? ORDER BY created_at, id LIMIT 1"
        )
    }

    fn page_sql(table: &str) -> String {
        format!(
            "SELECT id, tag, color, trace, log, created_at FROM {table}
             WHERE tag = ?
             ORDER BY created_at DESC, id DESC
             LIMIT ? OFFSET ?"
        )
    }

    fn is_missing_table_code(code: Option<&str>) -> bool {
        code == Some(NO_SUCH_TABLE)
    }

    fn record_from_row(row: &MySqlRow) -> std::result::Result<LogRecord, sqlx::Error> {
        Ok(LogRecord {
            id: row.try_get("id")?,
            tag: row.try_get("tag")?,
            color: row.try_get("color")?,
            trace: row.try_get("trace")?,
            message: row.try_get("log")?,
            created_at: row.try_get("created_at")?,
        })
    }

    async fn log_tables(&self) -> Result<Vec<String>> {
        let names: Vec<String> = sqlx::query_scalar(
            "SELECT table_name FROM information_schema.tables WHERE table_schema = DATABASE()",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(names
            .into_iter()
            .filter(|name| self.layout.owns_table(name))
            .collect())
    }
}

impl Schema for MySqlLogStore {
    fn schema_state(&self) -> &SchemaState {
        &self.schema
    }

    async fn create_table(&self, table: &str) -> std::result::Result<(), sqlx::Error> {
        sqlx::query(&Self::create_table_sql(table))
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    fn is_missing_table(err: &sqlx::Error) -> bool {
        match err {
            sqlx::Error::Database(db_err) => Self::is_missing_table_code(db_err.code().as_deref()),
            _ => false,
        }
    }
}

#[async_trait]
impl RingTable for MySqlLogStore {
    async fn count(&self, tag: &str) -> Result<u64> {
        let table = self.layout.table_for(tag)?;
        let query = format!("SELECT COUNT(*) FROM {table} WHERE tag = ?");
        let total: i64 = with_schema(self, &table, || {
            sqlx::query_scalar(&query).bind(tag).fetch_one(&self.pool)
        })
        .await?;
        Ok(total.max(0) as u64)
    }

    async fn insert(&self, log: &NewLog, created_at: NaiveDateTime) -> Result<()> {
        let table = self.layout.table_for(&log.tag)?;
        let query =
            format!("INSERT INTO {table} (tag, color, trace, log, created_at) VALUES (?, ?, ?, ?, ?)");
        with_schema(self, &table, || {
            sqlx::query(&query)
                .bind(&log.tag)
                .bind(&log.color)
                .bind(&log.trace)
                .bind(&log.message)
                .bind(created_at)
                .execute(&self.pool)
        })
        .await?;
        Ok(())
    }

    async fn delete_oldest(&self, tag: &str, n: u64) -> Result<u64> {
        let table = self.layout.table_for(tag)?;
        let query = Self::delete_oldest_sql(&table);
        let result = with_schema(self, &table, || {
            sqlx::query(&query).bind(tag).bind(n).execute(&self.pool)
        })
        .await?;
        Ok(result.rows_affected())
    }

    async fn overwrite_oldest(&self, log: &NewLog, created_at: NaiveDateTime) -> Result<u64> {
        let table = self.layout.table_for(&log.tag)?;
        let query = Self::overwrite_oldest_sql(&table);
        let result = with_schema(self, &table, || {
            sqlx::query(&query)
                .bind(&log.color)
                .bind(&log.trace)
                .bind(&log.message)
                .bind(created_at)
                .bind(&log.tag)
                .execute(&self.pool)
        })
        .await?;
        Ok(result.rows_affected())
    }
}

#[async_trait]
impl LogStore for MySqlLogStore {
    fn backend(&self) -> &'static str {
        "mysql"
    }

    fn limits(&self) -> Option<&Arc<Limits>> {
        Some(self.rotation.limits())
    }

    async fn save_log(&self, log: &NewLog) -> Result<()> {
        self.schema.check_open()?;
        self.rotation.save(self, log).await?;
        Ok(())
    }

    async fn delete_log(&self, tag: &str, id: i64) -> Result<u64> {
        let table = self.layout.table_for(tag)?;
        let query = format!("DELETE FROM {table} WHERE tag = ? AND id = ?");
        let result = with_schema(self, &table, || {
            sqlx::query(&query).bind(tag).bind(id).execute(&self.pool)
        })
        .await?;
        Ok(result.rows_affected())
    }

    async fn delete_log_range(&self, tag: &str, start: i64, stop: i64) -> Result<u64> {
        let table = self.layout.table_for(tag)?;
        let query = format!("DELETE FROM {table} WHERE tag = ? AND id BETWEEN ? AND ?");
        let result = with_schema(self, &table, || {
            sqlx::query(&query).bind(tag).bind(start).bind(stop).execute(&self.pool)
        })
        .await?;
        Ok(result.rows_affected())
    }

    async fn delete_tag_logs(&self, tag: &str, before: NaiveDateTime) -> Result<u64> {
        let table = self.layout.table_for(tag)?;
        let query = format!("DELETE FROM {table} WHERE tag = ? AND created_at < ?");
        let result = with_schema(self, &table, || {
            sqlx::query(&query).bind(tag).bind(before).execute(&self.pool)
        })
        .await?;
        Ok(result.rows_affected())
    }

    async fn delete_logs(&self, before: NaiveDateTime) -> Result<u64> {
        self.schema.check_open()?;
        let mut removed = 0;
        for table in self.log_tables().await? {
            let query = format!("DELETE FROM {table} WHERE created_at < ?");
            let result = with_schema(self, &table, || {
                sqlx::query(&query).bind(before).execute(&self.pool)
            })
            .await?;
            removed += result.rows_affected();
        }
        Ok(removed)
    }

    async fn clear_tag_logs(&self, tag: &str) -> Result<u64> {
        let table = self.layout.table_for(tag)?;
        let query = format!("DELETE FROM {table} WHERE tag = ?");
        let result = with_schema(self, &table, || {
            sqlx::query(&query).bind(tag).execute(&self.pool)
        })
        .await?;
        Ok(result.rows_affected())
    }

    /// `TRUNCATE` drops all rows and resets `AUTO_INCREMENT` atomically per table
    async fn clear_logs(&self) -> Result<()> {
        self.schema.check_open()?;
        let mut tables = self.log_tables().await?;
        if !tables.iter().any(|t| t == sql::BASE_TABLE) {
            tables.push(sql::BASE_TABLE.to_string());
        }

        for table in &tables {
            let query = format!("TRUNCATE TABLE {table}");
            with_schema(self, table, || sqlx::query(&query).execute(&self.pool)).await?;
        }
        tracing::info!(tables = tables.len(), "Truncated all log tables");
        Ok(())
    }

    async fn fetch_logs(&self, tag: &str, page: u32, count: u32) -> Result<Vec<LogRecord>> {
        let table = self.layout.table_for(tag)?;
        let query = Self::page_sql(&table);
        let offset = sql::page_offset(page, count);
        let rows = with_schema(self, &table, || {
            sqlx::query(&query)
                .bind(tag)
                .bind(i64::from(count))
                .bind(offset)
                .fetch_all(&self.pool)
        })
        .await?;

        rows.iter()
            .map(|row| Self::record_from_row(row).map_err(StoreError::from))
            .collect()
    }

    async fn total_count(&self, tag: &str) -> Result<u64> {
        self.count(tag).await
    }

    async fn close(&self) -> Result<()> {
        self.schema.close();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_oldest_row_statements_use_order_by_limit() {
        let delete = MySqlLogStore::delete_oldest_sql("log");
        assert!(delete.starts_with("DELETE FROM log WHERE tag = ?"));
        assert!(delete.ends_with("ORDER BY created_at, id LIMIT ?"));

        let update = MySqlLogStore::overwrite_oldest_sql("log_audit");
        assert!(update.starts_with("UPDATE log_audit SET"));
        assert!(update.contains("ORDER BY created_at, id LIMIT 1"));
        assert!(!update.contains("SELECT"));
    }

    #[test]
    fn test_page_is_newest_first() {
        let page = MySqlLogStore::page_sql("log");
        assert!(page.contains("ORDER BY created_at DESC, id DESC"));
        assert!(page.contains("LIMIT ? OFFSET ?"));
    }

    #[test]
    fn test_schema_has_millisecond_timestamp_and_index() {
        let ddl = MySqlLogStore::create_table_sql("log");
        assert!(ddl.contains("created_at DATETIME(3)"));
        assert!(ddl.contains("INDEX idx_tag_created_at (tag, created_at)"));
        assert!(ddl.contains("AUTO_INCREMENT"));
    }

    #[test]
    fn test_missing_table_code() {
        assert!(MySqlLogStore::is_missing_table_code(Some("42S02")));
        assert!(!MySqlLogStore::is_missing_table_code(Some("42000")));
        assert!(!MySqlLogStore::is_missing_table_code(None));
        assert!(!<MySqlLogStore as Schema>::is_missing_table(&sqlx::Error::RowNotFound));
    }
}
