//! SQLite adapter
//!
//! `created_at` is stored as fixed-width text (`%Y-%m-%d %H:%M:%S%.3f`), so
//! string comparison in SQL is chronological comparison.

use async_trait::async_trait;
use chrono::NaiveDateTime;
use sqlx::sqlite::{SqlitePool, SqliteRow};
use sqlx::Row;
use std::sync::Arc;

use super::sql::{self, with_schema, Schema, SchemaState, TableLayout};
use super::LogStore;
use crate::error::{Result, StoreError};
use crate::record::{format_timestamp, parse_timestamp, LogRecord, NewLog};
use crate::rotation::{Limits, RingTable, Rotation};

/// Log store on an externally supplied SQLite pool
pub struct SqliteLogStore {
    pool: SqlitePool,
    layout: TableLayout,
    rotation: Rotation,
    schema: SchemaState,
}

impl SqliteLogStore {
    pub fn new(pool: SqlitePool, layout: TableLayout, limits: Arc<Limits>) -> Self {
        Self {
            pool,
            layout,
            rotation: Rotation::new(limits),
            schema: SchemaState::default(),
        }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    fn create_table_sql(table: &str) -> String {
        format!(
            "CREATE TABLE IF NOT EXISTS {table} (
                id INTEGER PRIMARY KEY,
                tag TEXT NOT NULL DEFAULT '',
                log TEXT NOT NULL,
                trace TEXT NOT NULL,
                color TEXT NOT NULL DEFAULT '',
                created_at TEXT NOT NULL
            )"
        )
    }

    fn create_index_sql(table: &str) -> String {
        format!(
            "CREATE INDEX IF NOT EXISTS {} ON {table} (tag, created_at)",
            sql::index_name(table)
        )
    }

    fn record_from_row(row: &SqliteRow) -> std::result::Result<LogRecord, sqlx::Error> {
        let raw_ts: String = row.try_get("created_at")?;
        let created_at = parse_timestamp(&raw_ts).ok_or_else(|| {
            sqlx::Error::Decode(format!("invalid created_at value: {raw_ts}").into())
        })?;
        Ok(LogRecord {
            id: row.try_get("id")?,
            tag: row.try_get("tag")?,
            color: row.try_get("color")?,
            trace: row.try_get("trace")?,
            message: row.try_get("log")?,
            created_at,
        })
    }

    /// Log tables present in the database that belong to this layout
    async fn log_tables(&self) -> Result<Vec<String>> {
        let names: Vec<String> =
            sqlx::query_scalar("SELECT name FROM sqlite_master WHERE type = 'table'")
                .fetch_all(&self.pool)
                .await?;
        Ok(names
            .into_iter()
            .filter(|name| self.layout.owns_table(name))
            .collect())
    }
}

impl Schema for SqliteLogStore {
    fn schema_state(&self) -> &SchemaState {
        &self.schema
    }

    async fn create_table(&self, table: &str) -> std::result::Result<(), sqlx::Error> {
        sqlx::query(&Self::create_table_sql(table))
            .execute(&self.pool)
            .await?;
        sqlx::query(&Self::create_index_sql(table))
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    fn is_missing_table(err: &sqlx::Error) -> bool {
        match err {
            sqlx::Error::Database(db_err) => db_err.message().contains("no such table"),
            _ => false,
        }
    }
}

#[async_trait]
impl RingTable for SqliteLogStore {
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
        let created_at = format_timestamp(&created_at);
        with_schema(self, &table, || {
            sqlx::query(&query)
                .bind(&log.tag)
                .bind(&log.color)
                .bind(&log.trace)
                .bind(&log.message)
                .bind(&created_at)
                .execute(&self.pool)
        })
        .await?;
        Ok(())
    }

    async fn delete_oldest(&self, tag: &str, n: u64) -> Result<u64> {
        let table = self.layout.table_for(tag)?;
        let query = format!(
            "DELETE FROM {table} WHERE id IN (
                SELECT id FROM {table} WHERE tag = ? ORDER BY created_at, id LIMIT ?
            )"
        );
        let limit = i64::try_from(n).unwrap_or(i64::MAX);
        let result = with_schema(self, &table, || {
            sqlx::query(&query).bind(tag).bind(limit).execute(&self.pool)
        })
        .await?;
        Ok(result.rows_affected())
    }

    async fn overwrite_oldest(&self, log: &NewLog, created_at: NaiveDateTime) -> Result<u64> {
        let table = self.layout.table_for(&log.tag)?;
        let query = format!(
            "UPDATE {table} SET color = ?, trace = ?, log = ?, created_at = ?
             WHERE id = (
                SELECT id FROM {table} WHERE tag = ? ORDER BY created_at, id LIMIT 1
             )"
        );
        let created_at = format_timestamp(&created_at);
        let result = with_schema(self, &table, || {
            sqlx::query(&query)
                .bind(&log.color)
                .bind(&log.trace)
                .bind(&log.message)
                .bind(&created_at)
                .bind(&log.tag)
                .execute(&self.pool)
        })
        .await?;
        Ok(result.rows_affected())
    }
}

#[async_trait]
impl LogStore for SqliteLogStore {
    fn backend(&self) -> &'static str {
        "sqlite"
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
        let before = format_timestamp(&before);
        let result = with_schema(self, &table, || {
            sqlx::query(&query).bind(tag).bind(&before).execute(&self.pool)
        })
        .await?;
        Ok(result.rows_affected())
    }

    async fn delete_logs(&self, before: NaiveDateTime) -> Result<u64> {
        self.schema.check_open()?;
        let before = format_timestamp(&before);
        let mut removed = 0;
        for table in self.log_tables().await? {
            let query = format!("DELETE FROM {table} WHERE created_at < ?");
            let result = with_schema(self, &table, || {
                sqlx::query(&query).bind(&before).execute(&self.pool)
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

    /// Drop and recreate every log table in one transaction
    ///
    /// `INTEGER PRIMARY KEY` restarts at 1 on a fresh table.
    async fn clear_logs(&self) -> Result<()> {
        self.schema.check_open()?;
        let mut tables = self.log_tables().await?;
        if !tables.iter().any(|t| t == sql::BASE_TABLE) {
            tables.push(sql::BASE_TABLE.to_string());
        }

        let mut tx = self.pool.begin().await?;
        for table in &tables {
            sqlx::query(&format!("DROP TABLE IF EXISTS {table}"))
                .execute(&mut *tx)
                .await?;
            sqlx::query(&Self::create_table_sql(table))
                .execute(&mut *tx)
                .await?;
            sqlx::query(&Self::create_index_sql(table))
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;

        self.schema.forget_all();
        for table in &tables {
            self.schema.mark_ready(table);
        }
        tracing::info!(tables = tables.len(), "Cleared all log tables");
        Ok(())
    }

    async fn fetch_logs(&self, tag: &str, page: u32, count: u32) -> Result<Vec<LogRecord>> {
        let table = self.layout.table_for(tag)?;
        let query = format!(
            "SELECT id, tag, color, trace, log, created_at FROM {table}
             WHERE tag = ?
             ORDER BY created_at DESC, id DESC
             LIMIT ? OFFSET ?"
        );
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
