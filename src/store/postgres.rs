//! PostgreSQL adapter
//!
//! PostgreSQL has no `LIMIT` on `UPDATE`/`DELETE`; the oldest rows are picked
//! by id in a subquery instead.

use async_trait::async_trait;
use chrono::NaiveDateTime;
use sqlx::postgres::{PgPool, PgRow};
use sqlx::Row;
use std::sync::Arc;

use super::sql::{self, with_schema, Schema, SchemaState, TableLayout};
use super::LogStore;
use crate::error::{Result, StoreError};
use crate::record::{LogRecord, NewLog};
use crate::rotation::{Limits, RingTable, Rotation};

/// SQLSTATE `undefined_table`
const UNDEFINED_TABLE: &str = "42P01";

/// Log store on an externally supplied PostgreSQL pool
pub struct PostgresLogStore {
    pool: PgPool,
    layout: TableLayout,
    rotation: Rotation,
    schema: SchemaState,
}

impl PostgresLogStore {
    pub fn new(pool: PgPool, layout: TableLayout, limits: Arc<Limits>) -> Self {
        Self {
            pool,
            layout,
            rotation: Rotation::new(limits),
            schema: SchemaState::default(),
        }
    }

    fn create_table_sql(table: &str) -> String {
        format!(
            "CREATE TABLE IF NOT EXISTS {table} (
                id BIGSERIAL PRIMARY KEY,
                tag VARCHAR(255) NOT NULL DEFAULT '',
                log TEXT NOT NULL,
                trace VARCHAR(255) NOT NULL,
                color VARCHAR(16) NOT NULL DEFAULT '',
                created_at TIMESTAMP(3) NOT NULL DEFAULT CURRENT_TIMESTAMP
            )"
        )
    }

    fn create_index_sql(table: &str) -> String {
        format!(
            "CREATE INDEX IF NOT EXISTS {} ON {table} (tag, created_at)",
            sql::index_name(table)
        )
    }

    fn delete_oldest_sql(table: &str) -> String {
        format!(
            "DELETE FROM {table} WHERE id IN (
                SELECT id FROM {table} WHERE tag = $1 ORDER BY created_at, id LIMIT $2
            )"
        )
    }

    fn overwrite_oldest_sql(table: &str) -> String {
        format!(
            "UPDATE {table} SET color = $1, trace = $2, log = $3, created_at = $4
             WHERE id = (
                SELECT id FROM {table} WHERE tag = $5 ORDER BY created_at, id LIMIT 1
             )"
        )
    }

    fn page_sql(table: &str) -> String {
        format!(
            "SELECT id, tag, color, trace, log, created_at FROM {table}
             WHERE tag = $1
             ORDER BY created_at DESC, id DESC
             LIMIT $2 OFFSET $3"
        )
    }

    fn is_missing_table_code(code: Option<&str>) -> bool {
        code == Some(UNDEFINED_TABLE)
    }

    fn record_from_row(row: &PgRow) -> std::result::Result<LogRecord, sqlx::Error> {
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
            "SELECT tablename::text FROM pg_tables WHERE schemaname = current_schema()",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(names
            .into_iter()
            .filter(|name| self.layout.owns_table(name))
            .collect())
    }
}

impl Schema for PostgresLogStore {
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
            sqlx::Error::Database(db_err) => Self::is_missing_table_code(db_err.code().as_deref()),
            _ => false,
        }
    }
}

#[async_trait]
impl RingTable for PostgresLogStore {
    async fn count(&self, tag: &str) -> Result<u64> {
        let table = self.layout.table_for(tag)?;
        let query = format!("SELECT COUNT(*) FROM {table} WHERE tag = $1");
        let total: i64 = with_schema(self, &table, || {
            sqlx::query_scalar(&query).bind(tag).fetch_one(&self.pool)
        })
        .await?;
        Ok(total.max(0) as u64)
    }

    async fn insert(&self, log: &NewLog, created_at: NaiveDateTime) -> Result<()> {
        let table = self.layout.table_for(&log.tag)?;
        let query = format!(
            "INSERT INTO {table} (tag, color, trace, log, created_at) VALUES ($1, $2, $3, $4, $5)"
        );
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
        let limit = i64::try_from(n).unwrap_or(i64::MAX);
        let result = with_schema(self, &table, || {
            sqlx::query(&query).bind(tag).bind(limit).execute(&self.pool)
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
impl LogStore for PostgresLogStore {
    fn backend(&self) -> &'static str {
        "postgres"
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
        let query = format!("DELETE FROM {table} WHERE tag = $1 AND id = $2");
        let result = with_schema(self, &table, || {
            sqlx::query(&query).bind(tag).bind(id).execute(&self.pool)
        })
        .await?;
        Ok(result.rows_affected())
    }

    async fn delete_log_range(&self, tag: &str, start: i64, stop: i64) -> Result<u64> {
        let table = self.layout.table_for(tag)?;
        let query = format!("DELETE FROM {table} WHERE tag = $1 AND id BETWEEN $2 AND $3");
        let result = with_schema(self, &table, || {
            sqlx::query(&query).bind(tag).bind(start).bind(stop).execute(&self.pool)
        })
        .await?;
        Ok(result.rows_affected())
    }

    async fn delete_tag_logs(&self, tag: &str, before: NaiveDateTime) -> Result<u64> {
        let table = self.layout.table_for(tag)?;
        let query = format!("DELETE FROM {table} WHERE tag = $1 AND created_at < $2");
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
            let query = format!("DELETE FROM {table} WHERE created_at < $1");
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
        let query = format!("DELETE FROM {table} WHERE tag = $1");
        let result = with_schema(self, &table, || {
            sqlx::query(&query).bind(tag).execute(&self.pool)
        })
        .await?;
        Ok(result.rows_affected())
    }

    /// One `TRUNCATE ... RESTART IDENTITY` over every log table
    async fn clear_logs(&self) -> Result<()> {
        self.schema.check_open()?;
        let mut tables = self.log_tables().await?;
        if !tables.iter().any(|t| t == sql::BASE_TABLE) {
            tables.push(sql::BASE_TABLE.to_string());
        }
        for table in &tables {
            if !self.schema.is_ready(table) {
                self.create_table(table).await?;
                self.schema.mark_ready(table);
            }
        }

        let query = format!("TRUNCATE TABLE {} RESTART IDENTITY", tables.join(", "));
        sqlx::query(&query).execute(&self.pool).await?;
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
    fn test_oldest_row_statements_use_id_subquery() {
        let delete = PostgresLogStore::delete_oldest_sql("log");
        assert!(delete.contains("WHERE id IN ("));
        assert!(delete.contains("ORDER BY created_at, id LIMIT $2"));

        let update = PostgresLogStore::overwrite_oldest_sql("log");
        assert!(update.contains("created_at = $4"));
        assert!(update.contains("WHERE tag = $5 ORDER BY created_at, id LIMIT 1"));
    }

    #[test]
    fn test_page_uses_numbered_placeholders() {
        let page = PostgresLogStore::page_sql("log_api");
        assert!(page.contains("FROM log_api"));
        assert!(page.contains("LIMIT $2 OFFSET $3"));
        assert!(!page.contains('?'));
    }

    #[test]
    fn test_index_name_is_per_table() {
        assert_eq!(
            PostgresLogStore::create_index_sql("log_api"),
            "CREATE INDEX IF NOT EXISTS idx_log_api_tag_created_at ON log_api (tag, created_at)"
        );
    }

    #[test]
    fn test_missing_table_code() {
        assert!(PostgresLogStore::is_missing_table_code(Some("42P01")));
        assert!(!PostgresLogStore::is_missing_table_code(Some("42S02")));
        assert!(!<PostgresLogStore as Schema>::is_missing_table(&sqlx::Error::PoolClosed));
    }
}
