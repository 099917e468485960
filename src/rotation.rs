//! Bounded rotation policy
//!
//! Every tag is an independent ring of at most `limit` rows. Once a tag is
//! full, a save overwrites the oldest row in place instead of growing the
//! table. The decision is backend-neutral: relational adapters only provide
//! the four primitive statements of [`RingTable`].

use async_trait::async_trait;
use chrono::NaiveDateTime;
use dashmap::DashMap;
use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::error::Result;
use crate::record::NewLog;
use crate::trace;

/// Default per-tag capacity when neither the tag nor the config sets one
pub const DEFAULT_LIMIT: i64 = 10_000;

/// What a save does for a given row count and limit
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SavePlan {
    /// Add a new row
    Insert,
    /// Drop `surplus` oldest rows, then overwrite the oldest remaining one
    Overwrite { surplus: u64 },
}

/// Decide between insert and evict-in-place
///
/// A limit of zero or less disables rotation for the tag.
pub fn plan(count: u64, limit: i64) -> SavePlan {
    if limit <= 0 || count < limit as u64 {
        SavePlan::Insert
    } else {
        SavePlan::Overwrite {
            surplus: count - limit as u64,
        }
    }
}

/// Per-tag capacity limits
#[derive(Debug)]
pub struct Limits {
    default: AtomicI64,
    per_tag: DashMap<String, i64>,
}

impl Default for Limits {
    fn default() -> Self {
        Self::new(DEFAULT_LIMIT, HashMap::new())
    }
}

impl Limits {
    pub fn new(default: i64, per_tag: HashMap<String, i64>) -> Self {
        Self {
            default: AtomicI64::new(default),
            per_tag: per_tag.into_iter().collect(),
        }
    }

    /// Limit applied to `tag` (override if set, default otherwise)
    pub fn limit_for(&self, tag: &str) -> i64 {
        self.per_tag
            .get(tag)
            .map(|entry| *entry.value())
            .unwrap_or_else(|| self.default.load(Ordering::Relaxed))
    }

    /// Set the limit of one tag; `limit <= 0` makes the tag unbounded
    pub fn set_limit(&self, tag: &str, limit: i64) {
        self.per_tag.insert(tag.to_string(), limit);
    }

    /// Forget a tag override so the default applies again
    pub fn reset_limit(&self, tag: &str) {
        self.per_tag.remove(tag);
    }

    pub fn set_default(&self, limit: i64) {
        self.default.store(limit, Ordering::Relaxed);
    }

    pub fn default_limit(&self) -> i64 {
        self.default.load(Ordering::Relaxed)
    }
}

/// One async mutex per tag
///
/// Writers of different tags never wait on each other.
#[derive(Debug, Default)]
pub struct TagLocks {
    locks: DashMap<String, Arc<Mutex<()>>>,
}

impl TagLocks {
    pub async fn lock(&self, tag: &str) -> OwnedMutexGuard<()> {
        // Clone the Arc out so the map shard is not held across the await.
        let mutex = self.locks.entry(tag.to_string()).or_default().clone();
        mutex.lock_owned().await
    }
}

/// Primitive statements a relational adapter provides for rotation
#[async_trait]
pub trait RingTable: Send + Sync {
    /// Number of rows stored for `tag`
    async fn count(&self, tag: &str) -> Result<u64>;

    async fn insert(&self, log: &NewLog, created_at: NaiveDateTime) -> Result<()>;

    /// Delete the `n` rows with the smallest `(created_at, id)`; returns rows removed
    async fn delete_oldest(&self, tag: &str, n: u64) -> Result<u64>;

    /// Overwrite the row with the smallest `(created_at, id)`; returns rows touched
    async fn overwrite_oldest(&self, log: &NewLog, created_at: NaiveDateTime) -> Result<u64>;
}

/// Shared rotation state of one store: limits and the per-tag write locks
#[derive(Debug, Default)]
pub struct Rotation {
    limits: Arc<Limits>,
    locks: TagLocks,
}

impl Rotation {
    pub fn new(limits: Arc<Limits>) -> Self {
        Self {
            limits,
            locks: TagLocks::default(),
        }
    }

    pub fn limits(&self) -> &Arc<Limits> {
        &self.limits
    }

    /// Save `log` into `table` under the tag's limit
    ///
    /// The count-then-write sequence runs under the tag lock, so concurrent
    /// savers of one tag never target the same oldest row.
    pub async fn save<T>(&self, table: &T, log: &NewLog) -> Result<SavePlan>
    where
        T: RingTable + ?Sized,
    {
        let _guard = self.locks.lock(&log.tag).await;

        let limit = self.limits.limit_for(&log.tag);
        // Unbounded tags skip the count query entirely.
        let decision = if limit <= 0 {
            SavePlan::Insert
        } else {
            plan(table.count(&log.tag).await?, limit)
        };

        let created_at = trace::stamp();
        match decision {
            SavePlan::Insert => table.insert(log, created_at).await?,
            SavePlan::Overwrite { surplus } => {
                if surplus > 0 {
                    let removed = table.delete_oldest(&log.tag, surplus).await?;
                    tracing::debug!(tag = %log.tag, surplus, removed, "Trimmed surplus rows");
                }
                if table.overwrite_oldest(log, created_at).await? == 0 {
                    // The tag was emptied between the count and the update.
                    table.insert(log, created_at).await?;
                    return Ok(SavePlan::Insert);
                }
            }
        }
        Ok(decision)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex as StdMutex;

    #[test]
    fn test_plan_unbounded() {
        assert_eq!(plan(0, 0), SavePlan::Insert);
        assert_eq!(plan(1_000_000, -1), SavePlan::Insert);
    }

    #[test]
    fn test_plan_bounded() {
        assert_eq!(plan(2, 3), SavePlan::Insert);
        assert_eq!(plan(3, 3), SavePlan::Overwrite { surplus: 0 });
        assert_eq!(plan(7, 3), SavePlan::Overwrite { surplus: 4 });
    }

    #[test]
    fn test_limits_override_and_reset() {
        let limits = Limits::new(100, HashMap::from([("audit".to_string(), 5)]));
        assert_eq!(limits.limit_for("audit"), 5);
        assert_eq!(limits.limit_for(""), 100);

        limits.set_limit("", 0);
        assert_eq!(limits.limit_for(""), 0);

        limits.reset_limit("audit");
        limits.set_default(50);
        assert_eq!(limits.limit_for("audit"), 50);
    }

    /// In-memory ring used to exercise the policy without a database
    #[derive(Default)]
    struct MemTable {
        rows: StdMutex<Vec<(i64, String, String, NaiveDateTime)>>,
        next_id: StdMutex<i64>,
    }

    impl MemTable {
        fn messages(&self, tag: &str) -> Vec<String> {
            let mut rows: Vec<_> = self
                .rows
                .lock()
                .unwrap()
                .iter()
                .filter(|r| r.1 == tag)
                .cloned()
                .collect();
            rows.sort_by_key(|r| (r.3, r.0));
            rows.into_iter().map(|r| r.2).collect()
        }
    }

    #[async_trait]
    impl RingTable for MemTable {
        async fn count(&self, tag: &str) -> Result<u64> {
            Ok(self.rows.lock().unwrap().iter().filter(|r| r.1 == tag).count() as u64)
        }

        async fn insert(&self, log: &NewLog, created_at: NaiveDateTime) -> Result<()> {
            let mut id = self.next_id.lock().unwrap();
            *id += 1;
            self.rows
                .lock()
                .unwrap()
                .push((*id, log.tag.clone(), log.message.clone(), created_at));
            Ok(())
        }

        async fn delete_oldest(&self, tag: &str, n: u64) -> Result<u64> {
            let mut rows = self.rows.lock().unwrap();
            let mut ordered: Vec<_> = rows.iter().filter(|r| r.1 == tag).map(|r| (r.3, r.0)).collect();
            ordered.sort();
            let doomed: Vec<i64> = ordered.into_iter().take(n as usize).map(|(_, id)| id).collect();
            rows.retain(|r| !doomed.contains(&r.0));
            Ok(doomed.len() as u64)
        }

        async fn overwrite_oldest(&self, log: &NewLog, created_at: NaiveDateTime) -> Result<u64> {
            let mut rows = self.rows.lock().unwrap();
            let oldest = rows
                .iter_mut()
                .filter(|r| r.1 == log.tag)
                .min_by_key(|r| (r.3, r.0));
            match oldest {
                Some(row) => {
                    row.2 = log.message.clone();
                    row.3 = created_at;
                    Ok(1)
                }
                None => Ok(0),
            }
        }
    }

    fn log(tag: &str, message: &str) -> NewLog {
        NewLog::new(tag, "green", "rotation.rs:1", message)
    }

    #[tokio::test]
    async fn test_ring_keeps_most_recent() {
        let rotation = Rotation::new(Arc::new(Limits::new(3, HashMap::new())));
        let table = MemTable::default();

        for message in ["A", "B", "C", "D", "E"] {
            rotation.save(&table, &log("t", message)).await.unwrap();
        }

        assert_eq!(table.messages("t"), vec!["C", "D", "E"]);
    }

    #[tokio::test]
    async fn test_surplus_rows_are_trimmed() {
        let limits = Arc::new(Limits::new(0, HashMap::new()));
        let rotation = Rotation::new(limits.clone());
        let table = MemTable::default();

        for i in 0..6 {
            rotation.save(&table, &log("t", &i.to_string())).await.unwrap();
        }
        limits.set_limit("t", 2);

        let decision = rotation.save(&table, &log("t", "new")).await.unwrap();
        assert_eq!(decision, SavePlan::Overwrite { surplus: 4 });
        assert_eq!(table.messages("t"), vec!["5", "new"]);
    }

    #[tokio::test]
    async fn test_tags_are_independent() {
        let rotation = Rotation::new(Arc::new(Limits::new(2, HashMap::new())));
        let table = MemTable::default();

        for message in ["a1", "a2", "a3"] {
            rotation.save(&table, &log("a", message)).await.unwrap();
        }
        rotation.save(&table, &log("b", "b1")).await.unwrap();

        assert_eq!(table.messages("a"), vec!["a2", "a3"]);
        assert_eq!(table.messages("b"), vec!["b1"]);
    }

    #[tokio::test]
    async fn test_concurrent_saves_respect_limit() {
        let rotation = Arc::new(Rotation::new(Arc::new(Limits::new(5, HashMap::new()))));
        let table = Arc::new(MemTable::default());

        let mut handles = Vec::new();
        for i in 0..40 {
            let rotation = rotation.clone();
            let table = table.clone();
            handles.push(tokio::spawn(async move {
                rotation.save(table.as_ref(), &log("busy", &i.to_string())).await.unwrap();
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        assert_eq!(table.count("busy").await.unwrap(), 5);
    }
}
