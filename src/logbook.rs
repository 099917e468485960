//! The configured log store handle
//!
//! [`LogBook`] is what the rest of a program holds on to. It forwards every
//! call to the active backend, reports backend failures through `tracing`,
//! and hands back zero values instead of errors so that persisting a log
//! entry can never take the caller down with it. A disabled book
//! ([`LogBook::disabled`]) turns every call into a no-op.

use chrono::NaiveDateTime;
use std::sync::Arc;

use crate::error::StoreError;
use crate::record::{LogPage, LogRecord, NewLog};
use crate::store::LogStore;

#[derive(Clone, Default)]
pub struct LogBook {
    store: Option<Arc<dyn LogStore>>,
}

impl std::fmt::Debug for LogBook {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LogBook")
            .field("backend", &self.backend_name())
            .finish()
    }
}

impl LogBook {
    pub fn new(store: Arc<dyn LogStore>) -> Self {
        Self { store: Some(store) }
    }

    /// A book with no backend; every operation is a no-op
    pub fn disabled() -> Self {
        Self { store: None }
    }

    pub fn is_enabled(&self) -> bool {
        self.store.is_some()
    }

    /// Backend name, or `none` when disabled
    pub fn backend_name(&self) -> &'static str {
        self.store.as_ref().map_or("none", |store| store.backend())
    }

    pub fn store(&self) -> Option<&Arc<dyn LogStore>> {
        self.store.as_ref()
    }

    fn report(&self, operation: &'static str, tag: &str, err: &StoreError) {
        if err.is_unavailable() {
            tracing::debug!(target: "logvault", operation, tag = %tag, error = %err, "Log store unavailable");
        } else {
            tracing::error!(
                target: "logvault",
                backend = self.backend_name(),
                operation,
                tag = %tag,
                error = %err,
                "Log store operation failed"
            );
        }
    }

    /// Persist one entry; false when it was not stored
    pub async fn save_log(&self, tag: &str, color: &str, trace: &str, message: &str) -> bool {
        self.save(&NewLog::new(tag, color, trace, message)).await
    }

    pub async fn save(&self, log: &NewLog) -> bool {
        let Some(store) = &self.store else {
            return false;
        };
        match store.save_log(log).await {
            Ok(()) => true,
            Err(e) => {
                self.report("save_log", &log.tag, &e);
                false
            }
        }
    }

    /// One page of `tag`, newest first
    ///
    /// The page and the total are queried separately: a failed page leaves
    /// `logs` as `None` while `total` is still filled in.
    pub async fn get_logs(&self, tag: &str, page: u32, count: u32) -> LogPage {
        let Some(store) = &self.store else {
            return LogPage::default();
        };

        let total = match store.total_count(tag).await {
            Ok(total) => total,
            Err(e) => {
                self.report("total_count", tag, &e);
                0
            }
        };
        let logs = match store.fetch_logs(tag, page, count).await {
            Ok(logs) => Some(logs),
            Err(e) => {
                self.report("get_logs", tag, &e);
                None
            }
        };
        LogPage { logs, total }
    }

    pub async fn delete_log(&self, tag: &str, id: i64) -> u64 {
        let Some(store) = &self.store else {
            return 0;
        };
        store.delete_log(tag, id).await.unwrap_or_else(|e| {
            self.report("delete_log", tag, &e);
            0
        })
    }

    /// Remove entries of `tag` whose id is in `start..=stop`
    pub async fn delete_log_range(&self, tag: &str, start: i64, stop: i64) -> u64 {
        let Some(store) = &self.store else {
            return 0;
        };
        store.delete_log_range(tag, start, stop).await.unwrap_or_else(|e| {
            self.report("delete_log_range", tag, &e);
            0
        })
    }

    /// Remove entries of `tag` written strictly before `before`
    pub async fn delete_tag_logs(&self, tag: &str, before: NaiveDateTime) -> u64 {
        let Some(store) = &self.store else {
            return 0;
        };
        store.delete_tag_logs(tag, before).await.unwrap_or_else(|e| {
            self.report("delete_tag_logs", tag, &e);
            0
        })
    }

    /// Remove entries of every tag written strictly before `before`
    pub async fn delete_logs(&self, before: NaiveDateTime) -> u64 {
        let Some(store) = &self.store else {
            return 0;
        };
        store.delete_logs(before).await.unwrap_or_else(|e| {
            self.report("delete_logs", "", &e);
            0
        })
    }

    pub async fn clear_tag_logs(&self, tag: &str) -> u64 {
        let Some(store) = &self.store else {
            return 0;
        };
        store.clear_tag_logs(tag).await.unwrap_or_else(|e| {
            self.report("clear_tag_logs", tag, &e);
            0
        })
    }

    /// Remove everything; false when the backend failed or is disabled
    pub async fn clear_logs(&self) -> bool {
        let Some(store) = &self.store else {
            return false;
        };
        match store.clear_logs().await {
            Ok(()) => true,
            Err(e) => {
                self.report("clear_logs", "", &e);
                false
            }
        }
    }

    pub async fn total_count(&self, tag: &str) -> u64 {
        let Some(store) = &self.store else {
            return 0;
        };
        store.total_count(tag).await.unwrap_or_else(|e| {
            self.report("total_count", tag, &e);
            0
        })
    }

    /// Roughly the last `approx_bytes` of `tag`, oldest first (file backend)
    pub async fn tail_logs(&self, tag: &str, approx_bytes: i64) -> Vec<LogRecord> {
        let Some(store) = &self.store else {
            return Vec::new();
        };
        store.tail_logs(tag, approx_bytes).await.unwrap_or_else(|e| {
            self.report("tail_logs", tag, &e);
            Vec::new()
        })
    }

    /// Change the capacity of one tag; false when the backend does not rotate
    pub fn set_limit(&self, tag: &str, limit: i64) -> bool {
        match self.store.as_ref().and_then(|store| store.limits()) {
            Some(limits) => {
                limits.set_limit(tag, limit);
                true
            }
            None => false,
        }
    }

    pub async fn flush(&self) {
        if let Some(store) = &self.store {
            if let Err(e) = store.flush().await {
                self.report("flush", "", &e);
            }
        }
    }

    /// Flush and close the backend; later calls fail quietly
    pub async fn close(&self) {
        if let Some(store) = &self.store {
            if let Err(e) = store.close().await {
                self.report("close", "", &e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Result;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn test_disabled_book_is_a_noop() {
        let book = LogBook::disabled();
        assert!(!book.is_enabled());
        assert_eq!(book.backend_name(), "none");
        assert!(!book.save_log("", "red", "x.rs:1", "lost").await);
        assert_eq!(book.get_logs("", 0, 10).await, LogPage::default());
        assert_eq!(book.delete_log("", 1).await, 0);
        assert_eq!(book.delete_log_range("", 1, 5).await, 0);
        assert_eq!(book.delete_logs(crate::trace::stamp()).await, 0);
        assert_eq!(book.clear_tag_logs("").await, 0);
        assert!(!book.clear_logs().await);
        assert_eq!(book.total_count("").await, 0);
        assert!(book.tail_logs("", 0).await.is_empty());
        assert!(!book.set_limit("", 3));
        book.flush().await;
        book.close().await;
    }

    /// Backend whose page query fails but whose count works
    struct BrokenPages {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl LogStore for BrokenPages {
        fn backend(&self) -> &'static str {
            "broken"
        }

        async fn save_log(&self, _log: &NewLog) -> Result<()> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Err(StoreError::Io(std::io::Error::other("disk gone")))
        }

        async fn delete_log(&self, _tag: &str, _id: i64) -> Result<u64> {
            Ok(1)
        }

        async fn delete_log_range(&self, _tag: &str, start: i64, stop: i64) -> Result<u64> {
            Ok((stop - start + 1).max(0) as u64)
        }

        async fn delete_tag_logs(&self, _tag: &str, _before: NaiveDateTime) -> Result<u64> {
            Err(StoreError::Closed)
        }

        async fn delete_logs(&self, _before: NaiveDateTime) -> Result<u64> {
            Err(StoreError::Io(std::io::Error::other("locked")))
        }

        async fn clear_tag_logs(&self, _tag: &str) -> Result<u64> {
            Ok(4)
        }

        async fn clear_logs(&self) -> Result<()> {
            Ok(())
        }

        async fn fetch_logs(&self, _tag: &str, _page: u32, _count: u32) -> Result<Vec<LogRecord>> {
            Err(StoreError::Io(std::io::Error::other("page failed")))
        }

        async fn total_count(&self, _tag: &str) -> Result<u64> {
            Ok(12)
        }

        async fn close(&self) -> Result<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_errors_become_zero_values() {
        let store = Arc::new(BrokenPages {
            calls: AtomicUsize::new(0),
        });
        let book = LogBook::new(store.clone());

        assert!(book.is_enabled());
        assert_eq!(book.backend_name(), "broken");
        assert!(!book.save_log("t", "red", "x.rs:1", "msg").await);
        assert_eq!(store.calls.load(Ordering::SeqCst), 1);

        let page = book.get_logs("t", 0, 10).await;
        assert_eq!(page.logs, None);
        assert_eq!(page.total, 12);

        assert_eq!(book.delete_log("t", 1).await, 1);
        assert_eq!(book.delete_log_range("t", 3, 7).await, 5);
        assert_eq!(book.delete_tag_logs("t", crate::trace::stamp()).await, 0);
        assert_eq!(book.delete_logs(crate::trace::stamp()).await, 0);
        assert_eq!(book.clear_tag_logs("t").await, 4);
        assert!(book.clear_logs().await);
        assert!(book.tail_logs("t", 0).await.is_empty());
        assert!(!book.set_limit("t", 3));
    }
}
