/// Integration tests for bounded rotation through the public LogBook API
use logvault::config::{Config, StoreBackend};
use logvault::{open_store, LogBook};
use std::collections::HashSet;
use tempfile::TempDir;

async fn sqlite_book(default_limit: i64) -> LogBook {
    let mut cfg = Config::default();
    cfg.store.backend = StoreBackend::Sqlite;
    cfg.store.url = "sqlite::memory:".to_string();
    cfg.store.default_limit = default_limit;
    open_store(&cfg).await.unwrap()
}

async fn messages(book: &LogBook, tag: &str) -> Vec<String> {
    book.get_logs(tag, 0, 1000)
        .await
        .logs
        .unwrap()
        .into_iter()
        .map(|r| r.message)
        .collect()
}

#[tokio::test]
async fn test_limit_three_keeps_last_three() {
    let book = sqlite_book(3).await;

    for message in ["A", "B", "C", "D", "E"] {
        assert!(book.save_log("t", "green", "rotation_tests.rs:1", message).await);
    }

    let page = book.get_logs("t", 0, 10).await;
    let got: Vec<_> = page.logs.unwrap().into_iter().map(|r| r.message).collect();
    assert_eq!(got, vec!["E", "D", "C"]);
    assert_eq!(page.total, 3);
}

#[tokio::test]
async fn test_bounded_tag_holds_most_recent_in_order() {
    let book = sqlite_book(10).await;

    for i in 0..37 {
        book.save_log("jobs", "blue", "rotation_tests.rs:2", &format!("{i:03}")).await;
    }

    assert_eq!(book.total_count("jobs").await, 10);
    let expected: Vec<String> = (27..37).rev().map(|i| format!("{i:03}")).collect();
    assert_eq!(messages(&book, "jobs").await, expected);
}

#[tokio::test]
async fn test_unbounded_tag_grows() {
    let book = sqlite_book(0).await;

    for i in 0..25 {
        book.save_log("", "white", "rotation_tests.rs:3", &i.to_string()).await;
    }
    assert_eq!(book.total_count("").await, 25);
}

#[tokio::test]
async fn test_pages_cover_everything_once() {
    let book = sqlite_book(0).await;
    for i in 0..23 {
        book.save_log("p", "green", "rotation_tests.rs:4", &i.to_string()).await;
    }

    let mut seen = Vec::new();
    for page in 0..5 {
        let logs = book.get_logs("p", page, 5).await.logs.unwrap();
        seen.extend(logs);
    }

    assert_eq!(seen.len(), 23);
    for pair in seen.windows(2) {
        assert!(pair[0].created_at > pair[1].created_at);
    }
    let ids: HashSet<i64> = seen.iter().map(|r| r.id).collect();
    assert_eq!(ids.len(), 23);
}

#[tokio::test]
async fn test_runtime_limit_change_trims_surplus() {
    let book = sqlite_book(0).await;
    for i in 0..8 {
        book.save_log("t", "green", "rotation_tests.rs:5", &i.to_string()).await;
    }

    assert!(book.set_limit("t", 3));
    book.save_log("t", "green", "rotation_tests.rs:5", "new").await;

    assert_eq!(messages(&book, "t").await, vec!["new", "7", "6"]);
}

#[tokio::test]
async fn test_clear_tag_leaves_other_tags() {
    let book = sqlite_book(100).await;
    for tag in ["a", "b"] {
        for i in 0..4 {
            book.save_log(tag, "green", "rotation_tests.rs:6", &i.to_string()).await;
        }
    }

    assert_eq!(book.clear_tag_logs("a").await, 4);
    assert_eq!(book.total_count("a").await, 0);
    assert_eq!(book.total_count("b").await, 4);
}

#[tokio::test]
async fn test_clear_logs_restarts_ids() {
    let book = sqlite_book(100).await;
    for i in 0..5 {
        book.save_log("x", "green", "rotation_tests.rs:7", &i.to_string()).await;
    }

    assert!(book.clear_logs().await);
    assert_eq!(book.total_count("x").await, 0);

    book.save_log("y", "green", "rotation_tests.rs:7", "first").await;
    let logs = book.get_logs("y", 0, 10).await.logs.unwrap();
    assert_eq!(logs[0].id, 1);
}

#[tokio::test]
async fn test_delete_before_is_exclusive() {
    let book = sqlite_book(0).await;
    for message in ["old", "mid", "new"] {
        book.save_log("d", "green", "rotation_tests.rs:8", message).await;
    }
    let logs = book.get_logs("d", 0, 10).await.logs.unwrap();
    let mid = logs.iter().find(|r| r.message == "mid").unwrap();

    assert_eq!(book.delete_tag_logs("d", mid.created_at).await, 1);
    assert_eq!(messages(&book, "d").await, vec!["new", "mid"]);

    assert_eq!(book.delete_log("d", mid.id).await, 1);
    assert_eq!(book.delete_log("d", mid.id).await, 0);
}

#[tokio::test]
async fn test_huge_page_is_empty_not_a_failure() {
    let book = sqlite_book(0).await;
    for i in 0..3 {
        book.save_log("big", "green", "rotation_tests.rs:10", &i.to_string()).await;
    }

    let page = book.get_logs("big", u32::MAX, u32::MAX).await;
    assert_eq!(page.logs, Some(Vec::new()));
    assert_eq!(page.total, 3);

    let page = book.get_logs("big", 1, u32::MAX).await;
    assert_eq!(page.logs, Some(Vec::new()));
}

#[tokio::test]
async fn test_delete_range_and_prune_all_tags() {
    let book = sqlite_book(0).await;
    for tag in ["a", "b"] {
        for i in 0..3 {
            book.save_log(tag, "green", "rotation_tests.rs:11", &format!("old {i}")).await;
        }
    }
    let boundary = logvault::trace::stamp();
    for tag in ["a", "b"] {
        book.save_log(tag, "green", "rotation_tests.rs:11", "new").await;
    }

    assert_eq!(book.delete_logs(boundary).await, 6);
    assert_eq!(messages(&book, "a").await, vec!["new"]);
    assert_eq!(messages(&book, "b").await, vec!["new"]);

    let ids: Vec<i64> = book
        .get_logs("a", 0, 10)
        .await
        .logs
        .unwrap()
        .iter()
        .map(|r| r.id)
        .collect();
    assert_eq!(book.delete_log_range("a", ids[0], ids[0]).await, 1);
    assert_eq!(book.delete_log_range("b", 0, i64::MAX).await, 1);
    assert_eq!(book.total_count("a").await + book.total_count("b").await, 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_saves_on_pooled_file_database() {
    let dir = TempDir::new().unwrap();
    let mut cfg = Config::default();
    cfg.store.backend = StoreBackend::Sqlite;
    cfg.store.url = format!("sqlite:{}", dir.path().join("logs.db").display());
    cfg.store.default_limit = 5;
    cfg.store.max_connections = 4;
    let book = open_store(&cfg).await.unwrap();

    let mut tasks = Vec::new();
    for i in 0..60 {
        let book = book.clone();
        let tag = if i % 2 == 0 { "even" } else { "odd" };
        tasks.push(tokio::spawn(async move {
            book.save_log(tag, "green", "rotation_tests.rs:12", &format!("{i:02}")).await
        }));
    }
    for task in tasks {
        assert!(task.await.unwrap());
    }

    for tag in ["even", "odd"] {
        assert_eq!(book.total_count(tag).await, 5);
        let logs = book.get_logs(tag, 0, 100).await.logs.unwrap();
        assert_eq!(logs.len(), 5);
        let ids: HashSet<i64> = logs.iter().map(|r| r.id).collect();
        assert_eq!(ids.len(), 5);
    }
    book.close().await;
}

#[tokio::test]
async fn test_closed_book_returns_zero_values() {
    let book = sqlite_book(10).await;
    book.save_log("c", "green", "rotation_tests.rs:9", "before").await;
    book.close().await;

    assert!(!book.save_log("c", "green", "rotation_tests.rs:9", "after").await);
    assert_eq!(book.total_count("c").await, 0);
    assert!(book.get_logs("c", 0, 10).await.logs.is_none());
}
