//! Non-blocking queue in front of the log store

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use crate::logbook::LogBook;
use crate::record::NewLog;

#[derive(Debug)]
enum WriterMessage {
    Log(NewLog),
    /// Acknowledged once everything queued before it is stored and flushed
    Flush(oneshot::Sender<()>),
}

/// Cloneable handle to the writer task
///
/// The task exits once every handle is dropped, after storing what was
/// already queued.
#[derive(Clone, Debug)]
pub struct CaptureWriter {
    sender: mpsc::UnboundedSender<WriterMessage>,
}

impl CaptureWriter {
    /// Spawn the writer task on the current tokio runtime
    pub fn spawn(book: LogBook) -> Self {
        Self::spawn_with_handle(book).0
    }

    /// Like [`spawn`](Self::spawn), also returning the task handle
    pub fn spawn_with_handle(book: LogBook) -> (Self, JoinHandle<()>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let task = tokio::spawn(writer_task(book, rx));
        (Self { sender: tx }, task)
    }

    /// Queue one entry (non-blocking)
    ///
    /// Entries sent after the task is gone are dropped.
    pub fn write(&self, log: NewLog) {
        let _ = self.sender.send(WriterMessage::Log(log));
    }

    /// Wait until every entry queued so far is stored, then flush the store
    pub async fn flush(&self) {
        let (ack, done) = oneshot::channel();
        if self.sender.send(WriterMessage::Flush(ack)).is_ok() {
            let _ = done.await;
        }
    }
}

async fn writer_task(book: LogBook, mut rx: mpsc::UnboundedReceiver<WriterMessage>) {
    let mut failed: u64 = 0;

    while let Some(msg) = rx.recv().await {
        match msg {
            WriterMessage::Log(log) => {
                if !book.save(&log).await {
                    failed += 1;
                }
            }
            WriterMessage::Flush(ack) => {
                book.flush().await;
                let _ = ack.send(());
            }
        }
    }

    book.flush().await;
    tracing::info!(target: "logvault", failed, "Capture writer task shutting down");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rotation::Limits;
    use crate::store::{SqliteLogStore, TableLayout};
    use sqlx::sqlite::SqlitePoolOptions;
    use std::sync::Arc;

    async fn sqlite_book() -> LogBook {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        let store = SqliteLogStore::new(pool, TableLayout::Shared, Arc::new(Limits::default()));
        LogBook::new(Arc::new(store))
    }

    #[tokio::test]
    async fn test_entries_are_stored_in_order() {
        let book = sqlite_book().await;
        let writer = CaptureWriter::spawn(book.clone());

        for i in 0..10 {
            writer.write(NewLog::new("q", "green", "writer.rs:1", format!("m{i}")));
        }
        writer.flush().await;

        let page = book.get_logs("q", 0, 3).await;
        assert_eq!(page.total, 10);
        let messages: Vec<_> = page.logs.unwrap().into_iter().map(|r| r.message).collect();
        assert_eq!(messages, vec!["m9", "m8", "m7"]);
    }

    #[tokio::test]
    async fn test_task_drains_queue_on_drop() {
        let book = sqlite_book().await;
        let (writer, task) = CaptureWriter::spawn_with_handle(book.clone());

        writer.write(NewLog::new("", "red", "writer.rs:2", "last"));
        drop(writer);
        task.await.unwrap();

        assert_eq!(book.total_count("").await, 1);
    }

    #[tokio::test]
    async fn test_disabled_book_swallows_entries() {
        let writer = CaptureWriter::spawn(LogBook::disabled());
        writer.write(NewLog::new("", "red", "writer.rs:3", "nowhere"));
        writer.flush().await;
    }
}
