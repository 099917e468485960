//! Append-only file backend
//!
//! One text file per tag, `<name>.log` for the default tag and
//! `<name>_<tag>.log` otherwise. Lines are `created_at \t color \t trace \t
//! message`, with line breaks and backslashes in the text fields escaped so
//! every entry stays on one line. Writes collect in a per-tag buffer that is
//! flushed when it fills up or when the background timer fires.
//!
//! No file handle outlives a flush: every flush reopens the path in
//! append-or-create mode, so deleting or truncating a log file from
//! outside never breaks the writer.
//!
//! This backend does not rotate, page or count.

use async_trait::async_trait;
use chrono::NaiveDateTime;
use dashmap::DashMap;
use std::borrow::Cow;
use std::fs::{self, OpenOptions};
use std::io::{self, BufRead, BufReader, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use super::LogStore;
use crate::error::{Result, StoreError};
use crate::record::{check_name_tag, format_timestamp, parse_timestamp, LogRecord, NewLog};
use crate::trace;

pub const DEFAULT_FLUSH_INTERVAL: Duration = Duration::from_secs(5);
pub const DEFAULT_BUFFER_SIZE: usize = 4096;
/// Tail budget used when the caller passes zero or a negative size
pub const DEFAULT_TAIL_BYTES: u64 = 4096;

/// Where and how the file backend writes
#[derive(Debug, Clone)]
pub struct FileStoreOptions {
    pub folder: PathBuf,
    /// File name stem shared by every tag file
    pub name: String,
    pub flush_interval: Duration,
    pub buffer_size: usize,
}

impl Default for FileStoreOptions {
    fn default() -> Self {
        let (folder, name) = exe_dir_and_name();
        Self {
            folder,
            name,
            flush_interval: DEFAULT_FLUSH_INTERVAL,
            buffer_size: DEFAULT_BUFFER_SIZE,
        }
    }
}

impl FileStoreOptions {
    /// Options for `folder`; an empty folder or name falls back to the executable's
    pub fn new(folder: impl Into<PathBuf>, name: impl Into<String>) -> Self {
        let defaults = Self::default();
        let folder = folder.into();
        let name = name.into();
        Self {
            folder: if folder.as_os_str().is_empty() {
                defaults.folder
            } else {
                folder
            },
            name: if name.is_empty() { defaults.name } else { name },
            ..defaults
        }
    }

    /// Zero selects the default interval
    pub fn with_flush_interval(mut self, interval: Duration) -> Self {
        self.flush_interval = if interval.is_zero() {
            DEFAULT_FLUSH_INTERVAL
        } else {
            interval
        };
        self
    }

    /// Zero selects the default size
    pub fn with_buffer_size(mut self, size: usize) -> Self {
        self.buffer_size = if size == 0 { DEFAULT_BUFFER_SIZE } else { size };
        self
    }
}

/// Directory and file stem of the running executable
pub fn exe_dir_and_name() -> (PathBuf, String) {
    match std::env::current_exe() {
        Ok(exe) => {
            let folder = exe
                .parent()
                .map(Path::to_path_buf)
                .unwrap_or_else(|| PathBuf::from("."));
            let name = exe
                .file_stem()
                .map(|stem| stem.to_string_lossy().into_owned())
                .unwrap_or_else(|| env!("CARGO_PKG_NAME").to_string());
            (folder, name)
        }
        Err(e) => {
            tracing::warn!(error = %e, "Cannot resolve executable path, using working directory");
            (PathBuf::from("."), env!("CARGO_PKG_NAME").to_string())
        }
    }
}

/// Pending bytes of one tag file
#[derive(Debug)]
struct TagBuffer {
    path: PathBuf,
    pending: Vec<u8>,
}

impl TagBuffer {
    fn new(path: PathBuf, capacity: usize) -> Self {
        Self {
            path,
            pending: Vec::with_capacity(capacity),
        }
    }

    /// Write pending bytes through a freshly opened handle
    ///
    /// On failure the pending bytes are dropped.
    fn flush(&mut self) -> io::Result<()> {
        if self.pending.is_empty() {
            return Ok(());
        }
        let result = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .and_then(|mut file| file.write_all(&self.pending));
        self.pending.clear();
        result
    }
}

/// State shared with the background flush task
#[derive(Debug)]
struct Shared {
    options: FileStoreOptions,
    buffers: DashMap<String, Arc<Mutex<TagBuffer>>>,
    closed: AtomicBool,
}

impl Shared {
    fn file_name(&self, tag: &str) -> String {
        if tag.is_empty() {
            format!("{}.log", self.options.name)
        } else {
            format!("{}_{}.log", self.options.name, tag)
        }
    }

    fn path_for(&self, tag: &str) -> Result<PathBuf> {
        check_name_tag(tag, true)?;
        Ok(self.options.folder.join(self.file_name(tag)))
    }

    fn buffer_for(&self, tag: &str) -> Result<Arc<Mutex<TagBuffer>>> {
        if let Some(existing) = self.buffers.get(tag) {
            return Ok(existing.value().clone());
        }
        let path = self.path_for(tag)?;
        let capacity = self.options.buffer_size;
        Ok(self
            .buffers
            .entry(tag.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(TagBuffer::new(path, capacity))))
            .clone())
    }

    /// Flush every tag; keeps going past failures and returns the first one
    fn flush_all(&self) -> io::Result<()> {
        // Snapshot the map so no shard lock is held during file I/O.
        let buffers: Vec<_> = self
            .buffers
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect();

        let mut first_err = None;
        for (tag, buffer) in buffers {
            let mut buffer = buffer.lock().unwrap_or_else(PoisonError::into_inner);
            if let Err(e) = buffer.flush() {
                tracing::error!(tag = %tag, path = %buffer.path.display(), error = %e, "Failed to flush log file");
                first_err.get_or_insert(e);
            }
        }
        first_err.map_or(Ok(()), Err)
    }

    fn flush_tag(&self, tag: &str) -> io::Result<()> {
        let Some(buffer) = self.buffers.get(tag).map(|entry| entry.value().clone()) else {
            return Ok(());
        };
        let mut buffer = buffer.lock().unwrap_or_else(PoisonError::into_inner);
        buffer.flush()
    }

    fn discard_pending(&self, tag: &str) {
        let buffer = self.buffers.get(tag).map(|entry| entry.value().clone());
        if let Some(buffer) = buffer {
            buffer
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .pending
                .clear();
        }
    }

    /// Whether `file_name` is one of this store's tag files
    fn owns_file(&self, file_name: &str) -> bool {
        let name = &self.options.name;
        match file_name.strip_prefix(name.as_str()) {
            Some(".log") => true,
            Some(rest) => rest
                .strip_prefix('_')
                .and_then(|rest| rest.strip_suffix(".log"))
                .is_some_and(|tag| !tag.is_empty() && check_name_tag(tag, true).is_ok()),
            None => false,
        }
    }
}

/// Truncate `path` to zero length without creating it
fn truncate_existing(path: &Path) -> io::Result<()> {
    match OpenOptions::new().write(true).truncate(true).open(path) {
        Ok(_) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e),
    }
}

fn format_line(created_at: &NaiveDateTime, log: &NewLog) -> String {
    format!(
        "{}\t{}\t{}\t{}\n",
        format_timestamp(created_at),
        escape_field(&log.color),
        escape_field(&log.trace),
        escape_field(&log.message)
    )
}

/// `\`, LF and CR become `\\`, `\n` and `\r`
fn escape_field(field: &str) -> Cow<'_, str> {
    if !field.contains(&['\\', '\n', '\r'][..]) {
        return Cow::Borrowed(field);
    }
    let mut out = String::with_capacity(field.len() + 8);
    for c in field.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            c => out.push(c),
        }
    }
    Cow::Owned(out)
}

fn unescape_field(field: &str) -> Cow<'_, str> {
    if !field.contains('\\') {
        return Cow::Borrowed(field);
    }
    let mut out = String::with_capacity(field.len());
    let mut chars = field.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('r') => out.push('\r'),
            Some(other) => out.push(other),
            None => out.push('\\'),
        }
    }
    Cow::Owned(out)
}

fn parse_line(tag: &str, line: &str) -> Option<LogRecord> {
    let mut fields = line.splitn(4, '\t');
    let created_at = parse_timestamp(fields.next()?)?;
    let color = fields.next()?;
    let trace = fields.next()?;
    let message = fields.next()?;
    Some(LogRecord {
        id: 0,
        tag: tag.to_string(),
        color: unescape_field(color).into_owned(),
        trace: unescape_field(trace).into_owned(),
        message: unescape_field(message).into_owned(),
        created_at,
    })
}

/// File-backed log store
pub struct FileLogStore {
    shared: Arc<Shared>,
    shutdown: watch::Sender<bool>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl FileLogStore {
    /// Create the folder and start the periodic flush
    ///
    /// Outside a tokio runtime no timer runs; buffers are then written when
    /// they fill up, on [`LogStore::flush`] and on [`LogStore::close`].
    pub fn open(options: FileStoreOptions) -> Result<Self> {
        fs::create_dir_all(&options.folder)?;

        let interval = options.flush_interval;
        let shared = Arc::new(Shared {
            options,
            buffers: DashMap::new(),
            closed: AtomicBool::new(false),
        });
        let (shutdown, signal) = watch::channel(false);

        let task = match tokio::runtime::Handle::try_current() {
            Ok(handle) => Some(handle.spawn(flush_loop(shared.clone(), interval, signal))),
            Err(_) => {
                tracing::warn!("No tokio runtime, periodic log file flush disabled");
                None
            }
        };

        tracing::info!(
            folder = %shared.options.folder.display(),
            name = %shared.options.name,
            interval_ms = interval.as_millis() as u64,
            "File log store opened"
        );

        Ok(Self {
            shared,
            shutdown,
            task: Mutex::new(task),
        })
    }

    pub fn options(&self) -> &FileStoreOptions {
        &self.shared.options
    }

    /// Full path of the file holding `tag`
    pub fn path_for(&self, tag: &str) -> Result<PathBuf> {
        self.shared.path_for(tag)
    }

    fn check_open(&self) -> Result<()> {
        if self.shared.closed.load(Ordering::Acquire) {
            Err(StoreError::Closed)
        } else {
            Ok(())
        }
    }

    /// Whole lines from roughly the last `approx_bytes` of the tag's file
    ///
    /// When the read starts mid-file the first line is dropped, as it is most
    /// likely cut. A missing file reads as empty.
    pub fn read_last_log(&self, tag: &str, approx_bytes: i64) -> Result<Vec<String>> {
        let path = self.shared.path_for(tag)?;
        self.shared.flush_tag(tag)?;

        let mut file = match fs::File::open(&path) {
            Ok(file) => file,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let size = file.metadata()?.len();
        let budget = if approx_bytes <= 0 {
            DEFAULT_TAIL_BYTES
        } else {
            approx_bytes as u64
        };
        let offset = size - budget.min(size);
        file.seek(SeekFrom::Start(offset))?;

        let mut lines = Vec::new();
        for chunk in BufReader::new(file).split(b'\n').skip(usize::from(offset > 0)) {
            let chunk = chunk?;
            let line = String::from_utf8_lossy(&chunk);
            lines.push(line.strip_suffix('\r').unwrap_or(&line).to_string());
        }
        Ok(lines)
    }

    /// Empty the tag's file if it exists and drop its pending bytes
    pub fn clear(&self, tag: &str) -> Result<()> {
        let path = self.shared.path_for(tag)?;
        self.shared.discard_pending(tag);
        truncate_existing(&path)?;
        Ok(())
    }
}

#[async_trait]
impl LogStore for FileLogStore {
    fn backend(&self) -> &'static str {
        "file"
    }

    async fn save_log(&self, log: &NewLog) -> Result<()> {
        self.check_open()?;
        let buffer = self.shared.buffer_for(&log.tag)?;
        let line = format_line(&trace::stamp(), log);

        let mut buffer = buffer.lock().unwrap_or_else(PoisonError::into_inner);
        buffer.pending.extend_from_slice(line.as_bytes());
        if buffer.pending.len() >= self.shared.options.buffer_size {
            buffer.flush()?;
        }
        Ok(())
    }

    async fn delete_log(&self, _tag: &str, _id: i64) -> Result<u64> {
        Ok(0)
    }

    async fn delete_log_range(&self, _tag: &str, _start: i64, _stop: i64) -> Result<u64> {
        Ok(0)
    }

    async fn delete_tag_logs(&self, _tag: &str, _before: NaiveDateTime) -> Result<u64> {
        Ok(0)
    }

    async fn delete_logs(&self, _before: NaiveDateTime) -> Result<u64> {
        Ok(0)
    }

    async fn clear_tag_logs(&self, tag: &str) -> Result<u64> {
        self.check_open()?;
        self.clear(tag)?;
        Ok(0)
    }

    async fn clear_logs(&self) -> Result<()> {
        self.check_open()?;
        let tags: Vec<String> = self.shared.buffers.iter().map(|e| e.key().clone()).collect();
        for tag in &tags {
            self.shared.discard_pending(tag);
        }

        let mut cleared = 0usize;
        for entry in fs::read_dir(&self.shared.options.folder)? {
            let entry = entry?;
            let file_name = entry.file_name();
            if self.shared.owns_file(&file_name.to_string_lossy()) {
                truncate_existing(&entry.path())?;
                cleared += 1;
            }
        }
        tracing::info!(files = cleared, "Cleared log files");
        Ok(())
    }

    async fn fetch_logs(&self, _tag: &str, _page: u32, _count: u32) -> Result<Vec<LogRecord>> {
        Err(StoreError::Unsupported {
            backend: self.backend(),
            operation: "get_logs",
        })
    }

    async fn total_count(&self, _tag: &str) -> Result<u64> {
        Err(StoreError::Unsupported {
            backend: self.backend(),
            operation: "total_count",
        })
    }

    async fn tail_logs(&self, tag: &str, approx_bytes: i64) -> Result<Vec<LogRecord>> {
        let records = self
            .read_last_log(tag, approx_bytes)?
            .iter()
            .filter_map(|line| parse_line(tag, line))
            .collect();
        Ok(records)
    }

    async fn flush(&self) -> Result<()> {
        self.shared.flush_all()?;
        Ok(())
    }

    /// Stop the timer, wait for it, then write what is still buffered
    async fn close(&self) -> Result<()> {
        if self.shared.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        let _ = self.shutdown.send(true);

        let task = self
            .task
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(task) = task {
            if let Err(e) = task.await {
                tracing::warn!(error = %e, "Log file flush task ended abnormally");
            }
        }

        self.shared.flush_all()?;
        tracing::info!("File log store closed");
        Ok(())
    }
}

impl Drop for FileLogStore {
    fn drop(&mut self) {
        let _ = self.shutdown.send(true);
        if !self.shared.closed.load(Ordering::Acquire) {
            let _ = self.shared.flush_all();
        }
    }
}

/// Periodic flush until the shutdown signal flips or its sender is dropped
async fn flush_loop(shared: Arc<Shared>, interval: Duration, mut shutdown: watch::Receiver<bool>) {
    let mut timer = tokio::time::interval(interval);
    timer.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    // First tick completes immediately.
    timer.tick().await;

    loop {
        tokio::select! {
            _ = timer.tick() => {
                let _ = shared.flush_all();
            }
            _ = shutdown.changed() => break,
        }
    }

    tracing::debug!("Log file flush task shutting down");
}
