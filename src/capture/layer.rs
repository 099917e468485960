//! Tracing layer that persists events
//!
//! Field mapping:
//! - `tag` field: the store tag (default tag when absent)
//! - level: the color marker (see [`crate::Color`])
//! - event `file:line`: the trace, falling back to the target
//! - `message` plus any other fields as ` key=value`: the message

use std::fmt::Write as _;
use tracing::field::{Field, Visit};
use tracing::{Event, Subscriber};
use tracing_subscriber::{layer::Context, registry::LookupSpan, Layer};

use super::writer::CaptureWriter;
use crate::record::{Color, NewLog};
use crate::trace::format_trace;

/// Targets never persisted: the store's own diagnostics and the SQL driver,
/// either of which would feed back into the store
const IGNORED_TARGETS: &[&str] = &["logvault", "sqlx"];

pub struct PersistLayer {
    writer: CaptureWriter,
    ignored: Vec<String>,
}

impl PersistLayer {
    pub fn new(writer: CaptureWriter) -> Self {
        Self {
            writer,
            ignored: IGNORED_TARGETS.iter().map(|t| t.to_string()).collect(),
        }
    }

    /// Also skip events whose target starts with `prefix`
    pub fn ignore_target(mut self, prefix: impl Into<String>) -> Self {
        self.ignored.push(prefix.into());
        self
    }

    fn is_ignored(&self, target: &str) -> bool {
        self.ignored.iter().any(|prefix| {
            target
                .strip_prefix(prefix.as_str())
                .is_some_and(|rest| rest.is_empty() || rest.starts_with("::"))
        })
    }
}

#[derive(Default)]
struct FieldVisitor {
    message: String,
    tag: Option<String>,
    extra: String,
}

impl Visit for FieldVisitor {
    fn record_str(&mut self, field: &Field, value: &str) {
        match field.name() {
            "message" => self.message = value.to_string(),
            "tag" => self.tag = Some(value.to_string()),
            name => {
                let _ = write!(self.extra, " {}={}", name, value);
            }
        }
    }

    fn record_debug(&mut self, field: &Field, value: &dyn std::fmt::Debug) {
        match field.name() {
            // format_args! messages arrive here; their Debug is the plain text
            "message" => self.message = format!("{:?}", value),
            "tag" => self.tag = Some(format!("{:?}", value).trim_matches('"').to_string()),
            name => {
                let _ = write!(self.extra, " {}={:?}", name, value);
            }
        }
    }
}

impl<S> Layer<S> for PersistLayer
where
    S: Subscriber + for<'a> LookupSpan<'a>,
{
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let metadata = event.metadata();
        if self.is_ignored(metadata.target()) {
            return;
        }

        let mut visitor = FieldVisitor::default();
        event.record(&mut visitor);

        let trace = match (metadata.file(), metadata.line()) {
            (Some(file), Some(line)) => format_trace(file, line),
            _ => metadata.target().to_string(),
        };
        let color = Color::from(*metadata.level());

        self.writer.write(NewLog {
            tag: visitor.tag.unwrap_or_default(),
            color: color.as_str().to_string(),
            trace,
            message: visitor.message + &visitor.extra,
        });
    }
}
