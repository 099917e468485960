//! Log record model
//!
//! A [`NewLog`] is what callers submit; a [`LogRecord`] is what a backend
//! hands back, carrying the backend-assigned id and the write timestamp.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{Result, StoreError};

/// Text form of `created_at` used in files, SQLite columns and CLI arguments
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.3f";

/// A stored log entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogRecord {
    /// Backend-assigned id, unique within a tag (0 for file-backed records)
    pub id: i64,
    pub tag: String,
    pub color: String,
    /// Call site as `file:line`
    pub trace: String,
    pub message: String,
    #[serde(with = "timestamp_text")]
    pub created_at: NaiveDateTime,
}

impl fmt::Display for LogRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} [{} {}] {}",
            format_timestamp(&self.created_at),
            self.color,
            self.trace,
            self.message
        )
    }
}

/// A log entry as submitted by the front-end, before it is stamped and stored
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewLog {
    pub tag: String,
    pub color: String,
    pub trace: String,
    pub message: String,
}

impl NewLog {
    pub fn new(
        tag: impl Into<String>,
        color: impl Into<String>,
        trace: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            tag: tag.into(),
            color: color.into(),
            trace: trace.into(),
            message: message.into(),
        }
    }
}

/// Severity markers understood by the console echo
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Color {
    Black,
    White,
    Red,
    Green,
    Yellow,
    Blue,
    Magenta,
    Cyan,
}

impl Color {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Black => "black",
            Self::White => "white",
            Self::Red => "red",
            Self::Green => "green",
            Self::Yellow => "yellow",
            Self::Blue => "blue",
            Self::Magenta => "magenta",
            Self::Cyan => "cyan",
        }
    }

    /// Parse a stored marker; unknown markers yield `None`
    pub fn parse(value: &str) -> Option<Self> {
        match value.to_ascii_lowercase().as_str() {
            "black" => Some(Self::Black),
            "white" => Some(Self::White),
            "red" => Some(Self::Red),
            "green" => Some(Self::Green),
            "yellow" => Some(Self::Yellow),
            "blue" => Some(Self::Blue),
            "magenta" => Some(Self::Magenta),
            "cyan" => Some(Self::Cyan),
            _ => None,
        }
    }
}

impl fmt::Display for Color {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<tracing::Level> for Color {
    fn from(level: tracing::Level) -> Self {
        match level {
            tracing::Level::ERROR => Self::Red,
            tracing::Level::WARN => Self::Yellow,
            tracing::Level::INFO => Self::Green,
            tracing::Level::DEBUG => Self::Blue,
            tracing::Level::TRACE => Self::Cyan,
        }
    }
}

/// One page of `get_logs` results
///
/// `logs` is `None` when the page query failed; `total` is computed
/// independently and may still be valid.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct LogPage {
    pub logs: Option<Vec<LogRecord>>,
    pub total: u64,
}

pub fn format_timestamp(ts: &NaiveDateTime) -> String {
    ts.format(TIMESTAMP_FORMAT).to_string()
}

/// Parse a timestamp in the text form; the millisecond part is optional
pub fn parse_timestamp(value: &str) -> Option<NaiveDateTime> {
    let value = value.trim();
    NaiveDateTime::parse_from_str(value, TIMESTAMP_FORMAT)
        .or_else(|_| NaiveDateTime::parse_from_str(value, "%Y-%m-%d %H:%M:%S"))
        .ok()
}

/// Validate that a tag can be embedded in a file or table name
///
/// The default tag ("") is always accepted. `allow_dash` is false for table
/// names, where `-` would need quoting.
pub fn check_name_tag(tag: &str, allow_dash: bool) -> Result<()> {
    let valid = tag
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '_' || (allow_dash && c == '-'));
    if valid {
        Ok(())
    } else {
        Err(StoreError::InvalidTag(tag.to_string()))
    }
}

mod timestamp_text {
    use super::{format_timestamp, parse_timestamp};
    use chrono::NaiveDateTime;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(ts: &NaiveDateTime, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&format_timestamp(ts))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<NaiveDateTime, D::Error> {
        let raw = String::deserialize(d)?;
        parse_timestamp(&raw)
            .ok_or_else(|| serde::de::Error::custom(format!("invalid timestamp: {raw}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn sample_ts() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2025, 3, 1)
            .unwrap()
            .and_hms_milli_opt(12, 0, 5, 42)
            .unwrap()
    }

    #[test]
    fn test_timestamp_text_form() {
        let ts = sample_ts();
        assert_eq!(format_timestamp(&ts), "2025-03-01 12:00:05.042");
        assert_eq!(parse_timestamp("2025-03-01 12:00:05.042"), Some(ts));
        assert!(parse_timestamp("2025-03-01 12:00:05").is_some());
        assert!(parse_timestamp("yesterday").is_none());
    }

    #[test]
    fn test_record_display() {
        let record = LogRecord {
            id: 7,
            tag: String::new(),
            color: "red".to_string(),
            trace: "main.rs:10".to_string(),
            message: "disk full".to_string(),
            created_at: sample_ts(),
        };
        assert_eq!(
            record.to_string(),
            "2025-03-01 12:00:05.042 [red main.rs:10] disk full"
        );
    }

    #[test]
    fn test_record_json_uses_text_timestamp() {
        let record = LogRecord {
            id: 1,
            tag: "api".to_string(),
            color: "green".to_string(),
            trace: "lib.rs:1".to_string(),
            message: "ok".to_string(),
            created_at: sample_ts(),
        };
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["created_at"], "2025-03-01 12:00:05.042");

        let back: LogRecord = serde_json::from_value(json).unwrap();
        assert_eq!(back, record);
    }

    #[test]
    fn test_color_from_level() {
        assert_eq!(Color::from(tracing::Level::ERROR), Color::Red);
        assert_eq!(Color::from(tracing::Level::INFO).as_str(), "green");
        assert_eq!(Color::parse("MAGENTA"), Some(Color::Magenta));
        assert_eq!(Color::parse("purple"), None);
    }

    #[test]
    fn test_check_name_tag() {
        assert!(check_name_tag("", false).is_ok());
        assert!(check_name_tag("audit_2", false).is_ok());
        assert!(check_name_tag("web-api", true).is_ok());
        assert!(check_name_tag("web-api", false).is_err());
        assert!(check_name_tag("../etc", true).is_err());
        assert!(check_name_tag("a b", true).is_err());
    }
}
