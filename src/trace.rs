//! Call-site traces and the write clock

use chrono::{DateTime, Local, NaiveDateTime};
use std::panic::Location;
use std::path::Path;
use std::sync::atomic::{AtomicI64, Ordering};

static LAST_STAMP_MILLIS: AtomicI64 = AtomicI64::new(i64::MIN);

/// Current local time, truncated to milliseconds and strictly increasing
///
/// Two calls within the same millisecond return consecutive milliseconds, so
/// ordering by `created_at` matches submission order inside one process.
///
/// When local wall time steps back (DST fall-back, NTP correction) stamps keep
/// counting up from the last one issued, one millisecond per call, until the
/// wall clock passes it again. During that window `created_at` runs ahead of
/// real local time by up to the size of the step. Rotation relies on
/// `created_at` order, so stamps never jump back with the clock.
pub fn stamp() -> NaiveDateTime {
    let wall = Local::now().naive_local().and_utc().timestamp_millis();
    let mut prev = LAST_STAMP_MILLIS.load(Ordering::Relaxed);
    loop {
        let next = next_stamp(prev, wall);
        match LAST_STAMP_MILLIS.compare_exchange_weak(prev, next, Ordering::AcqRel, Ordering::Relaxed)
        {
            Ok(_) => return millis_to_naive(next),
            Err(actual) => prev = actual,
        }
    }
}

fn next_stamp(prev: i64, wall: i64) -> i64 {
    if wall > prev {
        wall
    } else {
        prev.saturating_add(1)
    }
}

fn millis_to_naive(millis: i64) -> NaiveDateTime {
    DateTime::from_timestamp_millis(millis)
        .unwrap_or_default()
        .naive_utc()
}

/// `basename:line` of the caller
#[track_caller]
pub fn caller_trace() -> String {
    let location = Location::caller();
    format_trace(location.file(), location.line())
}

/// `basename:line` for an explicit source location
pub fn format_trace(file: &str, line: u32) -> String {
    let base = Path::new(file)
        .file_name()
        .map(|name| name.to_string_lossy())
        .unwrap_or_else(|| file.into());
    format!("{}:{}", base, line)
}
