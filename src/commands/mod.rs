//! Command implementations for the CLI
//!
//! - logs: show, tail and count stored entries
//! - admin: write, delete, prune and clear entries
//! - config: configuration display and validation

pub mod admin;
pub mod config;
pub mod logs;
