//! Shared types, error definitions, and the hook dispatch table used across
//! all pinboard crates.

pub mod error;
pub mod event;
pub mod hooks;

pub use error::{Error, FromMessage, Result};

use std::time::{SystemTime, UNIX_EPOCH};

/// Current wall-clock time in milliseconds since the Unix epoch.
pub fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}
