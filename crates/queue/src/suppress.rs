//! Coalesces repeated identical warnings.
//!
//! When the board is unreachable for minutes at a time, every attempt fails
//! with the same message; this keeps the log at one line per window with a
//! suppressed-count suffix instead of hundreds.

use std::{
    collections::HashMap,
    sync::Mutex,
    time::{Duration, Instant},
};

struct Entry {
    window_start: Instant,
    suppressed: u64,
}

/// Per-message rate limiter for warning logs.
pub struct WarnSuppressor {
    window: Duration,
    entries: Mutex<HashMap<String, Entry>>,
}

impl WarnSuppressor {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Whether the caller should emit this message now. `Some(n)` means log
    /// it, mentioning the `n` occurrences suppressed since the last emit;
    /// `None` means stay quiet.
    pub fn check(&self, message: &str) -> Option<u64> {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        let now = Instant::now();
        match entries.get_mut(message) {
            Some(entry) if now.duration_since(entry.window_start) < self.window => {
                entry.suppressed += 1;
                None
            },
            Some(entry) => {
                let suppressed = entry.suppressed;
                entry.window_start = now;
                entry.suppressed = 0;
                Some(suppressed)
            },
            None => {
                entries.insert(
                    message.to_string(),
                    Entry {
                        window_start: now,
                        suppressed: 0,
                    },
                );
                Some(0)
            },
        }
    }
}

impl Default for WarnSuppressor {
    fn default() -> Self {
        Self::new(Duration::from_secs(30))
    }
}
