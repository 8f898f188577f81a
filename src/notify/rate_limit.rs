// Argus Host Monitoring Service - Notification Rate Limiting
// Windowed per-(channel, alert) delivery caps

use super::ChannelType;
use crate::clock::Clock;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

#[derive(Debug, Clone, Copy)]
struct WindowEntry {
    window_start: DateTime<Utc>,
    count: u32,
}

/// Caps deliveries per `(channel type, alert id)` within a rolling window.
///
/// A single mutex guards the table; every mutation of a window start and
/// count happens under it, which preserves the reset invariant under
/// concurrent dispatchers.
pub struct RateLimiter {
    limit: u32,
    window: ChronoDuration,
    clock: Arc<dyn Clock>,
    entries: Mutex<HashMap<(ChannelType, String), WindowEntry>>,
}

impl RateLimiter {
    pub fn new(limit: u32, window_secs: u64, clock: Arc<dyn Clock>) -> Self {
        Self {
            limit,
            window: ChronoDuration::seconds(window_secs as i64),
            clock,
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Record one attempted send and decide whether it may proceed.
    ///
    /// A fresh or elapsed window resets the count to one; otherwise the
    /// count increments. The send is rejected once the count exceeds the
    /// limit, so a zero limit rejects everything.
    pub fn allow(&self, channel: ChannelType, alert_id: &str) -> bool {
        let now = self.clock.now();
        let mut entries = self.entries.lock().expect("rate limiter lock poisoned");

        let entry = entries
            .entry((channel, alert_id.to_string()))
            .and_modify(|entry| {
                if now - entry.window_start >= self.window {
                    entry.window_start = now;
                    entry.count = 1;
                } else {
                    entry.count += 1;
                }
            })
            .or_insert(WindowEntry {
                window_start: now,
                count: 1,
            });

        entry.count <= self.limit
    }
}
