//! Per-client rate limiting over a rolling one-second window.
//!
//! One table for the whole process, guarded by a single coarse lock: the
//! critical section is a prune over at most `max_per_second` timestamps.
//! State is memory-resident for the process lifetime; entries for inactive
//! clients are never evicted, matching the observable memory behavior of
//! the wider system this serves.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};
use tracing::trace;

/// Rolling window over which admissions are counted
const WINDOW: Duration = Duration::from_secs(1);

/// Tracks recent admission timestamps per client and decides admit/reject.
pub struct RateLimiter {
    max_per_second: u32,
    clients: Mutex<HashMap<String, Vec<Instant>>>,
}

impl RateLimiter {
    /// Create a rate limiter admitting at most `max_per_second` messages
    /// per client per rolling second. A limit of 0 rejects everything.
    pub fn new(max_per_second: u32) -> Self {
        Self {
            max_per_second,
            clients: Mutex::new(HashMap::new()),
        }
    }

    /// Decide whether a request from `client` is admitted right now.
    ///
    /// Prunes the client's window to the last second on every call, so
    /// stale timestamps never persist past a check. Uses a monotonic
    /// clock; the window test is unaffected by wall-clock adjustments.
    pub fn admit(&self, client: &str) -> bool {
        let now = Instant::now();
        let mut clients = self.clients.lock().unwrap();

        let window = clients.entry(client.to_string()).or_default();
        window.retain(|&t| now.duration_since(t) < WINDOW);

        if window.len() >= self.max_per_second as usize {
            trace!(client, in_window = window.len(), "Rate limit hit");
            return false;
        }
        window.push(now);
        true
    }
}
