//! Fixed-window limiter gating session creation (spec.md §5).

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;

struct Window {
    started_at: DateTime<Utc>,
    count: u32,
}

pub struct SessionCreateLimiter {
    limit: u32,
    window_ms: i64,
    windows: Mutex<HashMap<String, Window>>,
}

impl SessionCreateLimiter {
    pub fn new(limit: u32, window_ms: i64) -> Self {
        Self {
            limit,
            window_ms,
            windows: Mutex::new(HashMap::new()),
        }
    }

    /// True if a new session may be created for `agent_id` right now;
    /// records the attempt either way so the window fills up correctly.
    pub fn try_acquire(&self, agent_id: &str, now: DateTime<Utc>) -> bool {
        let mut windows = self.windows.lock();
        let window = windows.entry(agent_id.to_string()).or_insert_with(|| Window {
            started_at: now,
            count: 0,
        });

        if (now - window.started_at).num_milliseconds() >= self.window_ms {
            window.started_at = now;
            window.count = 0;
        }

        if window.count >= self.limit {
            return false;
        }

        window.count += 1;
        true
    }
}
