//! Per-key feedback rate limiter.
//!
//! The same face is typically evaluated on consecutive frames seconds
//! apart; the gate keeps the buzzer/display from firing for each one.
//! It only suppresses the feedback side effect — attendance dedup is
//! calendar-day based and lives in the store.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// Cooldown key for decisions with no accepted identity.
pub const UNKNOWN_KEY: &str = "UNKNOWN";

/// Tracks the last feedback trigger per key (identity or the
/// [`UNKNOWN_KEY`] sentinel). Entries never expire; newer timestamps
/// supersede older ones.
#[derive(Default)]
pub struct CooldownGate {
    entries: Mutex<HashMap<String, Instant>>,
}

impl CooldownGate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns true iff `key` has no recorded trigger or the window has
    /// fully elapsed (boundary inclusive). Records `now` as the new
    /// last-trigger time only on true.
    pub fn allow(&self, key: &str, now: Instant, window: Duration) -> bool {
        let mut entries = self.entries.lock().unwrap();
        let allowed = match entries.get(key) {
            None => true,
            Some(&last) => now.saturating_duration_since(last) >= window,
        };
        if allowed {
            entries.insert(key.to_string(), now);
        }
        allowed
    }
}
