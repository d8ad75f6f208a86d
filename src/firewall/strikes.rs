//! Second-order breach counters.
//!
//! The rate limiter measures request frequency; this engine measures
//! rate-limit-breach frequency. Each breach registers a strike against the
//! offender's identity key, and reaching the policy threshold promotes the
//! offender to a block.

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy)]
struct StrikeRecord {
    count: u32,
    first_seen: Instant,
}

/// Per-identity strike counters with window-bounded reset.
#[derive(Debug, Default)]
pub struct StrikeEngine {
    records: DashMap<String, StrikeRecord>,
}

impl StrikeEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a strike for `key`.
    ///
    /// Returns `true` when the count reaches `threshold`; the record is
    /// consumed in the same operation, so exactly one caller observes the
    /// promotion edge. A record whose window has elapsed restarts at zero
    /// before counting. A `threshold` of zero never promotes and records
    /// nothing.
    pub fn register_strike(&self, key: &str, window: Duration, threshold: u32) -> bool {
        self.register_strike_at(key, window, threshold, Instant::now())
    }

    fn register_strike_at(
        &self,
        key: &str,
        window: Duration,
        threshold: u32,
        now: Instant,
    ) -> bool {
        if threshold == 0 {
            return false;
        }

        match self.records.entry(key.to_owned()) {
            Entry::Occupied(mut occupied) => {
                let record = occupied.get_mut();
                if now.duration_since(record.first_seen) > window {
                    record.count = 0;
                    record.first_seen = now;
                }
                record.count += 1;
                if record.count >= threshold {
                    occupied.remove();
                    true
                } else {
                    false
                }
            }
            Entry::Vacant(vacant) => {
                // A threshold of one promotes on the first strike; the
                // record would be consumed immediately, so it is never
                // created.
                if threshold == 1 {
                    return true;
                }
                vacant.insert(StrikeRecord {
                    count: 1,
                    first_seen: now,
                });
                false
            }
        }
    }

    /// Drop records whose window has fully elapsed.
    pub fn sweep_idle(&self, max_window: Duration) {
        let now = Instant::now();
        self.records
            .retain(|_, record| now.duration_since(record.first_seen) < max_window);
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}
