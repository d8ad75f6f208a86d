//! Rolling-window request log, sharded by identity key.

use dashmap::DashMap;
use std::collections::VecDeque;
use std::time::{Duration, Instant};

/// Per-identity rolling-window rate limiter.
///
/// Each key owns a FIFO of hit timestamps. A hit prunes timestamps older
/// than the window, refuses once the remaining count has reached the limit,
/// and appends otherwise. The map is sharded; a bucket's mutations are
/// serialized by its shard lock, so decisions for a single key are
/// linearizable. There is no ordering across keys.
#[derive(Debug, Default)]
pub struct RateLimiter {
    buckets: DashMap<String, VecDeque<Instant>>,
}

impl RateLimiter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a hit for `key` against `limit` per `window`.
    ///
    /// Returns `true` when the request is allowed. A refused hit consumes no
    /// slot.
    pub fn hit(&self, key: &str, limit: u32, window: Duration) -> bool {
        self.hit_at(key, limit, window, Instant::now())
    }

    fn hit_at(&self, key: &str, limit: u32, window: Duration, now: Instant) -> bool {
        let mut bucket = self.buckets.entry(key.to_owned()).or_default();

        while let Some(front) = bucket.front() {
            if now.duration_since(*front) >= window {
                bucket.pop_front();
            } else {
                break;
            }
        }

        if bucket.len() >= limit as usize {
            return false;
        }

        bucket.push_back(now);
        true
    }

    /// Drop buckets with no hit in the last `max_window`.
    pub fn sweep_idle(&self, max_window: Duration) {
        let now = Instant::now();
        self.buckets.retain(|_, bucket| {
            bucket
                .back()
                .is_some_and(|last| now.duration_since(*last) < max_window)
        });
    }

    pub fn len(&self) -> usize {
        self.buckets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const WINDOW: Duration = Duration::from_secs(60);

    #[test]
    fn allows_exactly_the_limit_within_a_window() {
        let limiter = RateLimiter::new();
        let now = Instant::now();

        for i in 0..5 {
            assert!(
                limiter.hit_at("k", 5, WINDOW, now + Duration::from_millis(i)),
                "hit {i} should be allowed"
            );
        }
        assert!(!limiter.hit_at("k", 5, WINDOW, now + Duration::from_millis(5)));
    }

    #[test]
    fn denied_hits_consume_no_slot() {
        let limiter = RateLimiter::new();
        let now = Instant::now();

        for _ in 0..3 {
            assert!(limiter.hit_at("k", 3, WINDOW, now));
        }
        // Refusals do not extend the window or occupy capacity.
        for _ in 0..10 {
            assert!(!limiter.hit_at("k", 3, WINDOW, now + Duration::from_secs(1)));
        }
        // Once the original hits age out, capacity returns.
        assert!(limiter.hit_at("k", 3, WINDOW, now + WINDOW));
    }

    #[test]
    fn slot_frees_exactly_when_the_window_elapses() {
        let limiter = RateLimiter::new();
        let now = Instant::now();

        assert!(limiter.hit_at("k", 1, WINDOW, now));
        assert!(!limiter.hit_at("k", 1, WINDOW, now + WINDOW - Duration::from_millis(1)));
        assert!(limiter.hit_at("k", 1, WINDOW, now + WINDOW));
    }

    #[test]
    fn keys_are_independent() {
        let limiter = RateLimiter::new();
        let now = Instant::now();

        assert!(limiter.hit_at("a", 1, WINDOW, now));
        assert!(!limiter.hit_at("a", 1, WINDOW, now));
        assert!(limiter.hit_at("b", 1, WINDOW, now));
    }

    #[test]
    fn zero_limit_refuses_everything() {
        let limiter = RateLimiter::new();
        assert!(!limiter.hit_at("k", 0, WINDOW, Instant::now()));
    }

    #[test]
    fn sweep_drops_idle_buckets_only() {
        let limiter = RateLimiter::new();
        let now = Instant::now();

        limiter.hit_at("old", 5, WINDOW, now - Duration::from_secs(120));
        limiter.hit_at("fresh", 5, WINDOW, now);
        assert_eq!(limiter.len(), 2);

        limiter.sweep_idle(WINDOW);
        assert_eq!(limiter.len(), 1);
        assert!(limiter.buckets.contains_key("fresh"));
    }
}
