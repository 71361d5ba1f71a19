// SPDX-FileCopyrightText: 2026 Attache Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Credential pool with per-key cooldown state.
//!
//! Keys rotate round-robin. A rate-limited key cools down until its
//! `available_at`; an invalid key is dead for the life of the process. The
//! pool is exhausted when no key is usable right now.

use std::time::{Duration, Instant};

use tracing::warn;

#[derive(Debug)]
struct KeyState {
    key: String,
    available_at: Instant,
    consecutive_failures: u32,
    dead: bool,
}

/// Rotation state over the configured credentials.
#[derive(Debug)]
pub struct KeyPool {
    keys: Vec<KeyState>,
    cursor: usize,
}

impl KeyPool {
    pub fn new(keys: Vec<String>) -> Self {
        let now = Instant::now();
        Self {
            keys: keys
                .into_iter()
                .map(|key| KeyState {
                    key,
                    available_at: now,
                    consecutive_failures: 0,
                    dead: false,
                })
                .collect(),
            cursor: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Picks the next usable key round-robin from the cursor, advancing the
    /// cursor past it. Returns the key's index, or `None` when the pool is
    /// exhausted at `now`.
    pub fn next_available(&mut self, now: Instant) -> Option<usize> {
        let n = self.keys.len();
        for offset in 0..n {
            let idx = (self.cursor + offset) % n;
            let state = &self.keys[idx];
            if !state.dead && state.available_at <= now {
                self.cursor = (idx + 1) % n;
                return Some(idx);
            }
        }
        None
    }

    /// The credential at `idx`.
    pub fn key(&self, idx: usize) -> &str {
        &self.keys[idx].key
    }

    /// Puts a key into rate-limit cooldown.
    pub fn cooldown(&mut self, idx: usize, retry_after: Duration, now: Instant) {
        let state = &mut self.keys[idx];
        state.available_at = now + retry_after;
        state.consecutive_failures += 1;
        warn!(
            key_index = idx,
            retry_after_secs = retry_after.as_secs(),
            consecutive_failures = state.consecutive_failures,
            "model key entering cooldown"
        );
    }

    /// Marks a key permanently unusable (rejected credential).
    pub fn mark_dead(&mut self, idx: usize) {
        self.keys[idx].dead = true;
        warn!(key_index = idx, "model key marked dead");
    }

    /// Resets failure tracking after a successful call.
    pub fn record_success(&mut self, idx: usize) {
        self.keys[idx].consecutive_failures = 0;
    }

    /// True when every key is dead or cooling down at `now`.
    pub fn is_exhausted(&self, now: Instant) -> bool {
        self.keys
            .iter()
            .all(|k| k.dead || k.available_at > now)
    }

    /// Time until the earliest non-dead key becomes usable. Zero when a key
    /// is usable now; `None` when every key is dead.
    pub fn earliest_available(&self, now: Instant) -> Option<Duration> {
        self.keys
            .iter()
            .filter(|k| !k.dead)
            .map(|k| k.available_at.saturating_duration_since(now))
            .min()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pool(names: &[&str]) -> KeyPool {
        KeyPool::new(names.iter().map(|s| s.to_string()).collect())
    }

    #[test]
    fn round_robin_rotates_across_keys() {
        let mut pool = pool(&["a", "b", "c"]);
        let now = Instant::now();
        let first = pool.next_available(now).unwrap();
        let second = pool.next_available(now).unwrap();
        let third = pool.next_available(now).unwrap();
        let fourth = pool.next_available(now).unwrap();
        assert_eq!(
            (pool.key(first), pool.key(second), pool.key(third)),
            ("a", "b", "c")
        );
        assert_eq!(pool.key(fourth), "a");
    }

    #[test]
    fn cooldown_skips_key_until_available() {
        let mut pool = pool(&["a", "b"]);
        let now = Instant::now();
        let a = pool.next_available(now).unwrap();
        pool.cooldown(a, Duration::from_secs(10), now);

        // Only "b" is usable while "a" cools down.
        let idx = pool.next_available(now).unwrap();
        assert_eq!(pool.key(idx), "b");
        let idx = pool.next_available(now).unwrap();
        assert_eq!(pool.key(idx), "b");

        // After the cooldown "a" rejoins the rotation.
        let later = now + Duration::from_secs(11);
        let idx = pool.next_available(later).unwrap();
        assert_eq!(pool.key(idx), "a");
    }

    #[test]
    fn dead_keys_never_return() {
        let mut pool = pool(&["a", "b"]);
        let now = Instant::now();
        pool.mark_dead(0);
        for _ in 0..4 {
            let idx = pool.next_available(now).unwrap();
            assert_eq!(pool.key(idx), "b");
        }
    }

    #[test]
    fn exhaustion_when_all_cooling_or_dead() {
        let mut pool = pool(&["a", "b"]);
        let now = Instant::now();
        assert!(!pool.is_exhausted(now));

        pool.mark_dead(0);
        pool.cooldown(1, Duration::from_secs(30), now);
        assert!(pool.is_exhausted(now));
        assert!(pool.next_available(now).is_none());

        // Earliest availability is the cooling key, not the dead one.
        let earliest = pool.earliest_available(now).unwrap();
        assert!(earliest > Duration::from_secs(29) && earliest <= Duration::from_secs(30));

        // All-dead pool has no earliest availability.
        pool.mark_dead(1);
        assert!(pool.earliest_available(now).is_none());
    }

    #[test]
    fn success_resets_failure_count() {
        let mut pool = pool(&["a"]);
        let now = Instant::now();
        pool.cooldown(0, Duration::from_secs(0), now);
        assert_eq!(pool.keys[0].consecutive_failures, 1);
        pool.record_success(0);
        assert_eq!(pool.keys[0].consecutive_failures, 0);
    }
}
