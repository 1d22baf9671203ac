#![forbid(unsafe_code)]

//! Trailing-edge debouncing keyed by a coalescing key.
//!
//! A burst of [`touch`](Debouncer::touch) calls for the same key collapses
//! into one entry that becomes due once the key has been quiet for the
//! configured window. An optional `max_wait` bounds how long a continuously
//! touched key can be postponed (a long drag still persists periodically).
//!
//! # Usage
//!
//! ```
//! use std::time::Duration;
//! use dashgrid_core::debounce::Debouncer;
//! use web_time::Instant;
//!
//! let mut debouncer = Debouncer::new(Duration::from_millis(250));
//! let t0 = Instant::now();
//! debouncer.touch("desktop", t0);
//! debouncer.touch("desktop", t0 + Duration::from_millis(100));
//!
//! assert!(debouncer.due(t0 + Duration::from_millis(300)).is_empty());
//! assert_eq!(debouncer.due(t0 + Duration::from_millis(350)), vec!["desktop"]);
//! ```
//!
//! # Invariants
//!
//! 1. A key is reported by [`due`](Debouncer::due) at most once per burst.
//! 2. Keys are reported in key order, so flushes are deterministic.
//! 3. The debouncer never reads the clock itself; callers pass `now`.

use std::collections::BTreeMap;
use std::time::Duration;

use web_time::Instant;

#[derive(Debug, Clone, Copy)]
struct PendingEntry {
    first_touch: Instant,
    last_touch: Instant,
    touches: u32,
}

/// Coalesces bursts of touches per key.
#[derive(Debug, Clone)]
pub struct Debouncer<K> {
    window: Duration,
    max_wait: Option<Duration>,
    pending: BTreeMap<K, PendingEntry>,
    coalesced: u64,
}

impl<K: Ord + Clone> Debouncer<K> {
    /// Create a debouncer with the given quiet window.
    #[must_use]
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            max_wait: None,
            pending: BTreeMap::new(),
            coalesced: 0,
        }
    }

    /// Builder: force a key due after it has been pending this long.
    #[must_use]
    pub fn with_max_wait(mut self, max_wait: Duration) -> Self {
        self.max_wait = Some(max_wait.max(self.window));
        self
    }

    #[must_use]
    pub fn window(&self) -> Duration {
        self.window
    }

    /// Record activity for `key`. Returns `true` if this started a new burst.
    pub fn touch(&mut self, key: K, now: Instant) -> bool {
        match self.pending.get_mut(&key) {
            Some(entry) => {
                entry.last_touch = now.max(entry.last_touch);
                entry.touches = entry.touches.saturating_add(1);
                self.coalesced = self.coalesced.saturating_add(1);
                false
            }
            None => {
                self.pending.insert(
                    key,
                    PendingEntry {
                        first_touch: now,
                        last_touch: now,
                        touches: 1,
                    },
                );
                true
            }
        }
    }

    /// Remove and return every key whose burst has settled at `now`.
    pub fn due(&mut self, now: Instant) -> Vec<K> {
        let ready: Vec<K> = self
            .pending
            .iter()
            .filter(|(_, entry)| self.is_entry_due(entry, now))
            .map(|(key, _)| key.clone())
            .collect();
        for key in &ready {
            self.pending.remove(key);
        }
        ready
    }

    /// Remove and return every pending key regardless of timing.
    pub fn take_all(&mut self) -> Vec<K> {
        std::mem::take(&mut self.pending).into_keys().collect()
    }

    /// Drop a pending key without reporting it.
    pub fn cancel(&mut self, key: &K) -> bool {
        self.pending.remove(key).is_some()
    }

    #[must_use]
    pub fn is_pending(&self, key: &K) -> bool {
        self.pending.contains_key(key)
    }

    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    /// Number of touches absorbed into an existing burst since creation.
    #[must_use]
    pub fn coalesced_count(&self) -> u64 {
        self.coalesced
    }

    /// Earliest instant at which some pending key becomes due.
    #[must_use]
    pub fn next_deadline(&self) -> Option<Instant> {
        self.pending
            .values()
            .map(|entry| self.deadline(entry))
            .min()
    }

    fn deadline(&self, entry: &PendingEntry) -> Instant {
        let quiet = entry.last_touch + self.window;
        match self.max_wait {
            Some(max_wait) => quiet.min(entry.first_touch + max_wait),
            None => quiet,
        }
    }

    fn is_entry_due(&self, entry: &PendingEntry, now: Instant) -> bool {
        now >= self.deadline(entry)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ms(n: u64) -> Duration {
        Duration::from_millis(n)
    }

    #[test]
    fn burst_collapses_to_one_flush() {
        let mut d = Debouncer::new(ms(250));
        let t0 = Instant::now();
        assert!(d.touch(1u8, t0));
        assert!(!d.touch(1u8, t0 + ms(50)));
        assert!(!d.touch(1u8, t0 + ms(200)));
        assert_eq!(d.coalesced_count(), 2);

        assert!(d.due(t0 + ms(449)).is_empty());
        assert_eq!(d.due(t0 + ms(450)), vec![1]);
        assert!(d.due(t0 + ms(10_000)).is_empty());
    }

    #[test]
    fn keys_flush_independently_in_order() {
        let mut d = Debouncer::new(ms(100));
        let t0 = Instant::now();
        d.touch("mobile", t0);
        d.touch("desktop", t0 + ms(10));
        assert_eq!(d.due(t0 + ms(105)), vec!["mobile"]);
        assert_eq!(d.due(t0 + ms(110)), vec!["desktop"]);
    }

    #[test]
    fn max_wait_bounds_continuous_activity() {
        let mut d = Debouncer::new(ms(250)).with_max_wait(ms(1000));
        let t0 = Instant::now();
        for step in 0..20 {
            d.touch(0u8, t0 + ms(step * 100));
            if step * 100 >= 1000 {
                break;
            }
        }
        assert_eq!(d.next_deadline(), Some(t0 + ms(1000)));
        assert_eq!(d.due(t0 + ms(1000)), vec![0]);
    }

    #[test]
    fn take_all_and_cancel() {
        let mut d = Debouncer::new(ms(250));
        let t0 = Instant::now();
        d.touch(1u8, t0);
        d.touch(2u8, t0);
        assert!(d.cancel(&1));
        assert_eq!(d.take_all(), vec![2]);
        assert_eq!(d.pending_count(), 0);
    }
}
