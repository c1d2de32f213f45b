//! Reclamation timer for deferred despawns.
//!
//! The timer is a passive countdown list. The host scheduler feeds it elapsed
//! time through [`ReclamationTimer::advance`]; for every whole interval that
//! has accumulated, each entry's remaining time drops by exactly one interval.
//! Entries whose remaining time reaches zero are removed and returned, in the
//! order they were scheduled, so the pool can despawn them.
//!
//! Every entry is decremented by the interval itself, for both entity kinds,
//! so expiry lands on the first tick at or after the requested lifetime.
//! An entry scheduled part-way through an interval is anchored to the current
//! tick phase: the partial interval already accumulated is added to its
//! countdown.

use std::time::Duration;

/// Default tick interval (100 ms).
pub const DEFAULT_RECLAIM_INTERVAL: Duration = Duration::from_millis(100);

/// An item waiting to be despawned.
#[derive(Debug)]
pub struct ReclamationEntry<T> {
    pub item: T,
    pub remaining: Duration,
}

/// Countdown list driven by fixed-size ticks.
#[derive(Debug)]
pub struct ReclamationTimer<T> {
    entries: Vec<ReclamationEntry<T>>,
    interval: Duration,
    /// Elapsed time not yet consumed by a whole tick.
    accumulated: Duration,
    ticks: u64,
}

impl<T> ReclamationTimer<T> {
    /// Create a timer ticking every `interval`.
    ///
    /// # Panics
    ///
    /// Panics if `interval` is zero.
    pub fn new(interval: Duration) -> Self {
        assert!(
            !interval.is_zero(),
            "reclaim interval must be positive, got {interval:?}"
        );
        Self {
            entries: Vec::new(),
            interval,
            accumulated: Duration::ZERO,
            ticks: 0,
        }
    }

    /// Register `item` to expire after `lifetime`, measured from now.
    pub fn schedule(&mut self, item: T, lifetime: Duration) {
        self.entries.push(ReclamationEntry {
            item,
            remaining: lifetime + self.accumulated,
        });
    }

    /// Feed elapsed time; returns the items that expired, oldest first.
    pub fn advance(&mut self, elapsed: Duration) -> Vec<T> {
        self.accumulated += elapsed;
        let mut expired = Vec::new();
        while self.accumulated >= self.interval {
            self.accumulated -= self.interval;
            self.step(&mut expired);
        }
        expired
    }

    /// Run exactly one tick.
    fn step(&mut self, expired: &mut Vec<T>) {
        self.ticks += 1;
        let mut i = 0;
        while i < self.entries.len() {
            let entry = &mut self.entries[i];
            entry.remaining = entry.remaining.saturating_sub(self.interval);
            if entry.remaining.is_zero() {
                // `remove` keeps scheduling order; don't advance `i`.
                expired.push(self.entries.remove(i).item);
            } else {
                i += 1;
            }
        }
    }

    /// Entries still counting down.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Remaining times of all entries, in scheduling order.
    pub fn remaining(&self) -> impl Iterator<Item = Duration> + '_ {
        self.entries.iter().map(|e| e.remaining)
    }

    /// Tick interval.
    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Number of whole ticks run so far.
    pub fn tick_count(&self) -> u64 {
        self.ticks
    }

    /// Stop the timer: drop every pending entry and any partial tick.
    pub fn clear(&mut self) {
        self.entries.clear();
        self.accumulated = Duration::ZERO;
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
