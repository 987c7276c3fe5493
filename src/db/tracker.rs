//! Physical connection tracking.
//!
//! Remembers which backend processes have already been seen so the provider
//! can run its one-time hook once per physical connection. Entries expire
//! after a TTL: a backend PID not seen for longer than that is presumed to be
//! a new, recycled connection.
//!
//! Uses `std::sync::Mutex` (not tokio): the lock is never held across an await.

use crate::config::TRACKER_PRUNE_INTERVAL;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;

struct TrackerState {
    last_seen: HashMap<i32, Instant>,
    last_prune: Instant,
}

pub struct ConnectionTracker {
    ttl: Duration,
    prune_interval: Duration,
    state: Mutex<TrackerState>,
}

impl ConnectionTracker {
    /// Create a tracker with the default prune interval.
    pub fn new(ttl: Duration) -> Self {
        Self::with_prune_interval(ttl, TRACKER_PRUNE_INTERVAL)
    }

    pub fn with_prune_interval(ttl: Duration, prune_interval: Duration) -> Self {
        Self {
            ttl,
            prune_interval,
            state: Mutex::new(TrackerState {
                last_seen: HashMap::new(),
                last_prune: Instant::now(),
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, TrackerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Drop expired entries, at most once per prune interval.
    ///
    /// Returns the number of entries removed.
    pub fn prune_if_due(&self) -> usize {
        let now = Instant::now();
        let mut state = self.lock();
        if now.duration_since(state.last_prune) <= self.prune_interval {
            return 0;
        }
        state.last_prune = now;

        let before = state.last_seen.len();
        let ttl = self.ttl;
        state
            .last_seen
            .retain(|_, seen| now.duration_since(*seen) <= ttl);
        let removed = before - state.last_seen.len();
        if removed > 0 {
            debug!(removed = removed, remaining = state.last_seen.len(), "Pruned stale connections");
        }
        removed
    }

    /// Record that `pid` was just seen.
    ///
    /// Returns true when the connection is new: never seen, or last seen
    /// longer than the TTL ago.
    pub fn observe(&self, pid: i32) -> bool {
        let now = Instant::now();
        let mut state = self.lock();
        let is_new = match state.last_seen.get(&pid) {
            Some(seen) => now.duration_since(*seen) > self.ttl,
            None => true,
        };
        state.last_seen.insert(pid, now);
        is_new
    }

    /// Forget `pid`, so its next observation counts as new.
    pub fn forget(&self, pid: i32) {
        self.lock().last_seen.remove(&pid);
    }

    /// Remove every entry.
    pub fn clear(&self) {
        self.lock().last_seen.clear();
    }

    pub fn contains(&self, pid: i32) -> bool {
        self.lock().last_seen.contains_key(&pid)
    }

    pub fn len(&self) -> usize {
        self.lock().last_seen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl std::fmt::Debug for ConnectionTracker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionTracker")
            .field("ttl", &self.ttl)
            .field("prune_interval", &self.prune_interval)
            .field("tracked", &self.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TTL: Duration = Duration::from_secs(600);

    #[tokio::test(start_paused = true)]
    async fn test_first_observation_is_new() {
        let tracker = ConnectionTracker::new(TTL);
        assert!(tracker.observe(42));
        assert!(!tracker.observe(42));
        assert!(tracker.observe(43));
        assert_eq!(tracker.len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_refresh_keeps_connection_known() {
        let tracker = ConnectionTracker::new(TTL);
        assert!(tracker.observe(7));
        for _ in 0..5 {
            tokio::time::advance(TTL / 2).await;
            assert!(!tracker.observe(7));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_expired_entry_counts_as_new() {
        let tracker = ConnectionTracker::new(TTL);
        assert!(tracker.observe(7));
        tokio::time::advance(TTL + Duration::from_millis(1)).await;
        assert!(tracker.observe(7));
        assert!(!tracker.observe(7));
    }

    #[tokio::test(start_paused = true)]
    async fn test_prune_is_throttled() {
        let tracker = ConnectionTracker::with_prune_interval(
            Duration::from_secs(10),
            Duration::from_secs(60),
        );
        tracker.observe(1);
        tokio::time::advance(Duration::from_secs(30)).await;
        // Stale, but the prune interval has not elapsed yet.
        assert_eq!(tracker.prune_if_due(), 0);
        assert!(tracker.contains(1));

        tokio::time::advance(Duration::from_secs(31)).await;
        tracker.observe(2);
        assert_eq!(tracker.prune_if_due(), 1);
        assert!(!tracker.contains(1));
        assert!(tracker.contains(2));

        // Just pruned: the next pass waits another interval.
        tokio::time::advance(Duration::from_secs(20)).await;
        assert_eq!(tracker.prune_if_due(), 0);
        assert!(tracker.contains(2));
    }

    #[tokio::test(start_paused = true)]
    async fn test_forget_and_clear() {
        let tracker = ConnectionTracker::new(TTL);
        tracker.observe(1);
        tracker.observe(2);
        tracker.forget(1);
        assert!(tracker.observe(1));
        tracker.clear();
        assert!(tracker.is_empty());
        assert!(tracker.observe(2));
    }
}
