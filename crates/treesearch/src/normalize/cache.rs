//! Time-expiring memo of normalized strings.

use std::sync::Arc;
use std::time::{Duration, Instant};

use fnv::FnvHashMap;
use parking_lot::Mutex;

#[derive(Debug)]
struct CacheEntry {
    value: Arc<str>,
    last_access: Instant,
}

#[derive(Debug)]
struct CacheState {
    entries: FnvHashMap<Box<str>, CacheEntry>,
    last_sweep: Instant,
}

/// Per-input cache with last-access timestamps.
///
/// Lookups sweep opportunistically: once `sweep_interval` has passed since
/// the previous sweep, entries idle for longer than `expiry` are dropped.
#[derive(Debug)]
pub struct NormalizeCache {
    state: Mutex<CacheState>,
    expiry: Duration,
    sweep_interval: Duration,
}

impl NormalizeCache {
    pub fn new(expiry: Duration, sweep_interval: Duration) -> Self {
        Self {
            state: Mutex::new(CacheState {
                entries: FnvHashMap::default(),
                last_sweep: Instant::now(),
            }),
            expiry,
            sweep_interval,
        }
    }

    pub fn get_or_insert_with(&self, key: &str, compute: impl FnOnce() -> String) -> Arc<str> {
        let now = Instant::now();
        let mut state = self.state.lock();
        if now.duration_since(state.last_sweep) >= self.sweep_interval {
            Self::sweep_locked(&mut state, now, self.expiry);
        }
        if let Some(entry) = state.entries.get_mut(key) {
            entry.last_access = now;
            return entry.value.clone();
        }
        let value: Arc<str> = Arc::from(compute());
        state.entries.insert(
            key.into(),
            CacheEntry {
                value: value.clone(),
                last_access: now,
            },
        );
        value
    }

    /// Evicts entries idle for longer than the expiry. Returns the number evicted.
    pub fn sweep(&self) -> usize {
        let mut state = self.state.lock();
        Self::sweep_locked(&mut state, Instant::now(), self.expiry)
    }

    fn sweep_locked(state: &mut CacheState, now: Instant, expiry: Duration) -> usize {
        let before = state.entries.len();
        state
            .entries
            .retain(|_, entry| now.duration_since(entry.last_access) <= expiry);
        state.last_sweep = now;
        let evicted = before - state.entries.len();
        if evicted > 0 {
            log::debug!(
                "normalize cache sweep evicted={} remaining={}",
                evicted,
                state.entries.len()
            );
        }
        evicted
    }

    pub fn len(&self) -> usize {
        self.state.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn repeated_lookup_reuses_value() {
        let cache = NormalizeCache::new(Duration::from_secs(60), Duration::from_secs(60));
        let mut calls = 0;
        let first = cache.get_or_insert_with("abc", || {
            calls += 1;
            "ABC".to_string()
        });
        let second = cache.get_or_insert_with("abc", || {
            calls += 1;
            "ABC".to_string()
        });
        assert_eq!(calls, 1);
        assert!(Arc::ptr_eq(&first, &second));
    }

    #[test]
    fn sweep_evicts_idle_entries() {
        let cache = NormalizeCache::new(Duration::ZERO, Duration::from_secs(3600));
        cache.get_or_insert_with("abc", || "ABC".to_string());
        assert_eq!(cache.len(), 1);
        std::thread::sleep(Duration::from_millis(5));
        assert_eq!(cache.sweep(), 1);
        assert!(cache.is_empty());
    }

    #[test]
    fn lookup_triggers_sweep_after_interval() {
        let cache = NormalizeCache::new(Duration::ZERO, Duration::ZERO);
        cache.get_or_insert_with("old", || "OLD".to_string());
        std::thread::sleep(Duration::from_millis(5));
        cache.get_or_insert_with("new", || "NEW".to_string());
        assert_eq!(cache.len(), 1);
    }
}
