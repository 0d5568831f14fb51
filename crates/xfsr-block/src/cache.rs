//! Bounded, reference-counted keyed cache.
//!
//! One generic implementation serves every metadata kind the volume caches.
//! Each instance owns its own byte budget and key space.
//!
//! # Policy
//!
//! | Event | Action |
//! |-------|--------|
//! | acquire, key indexed | refcount + 1; leaves the LRU list on 0 → 1 |
//! | acquire, miss, room in budget | fresh slot |
//! | acquire, miss, over budget, LRU non-empty | evict least-recently-released entry |
//! | acquire, miss, over budget, LRU empty | fresh slot anyway (temporary overrun) |
//! | loader fails | reserved footprint is returned, error propagates |
//! | release to 0, within budget | entry parked at LRU front, still indexed |
//! | release to 0, over budget | entry dropped from the index |
//!
//! An entry sits on the LRU list iff its refcount is 0, so an entry with a
//! live [`CacheRef`] is never evicted.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::hash::Hash;
use std::ops::Deref;
use std::sync::Arc;
use tracing::trace;
use xfsr_error::Result;

/// Byte budget of one cache instance.
#[cfg(target_pointer_width = "64")]
pub const DEFAULT_CACHE_BUDGET: usize = 512 * 1024;
#[cfg(not(target_pointer_width = "64"))]
pub const DEFAULT_CACHE_BUDGET: usize = 128 * 1024;

/// Point-in-time counters for one cache instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CacheStats {
    /// Indexed entries, referenced or parked.
    pub entries: usize,
    /// Entries parked on the LRU list (refcount 0).
    pub lru_len: usize,
    /// Tracked footprint in bytes.
    pub footprint: usize,
    pub budget: usize,
    pub hits: u64,
    pub misses: u64,
    /// Entries removed from the index to make or give back room.
    pub evictions: u64,
}

struct Slot<V> {
    refs: u32,
    value: Arc<V>,
}

struct CacheState<K, V> {
    budget: usize,
    tracked: usize,
    index: HashMap<K, Slot<V>>,
    /// Front is the most recently released key.
    lru: VecDeque<K>,
    hits: u64,
    misses: u64,
    evictions: u64,
}

impl<K: Copy + Eq + Hash + fmt::Debug, V> CacheState<K, V> {
    fn unlink_lru(&mut self, key: K) {
        if let Some(pos) = self.lru.iter().position(|k| *k == key) {
            let _ = self.lru.remove(pos);
        }
    }

    /// Take another reference on an indexed key.
    fn pin(&mut self, key: K) -> Option<Arc<V>> {
        let slot = self.index.get_mut(&key)?;
        slot.refs += 1;
        let value = Arc::clone(&slot.value);
        if slot.refs == 1 {
            self.unlink_lru(key);
        }
        Some(value)
    }

    /// Reserve room for one more entry, evicting the LRU tail if needed.
    fn reserve(&mut self, footprint: usize, cache: &'static str) {
        if self.tracked.saturating_add(footprint) > self.budget {
            if let Some(victim) = self.lru.pop_back() {
                if self.index.remove(&victim).is_some() {
                    self.tracked = self.tracked.saturating_sub(footprint);
                    self.evictions += 1;
                    trace!(target: "xfsr::cache", cache, ?victim, "evict lru tail");
                }
            } else {
                trace!(
                    target: "xfsr::cache",
                    cache,
                    tracked = self.tracked,
                    budget = self.budget,
                    "all entries referenced, exceeding budget"
                );
            }
        }
        self.tracked = self.tracked.saturating_add(footprint);
    }

    fn release(&mut self, key: K, footprint: usize, cache: &'static str) {
        let Some(slot) = self.index.get_mut(&key) else {
            return;
        };
        slot.refs = slot.refs.saturating_sub(1);
        if slot.refs > 0 {
            return;
        }
        if self.tracked <= self.budget {
            self.lru.push_front(key);
        } else {
            let _ = self.index.remove(&key);
            self.tracked = self.tracked.saturating_sub(footprint);
            self.evictions += 1;
            trace!(target: "xfsr::cache", cache, ?key, "freed on release, over budget");
        }
    }
}

/// Generic bounded keyed cache.
///
/// `footprint` is the accounting size of one entry; the budget is expressed
/// in the same unit (bytes).
pub struct CacheManager<K, V> {
    name: &'static str,
    footprint: usize,
    state: Arc<Mutex<CacheState<K, V>>>,
}

impl<K, V> fmt::Debug for CacheManager<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.lock();
        f.debug_struct("CacheManager")
            .field("name", &self.name)
            .field("footprint", &self.footprint)
            .field("budget", &state.budget)
            .field("tracked", &state.tracked)
            .field("entries", &state.index.len())
            .finish()
    }
}

impl<K: Copy + Eq + Hash + fmt::Debug, V> CacheManager<K, V> {
    #[must_use]
    pub fn new(name: &'static str, budget: usize, footprint: usize) -> Self {
        Self {
            name,
            footprint: footprint.max(1),
            state: Arc::new(Mutex::new(CacheState {
                budget,
                tracked: 0,
                index: HashMap::new(),
                lru: VecDeque::new(),
                hits: 0,
                misses: 0,
                evictions: 0,
            })),
        }
    }

    /// Return a counted reference to `key`, running `load` on a miss.
    ///
    /// `load` runs without the cache lock held. If two callers race on the
    /// same key the first inserted payload wins and the other is dropped.
    pub fn acquire<F>(&self, key: K, load: F) -> Result<CacheRef<K, V>>
    where
        F: FnOnce(K) -> Result<V>,
    {
        {
            let mut state = self.state.lock();
            if let Some(value) = state.pin(key) {
                state.hits += 1;
                trace!(target: "xfsr::cache", cache = self.name, ?key, "hit");
                return Ok(self.make_ref(key, value));
            }
            state.misses += 1;
            state.reserve(self.footprint, self.name);
        }
        trace!(target: "xfsr::cache", cache = self.name, ?key, "miss, loading");

        let loaded = match load(key) {
            Ok(value) => value,
            Err(err) => {
                let mut state = self.state.lock();
                state.tracked = state.tracked.saturating_sub(self.footprint);
                drop(state);
                trace!(target: "xfsr::cache", cache = self.name, ?key, error = %err, "load failed");
                return Err(err);
            }
        };

        let mut state = self.state.lock();
        if let Some(value) = state.pin(key) {
            state.tracked = state.tracked.saturating_sub(self.footprint);
            drop(state);
            return Ok(self.make_ref(key, value));
        }
        let value = Arc::new(loaded);
        state.index.insert(
            key,
            Slot {
                refs: 1,
                value: Arc::clone(&value),
            },
        );
        drop(state);
        Ok(self.make_ref(key, value))
    }

    /// True when `key` is indexed (referenced or parked on the LRU list).
    #[must_use]
    pub fn contains(&self, key: K) -> bool {
        self.state.lock().index.contains_key(&key)
    }

    /// Outstanding references on `key`; 0 when parked or absent.
    #[must_use]
    pub fn ref_count(&self, key: K) -> u32 {
        self.state.lock().index.get(&key).map_or(0, |slot| slot.refs)
    }

    #[must_use]
    pub fn stats(&self) -> CacheStats {
        let state = self.state.lock();
        CacheStats {
            entries: state.index.len(),
            lru_len: state.lru.len(),
            footprint: state.tracked,
            budget: state.budget,
            hits: state.hits,
            misses: state.misses,
            evictions: state.evictions,
        }
    }

    fn make_ref(&self, key: K, value: Arc<V>) -> CacheRef<K, V> {
        CacheRef {
            key,
            value,
            footprint: self.footprint,
            cache: self.name,
            state: Arc::clone(&self.state),
        }
    }
}

/// A counted reference into a [`CacheManager`].
///
/// Dropping it performs the release.
pub struct CacheRef<K: Copy + Eq + Hash + fmt::Debug, V> {
    key: K,
    value: Arc<V>,
    footprint: usize,
    cache: &'static str,
    state: Arc<Mutex<CacheState<K, V>>>,
}

impl<K: Copy + Eq + Hash + fmt::Debug, V> CacheRef<K, V> {
    #[must_use]
    pub fn key(&self) -> K {
        self.key
    }

    /// True when both references are backed by the same decoded payload.
    #[must_use]
    pub fn ptr_eq(a: &Self, b: &Self) -> bool {
        Arc::ptr_eq(&a.value, &b.value)
    }
}

impl<K: Copy + Eq + Hash + fmt::Debug, V> Clone for CacheRef<K, V> {
    fn clone(&self) -> Self {
        let mut state = self.state.lock();
        if let Some(slot) = state.index.get_mut(&self.key) {
            slot.refs += 1;
        }
        drop(state);
        Self {
            key: self.key,
            value: Arc::clone(&self.value),
            footprint: self.footprint,
            cache: self.cache,
            state: Arc::clone(&self.state),
        }
    }
}

impl<K: Copy + Eq + Hash + fmt::Debug, V> Deref for CacheRef<K, V> {
    type Target = V;

    fn deref(&self) -> &V {
        &self.value
    }
}

impl<K: Copy + Eq + Hash + fmt::Debug, V: fmt::Debug> fmt::Debug for CacheRef<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CacheRef")
            .field("cache", &self.cache)
            .field("key", &self.key)
            .field("value", &self.value)
            .finish()
    }
}

impl<K: Copy + Eq + Hash + fmt::Debug, V> Drop for CacheRef<K, V> {
    fn drop(&mut self) {
        self.state
            .lock()
            .release(self.key, self.footprint, self.cache);
    }
}
