//! Projection result cache
//!
//! Bounded LRU keyed by (city, record id). Concurrent misses on the same key
//! are collapsed: the first caller computes while the others wait on a
//! per-key gate and then read the stored value. Failed computations are
//! never stored, and neither are results whose city was invalidated while
//! they were being computed.

use ahash::AHashMap;
use parking_lot::Mutex;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub city: String,
    pub record: String,
}

impl CacheKey {
    pub fn new(city: impl Into<String>, record: impl Into<String>) -> Self {
        Self {
            city: city.into(),
            record: record.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub entries: usize,
    pub capacity: usize,
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
}

struct Slot<V> {
    value: Arc<V>,
    last_used: u64,
}

struct LruState<V> {
    entries: AHashMap<CacheKey, Slot<V>>,
    tick: u64,
    /// Bumped by every invalidation of a city
    generations: AHashMap<String, u64>,
}

impl<V> LruState<V> {
    fn generation(&self, city: &str) -> u64 {
        self.generations.get(city).copied().unwrap_or(0)
    }
}

/// Removes the key's single-flight gate once its holder is done, even if
/// the computation panics.
struct GateRelease<'a, V> {
    cache: &'a ProjectionCache<V>,
    key: &'a CacheKey,
    gate: Arc<Mutex<()>>,
}

impl<V> Drop for GateRelease<'_, V> {
    fn drop(&mut self) {
        let mut inflight = self.cache.inflight.lock();
        // map + this holder: nobody else is waiting
        if Arc::strong_count(&self.gate) <= 2 {
            inflight.remove(self.key);
        }
    }
}

pub struct ProjectionCache<V> {
    capacity: usize,
    state: Mutex<LruState<V>>,
    inflight: Mutex<AHashMap<CacheKey, Arc<Mutex<()>>>>,
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
}

impl<V> ProjectionCache<V> {
    /// A cache holding at most `capacity` entries; 0 disables storage
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            state: Mutex::new(LruState {
                entries: AHashMap::new(),
                tick: 0,
                generations: AHashMap::new(),
            }),
            inflight: Mutex::new(AHashMap::new()),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
        }
    }

    /// Look up a value and mark it recently used
    pub fn get(&self, key: &CacheKey) -> Option<Arc<V>> {
        let mut state = self.state.lock();
        state.tick += 1;
        let tick = state.tick;
        state.entries.get_mut(key).map(|slot| {
            slot.last_used = tick;
            slot.value.clone()
        })
    }

    pub fn insert(&self, key: CacheKey, value: Arc<V>) {
        if self.capacity == 0 {
            return;
        }
        let mut state = self.state.lock();
        self.insert_locked(&mut state, key, value);
    }

    fn insert_locked(&self, state: &mut LruState<V>, key: CacheKey, value: Arc<V>) {
        state.tick += 1;
        let tick = state.tick;

        if !state.entries.contains_key(&key) && state.entries.len() >= self.capacity {
            let oldest = state
                .entries
                .iter()
                .min_by_key(|(_, slot)| slot.last_used)
                .map(|(k, _)| k.clone());
            if let Some(oldest) = oldest {
                state.entries.remove(&oldest);
                self.evictions.fetch_add(1, Ordering::Relaxed);
            }
        }

        state.entries.insert(key, Slot { value, last_used: tick });
    }

    /// Return the cached value for `key`, computing and storing it on a miss.
    /// The boolean is `true` when the value came from the cache.
    pub fn get_or_try_insert_with<E, F>(&self, key: CacheKey, compute: F) -> Result<(Arc<V>, bool), E>
    where
        F: FnOnce() -> Result<V, E>,
    {
        if self.capacity == 0 {
            self.misses.fetch_add(1, Ordering::Relaxed);
            return compute().map(|v| (Arc::new(v), false));
        }

        if let Some(value) = self.get(&key) {
            self.hits.fetch_add(1, Ordering::Relaxed);
            return Ok((value, true));
        }

        let gate = self
            .inflight
            .lock()
            .entry(key.clone())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        let release = GateRelease {
            cache: self,
            key: &key,
            gate,
        };

        let _guard = release.gate.lock();
        if let Some(value) = self.get(&key) {
            self.hits.fetch_add(1, Ordering::Relaxed);
            return Ok((value, true));
        }

        self.misses.fetch_add(1, Ordering::Relaxed);
        let generation = self.state.lock().generation(&key.city);
        let value = Arc::new(compute()?);

        let mut state = self.state.lock();
        if state.generation(&key.city) == generation {
            self.insert_locked(&mut state, key.clone(), value.clone());
        }
        Ok((value, false))
    }

    /// Drop every entry for a city, returning how many were removed.
    /// Computations for the city already in flight will not be stored.
    pub fn invalidate_city(&self, city: &str) -> usize {
        let mut state = self.state.lock();
        *state.generations.entry(city.to_string()).or_insert(0) += 1;
        let before = state.entries.len();
        state.entries.retain(|key, _| key.city != city);
        before - state.entries.len()
    }

    pub fn clear(&self) {
        let mut state = self.state.lock();
        let cities: Vec<String> = state.entries.keys().map(|k| k.city.clone()).collect();
        for city in cities {
            *state.generations.entry(city).or_insert(0) += 1;
        }
        state.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.state.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            entries: self.len(),
            capacity: self.capacity,
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
        }
    }
}
