// src/cache.rs
//! TTL cache with single-flight compute: concurrent misses for the same
//! key run the pipeline once and share the result. Entries are never
//! served past `created_at + ttl`; expired entries are evicted lazily on
//! lookup (a `purge_expired` sweep also exists for housekeeping).
//!
//! A failed compute writes nothing: the error propagates and any prior
//! entry stays as-is (expired entries are still never served).

use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use metrics::counter;
use serde::Serialize;

#[derive(Debug, Clone)]
struct Entry<V> {
    value: V,
    created_at: Instant,
    ttl: Duration,
}

impl<V> Entry<V> {
    fn is_fresh(&self, now: Instant) -> bool {
        now.duration_since(self.created_at) < self.ttl
    }
}

struct Slot<V> {
    /// Serializes compute per key: the single-flight gate.
    gate: tokio::sync::Mutex<()>,
    state: Mutex<Option<Entry<V>>>,
}

impl<V> Default for Slot<V> {
    fn default() -> Self {
        Self {
            gate: tokio::sync::Mutex::new(()),
            state: Mutex::new(None),
        }
    }
}

impl<V: Clone> Slot<V> {
    /// Fresh value if present; lazily evicts an expired entry.
    fn peek_fresh(&self, now: Instant) -> Option<V> {
        let mut state = self.state.lock().expect("cache slot mutex poisoned");
        match state.as_ref() {
            Some(entry) if entry.is_fresh(now) => Some(entry.value.clone()),
            Some(_) => {
                *state = None;
                None
            }
            None => None,
        }
    }

    fn store(&self, value: V, ttl: Duration) {
        let mut state = self.state.lock().expect("cache slot mutex poisoned");
        *state = Some(Entry {
            value,
            created_at: Instant::now(),
            ttl,
        });
    }
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub entries: usize,
    pub hit_rate: f64,
}

pub struct ContextCache<V> {
    slots: Mutex<HashMap<String, Arc<Slot<V>>>>,
    default_ttl: Duration,
    max_entries: usize,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl<V: Clone> ContextCache<V> {
    pub fn new(default_ttl: Duration, max_entries: usize) -> Self {
        Self {
            slots: Mutex::new(HashMap::new()),
            default_ttl,
            max_entries: max_entries.max(1),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    fn slot(&self, key: &str) -> Arc<Slot<V>> {
        let mut slots = self.slots.lock().expect("cache map mutex poisoned");
        if slots.len() >= self.max_entries && !slots.contains_key(key) {
            Self::evict_for_room(&mut slots);
        }
        slots.entry(key.to_string()).or_default().clone()
    }

    /// Drop expired slots; if none expired, drop the oldest entry.
    fn evict_for_room(slots: &mut HashMap<String, Arc<Slot<V>>>) {
        let now = Instant::now();
        let before = slots.len();
        slots.retain(|_, slot| {
            let state = slot.state.lock().expect("cache slot mutex poisoned");
            state.as_ref().map_or(true, |e| e.is_fresh(now))
        });
        if slots.len() < before {
            return;
        }
        let oldest = slots
            .iter()
            .filter_map(|(k, slot)| {
                let state = slot.state.lock().expect("cache slot mutex poisoned");
                state.as_ref().map(|e| (k.clone(), e.created_at))
            })
            .min_by_key(|(_, created)| *created)
            .map(|(k, _)| k);
        if let Some(k) = oldest {
            slots.remove(&k);
        }
    }

    /// Cached value if fresh, without computing.
    pub fn get(&self, key: &str) -> Option<V> {
        let slot = {
            let slots = self.slots.lock().expect("cache map mutex poisoned");
            slots.get(key).cloned()
        };
        slot.and_then(|s| s.peek_fresh(Instant::now()))
    }

    /// Serve the cached value when fresh; otherwise run `compute` under
    /// the per-key single-flight gate. Concurrent callers for the same
    /// uncached key trigger exactly one compute and all share its result.
    /// A failed compute leaves the cache unmodified.
    pub async fn get_or_compute<F, Fut, E>(
        &self,
        key: &str,
        ttl: Option<Duration>,
        compute: F,
    ) -> Result<V, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V, E>>,
    {
        let ttl = ttl.unwrap_or(self.default_ttl);
        let slot = self.slot(key);

        if let Some(value) = slot.peek_fresh(Instant::now()) {
            self.hits.fetch_add(1, Ordering::Relaxed);
            counter!("context_cache_hits_total").increment(1);
            return Ok(value);
        }

        let _flight = slot.gate.lock().await;

        // Another flight may have filled the slot while we waited.
        if let Some(value) = slot.peek_fresh(Instant::now()) {
            self.hits.fetch_add(1, Ordering::Relaxed);
            counter!("context_cache_hits_total").increment(1);
            return Ok(value);
        }

        self.misses.fetch_add(1, Ordering::Relaxed);
        counter!("context_cache_misses_total").increment(1);

        let value = compute().await?;
        slot.store(value.clone(), ttl);
        Ok(value)
    }

    /// Recompute unconditionally (force refresh), still serialized with
    /// other flights for the key so concurrent callers don't race.
    pub async fn refresh<F, Fut, E>(
        &self,
        key: &str,
        ttl: Option<Duration>,
        compute: F,
    ) -> Result<V, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V, E>>,
    {
        let ttl = ttl.unwrap_or(self.default_ttl);
        let slot = self.slot(key);
        let _flight = slot.gate.lock().await;

        self.misses.fetch_add(1, Ordering::Relaxed);
        counter!("context_cache_misses_total").increment(1);

        let value = compute().await?;
        slot.store(value.clone(), ttl);
        Ok(value)
    }

    pub fn invalidate(&self, key: &str) {
        let mut slots = self.slots.lock().expect("cache map mutex poisoned");
        slots.remove(key);
    }

    pub fn clear(&self) {
        let mut slots = self.slots.lock().expect("cache map mutex poisoned");
        slots.clear();
        self.hits.store(0, Ordering::Relaxed);
        self.misses.store(0, Ordering::Relaxed);
    }

    /// Housekeeping sweep; lazy eviction on lookup already upholds the
    /// TTL invariant without it.
    pub fn purge_expired(&self) {
        let now = Instant::now();
        let mut slots = self.slots.lock().expect("cache map mutex poisoned");
        slots.retain(|_, slot| {
            let mut state = slot.state.lock().expect("cache slot mutex poisoned");
            match state.as_ref() {
                Some(e) if e.is_fresh(now) => true,
                Some(_) => {
                    *state = None;
                    false
                }
                None => false,
            }
        });
    }

    pub fn stats(&self) -> CacheStats {
        let now = Instant::now();
        let entries = {
            let slots = self.slots.lock().expect("cache map mutex poisoned");
            slots
                .values()
                .filter(|slot| {
                    let state = slot.state.lock().expect("cache slot mutex poisoned");
                    state.as_ref().map_or(false, |e| e.is_fresh(now))
                })
                .count()
        };
        let hits = self.hits.load(Ordering::Relaxed);
        let misses = self.misses.load(Ordering::Relaxed);
        let total = hits + misses;
        CacheStats {
            hits,
            misses,
            entries,
            hit_rate: if total > 0 {
                hits as f64 / total as f64
            } else {
                0.0
            },
        }
    }
}
