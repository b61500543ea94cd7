//! In-process named caches with live statistics.
//!
//! `CacheManager` is the default cache registry read by the statistics
//! extractor. Each `MemoryCache` keeps its entries in an `lru::LruCache`, is
//! bounded by `max_entries` (0 means unbounded), evicts by its configured
//! policy, expires entries by time-to-live / time-to-idle unless eternal, and
//! keeps atomic counters for hits, misses, evictions and get latency.

use std::collections::BTreeMap;
use std::fmt;
use std::hash::Hash;
use std::mem;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::time::{Duration, Instant};

use lru::LruCache;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Rule choosing the entry removed when a cache is full.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum EvictionPolicy {
    Lru,
    Lfu,
    Fifo,
}

impl fmt::Display for EvictionPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            EvictionPolicy::Lru => "LRU",
            EvictionPolicy::Lfu => "LFU",
            EvictionPolicy::Fifo => "FIFO",
        })
    }
}

/// Where a cache keeps entries beyond the heap.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum PersistenceStrategy {
    None,
    LocalTempSwap,
    LocalRestartable,
    Distributed,
}

impl fmt::Display for PersistenceStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            PersistenceStrategy::None => "NONE",
            PersistenceStrategy::LocalTempSwap => "LOCALTEMPSWAP",
            PersistenceStrategy::LocalRestartable => "LOCALRESTARTABLE",
            PersistenceStrategy::Distributed => "DISTRIBUTED",
        })
    }
}

/// Static configuration of one cache.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheConfig {
    pub max_entries: u64,
    pub ttl_seconds: u64,
    pub tti_seconds: u64,
    pub eternal: bool,
    pub eviction_policy: EvictionPolicy,
    pub persistence: PersistenceStrategy,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_entries: 10_000,
            ttl_seconds: 0,
            tti_seconds: 0,
            eternal: false,
            eviction_policy: EvictionPolicy::Lru,
            persistence: PersistenceStrategy::None,
        }
    }
}

/// Live counters of one cache.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct CacheStatistics {
    pub object_count: u64,
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    /// Average get latency in milliseconds.
    pub average_get_time_ms: f32,
}

/// Read-only view of a named cache.
pub trait CacheView: Send + Sync {
    fn name(&self) -> &str;
    fn config(&self) -> CacheConfig;
    fn statistics(&self) -> CacheStatistics;
    /// Estimated heap footprint in bytes.
    fn in_memory_size(&self) -> u64;
}

/// Lookup of caches by name.
pub trait CacheRegistry: Send + Sync {
    fn cache_names(&self) -> Vec<String>;
    fn cache(&self, name: &str) -> Option<Arc<dyn CacheView>>;
}

struct Entry<V> {
    value: V,
    created: Instant,
    last_access: Instant,
    // (access count, access sequence): position in the LFU index.
    rank: (u64, u64),
}

// Recency order lives in the `LruCache`; FIFO caches read through `peek_mut`
// so lookups never reorder them.
struct Store<K, V> {
    entries: LruCache<K, Entry<V>>,
    by_frequency: BTreeMap<(u64, u64), K>,
    seq: u64,
}

impl<K: Eq + Hash, V> Store<K, V> {
    fn discard(&mut self, key: &K) -> Option<V> {
        let entry = self.entries.pop(key)?;
        self.by_frequency.remove(&entry.rank);
        Some(entry.value)
    }
}

/// Bounded in-memory cache.
pub struct MemoryCache<K, V> {
    name: String,
    config: CacheConfig,
    store: Mutex<Store<K, V>>,
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
    gets: AtomicU64,
    get_nanos: AtomicU64,
}

// Per-entry bookkeeping beyond the key and value themselves.
const ENTRY_OVERHEAD: u64 = 64;

impl<K, V> MemoryCache<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    pub fn new(name: &str, config: CacheConfig) -> Self {
        Self {
            name: name.to_string(),
            config,
            store: Mutex::new(Store {
                entries: LruCache::unbounded(),
                by_frequency: BTreeMap::new(),
                seq: 0,
            }),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
            gets: AtomicU64::new(0),
            get_nanos: AtomicU64::new(0),
        }
    }

    pub fn get(&self, key: &K) -> Option<V> {
        self.get_at(key, Instant::now())
    }

    fn get_at(&self, key: &K, now: Instant) -> Option<V> {
        let started = Instant::now();
        let policy = self.config.eviction_policy;
        let mut guard = self.store.lock().unwrap_or_else(PoisonError::into_inner);
        let store = &mut *guard;

        if store.entries.peek(key).is_some_and(|e| self.is_expired(e, now)) {
            store.discard(key);
        }

        store.seq += 1;
        let seq = store.seq;
        let entry = match policy {
            EvictionPolicy::Fifo => store.entries.peek_mut(key),
            EvictionPolicy::Lru | EvictionPolicy::Lfu => store.entries.get_mut(key),
        };
        let found = entry.map(|e| {
            e.last_access = now;
            let previous = e.rank;
            e.rank = (previous.0 + 1, seq);
            (e.value.clone(), previous, e.rank)
        });
        let value = found.map(|(value, previous, rank)| {
            if policy == EvictionPolicy::Lfu {
                if let Some(k) = store.by_frequency.remove(&previous) {
                    store.by_frequency.insert(rank, k);
                }
            }
            value
        });
        drop(guard);

        if value.is_some() {
            self.hits.fetch_add(1, Ordering::Relaxed);
        } else {
            self.misses.fetch_add(1, Ordering::Relaxed);
        }
        self.gets.fetch_add(1, Ordering::Relaxed);
        self.get_nanos
            .fetch_add(started.elapsed().as_nanos() as u64, Ordering::Relaxed);
        value
    }

    pub fn put(&self, key: K, value: V) {
        self.put_at(key, value, Instant::now());
    }

    fn put_at(&self, key: K, value: V, now: Instant) {
        let policy = self.config.eviction_policy;
        let mut guard = self.store.lock().unwrap_or_else(PoisonError::into_inner);
        let store = &mut *guard;
        store.seq += 1;
        let rank = (0, store.seq);

        if policy == EvictionPolicy::Fifo {
            if let Some(e) = store.entries.peek_mut(&key) {
                e.value = value;
                e.created = now;
                e.last_access = now;
                return;
            }
        }

        let entry = Entry {
            value,
            created: now,
            last_access: now,
            rank,
        };
        // Unbounded store: `push` only hands back the entry it replaced.
        if let Some((_, replaced)) = store.entries.push(key.clone(), entry) {
            store.by_frequency.remove(&replaced.rank);
        }
        if policy == EvictionPolicy::Lfu {
            store.by_frequency.insert(rank, key.clone());
        }

        let max = self.config.max_entries;
        while max > 0 && store.entries.len() as u64 > max {
            let victim = match policy {
                EvictionPolicy::Lru | EvictionPolicy::Fifo => {
                    store.entries.peek_lru().map(|(k, _)| k.clone())
                }
                // The entry just written is never its own victim.
                EvictionPolicy::Lfu => store.by_frequency.values().find(|k| **k != key).cloned(),
            };
            let Some(victim) = victim else {
                break;
            };
            store.discard(&victim);
            self.evictions.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn remove(&self, key: &K) -> Option<V> {
        self.store
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .discard(key)
    }

    pub fn clear(&self) {
        let mut store = self.store.lock().unwrap_or_else(PoisonError::into_inner);
        store.entries.clear();
        store.by_frequency.clear();
    }

    /// Live entries. Expired entries are swept first.
    pub fn len(&self) -> usize {
        self.len_at(Instant::now())
    }

    fn len_at(&self, now: Instant) -> usize {
        let mut guard = self.store.lock().unwrap_or_else(PoisonError::into_inner);
        let store = &mut *guard;
        if self.expires() {
            let expired: Vec<K> = store
                .entries
                .iter()
                .filter(|(_, e)| self.is_expired(e, now))
                .map(|(k, _)| k.clone())
                .collect();
            for key in &expired {
                store.discard(key);
            }
        }
        store.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn expires(&self) -> bool {
        !self.config.eternal && (self.config.ttl_seconds > 0 || self.config.tti_seconds > 0)
    }

    fn is_expired(&self, entry: &Entry<V>, now: Instant) -> bool {
        if self.config.eternal {
            return false;
        }
        let ttl = self.config.ttl_seconds;
        let tti = self.config.tti_seconds;
        (ttl > 0 && now.saturating_duration_since(entry.created) >= Duration::from_secs(ttl))
            || (tti > 0
                && now.saturating_duration_since(entry.last_access) >= Duration::from_secs(tti))
    }
}

impl<K, V> CacheView for MemoryCache<K, V>
where
    K: Eq + Hash + Clone + Send + Sync,
    V: Clone + Send + Sync,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn config(&self) -> CacheConfig {
        self.config.clone()
    }

    fn statistics(&self) -> CacheStatistics {
        let gets = self.gets.load(Ordering::Relaxed);
        let nanos = self.get_nanos.load(Ordering::Relaxed);
        let average_get_time_ms = if gets > 0 {
            (nanos as f64 / gets as f64 / 1_000_000.0) as f32
        } else {
            0.0
        };
        CacheStatistics {
            object_count: self.len() as u64,
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
            average_get_time_ms,
        }
    }

    fn in_memory_size(&self) -> u64 {
        let per_entry = (mem::size_of::<K>() + mem::size_of::<V>()) as u64 + ENTRY_OVERHEAD;
        self.len() as u64 * per_entry
    }
}

/// Registry of named caches.
#[derive(Default)]
pub struct CacheManager {
    caches: RwLock<BTreeMap<String, Arc<dyn CacheView>>>,
}

impl CacheManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates and registers a cache, replacing any cache of the same name.
    pub fn create<K, V>(&self, name: &str, config: CacheConfig) -> Arc<MemoryCache<K, V>>
    where
        K: Eq + Hash + Clone + Send + Sync + 'static,
        V: Clone + Send + Sync + 'static,
    {
        let cache = Arc::new(MemoryCache::new(name, config));
        self.register(cache.clone());
        cache
    }

    /// Registers any cache view under its own name.
    pub fn register(&self, cache: Arc<dyn CacheView>) {
        debug!("Registering cache {}", cache.name());
        self.caches
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(cache.name().to_string(), cache);
    }

    pub fn remove(&self, name: &str) -> bool {
        self.caches
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(name)
            .is_some()
    }
}

impl CacheRegistry for CacheManager {
    fn cache_names(&self) -> Vec<String> {
        self.caches
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect()
    }

    fn cache(&self, name: &str) -> Option<Arc<dyn CacheView>> {
        self.caches
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(max: u64, policy: EvictionPolicy) -> CacheConfig {
        CacheConfig {
            max_entries: max,
            eviction_policy: policy,
            ..CacheConfig::default()
        }
    }

    #[test]
    fn test_hits_and_misses_are_counted() {
        let cache: MemoryCache<String, u32> = MemoryCache::new("c", CacheConfig::default());
        cache.put("a".into(), 1);
        assert_eq!(cache.get(&"a".into()), Some(1));
        assert_eq!(cache.get(&"a".into()), Some(1));
        assert_eq!(cache.get(&"b".into()), None);
        let stats = cache.statistics();
        assert_eq!((stats.hits, stats.misses, stats.object_count), (2, 1, 1));
        assert!(stats.average_get_time_ms >= 0.0);
    }

    #[test]
    fn test_lru_evicts_least_recently_used() {
        let cache: MemoryCache<u32, u32> = MemoryCache::new("lru", config(2, EvictionPolicy::Lru));
        cache.put(1, 1);
        cache.put(2, 2);
        cache.get(&1);
        cache.put(3, 3);
        assert_eq!(cache.get(&2), None);
        assert_eq!(cache.get(&1), Some(1));
        assert_eq!(cache.statistics().evictions, 1);
    }

    #[test]
    fn test_fifo_ignores_access() {
        let cache: MemoryCache<u32, u32> = MemoryCache::new("fifo", config(2, EvictionPolicy::Fifo));
        cache.put(1, 1);
        cache.put(2, 2);
        cache.get(&1);
        cache.put(3, 3);
        assert_eq!(cache.get(&1), None);
        assert_eq!(cache.get(&2), Some(2));
    }

    #[test]
    fn test_lfu_evicts_least_frequently_used() {
        let cache: MemoryCache<u32, u32> = MemoryCache::new("lfu", config(2, EvictionPolicy::Lfu));
        cache.put(1, 1);
        cache.put(2, 2);
        cache.get(&2);
        cache.get(&2);
        cache.get(&1);
        cache.put(3, 3);
        assert_eq!(cache.get(&1), None);
        assert_eq!(cache.get(&2), Some(2));
    }

    #[test]
    fn test_ttl_and_tti_expiry() {
        let cfg = CacheConfig {
            ttl_seconds: 10,
            tti_seconds: 3,
            ..CacheConfig::default()
        };
        let cache: MemoryCache<u32, u32> = MemoryCache::new("exp", cfg);
        let t0 = Instant::now();
        cache.put_at(1, 1, t0);
        assert_eq!(cache.get_at(&1, t0 + Duration::from_secs(2)), Some(1));
        assert_eq!(cache.get_at(&1, t0 + Duration::from_secs(4)), Some(1));
        assert_eq!(cache.get_at(&1, t0 + Duration::from_secs(8)), None);

        cache.put_at(2, 2, t0);
        for s in [2, 4, 6, 8] {
            assert_eq!(cache.get_at(&2, t0 + Duration::from_secs(s)), Some(2));
        }
        assert_eq!(cache.get_at(&2, t0 + Duration::from_secs(10)), None);
    }

    #[test]
    fn test_eternal_never_expires() {
        let cfg = CacheConfig {
            ttl_seconds: 1,
            eternal: true,
            ..CacheConfig::default()
        };
        let cache: MemoryCache<u32, u32> = MemoryCache::new("eternal", cfg);
        let t0 = Instant::now();
        cache.put_at(1, 1, t0);
        assert_eq!(cache.get_at(&1, t0 + Duration::from_secs(3600)), Some(1));
    }

    #[test]
    fn test_expired_entries_are_not_counted() {
        let cfg = CacheConfig {
            ttl_seconds: 10,
            ..CacheConfig::default()
        };
        let cache: MemoryCache<u32, u32> = MemoryCache::new("sweep", cfg);
        let t0 = Instant::now();
        cache.put_at(1, 1, t0);
        cache.put_at(2, 2, t0 + Duration::from_secs(5));
        assert_eq!(cache.len_at(t0 + Duration::from_secs(1)), 2);
        assert_eq!(cache.len_at(t0 + Duration::from_secs(11)), 1);
        assert_eq!(cache.len_at(t0 + Duration::from_secs(16)), 0);
        assert_eq!(cache.statistics().evictions, 0);
    }

    #[test]
    fn test_rewritten_lfu_entry_starts_cold() {
        let cache: MemoryCache<u32, u32> = MemoryCache::new("lfu", config(2, EvictionPolicy::Lfu));
        cache.put(1, 1);
        cache.put(2, 2);
        cache.get(&1);
        cache.get(&2);
        cache.get(&2);
        cache.put(2, 20);
        cache.put(3, 3);
        assert_eq!(cache.get(&2), None);
        assert_eq!(cache.get(&1), Some(1));
        assert_eq!(cache.get(&3), Some(3));
    }

    #[test]
    fn test_fifo_rewrite_keeps_position() {
        let cache: MemoryCache<u32, u32> = MemoryCache::new("fifo", config(2, EvictionPolicy::Fifo));
        cache.put(1, 1);
        cache.put(2, 2);
        cache.put(1, 10);
        cache.put(3, 3);
        assert_eq!(cache.get(&1), None);
        assert_eq!(cache.get(&2), Some(2));
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn test_manager_lists_sorted_names() {
        let manager = CacheManager::new();
        let _b: Arc<MemoryCache<u32, u32>> = manager.create("beta", CacheConfig::default());
        let _a: Arc<MemoryCache<u32, u32>> = manager.create("alpha", CacheConfig::default());
        assert_eq!(manager.cache_names(), vec!["alpha", "beta"]);
        assert!(manager.cache("alpha").is_some());
        assert!(manager.remove("alpha"));
        assert!(manager.cache("alpha").is_none());
    }
}
