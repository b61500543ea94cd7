//! Cache statistics extraction.
//!
//! Unlike the bean and thread walkers this is strict: an absent cache
//! registry or an unknown cache name fails the whole report.

use std::io::Write;

use crate::cache::CacheRegistry;
use crate::error::{Result, StatusError};

/// Configuration and live counters of one cache, captured at call time.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheDescriptor {
    pub name: String,
    pub in_memory_size: u64,
    pub eviction_policy: String,
    pub max_entries: u64,
    pub ttl_seconds: u64,
    pub tti_seconds: u64,
    pub eternal: bool,
    pub persistence: String,
    pub object_count: u64,
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub average_latency_ms: f32,
}

impl CacheDescriptor {
    pub fn total(&self) -> u64 {
        self.hits.saturating_add(self.misses)
    }

    pub fn hit_ratio(&self) -> u64 {
        hit_ratio(self.hits, self.misses)
    }
}

/// Whole-percent share of hits, truncated. Zero when nothing was looked up.
pub fn hit_ratio(hits: u64, misses: u64) -> u64 {
    let total = u128::from(hits) + u128::from(misses);
    if total == 0 {
        return 0;
    }
    (100 * u128::from(hits) / total) as u64
}

/// Resolves `name` in `registry` and captures its descriptor.
pub fn describe(registry: Option<&dyn CacheRegistry>, name: &str) -> Result<CacheDescriptor> {
    let registry = registry.ok_or(StatusError::MissingCollaborator("CacheManager"))?;
    let cache = registry
        .cache(name)
        .ok_or_else(|| StatusError::CacheNotFound(name.to_string()))?;

    let config = cache.config();
    let stats = cache.statistics();
    Ok(CacheDescriptor {
        name: cache.name().to_string(),
        in_memory_size: cache.in_memory_size(),
        eviction_policy: config.eviction_policy.to_string(),
        max_entries: config.max_entries,
        ttl_seconds: config.ttl_seconds,
        tti_seconds: config.tti_seconds,
        eternal: config.eternal,
        persistence: config.persistence.to_string(),
        object_count: stats.object_count,
        hits: stats.hits,
        misses: stats.misses,
        evictions: stats.evictions,
        average_latency_ms: stats.average_get_time_ms,
    })
}

/// Sorted cache names, one per line.
pub fn render_cache_list(registry: Option<&dyn CacheRegistry>, out: &mut dyn Write) -> Result<()> {
    let registry = registry.ok_or(StatusError::MissingCollaborator("CacheManager"))?;
    let mut names = registry.cache_names();
    names.sort();
    for name in names {
        writeln!(out, "{name}")?;
    }
    Ok(())
}

/// `key: value` lines for one cache.
pub fn render_cache_details(
    registry: Option<&dyn CacheRegistry>,
    name: &str,
    out: &mut dyn Write,
) -> Result<()> {
    let d = describe(registry, name)?;
    writeln!(out, "name: {}", d.name)?;
    writeln!(out, "memory: {}", d.in_memory_size)?;
    writeln!(out, "objects: {}", d.object_count)?;
    writeln!(out, "maxobjects: {}", d.max_entries)?;
    writeln!(out, "time-to-live: {}", d.ttl_seconds)?;
    writeln!(out, "time-to-idle: {}", d.tti_seconds)?;
    writeln!(out, "eviction-policy: {}", d.eviction_policy)?;
    writeln!(out, "eternal: {}", d.eternal)?;
    writeln!(out, "persistence strategy: {}", d.persistence)?;
    writeln!(out, "evictions: {}", d.evictions)?;
    writeln!(out, "latency: {:?}", d.average_latency_ms)?;
    writeln!(out, "hits: {}", d.hits)?;
    writeln!(out, "misses: {}", d.misses)?;
    writeln!(out, "total: {}", d.total())?;
    writeln!(out, "hitratio: {}%", d.hit_ratio())?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{CacheConfig, CacheManager, EvictionPolicy, MemoryCache};
    use std::sync::Arc;

    #[test]
    fn test_hit_ratio_truncates() {
        assert_eq!(hit_ratio(0, 0), 0);
        assert_eq!(hit_ratio(3, 1), 75);
        assert_eq!(hit_ratio(1, 2), 33);
        assert_eq!(hit_ratio(2, 1), 66);
        assert_eq!(hit_ratio(u64::MAX, u64::MAX), 50);
    }

    #[test]
    fn test_unknown_cache_is_a_hard_failure() {
        let manager = CacheManager::new();
        let err = describe(Some(&manager), "UNKNOWN").unwrap_err();
        assert_eq!(err.to_string(), "No such cache name.");
        let err = describe(None, "any").unwrap_err();
        assert_eq!(err.to_string(), "Could not get CacheManager bean.");
    }

    #[test]
    fn test_details_report() {
        let manager = CacheManager::new();
        let cache: Arc<MemoryCache<String, String>> = manager.create(
            "users",
            CacheConfig {
                max_entries: 100,
                ttl_seconds: 600,
                tti_seconds: 300,
                eviction_policy: EvictionPolicy::Lfu,
                ..CacheConfig::default()
            },
        );
        cache.put("a".into(), "x".into());
        for _ in 0..3 {
            cache.get(&"a".to_string());
        }
        cache.get(&"b".to_string());

        let mut buf = Vec::new();
        render_cache_details(Some(&manager), "users", &mut buf).unwrap();
        let text = String::from_utf8(buf).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "name: users");
        assert_eq!(lines[2], "objects: 1");
        assert_eq!(lines[3], "maxobjects: 100");
        assert_eq!(lines[4], "time-to-live: 600");
        assert_eq!(lines[5], "time-to-idle: 300");
        assert_eq!(lines[6], "eviction-policy: LFU");
        assert_eq!(lines[7], "eternal: false");
        assert_eq!(lines[8], "persistence strategy: NONE");
        assert_eq!(lines[9], "evictions: 0");
        assert!(lines[10].starts_with("latency: "));
        assert_eq!(&lines[11..], ["hits: 3", "misses: 1", "total: 4", "hitratio: 75%"]);
    }

    #[test]
    fn test_cache_list_sorted() {
        let manager = CacheManager::new();
        let _z: Arc<MemoryCache<u8, u8>> = manager.create("zeta", CacheConfig::default());
        let _a: Arc<MemoryCache<u8, u8>> = manager.create("alpha", CacheConfig::default());
        let mut buf = Vec::new();
        render_cache_list(Some(&manager), &mut buf).unwrap();
        assert_eq!(String::from_utf8(buf).unwrap(), "alpha\nzeta\n");
    }
}
