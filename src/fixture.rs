//! Static application registry loaded from a fixture file.
//!
//! A fixture describes sessions, users, tools, functions, properties, a
//! datasource, components and caches. It backs every collaborator trait so
//! the endpoint can run standalone and so integration tests have stable
//! application state.

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::Path;
use std::sync::Arc;

use anyhow::{bail, Context};
use chrono::{Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::cache::{CacheConfig, CacheManager, CacheStatistics, CacheView, MemoryCache};
use crate::collaborators::{
    AppRegistry, ComponentRegistry, ConnectionCounts, DataSourcePool, FunctionRegistry,
    PropertyStore, SessionDirectory, ToolInfo, ToolRegistry, UsageSession, UserDirectory,
};

/// Live cache in front of display id lookups.
pub const DISPLAY_ID_CACHE: &str = "runtime-status.displayIds";

/// Pool section of a fixture.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FixtureDataSource {
    pub implementation: String,
    /// Absent for implementations that do not expose counts.
    pub counts: Option<ConnectionCounts>,
}

/// Cache section of a fixture: a frozen cache with fixed counters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FixtureCache {
    pub name: String,
    #[serde(default)]
    pub memory_bytes: u64,
    pub config: CacheConfig,
    pub statistics: CacheStatistics,
}

/// Root of a fixture file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FixtureData {
    pub version: String,
    pub generated_at: String,
    pub sessions: Vec<UsageSession>,
    /// user id -> display id
    pub users: BTreeMap<String, String>,
    pub tools: Vec<ToolInfo>,
    pub functions: Vec<String>,
    pub properties: BTreeMap<String, String>,
    pub datasource: Option<FixtureDataSource>,
    pub components: Vec<String>,
    pub caches: Vec<FixtureCache>,
}

impl FixtureData {
    /// Loads a fixture from JSON, TOML or YAML chosen by extension.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        debug!("Loading fixture from: {}", path.display());
        if !path.exists() {
            bail!("Fixture file not found: {}", path.display());
        }
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read fixture file {}", path.display()))?;
        let data: FixtureData = match path.extension().and_then(|s| s.to_str()) {
            Some("json") => serde_json::from_str(&content)?,
            Some("toml") => toml::from_str(&content)?,
            _ => serde_yaml::from_str(&content)?,
        };
        info!(
            "Loaded fixture version {} generated at {} ({} sessions, {} tools, {} caches)",
            data.version,
            data.generated_at,
            data.sessions.len(),
            data.tools.len(),
            data.caches.len()
        );
        Ok(data)
    }

    /// Wires every collaborator to this fixture.
    pub fn into_registry(self) -> AppRegistry {
        let caches = CacheManager::new();
        for cache in &self.caches {
            caches.register(Arc::new(StaticCache(cache.clone())));
        }
        let display_ids = caches.create(
            DISPLAY_ID_CACHE,
            CacheConfig {
                max_entries: 1000,
                tti_seconds: 600,
                ..CacheConfig::default()
            },
        );
        let datasource = self.datasource.clone();
        let app = Arc::new(StaticApplication {
            data: self,
            display_ids,
        });

        AppRegistry {
            sessions: Some(app.clone()),
            users: Some(app.clone()),
            tools: Some(app.clone()),
            functions: Some(app.clone()),
            properties: Some(app.clone()),
            datasource: datasource.map(|ds| Arc::new(ds) as Arc<dyn DataSourcePool>),
            components: Some(app),
            caches: Some(Arc::new(caches)),
        }
    }
}

struct StaticApplication {
    data: FixtureData,
    display_ids: Arc<MemoryCache<String, String>>,
}

impl SessionDirectory for StaticApplication {
    fn active_user_count(&self, window_seconds: u64) -> usize {
        let secs = i64::try_from(window_seconds).unwrap_or(i64::MAX).min(i64::MAX / 1000);
        let window = Duration::seconds(secs);
        let cutoff = Utc::now()
            .checked_sub_signed(window)
            .unwrap_or(chrono::DateTime::<Utc>::MIN_UTC);
        self.data
            .sessions
            .iter()
            .filter(|s| s.last_activity >= cutoff)
            .map(|s| s.user_id.as_str())
            .collect::<BTreeSet<_>>()
            .len()
    }

    fn open_sessions_by_server(&self) -> BTreeMap<String, Vec<UsageSession>> {
        let mut by_server: BTreeMap<String, Vec<UsageSession>> = BTreeMap::new();
        for session in &self.data.sessions {
            by_server
                .entry(session.server.clone())
                .or_default()
                .push(session.clone());
        }
        by_server
    }
}

impl UserDirectory for StaticApplication {
    fn display_id(&self, user_id: &str) -> Option<String> {
        let key = user_id.to_string();
        if let Some(id) = self.display_ids.get(&key) {
            return Some(id);
        }
        let id = self.data.users.get(user_id).cloned()?;
        self.display_ids.put(key, id.clone());
        Some(id)
    }
}

impl ToolRegistry for StaticApplication {
    fn tool_ids(&self) -> Vec<String> {
        self.data.tools.iter().map(|t| t.id.clone()).collect()
    }

    fn tool(&self, id: &str) -> Option<ToolInfo> {
        self.data.tools.iter().find(|t| t.id == id).cloned()
    }
}

impl FunctionRegistry for StaticApplication {
    fn registered_functions(&self) -> Vec<String> {
        self.data.functions.clone()
    }
}

impl PropertyStore for StaticApplication {
    fn raw_properties(&self) -> BTreeMap<String, String> {
        self.data.properties.clone()
    }
}

impl ComponentRegistry for StaticApplication {
    fn registered_interfaces(&self) -> Vec<String> {
        self.data.components.clone()
    }
}

impl DataSourcePool for FixtureDataSource {
    fn implementation(&self) -> String {
        self.implementation.clone()
    }

    fn connection_counts(&self) -> Option<ConnectionCounts> {
        self.counts
    }
}

struct StaticCache(FixtureCache);

impl CacheView for StaticCache {
    fn name(&self) -> &str {
        &self.0.name
    }

    fn config(&self) -> CacheConfig {
        self.0.config.clone()
    }

    fn statistics(&self) -> CacheStatistics {
        self.0.statistics
    }

    fn in_memory_size(&self) -> u64 {
        self.0.memory_bytes
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const FIXTURE: &str = r#"
version: "1"
generated_at: "2024-01-01T00:00:00Z"
users:
  u1: alice
tools:
  - id: sakai.home
    title: Home
    description: Home page
functions: [site.visit, content.read]
properties:
  serverName: example
datasource:
  implementation: hikari
  counts: { active: 3, idle: 7 }
components: [org.example.Foo]
caches:
  - name: users
    memory_bytes: 2048
    config:
      max_entries: 100
      ttl_seconds: 60
      tti_seconds: 30
      eternal: false
      eviction_policy: LRU
      persistence: NONE
    statistics:
      object_count: 5
      hits: 3
      misses: 1
      evictions: 0
      average_get_time_ms: 0.5
"#;

    #[test]
    fn test_load_yaml_fixture_and_wire_registry() {
        let mut file = tempfile::Builder::new().suffix(".yaml").tempfile().unwrap();
        file.write_all(FIXTURE.as_bytes()).unwrap();

        let data = FixtureData::load(file.path()).unwrap();
        assert_eq!(data.functions, vec!["site.visit", "content.read"]);

        let app = data.into_registry();
        assert_eq!(app.users().unwrap().display_id("u1").as_deref(), Some("alice"));
        assert_eq!(app.users().unwrap().display_id("nope"), None);
        assert_eq!(app.tools().unwrap().tool("sakai.home").unwrap().title, "Home");
        let counts = app.datasource().unwrap().connection_counts().unwrap();
        assert_eq!((counts.active, counts.idle), (3, 7));
        let cache = app.caches().unwrap().cache("users").unwrap();
        assert_eq!(cache.in_memory_size(), 2048);
        assert_eq!(cache.statistics().hits, 3);
    }

    #[test]
    fn test_display_ids_go_through_a_live_cache() {
        let mut users = BTreeMap::new();
        users.insert("u1".to_string(), "alice".to_string());
        let app = FixtureData {
            users,
            ..FixtureData::default()
        }
        .into_registry();

        let directory = app.users().unwrap();
        for _ in 0..3 {
            assert_eq!(directory.display_id("u1").as_deref(), Some("alice"));
        }
        assert_eq!(directory.display_id("ghost"), None);

        let caches = app.caches().unwrap();
        assert_eq!(caches.cache_names(), vec![DISPLAY_ID_CACHE.to_string()]);
        let stats = caches.cache(DISPLAY_ID_CACHE).unwrap().statistics();
        assert_eq!(stats.object_count, 1);
        assert_eq!((stats.hits, stats.misses), (2, 2));
    }

    #[test]
    fn test_missing_fixture_file_is_an_error() {
        assert!(FixtureData::load(Path::new("/nonexistent/fixture.yaml")).is_err());
    }

    #[test]
    fn test_active_user_count_uses_window_and_distinct_users() {
        let now = Utc::now();
        let session = |id: &str, user: &str, idle_secs: i64| UsageSession {
            id: id.into(),
            server: "app-1".into(),
            user_id: user.into(),
            ip_address: String::new(),
            started: now - Duration::seconds(7200),
            last_activity: now - Duration::seconds(idle_secs),
        };
        let data = FixtureData {
            sessions: vec![
                session("s1", "u1", 60),
                session("s2", "u1", 100),
                session("s3", "u2", 1000),
                session("s4", "u3", 5000),
            ],
            ..FixtureData::default()
        };
        let app = data.into_registry();
        let sessions = app.sessions().unwrap();
        assert_eq!(sessions.active_user_count(3600), 2);
        assert_eq!(sessions.active_user_count(300), 1);
        assert_eq!(sessions.open_sessions_by_server()["app-1"].len(), 4);
    }
}
