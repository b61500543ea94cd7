//! Generate-fixture command implementation.
//!
//! Writes a synthetic application registry so the endpoint can be tried
//! without a host application.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::{Duration, Utc};
use rand::seq::SliceRandom;
use rand::Rng;
use runtime_status_endpoint::cache::{
    CacheConfig, CacheStatistics, EvictionPolicy, PersistenceStrategy,
};
use runtime_status_endpoint::collaborators::{ConnectionCounts, ToolInfo, UsageSession};
use runtime_status_endpoint::fixture::{FixtureCache, FixtureData, FixtureDataSource};
use tracing::debug;

const USERS: [&str; 8] = [
    "alice", "bob", "carol", "dave", "erin", "frank", "grace", "heidi",
];
const TOOLS: [(&str, &str); 5] = [
    ("sakai.announcements", "Announcements"),
    ("sakai.gradebook", "Gradebook"),
    ("sakai.resources", "Resources"),
    ("sakai.schedule", "Calendar"),
    ("sakai.siteinfo", "Site Info"),
];
const FUNCTIONS: [&str; 6] = [
    "annc.new",
    "annc.read",
    "calendar.read",
    "content.read",
    "gradebook.viewOwnGrades",
    "site.visit",
];
const CACHES: [(&str, EvictionPolicy); 3] = [
    ("org.sakaiproject.user.api.UserDirectoryService", EvictionPolicy::Lru),
    ("org.sakaiproject.site.api.SiteService", EvictionPolicy::Lfu),
    ("org.sakaiproject.authz.api.SecurityService", EvictionPolicy::Fifo),
];

/// Generates a fixture and writes it as YAML or JSON by extension.
pub fn command_generate_fixture(
    output: PathBuf,
    sessions: usize,
    servers: usize,
) -> anyhow::Result<()> {
    debug!(
        "Generating fixture: sessions={}, servers={}, output={}",
        sessions,
        servers,
        output.display()
    );

    let data = generate_fixture(&mut rand::thread_rng(), sessions, servers.max(1));
    let content = match output.extension().and_then(|s| s.to_str()) {
        Some("yaml") | Some("yml") => serde_yaml::to_string(&data)?,
        _ => serde_json::to_string_pretty(&data)?,
    };
    write_output(&output, &content)?;

    println!(
        "✅ Generated fixture: {} sessions, {} tools, {} caches in {}",
        data.sessions.len(),
        data.tools.len(),
        data.caches.len(),
        output.display()
    );
    Ok(())
}

fn write_output(path: &Path, content: &str) -> anyhow::Result<()> {
    fs::write(path, content)?;
    Ok(())
}

/// Builds a random but internally consistent fixture.
pub fn generate_fixture(rng: &mut impl Rng, sessions: usize, servers: usize) -> FixtureData {
    let now = Utc::now();

    let users: BTreeMap<String, String> = USERS
        .iter()
        .enumerate()
        .map(|(i, name)| (format!("user-{:04}", i + 1), (*name).to_string()))
        .collect();
    let user_ids: Vec<&String> = users.keys().collect();

    let sessions = (0..sessions)
        .map(|i| {
            // Some sessions belong to users unknown to the directory.
            let user_id = if rng.gen_bool(0.1) {
                format!("user-{:04}", 9000 + i)
            } else {
                user_ids.choose(&mut *rng).map(|u| (*u).clone()).unwrap_or_default()
            };
            let idle = rng.gen_range(0..7200);
            UsageSession {
                id: format!("{:08x}", rng.gen::<u32>()),
                server: format!("app{}-{}", i % servers + 1, rng.gen_range(1000..9999)),
                user_id,
                ip_address: format!("10.0.{}.{}", rng.gen_range(0..255), rng.gen_range(1..255)),
                started: now - Duration::seconds(idle + rng.gen_range(0..3600)),
                last_activity: now - Duration::seconds(idle),
            }
        })
        .collect();

    let tools = TOOLS
        .iter()
        .map(|(id, title)| {
            let mut tool = ToolInfo {
                id: (*id).to_string(),
                title: (*title).to_string(),
                description: format!("{title} tool"),
                categories: vec!["course".into(), "project".into()],
                ..ToolInfo::default()
            };
            tool.registered_config
                .insert("functions.require".into(), format!("{}.read", id.trim_start_matches("sakai.")));
            if rng.gen_bool(0.5) {
                tool.mutable_config.insert("max.items".into(), rng.gen_range(10..100).to_string());
            }
            tool
        })
        .collect();

    let mut properties = BTreeMap::new();
    properties.insert("serverName".to_string(), "status.example.org".to_string());
    properties.insert("ui.service".to_string(), "Example LMS".to_string());
    properties.insert("username@javax.sql.BaseDataSource".to_string(), "sakai".to_string());
    properties.insert("password@javax.sql.BaseDataSource".to_string(), "changeme".to_string());
    properties.insert("smtp.password".to_string(), "changeme".to_string());

    let caches = CACHES
        .iter()
        .map(|(name, policy)| {
            let hits = rng.gen_range(0..100_000);
            let misses = rng.gen_range(0..10_000);
            let max_entries = 10_000;
            FixtureCache {
                name: (*name).to_string(),
                memory_bytes: rng.gen_range(1024..64 * 1024 * 1024),
                config: CacheConfig {
                    max_entries,
                    ttl_seconds: 3600,
                    tti_seconds: 600,
                    eternal: false,
                    eviction_policy: *policy,
                    persistence: PersistenceStrategy::None,
                },
                statistics: CacheStatistics {
                    object_count: rng.gen_range(0..max_entries),
                    hits,
                    misses,
                    evictions: rng.gen_range(0..misses + 1),
                    average_get_time_ms: rng.gen_range(0.01..2.0),
                },
            }
        })
        .collect();

    FixtureData {
        version: "1.0".to_string(),
        generated_at: now.format("%Y-%m-%dT%H:%M:%SZ").to_string(),
        sessions,
        users,
        tools,
        functions: FUNCTIONS.iter().map(|f| (*f).to_string()).collect(),
        properties,
        datasource: Some(FixtureDataSource {
            implementation: "hikari".to_string(),
            counts: Some(ConnectionCounts {
                active: rng.gen_range(0..20),
                idle: rng.gen_range(0..10),
            }),
        }),
        components: vec![
            "org.sakaiproject.authz.api.FunctionManager".to_string(),
            "org.sakaiproject.tool.api.SessionManager".to_string(),
            "org.sakaiproject.tool.api.ToolManager".to_string(),
            "org.sakaiproject.user.api.UserDirectoryService".to_string(),
        ],
        caches,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_generated_fixture_is_consistent() {
        let mut rng = StdRng::seed_from_u64(7);
        let data = generate_fixture(&mut rng, 25, 2);
        assert_eq!(data.sessions.len(), 25);
        assert!(data.sessions.iter().all(|s| s.last_activity >= s.started));
        assert!(data.sessions.iter().all(|s| s.server.starts_with("app1-") || s.server.starts_with("app2-")));
        for cache in &data.caches {
            assert!(cache.statistics.evictions <= cache.statistics.misses);
            assert!(cache.statistics.object_count < cache.config.max_entries);
        }
    }

    #[test]
    fn test_generated_fixture_loads_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("fixture.json");
        command_generate_fixture(path.clone(), 5, 1).unwrap();
        let loaded = FixtureData::load(&path).unwrap();
        assert_eq!(loaded.sessions.len(), 5);
        assert_eq!(loaded.tools.len(), TOOLS.len());
    }
}
