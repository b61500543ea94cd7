//! Report bodies for every status endpoint.
//!
//! Each report writes plain text lines into `out`. Bean, thread and cache
//! reports delegate to their renderers; the application reports read the
//! collaborators wired into `AppRegistry`.

use std::collections::{BTreeMap, BTreeSet};
use std::io::Write;
use std::sync::Arc;

use tracing::{debug, info};

use crate::beans;
use crate::cache::CacheManager;
use crate::cache_stats;
use crate::collaborators::{AppRegistry, UsageSession, UserDirectory};
use crate::config::Config;
use crate::error::{Result, StatusError};
use crate::fixture::FixtureData;
use crate::registry::BeanRegistry;
use crate::system;
use crate::threads::{LocalThreads, ThreadWalker};

/// Replacement value of redacted properties.
pub const REDACTED: &str = "********";

/// Windows, in seconds, of the active session counts.
pub const ACTIVE_WINDOWS: [u64; 4] = [3600, 1800, 900, 300];

pub const THREAD_POOL_PATTERN: &str = "*:type=ThreadPool,*";
pub const REQUEST_PROCESSOR_PATTERN: &str = "*:type=RequestProcessor,*";
pub const WEB_MODULE_PATTERN: &str = "*:j2eeType=WebModule,*";

/// Renders reports against one bean registry and one set of collaborators.
pub struct Reporter {
    beans: Arc<BeanRegistry>,
    app: AppRegistry,
    threads: ThreadWalker<LocalThreads>,
}

impl Reporter {
    pub fn new(beans: Arc<BeanRegistry>, app: AppRegistry) -> Self {
        Self {
            beans,
            app,
            threads: ThreadWalker::new(LocalThreads),
        }
    }

    /// Bean registry with the platform beans, and collaborators from the
    /// configured fixture. Without a fixture only an empty cache manager is
    /// wired in.
    pub fn from_config(config: &Config) -> anyhow::Result<Self> {
        let beans = Arc::new(BeanRegistry::new(config.default_domain()));
        system::register_platform_beans(&beans);

        let app = match &config.fixture_path {
            Some(path) => FixtureData::load(path)?.into_registry(),
            None => AppRegistry {
                caches: Some(Arc::new(CacheManager::new())),
                ..AppRegistry::default()
            },
        };
        info!("Status reporter ready with {} beans", beans.len());
        Ok(Self::new(beans, app))
    }

    pub fn beans(&self) -> &Arc<BeanRegistry> {
        &self.beans
    }

    pub fn app(&self) -> &AppRegistry {
        &self.app
    }

    pub fn bean_list(&self, out: &mut dyn Write) -> Result<()> {
        Ok(beans::render_bean_list(&self.beans, out)?)
    }

    pub fn bean_details(&self, out: &mut dyn Write) -> Result<()> {
        Ok(beans::render_bean_details(&self.beans, out)?)
    }

    pub fn bean_domains(&self, out: &mut dyn Write) -> Result<()> {
        Ok(beans::render_domains(&self.beans, out)?)
    }

    /// `name,maxThreads,currentThreadCount,currentThreadsBusy` per pool.
    pub fn thread_pools(&self, out: &mut dyn Write) -> Result<()> {
        Ok(beans::render_attribute_rows(
            &self.beans,
            THREAD_POOL_PATTERN,
            &["name", "maxThreads", "currentThreadCount", "currentThreadsBusy"],
            out,
        )?)
    }

    /// `worker uri` for every request processor that is serving a request.
    pub fn current_uris(&self, out: &mut dyn Write) -> Result<()> {
        for name in self.beans.find_beans(REQUEST_PROCESSOR_PATTERN) {
            let uri = match self.beans.get_attribute(&name, "currentUri") {
                Ok(uri) if uri.is_null() => continue,
                Ok(uri) => uri,
                Err(e) => {
                    // Request finished between discovery and read.
                    debug!("skipping {}: {}", name, e);
                    continue;
                }
            };
            match self.beans.get_attribute(&name, "workerThreadName") {
                Ok(worker) => writeln!(out, "{worker} {uri}")?,
                Err(e) => debug!("skipping {}: {}", name, e),
            }
        }
        Ok(())
    }

    pub fn thread_details(&self, out: &mut dyn Write) -> Result<()> {
        Ok(self.threads.render_thread_details(out)?)
    }

    pub fn thread_stacks(&self, out: &mut dyn Write) -> Result<()> {
        Ok(self.threads.render_thread_stacks(out)?)
    }

    pub fn thread_groups(&self, out: &mut dyn Write) -> Result<()> {
        Ok(self.threads.render_group_tree(out)?)
    }

    /// `docBase,processingTime` per web module.
    pub fn webapps(&self, out: &mut dyn Write) -> Result<()> {
        Ok(beans::render_attribute_rows(
            &self.beans,
            WEB_MODULE_PATTERN,
            &["docBase", "processingTime"],
            out,
        )?)
    }

    pub fn webapp_details(&self, out: &mut dyn Write) -> Result<()> {
        Ok(beans::render_module_details(&self.beans, WEB_MODULE_PATTERN, out)?)
    }

    /// `free,total,max` in bytes.
    pub fn memory(&self, out: &mut dyn Write) -> Result<()> {
        let summary = system::memory_summary().map_err(StatusError::Platform)?;
        writeln!(out, "{},{},{}", summary.free, summary.total, summary.max)?;
        Ok(())
    }

    /// Process environment, sorted, with `password*` keys redacted.
    pub fn system_properties(&self, out: &mut dyn Write) -> Result<()> {
        let vars: BTreeMap<String, String> = std::env::vars_os()
            .map(|(k, v)| {
                (
                    k.to_string_lossy().into_owned(),
                    v.to_string_lossy().into_owned(),
                )
            })
            .collect();
        write_properties(&vars, redact_system_property, out)
    }

    pub fn database(&self, out: &mut dyn Write) -> Result<()> {
        let pool = self.app.datasource()?;
        match pool.connection_counts() {
            Some(counts) => writeln!(out, "{},{}", counts.active, counts.idle)?,
            None => writeln!(
                out,
                "Unsupported datasource implementation: {}",
                pool.implementation()
            )?,
        }
        Ok(())
    }

    pub fn components(&self, out: &mut dyn Write) -> Result<()> {
        let names: BTreeSet<String> = self
            .app
            .components()?
            .registered_interfaces()
            .into_iter()
            .collect();
        write_lines(names, out)
    }

    /// Distinct active users within each of `ACTIVE_WINDOWS`.
    pub fn active_sessions(&self, out: &mut dyn Write) -> Result<()> {
        let sessions = self.app.sessions()?;
        let counts: Vec<String> = ACTIVE_WINDOWS
            .iter()
            .map(|w| sessions.active_user_count(*w).to_string())
            .collect();
        writeln!(out, "{}", counts.join(","))?;
        Ok(())
    }

    pub fn session_counts(&self, out: &mut dyn Write) -> Result<()> {
        let by_server = self.app.sessions()?.open_sessions_by_server();
        let mut total = 0;
        for (server, sessions) in &by_server {
            writeln!(out, "{}: {}", server_name(server), sessions.len())?;
            total += sessions.len();
        }
        writeln!(out, "total: {total}")?;
        Ok(())
    }

    pub fn session_total(&self, out: &mut dyn Write) -> Result<()> {
        let by_server = self.app.sessions()?.open_sessions_by_server();
        let total: usize = by_server.values().map(Vec::len).sum();
        writeln!(out, "{total}")?;
        Ok(())
    }

    /// Server heading followed by the display id of each session's user.
    pub fn users_by_server(&self, out: &mut dyn Write) -> Result<()> {
        let users = self.app.users()?;
        let by_server = self.app.sessions()?.open_sessions_by_server();
        for (server, sessions) in &by_server {
            writeln!(out, "{}:", server_name(server))?;
            for session in sessions {
                writeln!(out, "  - {}", display_id(users, session))?;
            }
        }
        Ok(())
    }

    /// Server heading repeated before every session's display id.
    pub fn all_users(&self, out: &mut dyn Write) -> Result<()> {
        let users = self.app.users()?;
        let by_server = self.app.sessions()?.open_sessions_by_server();
        for (server, sessions) in &by_server {
            let server = server_name(server);
            for session in sessions {
                writeln!(out, "{server}:")?;
                writeln!(out, "{}", display_id(users, session))?;
            }
        }
        Ok(())
    }

    /// Application properties, sorted, with `password*` and `*password`
    /// keys redacted.
    pub fn application_properties(&self, out: &mut dyn Write) -> Result<()> {
        let props = self.app.properties()?.raw_properties();
        write_properties(&props, redact_application_property, out)
    }

    pub fn tools(&self, out: &mut dyn Write) -> Result<()> {
        let ids: BTreeSet<String> = self.app.tools()?.tool_ids().into_iter().collect();
        write_lines(ids, out)
    }

    pub fn tool_details(&self, tool_id: &str, out: &mut dyn Write) -> Result<()> {
        let Some(tool) = self.app.tools()?.tool(tool_id) else {
            writeln!(out, "ERROR: no such tool ID")?;
            return Ok(());
        };

        writeln!(out, "id: {}", tool.id)?;
        writeln!(out, "title: {}", tool.title)?;
        writeln!(out, "description: {}", tool.description)?;
        for (heading, config) in [
            ("registered_properties", &tool.registered_config),
            ("mutable_properties", &tool.mutable_config),
            ("final_properties", &tool.final_config),
        ] {
            if config.is_empty() {
                continue;
            }
            writeln!(out, "{heading}:")?;
            for (key, value) in config {
                writeln!(out, "  {key}: {value}")?;
            }
        }
        for (heading, items) in [("keywords", &tool.keywords), ("categories", &tool.categories)] {
            if items.is_empty() {
                continue;
            }
            writeln!(out, "{heading}:")?;
            for item in items {
                writeln!(out, "  - {item}")?;
            }
        }
        Ok(())
    }

    pub fn functions(&self, out: &mut dyn Write) -> Result<()> {
        let names: BTreeSet<String> = self
            .app
            .functions()?
            .registered_functions()
            .into_iter()
            .collect();
        write_lines(names, out)
    }

    pub fn caches(&self, out: &mut dyn Write) -> Result<()> {
        cache_stats::render_cache_list(self.app.caches(), out)
    }

    pub fn cache_details(&self, name: &str, out: &mut dyn Write) -> Result<()> {
        cache_stats::render_cache_details(self.app.caches(), name, out)
    }
}

/// Server instance id without its trailing `-<digits>` suffix.
pub fn server_name(id: &str) -> &str {
    let trimmed = id.trim_end_matches(|c: char| c.is_ascii_digit());
    if trimmed.len() == id.len() {
        return id;
    }
    trimmed.strip_suffix('-').unwrap_or(id)
}

pub fn redact_system_property(key: &str) -> bool {
    key.starts_with("password")
}

pub fn redact_application_property(key: &str) -> bool {
    key.starts_with("password") || key.ends_with("password")
}

fn display_id(users: &dyn UserDirectory, session: &UsageSession) -> String {
    users
        .display_id(&session.user_id)
        .unwrap_or_else(|| format!("no display ID for userId \"{}\"", session.user_id))
}

fn write_properties(
    props: &BTreeMap<String, String>,
    redact: fn(&str) -> bool,
    out: &mut dyn Write,
) -> Result<()> {
    for (key, value) in props {
        let value = if redact(key) { REDACTED } else { value.as_str() };
        writeln!(out, "{key}={value}")?;
    }
    Ok(())
}

fn write_lines(lines: impl IntoIterator<Item = String>, out: &mut dyn Write) -> Result<()> {
    for line in lines {
        writeln!(out, "{line}")?;
    }
    Ok(())
}
