//! Flat path namespace of status reports.
//!
//! Exact paths resolve through a process-wide table built on first use;
//! two prefix families pass the rest of the path to a parameterized report.
//! Unknown paths render nothing. Every failure inside a report, including a
//! panic, becomes the body `Exception: <message>\n`.

use std::error::Error as StdError;
use std::io::Write;
use std::panic::{self, AssertUnwindSafe};

use ahash::AHashMap as HashMap;
use once_cell::sync::Lazy;
use tracing::{debug, error};

use crate::error::{Result, StatusError};
use crate::frame;
use crate::reports::Reporter;
use crate::threads::enter_frame;

/// Report without parameters.
pub type Report = fn(&Reporter, &mut dyn Write) -> Result<()>;

/// Report taking the path remainder after its prefix.
pub type ParamReport = fn(&Reporter, &str, &mut dyn Write) -> Result<()>;

pub const TOOL_PREFIX: &str = "/sakai/tools/";
pub const CACHE_PREFIX: &str = "/sakai/cache/";

static EXACT: Lazy<HashMap<&'static str, Report>> = Lazy::new(|| {
    let entries: [(&'static str, Report); 23] = [
        ("/tomcat/mbeans", Reporter::bean_list),
        ("/tomcat/mbeans/details", Reporter::bean_details),
        ("/tomcat/mbeans/domains", Reporter::bean_domains),
        ("/tomcat/current/uris", Reporter::current_uris),
        ("/tomcat/threads", Reporter::thread_pools),
        ("/tomcat/threads/details", Reporter::thread_details),
        ("/tomcat/threads/stacks", Reporter::thread_stacks),
        ("/tomcat/threadgroups", Reporter::thread_groups),
        ("/tomcat/webapps", Reporter::webapps),
        ("/tomcat/webapps/details", Reporter::webapp_details),
        ("/system/memory", Reporter::memory),
        ("/system/properties", Reporter::system_properties),
        ("/sakai/database", Reporter::database),
        ("/sakai/beans", Reporter::components),
        ("/sakai/sessions", Reporter::active_sessions),
        ("/sakai/sessions/counts", Reporter::session_counts),
        ("/sakai/sessions/total", Reporter::session_total),
        ("/sakai/sessions/users-by-server", Reporter::users_by_server),
        ("/sakai/sessions/all-users", Reporter::all_users),
        ("/sakai/properties", Reporter::application_properties),
        ("/sakai/tools", Reporter::tools),
        ("/sakai/functions", Reporter::functions),
        ("/sakai/cache", Reporter::caches),
    ];
    debug!("Registering {} status endpoints", entries.len());
    entries.into_iter().collect()
});

static PREFIXES: [(&str, ParamReport); 2] = [
    (TOOL_PREFIX, Reporter::tool_details),
    (CACHE_PREFIX, Reporter::cache_details),
];

static CATALOG: Lazy<Vec<&'static str>> = Lazy::new(|| {
    let mut paths: Vec<&'static str> = EXACT.keys().copied().collect();
    paths.sort_unstable();
    paths
});

/// A resolved request path.
#[derive(Clone, Copy)]
pub enum Route<'a> {
    Exact(&'static str, Report),
    Prefixed(&'static str, ParamReport, &'a str),
}

impl Route<'_> {
    /// Bounded label naming the route: the exact path or the prefix.
    pub fn label(&self) -> &'static str {
        match self {
            Route::Exact(path, _) => *path,
            Route::Prefixed(prefix, _, _) => *prefix,
        }
    }

    fn run(&self, reporter: &Reporter, out: &mut dyn Write) -> Result<()> {
        match self {
            Route::Exact(_, report) => report(reporter, out),
            Route::Prefixed(_, report, param) => report(reporter, param, out),
        }
    }
}

/// Sorted exact-match paths, computed once.
pub fn catalog() -> &'static [&'static str] {
    &CATALOG
}

/// Exact match first, then the prefix families.
pub fn resolve(path: &str) -> Option<Route<'_>> {
    if let Some((&key, &report)) = EXACT.get_key_value(path) {
        return Some(Route::Exact(key, report));
    }
    PREFIXES.iter().find_map(|&(prefix, report)| {
        path.strip_prefix(prefix)
            .map(|param| Route::Prefixed(prefix, report, param))
    })
}

/// Outcome of rendering one path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rendered {
    /// Route label, `None` for unknown paths.
    pub route: Option<&'static str>,
    pub body: String,
    /// Message of the failure that replaced the body.
    pub error: Option<String>,
}

impl Rendered {
    pub fn failed(route: Option<&'static str>, err: &StatusError) -> Self {
        Self {
            route,
            body: error_body(err),
            error: Some(err.to_string()),
        }
    }
}

/// Plain-text body reporting a failed report.
pub fn error_body(err: &StatusError) -> String {
    format!("Exception: {err}\n")
}

/// Renders `path` against `reporter`. Never panics and never fails; a
/// failed report is logged and rendered as the exception body.
pub fn render(reporter: &Reporter, path: &str) -> Rendered {
    let _frame = enter_frame(frame!("render"));
    debug!("Rendering status path {}", path);

    let Some(route) = resolve(path) else {
        debug!("No status report for {}", path);
        return Rendered {
            route: None,
            body: String::new(),
            error: None,
        };
    };

    let mut buf = Vec::new();
    let outcome = panic::catch_unwind(AssertUnwindSafe(|| route.run(reporter, &mut buf)))
        .unwrap_or_else(|payload| Err(StatusError::Internal(panic_message(payload.as_ref()))));

    match outcome {
        Ok(()) => Rendered {
            route: Some(route.label()),
            body: String::from_utf8_lossy(&buf).into_owned(),
            error: None,
        },
        Err(err) => {
            log_failure(path, &err);
            Rendered::failed(Some(route.label()), &err)
        }
    }
}

/// Logs a report failure with its source chain.
pub fn log_failure(path: &str, err: &StatusError) {
    let mut chain = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        chain.push_str(": ");
        chain.push_str(&cause.to_string());
        source = cause.source();
    }
    error!("Status report {} failed: {}", path, chain);
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "report panicked".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collaborators::AppRegistry;
    use crate::registry::BeanRegistry;
    use std::sync::Arc;

    fn reporter() -> Reporter {
        Reporter::new(Arc::new(BeanRegistry::default()), AppRegistry::default())
    }

    #[test]
    fn test_catalog_is_sorted_and_complete() {
        let catalog = catalog();
        assert_eq!(catalog.len(), 23);
        assert!(catalog.windows(2).all(|w| w[0] < w[1]));
        assert_eq!(catalog[0], "/sakai/beans");
        assert!(catalog.contains(&"/tomcat/threadgroups"));
    }

    #[test]
    fn test_exact_match_wins_over_prefix() {
        assert_eq!(resolve("/sakai/cache").unwrap().label(), "/sakai/cache");
        assert_eq!(resolve("/sakai/cache/users").unwrap().label(), CACHE_PREFIX);
        assert_eq!(resolve("/sakai/tools/").unwrap().label(), TOOL_PREFIX);
        assert!(resolve("/sakai/cachex").is_none());
    }

    #[test]
    fn test_unknown_path_renders_nothing() {
        let rendered = render(&reporter(), "/does/not/exist");
        assert_eq!(rendered.body, "");
        assert_eq!(rendered.route, None);
        assert_eq!(rendered.error, None);
    }

    #[test]
    fn test_failed_report_becomes_exception_body() {
        let rendered = render(&reporter(), "/sakai/sessions");
        assert_eq!(rendered.body, "Exception: Could not get SessionManager bean.\n");
        assert_eq!(rendered.route, Some("/sakai/sessions"));
        assert!(rendered.error.is_some());
    }

    #[test]
    fn test_panic_in_report_is_contained() {
        let registry = Arc::new(BeanRegistry::default());
        registry
            .register_named(
                "d:type=ThreadPool,name=p",
                Arc::new(crate::registry::DynamicBean::new().attribute(
                    "name",
                    "String",
                    "pool name",
                    || -> String { panic!("bean exploded") },
                )),
            )
            .unwrap();
        let reporter = Reporter::new(registry, AppRegistry::default());
        let rendered = render(&reporter, "/tomcat/threads");
        assert_eq!(rendered.body, "Exception: report failed: bean exploded\n");
    }
}
