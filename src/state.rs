//! Application state management for the status server.
//!
//! This module defines the shared state passed to HTTP handlers and the
//! beans through which the HTTP layer describes itself: the worker pool,
//! the web module and one request processor per in-flight request.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use prometheus::Registry;
use tracing::{debug, warn};

use runtime_status_endpoint::config::Config;
use runtime_status_endpoint::metrics::ReportMetrics;
use runtime_status_endpoint::registry::{BeanName, BeanRegistry, DynamicBean, OperationInfo};
use runtime_status_endpoint::threads::ThreadGroup;
use runtime_status_endpoint::Reporter;

/// Type alias for shared application state.
pub type SharedState = Arc<AppState>;

pub const WORKER_POOL_BEAN: &str = "http:type=ThreadPool,name=\"http-worker\"";
pub const WEB_MODULE_BEAN: &str = "http:j2eeType=WebModule,name=//localhost/";

/// Global application state shared across requests.
pub struct AppState {
    pub reporter: Arc<Reporter>,
    pub config: Arc<Config>,
    pub registry: Registry,
    pub metrics: ReportMetrics,
    pub http: Arc<HttpStats>,
}

/// Request counters of the HTTP layer.
pub struct HttpStats {
    busy: AtomicUsize,
    requests: AtomicU64,
    errors: AtomicU64,
    processing_ms: AtomicU64,
    next_worker: AtomicU64,
    started: DateTime<Utc>,
}

impl Default for HttpStats {
    fn default() -> Self {
        Self {
            busy: AtomicUsize::new(0),
            requests: AtomicU64::new(0),
            errors: AtomicU64::new(0),
            processing_ms: AtomicU64::new(0),
            next_worker: AtomicU64::new(1),
            started: Utc::now(),
        }
    }
}

impl HttpStats {
    /// Marks the calling worker busy with `uri` and publishes a request
    /// processor bean until the returned guard drops.
    pub fn begin(self: &Arc<Self>, beans: &Arc<BeanRegistry>, uri: &str) -> InFlight {
        self.busy.fetch_add(1, Ordering::Relaxed);
        let worker = self.next_worker.fetch_add(1, Ordering::Relaxed);
        let thread_name = std::thread::current()
            .name()
            .unwrap_or("http-worker")
            .to_string();
        let started = Instant::now();
        let uri = uri.to_string();

        let bean = DynamicBean::new()
            .attribute("workerThreadName", "String", "Worker serving the request", move || {
                thread_name.clone()
            })
            .attribute("currentUri", "String", "Request URI", move || uri.clone())
            .attribute("requestProcessingTime", "long", "Milliseconds since the request started", move || {
                started.elapsed().as_millis() as u64
            });
        let name = BeanName::from_parts(
            "http",
            vec![
                ("type".to_string(), "RequestProcessor".to_string()),
                ("worker".to_string(), worker.to_string()),
            ],
        );
        beans.register(name.clone(), Arc::new(bean));

        InFlight {
            stats: Arc::clone(self),
            beans: Arc::clone(beans),
            name,
            started,
        }
    }

    pub fn record_error(&self) {
        self.errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn errors(&self) -> u64 {
        self.errors.load(Ordering::Relaxed)
    }

    pub fn busy(&self) -> usize {
        self.busy.load(Ordering::Relaxed)
    }

    pub fn requests(&self) -> u64 {
        self.requests.load(Ordering::Relaxed)
    }
}

/// One request in progress. Dropping it retires the request processor bean
/// and folds the elapsed time into the module totals.
pub struct InFlight {
    stats: Arc<HttpStats>,
    beans: Arc<BeanRegistry>,
    name: BeanName,
    started: Instant,
}

impl Drop for InFlight {
    fn drop(&mut self) {
        self.beans.unregister(&self.name);
        let elapsed = self.started.elapsed().as_millis() as u64;
        self.stats.processing_ms.fetch_add(elapsed, Ordering::Relaxed);
        self.stats.requests.fetch_add(1, Ordering::Relaxed);
        self.stats.busy.fetch_sub(1, Ordering::Relaxed);
    }
}

/// Registers the worker pool and web module beans.
pub fn register_http_beans(
    beans: &BeanRegistry,
    stats: &Arc<HttpStats>,
    workers: &Arc<ThreadGroup>,
    max_threads: usize,
    config: &Config,
) {
    let pool = {
        let workers = Arc::clone(workers);
        let busy = Arc::clone(stats);
        DynamicBean::new()
            .attribute("name", "String", "Pool name", || "\"http-worker\"")
            .attribute("maxThreads", "int", "Maximum number of report workers", move || max_threads)
            .attribute("currentThreadCount", "int", "Live worker threads", move || {
                workers.active_count()
            })
            .attribute("currentThreadsBusy", "int", "Workers rendering a report", move || busy.busy())
    };

    let module = {
        let doc_base = match config.context_path() {
            "" => "/".to_string(),
            context => context.to_string(),
        };
        let processing = Arc::clone(stats);
        let requests = Arc::clone(stats);
        let errors = Arc::clone(stats);
        let started = stats.started;
        DynamicBean::new()
            .attribute("docBase", "String", "Context path of the module", move || doc_base.clone())
            .attribute("processingTime", "long", "Total request processing time in ms", move || {
                processing.processing_ms.load(Ordering::Relaxed)
            })
            .attribute("requestCount", "int", "Completed requests", move || requests.requests())
            .attribute("errorCount", "int", "Requests that rendered an exception", move || {
                errors.errors.load(Ordering::Relaxed)
            })
            .attribute("startTime", "String", "Module start time", move || started.to_rfc3339())
            .operation(OperationInfo::new("getCatalog", "String[]", "Report paths served by the module"))
    };

    for (name, bean) in [(WORKER_POOL_BEAN, pool), (WEB_MODULE_BEAN, module)] {
        match beans.register_named(name, Arc::new(bean)) {
            Ok(name) => debug!("Registered HTTP bean {}", name),
            Err(e) => warn!("Failed to register HTTP bean {}: {}", name, e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use runtime_status_endpoint::registry::AttrValue;

    #[test]
    fn test_request_processor_bean_lives_for_the_request() {
        let beans = Arc::new(BeanRegistry::default());
        let stats = Arc::new(HttpStats::default());

        let guard = stats.begin(&beans, "/status/tomcat/current/uris");
        let found = beans.find_beans("*:type=RequestProcessor,*");
        assert_eq!(found.len(), 1);
        let name = found.iter().next().unwrap();
        assert_eq!(
            beans.get_attribute(name, "currentUri").unwrap(),
            AttrValue::from("/status/tomcat/current/uris")
        );
        assert_eq!(stats.busy(), 1);

        drop(guard);
        assert!(!beans.is_registered(name));
        assert!(beans.find_beans("*:type=RequestProcessor,*").is_empty());
        assert_eq!(stats.busy(), 0);
        assert_eq!(stats.requests(), 1);
    }

    #[test]
    fn test_http_beans_answer_the_pool_and_module_reports() {
        let beans = BeanRegistry::default();
        let stats = Arc::new(HttpStats::default());
        let workers = ThreadGroup::new(&ThreadGroup::main(), "http-test-workers");
        register_http_beans(&beans, &stats, &workers, 16, &Config::default());

        let pool = beans.find_beans("*:type=ThreadPool,*");
        let pool = pool.iter().next().unwrap();
        assert_eq!(beans.get_attribute(pool, "maxThreads").unwrap(), AttrValue::UInt(16));
        assert_eq!(beans.get_attribute(pool, "currentThreadsBusy").unwrap(), AttrValue::UInt(0));

        let module = beans.find_beans("*:j2eeType=WebModule,*");
        let module = module.iter().next().unwrap();
        assert_eq!(beans.get_attribute(module, "docBase").unwrap(), AttrValue::from("/status"));
    }
}
