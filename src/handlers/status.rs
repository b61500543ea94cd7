//! Status report handler.
//!
//! Every path that is not a fixed server endpoint lands here. The context
//! path is stripped, the report renders on a blocking worker and the body
//! is always returned as `text/plain` with status 200. Paths outside the
//! context render an empty body.

use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::{
    extract::State,
    http::{StatusCode, Uri},
    response::IntoResponse,
};
use runtime_status_endpoint::endpoints::{self, log_failure, resolve, Rendered};
use runtime_status_endpoint::threads::run_tracked;
use runtime_status_endpoint::StatusError;
use tracing::{debug, instrument};

use crate::handlers::index::index_body;
use crate::state::SharedState;

/// Handler for status report paths.
#[instrument(skip(state), fields(path = %uri.path()))]
pub async fn status_handler(State(state): State<SharedState>, uri: Uri) -> impl IntoResponse {
    let start = Instant::now();
    let body = match state.config.strip_context(uri.path()) {
        None => {
            debug!("{} is outside the context path", uri.path());
            String::new()
        }
        Some("") | Some("/") => index_body(&state.config),
        Some(path) => {
            debug!("Processing status request for {}", path);
            let rendered = render_blocking(&state, uri.path(), path).await;
            if rendered.error.is_some() {
                state.http.record_error();
            }
            state.metrics.observe(&rendered, start.elapsed());
            rendered.body
        }
    };

    (
        StatusCode::OK,
        [("Content-Type", "text/plain; charset=utf-8")],
        body,
    )
}

/// Renders on the blocking pool, bounded by the configured timeout.
async fn render_blocking(state: &SharedState, uri: &str, path: &str) -> Rendered {
    let reporter = Arc::clone(&state.reporter);
    let http = Arc::clone(&state.http);
    let request_uri = uri.to_string();
    let report_path = path.to_string();

    let task = tokio::task::spawn_blocking(move || {
        run_tracked(|| {
            let _in_flight = http.begin(reporter.beans(), &request_uri);
            endpoints::render(&reporter, &report_path)
        })
    });

    let route = resolve(path).map(|r| r.label());
    let joined = match state.config.report_timeout_ms {
        Some(ms) => match tokio::time::timeout(Duration::from_millis(ms), task).await {
            Ok(joined) => joined,
            Err(_) => {
                let err = StatusError::Timeout(ms);
                log_failure(path, &err);
                return Rendered::failed(route, &err);
            }
        },
        None => task.await,
    };

    joined.unwrap_or_else(|e| {
        let err = StatusError::Internal(e.to_string());
        log_failure(path, &err);
        Rendered::failed(route, &err)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::{AppState, HttpStats};
    use axum::body::to_bytes;
    use prometheus::Registry;
    use runtime_status_endpoint::cache::CacheManager;
    use runtime_status_endpoint::collaborators::AppRegistry;
    use runtime_status_endpoint::config::Config;
    use runtime_status_endpoint::metrics::ReportMetrics;
    use runtime_status_endpoint::registry::{BeanRegistry, DynamicBean};
    use runtime_status_endpoint::Reporter;

    fn state_with(beans: BeanRegistry, config: Config) -> SharedState {
        let registry = Registry::new();
        let metrics = ReportMetrics::new(&registry).unwrap();
        let app = AppRegistry {
            caches: Some(Arc::new(CacheManager::new())),
            ..AppRegistry::default()
        };
        Arc::new(AppState {
            reporter: Arc::new(Reporter::new(Arc::new(beans), app)),
            config: Arc::new(config),
            registry,
            metrics,
            http: Arc::new(HttpStats::default()),
        })
    }

    async fn get(state: &SharedState, uri: &'static str) -> (StatusCode, String) {
        let response = status_handler(State(Arc::clone(state)), Uri::from_static(uri))
            .await
            .into_response();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, String::from_utf8(bytes.to_vec()).unwrap())
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_slow_report_times_out_with_exception_body() {
        let beans = BeanRegistry::default();
        beans
            .register_named(
                "http:type=ThreadPool,name=\"slow\"",
                Arc::new(
                    DynamicBean::new()
                        .attribute("name", "String", "", || "\"slow\"")
                        .attribute("maxThreads", "int", "", || {
                            std::thread::sleep(Duration::from_millis(500));
                            8u64
                        })
                        .attribute("currentThreadCount", "int", "", || 1u64)
                        .attribute("currentThreadsBusy", "int", "", || 1u64),
                ),
            )
            .unwrap();
        let state = state_with(
            beans,
            Config {
                report_timeout_ms: Some(50),
                ..Config::default()
            },
        );

        let (status, body) = get(&state, "/status/tomcat/threads").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "Exception: report timed out after 50 ms\n");
        assert_eq!(state.http.errors(), 1);
    }

    #[tokio::test]
    async fn test_report_failures_keep_status_ok() {
        let state = state_with(BeanRegistry::default(), Config::default());
        let (status, body) = get(&state, "/status/sakai/cache/UNKNOWN").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "Exception: No such cache name.\n");
    }

    #[tokio::test]
    async fn test_paths_outside_the_context_render_nothing() {
        let state = state_with(BeanRegistry::default(), Config::default());
        let (status, body) = get(&state, "/tomcat/mbeans/domains").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "");

        let (_, body) = get(&state, "/statusx/tomcat/mbeans/domains").await;
        assert_eq!(body, "");
        assert_eq!(state.http.errors(), 0);
    }

    #[tokio::test]
    async fn test_root_context_routes_every_path() {
        let beans = BeanRegistry::default();
        beans
            .register_named("app:type=Marker", Arc::new(DynamicBean::new()))
            .unwrap();
        let state = state_with(
            beans,
            Config {
                context_path: Some("/".into()),
                ..Config::default()
            },
        );
        let (_, body) = get(&state, "/tomcat/mbeans/domains").await;
        assert!(body.lines().any(|l| l == "  - app"));
    }
}
