//! Index page handler.
//!
//! This module provides the `/` endpoint handler listing every report path
//! served under the configured context.

use axum::{extract::State, http::StatusCode, response::IntoResponse};
use runtime_status_endpoint::config::Config;
use runtime_status_endpoint::endpoints::{catalog, CACHE_PREFIX, TOOL_PREFIX};
use std::fmt::Write as FmtWrite;
use tracing::{debug, instrument};

use crate::state::SharedState;

/// Handler for the index page.
#[instrument(skip(state))]
pub async fn index_handler(State(state): State<SharedState>) -> impl IntoResponse {
    debug!("Processing index request");
    (
        StatusCode::OK,
        [("Content-Type", "text/plain; charset=utf-8")],
        index_body(&state.config),
    )
}

/// Plain-text listing of the report catalog.
pub fn index_body(config: &Config) -> String {
    let version = env!("CARGO_PKG_VERSION");
    let context = config.context_path();
    let mut body = format!(
        r#"RUNTIME STATUS ENDPOINT
=======================

VERSION: {version}
DESCRIPTION: Read-only plain-text diagnostic reports

REPORTS
-------
"#
    );
    for path in catalog() {
        let _ = writeln!(body, "GET {context}{path}");
    }
    let _ = writeln!(body, "GET {context}{TOOL_PREFIX}<tool-id>");
    let _ = writeln!(body, "GET {context}{CACHE_PREFIX}<cache-name>");

    body.push_str(
        r#"
OTHER ENDPOINTS
---------------
GET /metrics     - Prometheus metrics about rendered reports
GET /            - This page

Unknown report paths return an empty body. A failed report returns
"Exception: <message>" with status 200.

CLI COMMANDS
------------
runtime-status-endpoint                         - Start the server
runtime-status-endpoint report /tomcat/threads  - Render one report
runtime-status-endpoint endpoints               - List report paths
runtime-status-endpoint config -o config.yaml   - Generate config file
runtime-status-endpoint generate-fixture -o f.json - Generate a fixture
"#,
    );
    body
}
