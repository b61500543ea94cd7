//! HTTP endpoint handlers for the status server.
//!
//! This module provides handlers for all HTTP endpoints:
//! - `/`: Index page listing the report paths
//! - `/metrics`: Prometheus metrics endpoint
//! - everything else: status reports dispatched by path

pub mod index;
pub mod metrics;
pub mod status;

// Re-export handlers
pub use index::index_handler;
pub use metrics::metrics_handler;
pub use status::status_handler;
