//! Read-only diagnostic status endpoint.
//!
//! A flat namespace of plain-text reports over the process bean registry,
//! the tracked thread hierarchy, named caches and application collaborators
//! such as sessions, tools and properties. `endpoints::render` is the single
//! entry point; the binary adds the HTTP transport around it.

pub mod beans;
pub mod cache;
pub mod cache_stats;
pub mod collaborators;
pub mod config;
pub mod endpoints;
pub mod error;
pub mod fixture;
pub mod metrics;
pub mod registry;
pub mod reports;
pub mod system;
pub mod threads;

pub use endpoints::{render, Rendered};
pub use error::StatusError;
pub use reports::Reporter;
