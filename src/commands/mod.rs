//! CLI command implementations for runtime-status-endpoint.
//!
//! This module provides implementations for all CLI subcommands:
//! - `report`: Render one report to stdout
//! - `endpoints`: List report paths
//! - `config`: Configuration file generation
//! - `generate-fixture`: Synthetic application registry generation

pub mod config;
pub mod generate;
pub mod report;

// Re-export command functions
pub use config::command_config;
pub use generate::command_generate_fixture;
pub use report::{command_endpoints, command_report};
