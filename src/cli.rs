//! CLI arguments and subcommands for runtime-status-endpoint.
//!
//! This module defines the command-line interface structure using the clap library,
//! including all flags, options, and subcommands.

use clap::{Parser, Subcommand, ValueEnum};
use std::net::IpAddr;
use std::path::PathBuf;

use runtime_status_endpoint::config::Config;

/// Log level options for CLI parsing
#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum LogLevel {
    Off,
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

/// Configuration format options for output
#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum ConfigFormat {
    Yaml,
    Json,
    Toml,
}

/// Main CLI arguments structure
#[derive(Parser, Debug)]
#[command(
    name = "runtime-status-endpoint",
    about = "Read-only plain-text diagnostic endpoint for beans, threads, caches and sessions",
    long_about = "Read-only plain-text diagnostic endpoint.\n\n\
                  Serves a flat namespace of reports about management beans, thread groups \
                  and stacks, cache statistics, session counts and application properties. \
                  Reports can also be rendered once from the command line.",
    author = "Michael Moll <proc-mem@herakles.io> - Herakles IO",
    version = "0.1.0",
    propagate_version = true
)]
pub struct Args {
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// HTTP listen port
    #[arg(short = 'p', long)]
    pub port: Option<u16>,

    /// Bind to specific interface/IP
    #[arg(long)]
    pub bind: Option<IpAddr>,

    /// Log level
    #[arg(long, value_enum)]
    pub log_level: Option<LogLevel>,

    /// Config file (YAML/JSON/TOML)
    #[arg(short = 'c', long)]
    pub config: Option<PathBuf>,

    /// Disable all config file loading
    #[arg(long)]
    pub no_config: bool,

    /// Print effective merged config and exit
    #[arg(long)]
    pub show_config: bool,

    /// Output format for --show-config
    #[arg(long, value_enum, default_value = "yaml")]
    pub config_format: ConfigFormat,

    /// Validate config and exit (return code 1 on error)
    #[arg(long)]
    pub check_config: bool,

    /// Path prefix stripped from request paths (e.g. /status)
    #[arg(long)]
    pub context_path: Option<String>,

    /// Application registry fixture (YAML/JSON/TOML)
    #[arg(long)]
    pub fixture: Option<PathBuf>,

    /// Per-report time budget in milliseconds
    #[arg(long)]
    pub report_timeout_ms: Option<u64>,

    /// Disable the /metrics endpoint
    #[arg(long)]
    pub disable_metrics: bool,

    /// Enable HTTPS
    #[arg(long)]
    pub enable_tls: bool,

    /// TLS certificate (PEM)
    #[arg(long)]
    pub tls_cert: Option<PathBuf>,

    /// TLS private key (PEM)
    #[arg(long)]
    pub tls_key: Option<PathBuf>,
}

/// Subcommands for additional functionality
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Render one status report to stdout
    Report {
        /// Report path, e.g. /tomcat/threadgroups
        path: String,
    },

    /// List the available report paths
    Endpoints,

    /// Generate configuration files
    Config {
        /// Output file path ("-" for stdout)
        #[arg(short = 'o', long)]
        output: Option<PathBuf>,

        /// Output format
        #[arg(long, value_enum, default_value = "yaml")]
        format: ConfigFormat,

        /// Include comments and examples
        #[arg(long)]
        commented: bool,
    },

    /// Generate a synthetic application registry fixture
    GenerateFixture {
        /// Output file path
        #[arg(short = 'o', long, default_value = "runtime-status-fixture.json")]
        output: PathBuf,

        /// Number of open sessions
        #[arg(long, default_value_t = 40)]
        sessions: usize,

        /// Number of server instances
        #[arg(long, default_value_t = 3)]
        servers: usize,
    },
}

impl LogLevel {
    pub fn parse(level: &str) -> Option<Self> {
        <Self as ValueEnum>::from_str(level, true).ok()
    }
}

/// Applies CLI overrides on top of a loaded config.
pub fn apply_overrides(mut config: Config, args: &Args) -> Config {
    if let Some(bind_ip) = args.bind {
        config.bind = Some(bind_ip.to_string());
    }
    if let Some(port) = args.port {
        config.port = Some(port);
    }
    if let Some(level) = args.log_level {
        if let Some(name) = level.to_possible_value() {
            config.log_level = Some(name.get_name().to_string());
        }
    }
    if let Some(context) = &args.context_path {
        config.context_path = Some(context.clone());
    }
    if let Some(fixture) = &args.fixture {
        config.fixture_path = Some(fixture.clone());
    }
    if let Some(timeout) = args.report_timeout_ms {
        config.report_timeout_ms = Some(timeout);
    }
    if args.disable_metrics {
        config.enable_metrics = Some(false);
    }
    if args.enable_tls {
        config.enable_tls = Some(true);
    }
    if let Some(cert) = &args.tls_cert {
        config.tls_cert_path = Some(cert.clone());
    }
    if let Some(key) = &args.tls_key {
        config.tls_key_path = Some(key.clone());
    }
    config
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_overrides_config_file() {
        let args = Args::parse_from([
            "runtime-status-endpoint",
            "--port",
            "7000",
            "--log-level",
            "debug",
            "--context-path",
            "/diag",
            "--disable-metrics",
        ]);
        let config = apply_overrides(Config::default(), &args);
        assert_eq!(config.port, Some(7000));
        assert_eq!(config.log_level.as_deref(), Some("debug"));
        assert_eq!(config.context_path(), "/diag");
        assert!(!config.metrics_enabled());
        assert_eq!(config.bind_addr(), "0.0.0.0");
    }

    #[test]
    fn test_report_subcommand() {
        let args = Args::parse_from(["runtime-status-endpoint", "report", "/sakai/cache"]);
        match args.command {
            Some(Commands::Report { path }) => assert_eq!(path, "/sakai/cache"),
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_log_level_parse() {
        assert!(matches!(LogLevel::parse("WARN"), Some(LogLevel::Warn)));
        assert!(LogLevel::parse("loud").is_none());
    }
}
