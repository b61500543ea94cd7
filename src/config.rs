//! Configuration file handling.
//!
//! Every field is optional so a partial file only overrides what it names.
//! Precedence is CLI > file > built-in default; the CLI layer is applied by
//! the binary after `load_config`.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

pub const DEFAULT_BIND_ADDR: &str = "0.0.0.0";
pub const DEFAULT_PORT: u16 = 9216;
pub const DEFAULT_CONTEXT_PATH: &str = "/status";
pub const DEFAULT_REPORT_TIMEOUT_MS: u64 = 30_000;

/// Locations searched when no config file is given explicitly.
pub const DEFAULT_CONFIG_PATHS: [&str; 3] = [
    "/etc/runtime-status/config.yaml",
    "./runtime-status.yaml",
    "./runtime-status.json",
];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    // Server
    pub bind: Option<String>,
    pub port: Option<u16>,
    /// Prefix stripped from request paths before dispatch.
    pub context_path: Option<String>,

    // Reports
    pub report_timeout_ms: Option<u64>,
    pub fixture_path: Option<PathBuf>,
    pub default_domain: Option<String>,

    // Features
    pub enable_metrics: Option<bool>,

    // Logging
    pub log_level: Option<String>,

    // TLS
    pub enable_tls: Option<bool>,
    pub tls_cert_path: Option<PathBuf>,
    pub tls_key_path: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind: Some(DEFAULT_BIND_ADDR.to_string()),
            port: Some(DEFAULT_PORT),
            context_path: Some(DEFAULT_CONTEXT_PATH.to_string()),
            report_timeout_ms: Some(DEFAULT_REPORT_TIMEOUT_MS),
            fixture_path: None,
            default_domain: Some(crate::registry::DEFAULT_DOMAIN.to_string()),
            enable_metrics: Some(true),
            log_level: Some("info".into()),
            enable_tls: Some(false),
            tls_cert_path: None,
            tls_key_path: None,
        }
    }
}

impl Config {
    pub fn bind_addr(&self) -> &str {
        self.bind.as_deref().unwrap_or(DEFAULT_BIND_ADDR)
    }

    pub fn port(&self) -> u16 {
        self.port.unwrap_or(DEFAULT_PORT)
    }

    /// Context path without a trailing slash; empty means the root.
    pub fn context_path(&self) -> &str {
        self.context_path
            .as_deref()
            .unwrap_or(DEFAULT_CONTEXT_PATH)
            .trim_end_matches('/')
    }

    pub fn default_domain(&self) -> &str {
        self.default_domain
            .as_deref()
            .unwrap_or(crate::registry::DEFAULT_DOMAIN)
    }

    pub fn metrics_enabled(&self) -> bool {
        self.enable_metrics.unwrap_or(true)
    }

    pub fn tls_enabled(&self) -> bool {
        self.enable_tls.unwrap_or(false)
    }

    /// Strips the context path from a request path. `None` when the path
    /// lies outside the context; the root context accepts every path.
    pub fn strip_context<'a>(&self, path: &'a str) -> Option<&'a str> {
        let context = self.context_path();
        if context.is_empty() {
            return Some(path);
        }
        path.strip_prefix(context)
            .filter(|rest| rest.is_empty() || rest.starts_with('/'))
    }
}

/// Validates the merged configuration (used by `--check-config` and at
/// startup).
pub fn validate_effective_config(cfg: &Config) -> anyhow::Result<()> {
    if cfg.report_timeout_ms == Some(0) {
        bail!("report_timeout_ms must be greater than zero");
    }

    if let Some(context) = cfg.context_path.as_deref() {
        if !context.is_empty() && !context.starts_with('/') {
            bail!("Invalid context_path '{}', it must start with '/'", context);
        }
    }

    if let Some(domain) = cfg.default_domain.as_deref() {
        if domain.is_empty() || domain.contains(':') {
            bail!("Invalid default_domain '{}'", domain);
        }
    }

    if cfg.tls_enabled() {
        match (&cfg.tls_cert_path, &cfg.tls_key_path) {
            (Some(_), Some(_)) => {}
            _ => bail!("enable_tls requires both tls_cert_path and tls_key_path"),
        }
    }

    if let Some(level) = cfg.log_level.as_deref() {
        if !matches!(level, "off" | "error" | "warn" | "info" | "debug" | "trace") {
            bail!("Invalid log_level '{}'", level);
        }
    }

    Ok(())
}

/// Loads a config file, or the first existing default location. Returns
/// the built-in defaults when there is no file.
pub fn load_config(path: Option<&Path>) -> anyhow::Result<Config> {
    let path = match path {
        Some(p) => {
            if !p.exists() {
                bail!("Config file not found: {}", p.display());
            }
            p.to_path_buf()
        }
        None => match DEFAULT_CONFIG_PATHS.iter().map(Path::new).find(|p| p.exists()) {
            Some(p) => p.to_path_buf(),
            None => {
                debug!("No config file found, using defaults");
                return Ok(Config::default());
            }
        },
    };

    let content = fs::read_to_string(&path)
        .with_context(|| format!("Failed to read config file {}", path.display()))?;
    let config = parse_config(&content, &path)?;
    info!("Loaded configuration from: {}", path.display());
    Ok(config)
}

fn parse_config(content: &str, path: &Path) -> anyhow::Result<Config> {
    let config = match path.extension().and_then(|s| s.to_str()) {
        Some("json") => serde_json::from_str(content)
            .with_context(|| format!("Invalid JSON in {}", path.display()))?,
        Some("toml") => toml::from_str(content)
            .with_context(|| format!("Invalid TOML in {}", path.display()))?,
        _ => serde_yaml::from_str(content)
            .with_context(|| format!("Invalid YAML in {}", path.display()))?,
    };
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_temp(suffix: &str, content: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::Builder::new().suffix(suffix).tempfile().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_default_config_is_valid() {
        assert!(validate_effective_config(&Config::default()).is_ok());
    }

    #[test]
    fn test_partial_yaml_leaves_other_fields_unset() {
        let file = write_temp(".yaml", "port: 8080\ncontext_path: /diag\n");
        let config = load_config(Some(file.path())).unwrap();
        assert_eq!(config.port, Some(8080));
        assert_eq!(config.context_path(), "/diag");
        assert_eq!(config.bind, None);
        assert_eq!(config.bind_addr(), DEFAULT_BIND_ADDR);
    }

    #[test]
    fn test_json_and_toml_configs() {
        let file = write_temp(".json", r#"{"report_timeout_ms": 250}"#);
        assert_eq!(load_config(Some(file.path())).unwrap().report_timeout_ms, Some(250));

        let file = write_temp(".toml", "enable_metrics = false\n");
        assert!(!load_config(Some(file.path())).unwrap().metrics_enabled());
    }

    #[test]
    fn test_missing_explicit_config_is_an_error() {
        assert!(load_config(Some(Path::new("/nonexistent/runtime-status.yaml"))).is_err());
    }

    #[test]
    fn test_validation_rejects_bad_values() {
        let tls_without_key = Config {
            enable_tls: Some(true),
            tls_cert_path: Some("/tmp/cert.pem".into()),
            ..Config::default()
        };
        assert!(validate_effective_config(&tls_without_key).is_err());

        let zero_timeout = Config {
            report_timeout_ms: Some(0),
            ..Config::default()
        };
        assert!(validate_effective_config(&zero_timeout).is_err());

        let relative_context = Config {
            context_path: Some("status".into()),
            ..Config::default()
        };
        assert!(validate_effective_config(&relative_context).is_err());
    }

    #[test]
    fn test_strip_context() {
        let config = Config::default();
        assert_eq!(config.strip_context("/status/tomcat/mbeans"), Some("/tomcat/mbeans"));
        assert_eq!(config.strip_context("/status"), Some(""));
        assert_eq!(config.strip_context("/statusx/a"), None);
        assert_eq!(config.strip_context("/tomcat/mbeans"), None);

        let root = Config {
            context_path: Some("/".into()),
            ..Config::default()
        };
        assert_eq!(root.strip_context("/sakai/cache"), Some("/sakai/cache"));
    }
}
