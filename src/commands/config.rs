//! Config command implementation.

use std::fs;
use std::path::PathBuf;

use runtime_status_endpoint::config::Config;

use crate::cli::ConfigFormat;

/// Writes the default configuration in the requested format.
pub fn command_config(
    output: Option<PathBuf>,
    format: ConfigFormat,
    commented: bool,
) -> anyhow::Result<()> {
    let config = Config::default();
    let output = output.unwrap_or_else(|| PathBuf::from("runtime-status.yaml"));

    let content = match format {
        ConfigFormat::Json => serde_json::to_string_pretty(&config)?,
        ConfigFormat::Toml => toml::to_string_pretty(&config)?,
        ConfigFormat::Yaml => {
            let mut content = serde_yaml::to_string(&config)?;
            if commented {
                content = add_config_comments(content);
            }
            content
        }
    };

    if output.to_string_lossy() == "-" {
        print!("{}", content);
    } else {
        fs::write(&output, content)?;
        println!("✅ Configuration written to: {}", output.display());
    }

    Ok(())
}

/// Adds comments to YAML configuration
fn add_config_comments(yaml: String) -> String {
    let comments = r#"# Runtime Status Endpoint Configuration
# =====================================
#
# Server Configuration
# --------------------
# bind: "0.0.0.0"              # Bind IP (0.0.0.0 = all interfaces)
# port: 9216                   # HTTP port
# context_path: "/status"      # Prefix stripped before dispatch ("/" = none)
#
# Reports
# -------
# report_timeout_ms: 30000     # Time budget per report
# fixture_path: null           # Application registry fixture (YAML/JSON/TOML)
# default_domain: "DefaultDomain" # Bean registry default domain
#
# Feature Flags
# -------------
# enable_metrics: true         # Serve /metrics
#
# Logging
# -------
# log_level: "info"            # off, error, warn, info, debug, trace
#
# TLS
# ---
# enable_tls: false
# tls_cert_path: null          # PEM certificate
# tls_key_path: null           # PEM private key
"#;

    format!("{comments}\n{yaml}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use runtime_status_endpoint::config::load_config;

    #[test]
    fn test_generated_configs_load_back() {
        let dir = tempfile::tempdir().unwrap();
        for (name, format) in [
            ("c.yaml", ConfigFormat::Yaml),
            ("c.json", ConfigFormat::Json),
            ("c.toml", ConfigFormat::Toml),
        ] {
            let path = dir.path().join(name);
            command_config(Some(path.clone()), format, true).unwrap();
            assert_eq!(load_config(Some(&path)).unwrap(), Config::default());
        }
    }
}
