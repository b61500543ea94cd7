//! One-shot report rendering without the HTTP server.

use std::io::{self, Write};

use anyhow::bail;
use runtime_status_endpoint::config::Config;
use runtime_status_endpoint::endpoints::{self, catalog, CACHE_PREFIX, TOOL_PREFIX};
use runtime_status_endpoint::Reporter;
use tracing::debug;

/// Renders `path` to stdout. Exits with an error when the report failed.
/// The path may be given with or without the context path.
pub fn command_report(path: &str, config: &Config) -> anyhow::Result<()> {
    let reporter = Reporter::from_config(config)?;
    let path = config.strip_context(path).unwrap_or(path);
    debug!("Rendering {} from the command line", path);

    let rendered = endpoints::render(&reporter, path);
    let mut stdout = io::stdout().lock();
    stdout.write_all(rendered.body.as_bytes())?;
    stdout.flush()?;

    if rendered.route.is_none() {
        bail!("No report at {} (see `endpoints`)", path);
    }
    if let Some(err) = rendered.error {
        bail!("Report {} failed: {}", path, err);
    }
    Ok(())
}

/// Prints every exact path and the parameterized families.
pub fn command_endpoints(config: &Config) -> anyhow::Result<()> {
    let context = config.context_path();
    let mut stdout = io::stdout().lock();
    for path in catalog() {
        writeln!(stdout, "{context}{path}")?;
    }
    writeln!(stdout, "{context}{TOOL_PREFIX}<tool-id>")?;
    writeln!(stdout, "{context}{CACHE_PREFIX}<cache-name>")?;
    Ok(())
}
