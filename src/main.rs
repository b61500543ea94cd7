//! runtime-status-endpoint server binary.

mod cli;
mod commands;
mod handlers;
mod state;

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use axum::{routing::get, Router};
use clap::Parser;
use prometheus::Registry;
use tokio::{net::TcpListener, signal};
use tracing::{debug, error, info, level_filters::LevelFilter};

use runtime_status_endpoint::config::{load_config, validate_effective_config, Config};
use runtime_status_endpoint::metrics::ReportMetrics;
use runtime_status_endpoint::threads::{
    attach_current, build_tracked_runtime, detach_current, ThreadGroup,
};
use runtime_status_endpoint::Reporter;

use cli::{apply_overrides, Args, Commands, ConfigFormat, LogLevel};
use handlers::{index_handler, metrics_handler, status_handler};
use state::{register_http_beans, AppState, HttpStats};

/// Upper bound of blocking threads rendering reports.
const MAX_REPORT_WORKERS: usize = 64;

/// Seconds granted to open connections on shutdown (TLS listener).
const SHUTDOWN_GRACE_SECS: u64 = 5;

fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let config = resolve_config(&args)?;

    if args.check_config {
        if let Err(e) = validate_effective_config(&config) {
            eprintln!("❌ Configuration invalid: {}", e);
            std::process::exit(1);
        }
        println!("✅ Configuration is valid");
        return Ok(());
    }

    if args.show_config {
        return show_config(&config, args.config_format);
    }

    if let Err(e) = validate_effective_config(&config) {
        eprintln!("❌ Configuration invalid: {}", e);
        std::process::exit(1);
    }

    setup_logging(&config);
    attach_current(&ThreadGroup::main(), false);

    if let Some(command) = &args.command {
        return match command {
            Commands::Report { path } => commands::command_report(path, &config),
            Commands::Endpoints => commands::command_endpoints(&config),
            Commands::Config {
                output,
                format,
                commented,
            } => commands::command_config(output.clone(), *format, *commented),
            Commands::GenerateFixture {
                output,
                sessions,
                servers,
            } => commands::command_generate_fixture(output.clone(), *sessions, *servers),
        };
    }

    let workers = ThreadGroup::new(&ThreadGroup::main(), "http-workers");
    let runtime = build_tracked_runtime(&workers, "http-worker", MAX_REPORT_WORKERS)
        .context("Failed to build tokio runtime")?;
    let result = runtime.block_on(serve(config, workers));
    detach_current();
    result
}

/// Config file (unless disabled) with CLI overrides applied.
fn resolve_config(args: &Args) -> anyhow::Result<Config> {
    let config = if args.no_config {
        Config::default()
    } else {
        load_config(args.config.as_deref())?
    };
    Ok(apply_overrides(config, args))
}

/// Shows configuration in requested format
fn show_config(config: &Config, format: ConfigFormat) -> anyhow::Result<()> {
    let output = match format {
        ConfigFormat::Json => serde_json::to_string_pretty(config)?,
        ConfigFormat::Toml => toml::to_string_pretty(config)?,
        ConfigFormat::Yaml => serde_yaml::to_string(config)?,
    };
    println!("{output}");
    Ok(())
}

/// Initializes tracing logging subsystem with configured log level
fn setup_logging(config: &Config) {
    let level = config
        .log_level
        .as_deref()
        .and_then(LogLevel::parse)
        .unwrap_or(LogLevel::Info);
    let filter = match level {
        LogLevel::Off => LevelFilter::OFF,
        LogLevel::Error => LevelFilter::ERROR,
        LogLevel::Warn => LevelFilter::WARN,
        LogLevel::Info => LevelFilter::INFO,
        LogLevel::Debug => LevelFilter::DEBUG,
        LogLevel::Trace => LevelFilter::TRACE,
    };

    // Reports go to stdout in CLI mode, so logs use stderr.
    let subscriber = tracing_subscriber::fmt()
        .with_max_level(filter)
        .with_target(true)
        .with_thread_ids(false)
        .with_thread_names(true)
        .with_file(true)
        .with_line_number(true)
        .with_writer(std::io::stderr)
        .finish();

    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Failed to set tracing subscriber: {}", e);
        return;
    }

    info!("Logging initialized with level: {:?}", level);
}

async fn serve(config: Config, workers: Arc<ThreadGroup>) -> anyhow::Result<()> {
    info!("Starting runtime-status-endpoint");

    let registry = Registry::new();
    let metrics = ReportMetrics::new(&registry)?;
    debug!("Prometheus registry initialized");

    let reporter = Reporter::from_config(&config)?;
    let http = Arc::new(HttpStats::default());
    register_http_beans(reporter.beans(), &http, &workers, MAX_REPORT_WORKERS, &config);

    let config = Arc::new(config);
    let state = Arc::new(AppState {
        reporter: Arc::new(reporter),
        config: Arc::clone(&config),
        registry,
        metrics,
        http,
    });

    let mut app = Router::new().route("/", get(index_handler));
    if config.metrics_enabled() {
        app = app.route("/metrics", get(metrics_handler));
    }
    let app = app.fallback(status_handler).with_state(state);

    let addr: SocketAddr = format!("{}:{}", config.bind_addr(), config.port())
        .parse()
        .with_context(|| format!("Invalid bind address {}:{}", config.bind_addr(), config.port()))?;

    if config.tls_enabled() {
        serve_tls(&config, addr, app).await?;
    } else {
        let listener = TcpListener::bind(addr)
            .await
            .with_context(|| format!("Failed to bind {}", addr))?;
        info!(
            "runtime-status-endpoint listening on http://{}{}",
            addr,
            config.context_path()
        );
        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal())
            .await?;
    }

    info!("runtime-status-endpoint stopped gracefully");
    Ok(())
}

async fn serve_tls(config: &Config, addr: SocketAddr, app: Router) -> anyhow::Result<()> {
    let (Some(cert), Some(key)) = (&config.tls_cert_path, &config.tls_key_path) else {
        anyhow::bail!("enable_tls requires both tls_cert_path and tls_key_path");
    };
    let tls = axum_server::tls_rustls::RustlsConfig::from_pem_file(cert, key)
        .await
        .with_context(|| format!("Failed to load TLS material from {}", cert.display()))?;

    let handle = axum_server::Handle::new();
    let shutdown = handle.clone();
    tokio::spawn(async move {
        shutdown_signal().await;
        shutdown.graceful_shutdown(Some(Duration::from_secs(SHUTDOWN_GRACE_SECS)));
    });

    info!(
        "runtime-status-endpoint listening on https://{}{}",
        addr,
        config.context_path()
    );
    axum_server::bind_rustls(addr, tls)
        .handle(handle)
        .serve(app.into_make_service())
        .await?;
    Ok(())
}

/// Resolves on SIGINT or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received SIGINT (Ctrl+C), shutting down gracefully...");
        }
        _ = terminate => {
            info!("Received SIGTERM, shutting down gracefully...");
        }
    }
}
