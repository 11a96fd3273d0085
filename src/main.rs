use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::{fmt, EnvFilter};

use wazuh_exporter::collector::Collector;
use wazuh_exporter::config::Config;
use wazuh_exporter::export::{ExporterMetrics, MetricsServer};
use wazuh_exporter::wazuh::Client;

/// Exit status for configuration errors.
const EXIT_CONFIG: i32 = 2;

/// Prometheus exporter for the Wazuh manager API.
#[derive(Parser)]
#[command(name = "wazuh-exporter", about)]
struct Cli {
    /// Path to an optional YAML configuration file. Environment variables
    /// override its values.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Logging verbosity level (trace, debug, info, warn, error).
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Print version information and exit.
    Version,
}

/// Build-time version info, injected by build.rs.
mod version {
    /// Release version string (set at build time).
    pub const RELEASE: &str = env!("CARGO_PKG_VERSION");

    /// Git commit hash (set at build time via env, or "unknown").
    pub fn git_commit() -> &'static str {
        option_env!("GIT_COMMIT").unwrap_or("unknown")
    }

    /// Full version string with platform info.
    pub fn full() -> String {
        format!(
            "{} (commit: {}, {}/{})",
            RELEASE,
            git_commit(),
            std::env::consts::OS,
            std::env::consts::ARCH,
        )
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    if let Some(Command::Version) = &cli.command {
        println!("wazuh-exporter {}", version::full());
        return Ok(());
    }

    let filter = EnvFilter::try_new(&cli.log_level)
        .with_context(|| format!("invalid log level: {}", cli.log_level))?;

    fmt().with_env_filter(filter).with_target(true).init();

    let cfg = match Config::load(cli.config.as_deref()) {
        Ok(cfg) => cfg,
        Err(e) => {
            tracing::error!("invalid configuration: {e:#}");
            std::process::exit(EXIT_CONFIG);
        }
    };

    tracing::info!(
        version = version::RELEASE,
        commit = version::git_commit(),
        manager = %cfg.manager.base_url(),
        "starting wazuh-exporter",
    );

    let rt = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("building tokio runtime")?;

    rt.block_on(run(cfg))
}

async fn run(cfg: Config) -> Result<()> {
    let addr = cfg.exporter.socket_addr()?;
    let metrics = Arc::new(ExporterMetrics::new().context("registering exporter metrics")?);

    let client = Client::new(&cfg.manager)?.with_metrics(metrics.request_callback());
    let collector = Collector::new(client, cfg.families);

    let server = MetricsServer::new(addr, collector, metrics);
    server.start().await?;

    shutdown_signal().await?;

    server.stop().await?;

    tracing::info!("wazuh-exporter stopped");

    Ok(())
}

async fn shutdown_signal() -> Result<()> {
    let mut sigterm = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
        .context("registering SIGTERM handler")?;

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("received SIGINT, shutting down");
        }
        _ = sigterm.recv() => {
            tracing::info!("received SIGTERM, shutting down");
        }
    }

    Ok(())
}
