// Admin entrypoint: runs the cleanup worker over one cache root.

use anyhow::{Context, Result};
use clap::Parser;
use diskjanitor::config::Config;
use diskjanitor::issues::{DedupIssueSink, TracingIssueSink};
use diskjanitor::shutdown::GracefulShutdown;
use diskjanitor::{CleanupFacade, Collaborators};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

const CONFIG_PATH: &str = "cfg/diskjanitor.cfg.yaml";
const CONFIG_PATH_LOCAL: &str = "cfg/diskjanitor.cfg.local.yaml";

const GRACEFUL_TIMEOUT: Duration = Duration::from_secs(30);

/// diskjanitor - background eviction for on-disk caches
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Custom config file path
    #[arg(short, long, value_name = "FILE")]
    cfg: Option<PathBuf>,

    /// Cache root directory to keep trimmed
    #[arg(short, long, value_name = "DIR")]
    root: PathBuf,

    /// Sweep the whole cache once right after startup
    #[arg(long)]
    full: bool,
}

/// Loads the configuration from YAML.
/// Tries the local config first, then falls back to the default one.
fn load_cfg(path: Option<PathBuf>) -> Result<Config> {
    if let Some(custom_path) = path {
        return Config::load(&custom_path)
            .with_context(|| format!("failed to load custom config from {:?}", custom_path));
    }

    match Config::load(PathBuf::from(CONFIG_PATH_LOCAL)) {
        Ok(cfg) => Ok(cfg),
        Err(_) => Config::load(PathBuf::from(CONFIG_PATH))
            .with_context(|| format!("failed to load config from {}", CONFIG_PATH)),
    }
}

/// Configures structured logging based on configuration.
fn configure_logger(cfg: &Config) {
    use tracing_subscriber::fmt;
    use tracing_subscriber::prelude::*;
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(cfg.cleanup.log_level()));

    if cfg.cleanup.is_prod() {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().pretty())
            .init();
    }
}

fn main() -> Result<()> {
    let args = Args::parse();

    tokio::runtime::Runtime::new()
        .context("Failed to create tokio runtime")?
        .block_on(async_main(args))
}

async fn async_main(args: Args) -> Result<()> {
    let cfg = load_cfg(args.cfg)?;
    configure_logger(&cfg);
    info!(component = "main", event = "config_loaded", root = ?args.root, "config loaded");

    let root = args
        .root
        .canonicalize()
        .with_context(|| format!("cache root {:?} is not accessible", args.root))?;

    let issues = Arc::new(DedupIssueSink::new(TracingIssueSink, cfg.cleanup.advisory_interval));
    let facade = CleanupFacade::new(&cfg.cleanup, root.clone(), Collaborators::filesystem(&root, issues))
        .context("failed to build cleanup engine")?;

    facade.start();
    if args.full {
        facade.force_full_clean();
    }

    let graceful = GracefulShutdown::new(CancellationToken::new(), GRACEFUL_TIMEOUT);
    graceful.await_signal().await;

    if let Err(e) = graceful.finish(facade.shutdown()).await {
        error!(
            component = "main",
            scope = "service",
            event = "graceful_shutdown_failed",
            error = %e,
            "failed to gracefully shut down service"
        );
        return Err(e.into());
    }

    let stats = facade.stats();
    info!(
        component = "main",
        event = "exit",
        removed = stats.removed_files,
        failures = stats.task_failures,
        "bye"
    );
    Ok(())
}
