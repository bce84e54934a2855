//! logbridge Daemon - Log aggregator

use anyhow::{Context, Result};
use clap::Parser;
use logbridge_core::{constants, ConfigFile, SessionMode};
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod daemon;

use daemon::Daemon;

#[derive(Parser, Debug)]
#[command(name = "logbridged")]
#[command(about = "logbridge aggregator: collects entries from producers")]
#[command(version)]
struct Args {
    /// Config file (default: logbridge.{toml,yaml,yml,json} in the working directory)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Host to bind
    #[arg(long)]
    host: Option<String>,

    /// Preferred port (an ephemeral port is used if it is taken)
    #[arg(short, long, env = constants::ENV_PORT)]
    port: Option<u16>,

    /// Ring buffer capacity
    #[arg(long)]
    capacity: Option<usize>,

    /// Durable store base directory
    #[arg(long)]
    store_dir: Option<PathBuf>,

    /// Reuse one persistent session folder instead of one per start
    #[arg(long)]
    single: bool,

    /// Disable the durable session store
    #[arg(long)]
    no_store: bool,

    /// Token required on ingestion and mutation routes
    #[arg(long, env = constants::ENV_TOKEN)]
    token: Option<String>,

    /// Project name advertised in the discovery record
    #[arg(long)]
    project: Option<String>,

    /// Do not write the shared temp-dir discovery record
    #[arg(long)]
    no_legacy: bool,
}

impl Args {
    fn apply(self, config: &mut ConfigFile) {
        if let Some(host) = self.host {
            config.aggregator.host = host;
        }
        if let Some(port) = self.port {
            config.aggregator.port = port;
        }
        if let Some(capacity) = self.capacity {
            config.aggregator.capacity = capacity;
        }
        if let Some(dir) = self.store_dir {
            config.store.dir = dir;
        }
        if self.single {
            config.store.mode = SessionMode::Single;
        }
        if self.no_store {
            config.store.enabled = false;
        }
        if self.token.is_some() {
            config.aggregator.token = self.token;
        }
        if self.project.is_some() {
            config.aggregator.project = self.project;
        }
        if self.no_legacy {
            config.aggregator.legacy_discovery = false;
        }
    }
}

fn load_config(path: Option<&PathBuf>, cwd: &std::path::Path) -> Result<ConfigFile> {
    match path {
        Some(path) => {
            let mut config = ConfigFile::load(path)
                .with_context(|| format!("Failed to load {}", path.display()))?;
            config.apply_env_from(|key| std::env::var(key).ok())?;
            Ok(config)
        }
        None => Ok(ConfigFile::discover(cwd)?),
    }
}

#[cfg(unix)]
async fn shutdown_signal() {
    use tokio::signal::unix::{signal, SignalKind};

    let (mut sigterm, mut sigint) = match (
        signal(SignalKind::terminate()),
        signal(SignalKind::interrupt()),
    ) {
        (Ok(term), Ok(int)) => (term, int),
        _ => {
            let _ = tokio::signal::ctrl_c().await;
            return;
        }
    };

    tokio::select! {
        _ = sigterm.recv() => {
            info!("Received SIGTERM, shutting down...");
        }
        _ = sigint.recv() => {
            info!("Received SIGINT, shutting down...");
        }
    }
}

#[cfg(not(unix))]
async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
    info!("Received Ctrl-C, shutting down...");
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "logbridged=info,logbridge_web=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();
    let cwd = std::env::current_dir()?;

    let mut config = load_config(args.config.as_ref(), &cwd)?;
    args.apply(&mut config);

    info!("logbridge aggregator starting...");

    let daemon = Daemon::new(config, cwd).await?;
    daemon.run(shutdown_signal()).await?;

    info!("Aggregator shutdown complete");
    Ok(())
}
