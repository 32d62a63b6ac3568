use std::path::PathBuf;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use serde_json::json;
use tokio::signal;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use forgemirror::cache::TieredCache;
use forgemirror::config::{self, Config};
use forgemirror::facade::{CacheFacade, DefaultsConfigStore};
use forgemirror::git;
use forgemirror::metrics::MetricsRegistry;
use forgemirror::mirror::{RepoCacheManager, RepoStatus, RepositoryId};

// ---------------------------------------------------------------------------
// CLI
// ---------------------------------------------------------------------------

#[derive(Parser, Debug)]
#[command(name = "forgemirror", about = "Git mirror cache and response cache tools")]
struct Cli {
    /// Path to the YAML configuration file.
    #[arg(short, long, env = "FORGEMIRROR_CONFIG")]
    config: Option<PathBuf>,

    #[arg(long, value_enum, default_value_t = LogFormat::Json)]
    log_format: LogFormat,

    /// Print the metrics exposition after the command finishes.
    #[arg(long)]
    metrics: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum LogFormat {
    Json,
    Pretty,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Clone or refresh a mirror, then print its branches and tags.
    Mirror {
        url: String,
        /// Give up waiting for the clone after this many seconds.
        #[arg(long, default_value_t = 300)]
        wait_secs: u64,
    },
    /// Show where a repository's mirror lives and whether it is usable.
    Status { url: String },
    /// Read or write configuration values through the response cache.
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand, Debug)]
enum ConfigAction {
    Get { key: String },
    Set { key: String, value: String },
}

// ---------------------------------------------------------------------------
// Commands
// ---------------------------------------------------------------------------

async fn run_mirror(config: &Config, metrics: MetricsRegistry, url: &str, wait: Duration) -> Result<()> {
    let manager = RepoCacheManager::from_config(&config.mirror, metrics);
    manager.trigger_clone(url);

    let settled = async {
        loop {
            let status = manager.get_status(url);
            if status != RepoStatus::Cloning {
                return status;
            }
            tokio::time::sleep(Duration::from_millis(200)).await;
        }
    };

    let status = tokio::select! {
        res = tokio::time::timeout(wait, settled) => match res {
            Ok(status) => status,
            Err(_) => {
                manager.shutdown();
                bail!("mirror of {url} not ready after {wait:?}");
            }
        },
        () = shutdown_signal() => {
            manager.shutdown();
            bail!("interrupted while mirroring {url}");
        }
    };

    if status != RepoStatus::Ready {
        bail!("mirror of {url} ended in status {status}");
    }

    let git_binary = config.mirror.git_binary.clone();
    let report = manager
        .access_repo(url, |path| async move {
            let default_branch = git::default_branch(&git_binary, &path).await.ok();
            let branches = git::list_branches(&git_binary, &path).await?;
            let tags = git::list_tags(&git_binary, &path).await?;
            Ok(json!({
                "path": path,
                "default_branch": default_branch,
                "branches": branches,
                "tags": tags,
            }))
        })
        .await?;

    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

async fn run_status(config: &Config, url: &str) -> Result<()> {
    let id = RepositoryId::from_url(url);
    let path = id.mirror_path(&config.mirror.root);
    let valid = git::validate_bare_repo(&path).await;
    let report = json!({
        "url": url,
        "id": id.as_str(),
        "path": path,
        "valid_mirror": valid,
    });
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

async fn run_config(config: &Config, metrics: MetricsRegistry, action: ConfigAction) -> Result<()> {
    let backend = TieredCache::from_config(&config.cache, metrics).await?;
    let facade = CacheFacade::new(backend.clone());
    let store = DefaultsConfigStore::new();

    let result = match action {
        ConfigAction::Get { key } => facade
            .get_config_value(&store, &key)
            .await
            .map(|value| println!("{value}")),
        ConfigAction::Set { key, value } => facade.set_config_value(&store, &key, &value).await,
    };
    backend.close().await;
    result
}

// ---------------------------------------------------------------------------
// Graceful shutdown
// ---------------------------------------------------------------------------

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to listen for Ctrl+C");
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
                tracing::error!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => tracing::info!("received SIGINT"),
        () = terminate => tracing::info!("received SIGTERM"),
    }
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ---- Tracing ----
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let registry = tracing_subscriber::registry().with(filter);
    match cli.log_format {
        LogFormat::Json => registry
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .init(),
        LogFormat::Pretty => registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init(),
    }

    // ---- Config ----
    let config = config::load_config(cli.config.as_deref()).context("failed to load configuration")?;
    tracing::info!(
        mirror_root = %config.mirror.root.display(),
        durable_cache = config.cache.durable.is_enabled(),
        "starting forgemirror"
    );

    let metrics = MetricsRegistry::new();
    let result = match cli.command {
        Command::Mirror { url, wait_secs } => {
            run_mirror(&config, metrics.clone(), &url, Duration::from_secs(wait_secs)).await
        }
        Command::Status { url } => run_status(&config, &url).await,
        Command::Config { action } => run_config(&config, metrics.clone(), action).await,
    };

    if cli.metrics {
        print!("{}", metrics.encode());
    }
    result
}
