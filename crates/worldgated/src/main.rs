//! worldgated: the worldgate daemon.
//!
//! Single binary that assembles the gateway:
//! - World catalog (redb)
//! - Launcher (process or container)
//! - Orchestrator + route table
//! - Activation restore
//! - REST API
//!
//! # Usage
//!
//! ```text
//! worldgated serve --config /etc/worldgate/worldgate.toml --launcher container
//! ```

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand, ValueEnum};
use tokio::sync::watch;
use tracing::{info, warn};

use worldgate_core::{LauncherKind, WorldgateConfig};
use worldgate_health::HealthProber;
use worldgate_launcher::{ContainerLauncher, Launcher, ProcessLauncher};
use worldgate_orchestrator::{Orchestrator, restore_active_worlds};
use worldgate_routes::RouteTable;
use worldgate_state::StateStore;

const DEFAULT_LOG_FILTER: &str = "info,worldgated=debug,worldgate=debug";

#[derive(Parser)]
#[command(name = "worldgated", about = "worldgate gateway daemon")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the gateway: orchestrator, route table and REST API.
    Serve {
        /// Path to worldgate.toml. Missing file means defaults.
        #[arg(long, default_value = "worldgate.toml")]
        config: PathBuf,

        /// Port to listen on (overrides `server.port`).
        #[arg(long)]
        port: Option<u16>,

        /// Data directory for the world catalog (overrides `server.data_dir`).
        #[arg(long)]
        data_dir: Option<PathBuf>,

        /// Launch mechanism (overrides `orchestrator.launcher`).
        #[arg(long)]
        launcher: Option<LauncherKind>,

        #[arg(long, value_enum, default_value_t = LogFormat::Text)]
        log_format: LogFormat,
    },
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Command::Serve {
            config,
            port,
            data_dir,
            launcher,
            log_format,
        } => {
            init_tracing(log_format);
            let mut config = WorldgateConfig::load_or_default(&config)?;
            if let Some(port) = port {
                config.server.port = port;
            }
            if let Some(data_dir) = data_dir {
                config.server.data_dir = data_dir;
            }
            if let Some(launcher) = launcher {
                config.orchestrator.launcher = launcher;
            }
            config.validate()?;
            serve(config).await
        }
    }
}

fn init_tracing(format: LogFormat) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(DEFAULT_LOG_FILTER));
    match format {
        LogFormat::Text => tracing_subscriber::fmt().with_env_filter(filter).init(),
        LogFormat::Json => tracing_subscriber::fmt().json().with_env_filter(filter).init(),
    }
}

fn build_launcher(config: &WorldgateConfig) -> Arc<dyn Launcher> {
    match config.orchestrator.launcher {
        LauncherKind::Process => Arc::new(ProcessLauncher::new(config.process.clone())),
        LauncherKind::Container => Arc::new(ContainerLauncher::new(config.container.clone())),
    }
}

async fn serve(config: WorldgateConfig) -> anyhow::Result<()> {
    info!("worldgate daemon starting");

    // ── Initialize subsystems ──────────────────────────────────

    std::fs::create_dir_all(&config.server.data_dir)?;
    let db_path = config.server.data_dir.join("worldgate.redb");
    let store = StateStore::open(&db_path)?;
    info!(path = ?db_path, "world catalog opened");

    let routes = RouteTable::new();
    let prober = HealthProber::new(
        config.orchestrator.health_timeout(),
        config.orchestrator.health_interval(),
        config.orchestrator.probe_timeout(),
    );
    let orchestrator = Arc::new(Orchestrator::new(
        build_launcher(&config),
        Arc::new(routes.clone()),
        prober,
    ));
    info!(launcher = %orchestrator.launcher_kind(), health_timeout = ?config.orchestrator.health_timeout(), "orchestrator initialized");

    // ── Start API server ───────────────────────────────────────

    let router = worldgate_api::build_router(worldgate_api::ApiState {
        orchestrator: orchestrator.clone(),
        routes,
        store: store.clone(),
    });
    let addr = SocketAddr::from(([0, 0, 0, 0], config.server.port));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(%addr, "API server listening");

    // ── Restore previously active worlds ───────────────────────

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let restore_enabled = config.orchestrator.restore_active_worlds;
    let restore = {
        let orchestrator = orchestrator.clone();
        tokio::spawn(async move {
            restore_active_worlds(&orchestrator, &store, restore_enabled, shutdown_rx).await;
        })
    };

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // ── Teardown ───────────────────────────────────────────────

    // The restore pass finishes its current attach (bounded by the health
    // timeout) and skips the rest.
    let _ = shutdown_tx.send(true);
    if let Err(e) = restore.await {
        warn!(error = %e, "restore task failed");
    }
    orchestrator.shutdown_all().await;

    info!("worldgate daemon stopped");
    Ok(())
}

/// Resolves on Ctrl-C or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install CTRL+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    info!("shutdown signal received");
}
