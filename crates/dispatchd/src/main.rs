//! dispatchd — the DispatchGrid daemon.
//!
//! Single binary that assembles the gateway:
//! - Configuration (environment, optional `.env`)
//! - State store (redb)
//! - Script registry (local store or the platform API)
//! - Script dispatcher
//! - Cache sweeper
//! - Gateway router
//!
//! # Usage
//!
//! ```text
//! dispatchd serve --port 8787 --data-dir /var/lib/dispatchgrid --registry remote
//! ```

mod sweeper;

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::{Parser, Subcommand, ValueEnum};
use dispatch_core::GatewayConfig;
use dispatchgrid_api::{GatewayState, HttpDispatcher, ScriptDispatcher, build_router};
use dispatchgrid_registry::{HttpProvisioning, LocalProvisioning, ProvisioningApi};
use dispatchgrid_state::StateStore;
use tokio::sync::watch;
use tracing::{error, info, warn};

use crate::sweeper::CacheSweeper;

#[derive(Parser)]
#[command(name = "dispatchd", about = "DispatchGrid daemon")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Serve the gateway.
    Serve {
        /// Port to listen on.
        #[arg(long, env = "PORT", default_value = "8787")]
        port: u16,

        /// Data directory for persistent state.
        #[arg(long, env = "DISPATCHGRID_DATA_DIR", default_value = "/var/lib/dispatchgrid")]
        data_dir: PathBuf,

        /// Where namespaces and scripts are provisioned.
        #[arg(long, value_enum, default_value = "remote")]
        registry: RegistryBackend,

        /// Expired cache purge interval in seconds.
        #[arg(long, default_value = "300")]
        sweep_interval: u64,
    },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum RegistryBackend {
    /// Keep the registry in the local state store.
    Local,
    /// Provision through the platform's REST API.
    Remote,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,dispatchd=debug,dispatchgrid=debug".into()),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Command::Serve {
            port,
            data_dir,
            registry,
            sweep_interval,
        } => serve(port, data_dir, registry, sweep_interval).await,
    }
}

async fn serve(
    port: u16,
    data_dir: PathBuf,
    registry: RegistryBackend,
    sweep_interval: u64,
) -> anyhow::Result<()> {
    let config = GatewayConfig::from_env().context("invalid gateway configuration")?;
    info!(
        namespace = %config.namespace,
        read_only = config.access.is_read_only(),
        ?registry,
        "DispatchGrid daemon starting"
    );

    // ── Initialize subsystems ──────────────────────────────────

    std::fs::create_dir_all(&data_dir)
        .with_context(|| format!("cannot create data dir {}", data_dir.display()))?;
    let db_path = data_dir.join("dispatchgrid.redb");
    let store = StateStore::open(&db_path)?;
    info!(path = ?db_path, "state store opened");

    let provider: Arc<dyn ProvisioningApi> = match registry {
        RegistryBackend::Local => {
            Arc::new(LocalProvisioning::new(store.clone(), config.account_id.clone()))
        }
        RegistryBackend::Remote => Arc::new(HttpProvisioning::new(
            config.provisioning_url.clone(),
            config.account_id.clone(),
            config.api_token.clone(),
            config.upstream_timeout,
        )?),
    };

    let dispatcher: Option<Arc<dyn ScriptDispatcher>> = match &config.dispatch_url {
        Some(url) => {
            info!(%url, "script dispatch enabled");
            Some(Arc::new(HttpDispatcher::new(url.clone(), config.upstream_timeout)))
        }
        None => {
            warn!("DISPATCH_URL not set; script routes will answer 404");
            None
        }
    };

    let sweeper = CacheSweeper::new(store.cache(), Duration::from_secs(sweep_interval));

    // ── Shutdown signal ────────────────────────────────────────

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let sweeper_handle = tokio::spawn(async move {
        sweeper.run(shutdown_rx).await;
    });

    // ── Start gateway ──────────────────────────────────────────

    let router = build_router(GatewayState::new(config, store, provider, dispatcher));
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(%addr, "gateway listening");

    axum::serve(listener, router)
        .with_graceful_shutdown(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!(error = %e, "failed to listen for shutdown signal");
            }
            info!("shutdown signal received");
            let _ = shutdown_tx.send(true);
        })
        .await?;

    let _ = sweeper_handle.await;

    info!("DispatchGrid daemon stopped");
    Ok(())
}
