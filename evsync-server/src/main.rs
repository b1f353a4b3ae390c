//! evsync server
//!
//! Receives signed Graph webhooks, keeps page events fresh, and republishes
//! them as normalized events.

mod api;
mod config;
mod server;
mod shutdown;
mod state;

use clap::Parser;
use config::{APP_SECRET_ENV, ConfigLoader};
use evsync_core::processors::LIMITER_PRUNE_INTERVAL;
use server::{build_router, run_server};
use shutdown::{shutdown_signal, spawn_config_reload_handler};
use state::AppState;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::watch;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

/// evsync - Graph API event aggregation service
#[derive(Parser, Debug)]
#[command(name = "evsync-server")]
#[command(version, about, long_about = None)]
struct Args {
    /// Path to the configuration file
    #[arg(short, long, default_value = "./evsync.toml")]
    config: PathBuf,

    /// Override the listen address (e.g., 0.0.0.0:3000)
    #[arg(short, long)]
    listen: Option<SocketAddr>,

    /// App secret used to verify webhook signatures
    #[arg(long, env = APP_SECRET_ENV, hide_env_values = true)]
    app_secret: Option<String>,

    /// Do not run the periodic page refresh
    #[arg(long, default_value = "false")]
    no_refresh: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    init_tracing();

    // Parse command line arguments
    let args = Args::parse();

    tracing::info!("Starting evsync-server v{}", env!("CARGO_PKG_VERSION"));

    // Load configuration
    let config_loader = Arc::new(ConfigLoader::new(
        &args.config,
        args.listen,
        args.app_secret.clone(),
    ));
    let loaded_config = config_loader.load().map_err(|e| {
        tracing::error!("Failed to load configuration: {}", e);
        e
    })?;

    let listen_addr = loaded_config.server.listen;
    tracing::info!(
        app_id = %loaded_config.app.app_id,
        pages = loaded_config.pages.len(),
        "Configuration loaded from {:?}",
        config_loader.path()
    );

    // Create application state
    let state = AppState::new(loaded_config).map_err(|e| {
        tracing::error!("Failed to create Graph client: {}", e);
        e
    })?;

    // Background loops stop through this channel once the server has drained.
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let maintenance_handle = tokio::spawn(
        state
            .webhooks
            .clone()
            .run_maintenance(LIMITER_PRUNE_INTERVAL, shutdown_rx.clone()),
    );
    let refresh_handle = if args.no_refresh {
        tracing::info!("Periodic refresh disabled");
        None
    } else {
        Some(tokio::spawn(state.refresher.clone().run(shutdown_rx)))
    };

    // Spawn config reload handler (listens for SIGHUP)
    let reload_notify = spawn_config_reload_handler(state.clone(), config_loader);

    // Build the router
    let router = build_router(state);

    // Run the server
    tracing::info!("Starting HTTP server on {}", listen_addr);
    let result = run_server(router, listen_addr, shutdown_signal()).await;

    // Stop background tasks
    reload_notify.notify_one();
    let _ = shutdown_tx.send(true);
    if let Some(handle) = refresh_handle {
        if let Err(e) = handle.await {
            tracing::error!("Refresh task failed: {}", e);
        }
    }
    if let Err(e) = maintenance_handle.await {
        tracing::error!("Limiter maintenance task failed: {}", e);
    }
    tracing::info!("Server shutdown complete");

    result.map_err(Into::into)
}

/// Initialize the tracing subscriber with environment-based filtering.
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,evsync_core=debug"));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}
