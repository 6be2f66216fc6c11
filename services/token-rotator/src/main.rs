//! Token Rotator
//!
//! Long-running service that:
//! 1. Opens the region state store, seeding missing regions
//! 2. Bootstraps empty live pools on the first tick
//! 3. Refreshes and promotes each region's tokens on a fixed interval
//! 4. Optionally serves health, metrics and success reports on an admin port

mod admin;
mod config;
mod metrics;

use std::sync::Arc;

use anyhow::{Context, Result};
use issuer::CredentialSource;
use token_pool::{Fetcher, FileStore, Rotator};
use tokio::net::TcpListener;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::admin::{AdminState, build_admin_router};
use crate::config::Config;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing with JSON output and LOG_LEVEL / RUST_LOG support
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_env("LOG_LEVEL")
                .or_else(|_| EnvFilter::try_from_default_env())
                .unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with(tracing_subscriber::fmt::layer().json())
        .init();

    info!("starting token-rotator");

    // Install Prometheus metrics recorder before any metrics are emitted
    let prometheus_handle =
        metrics::install_recorder().context("failed to install Prometheus recorder")?;

    // CLI: simple --config flag parsing
    let args: Vec<String> = std::env::args().collect();
    let cli_config_path = args
        .iter()
        .position(|a| a == "--config")
        .and_then(|i| args.get(i + 1))
        .map(|s| s.as_str());

    let config_path = Config::resolve_path(cli_config_path);
    info!(path = %config_path.display(), "loading configuration");

    let config = Config::load(&config_path)
        .with_context(|| format!("failed to load config from {}", config_path.display()))?;

    info!(
        data_dir = %config.store.data_dir.display(),
        credentials_dir = %config.credentials.dir.display(),
        endpoints = config.issuer.endpoints.len(),
        regions = ?config.refresh.regions,
        batch_size = config.refresh.batch_size,
        tick_interval_secs = config.refresh.tick_interval_secs,
        "configuration loaded"
    );

    // Store failures at startup are fatal
    let store = FileStore::open(&config.store.data_dir, &config.refresh.regions)
        .await
        .with_context(|| {
            format!(
                "failed to open state store at {}",
                config.store.data_dir.display()
            )
        })?;
    let store = Arc::new(store);

    let client = reqwest::Client::builder()
        .timeout(config.request_timeout())
        .build()
        .context("failed to build HTTP client")?;

    let fetcher = Fetcher::new(
        client,
        config.issuer.endpoints.clone(),
        config.refresh.batch_size,
        config.issuer.max_concurrency,
        config.request_timeout(),
    );

    let rotator = Arc::new(Rotator::new(
        store.clone(),
        CredentialSource::new(&config.credentials.dir),
        fetcher,
        config.refresh_policy(),
    ));
    info!(owner = rotator.owner(), "rotator ready");

    let scheduler = token_pool::spawn_scheduler(
        rotator,
        config.refresh.regions.clone(),
        config.tick_interval(),
    );

    let admin_server = match config.admin.listen_addr {
        Some(addr) => {
            let app = build_admin_router(AdminState::new(
                store,
                config.refresh.regions.clone(),
                prometheus_handle,
            ));
            let listener = TcpListener::bind(addr)
                .await
                .with_context(|| format!("failed to bind admin listener to {addr}"))?;
            info!(%addr, "admin listener started");
            Some(tokio::spawn(async move {
                if let Err(e) = axum::serve(listener, app).await {
                    error!(error = %e, "admin server error");
                }
            }))
        }
        None => None,
    };

    shutdown_signal().await;

    scheduler.abort();
    if let Some(handle) = admin_server {
        handle.abort();
    }

    info!("shutdown complete");
    Ok(())
}

/// Wait for SIGTERM or SIGINT for graceful shutdown.
///
/// A handler that fails to install never fires; the other one still does.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("received SIGINT, shutting down"),
        _ = terminate => info!("received SIGTERM, shutting down"),
    }
}
