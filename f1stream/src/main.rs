//! Process entry point: load configuration, build the store and shared
//! state, spawn the scraper and health checker on timers, serve HTTP
//! with a graceful shutdown drain.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::Result;
use clap::Parser;
use tokio::sync::watch;
use tracing::{error, info};

use f1stream_api::{build_router, AppState};
use f1stream_core::{logging, Settings};
use f1stream_providers::Store;

/// The live-stream aggregator and embedding gateway.
#[derive(Parser, Debug)]
#[command(name = "f1stream", version, about)]
struct Args {
    /// Path to an optional TOML/YAML config file overlaid beneath the
    /// environment (environment always wins).
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Override LISTEN_ADDR.
    #[arg(long)]
    listen_addr: Option<String>,

    /// Override DATA_DIR.
    #[arg(long)]
    data_dir: Option<String>,
}

const DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

#[tokio::main]
async fn main() -> Result<()> {
    logging::init_logging()?;

    let args = Args::parse();
    let mut settings = Settings::load(args.config.as_deref())?;
    if let Some(listen_addr) = args.listen_addr {
        settings.listen_addr = listen_addr;
    }
    if let Some(data_dir) = args.data_dir {
        settings.data_dir = data_dir;
    }

    info!(listen_addr = %settings.listen_addr, data_dir = %settings.data_dir, "f1stream starting");

    let store = Store::new(&settings.data_dir)?;
    let state = AppState::new(settings, store)?;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let health_handle = {
        let checker = state.health_checker.clone();
        let rx = shutdown_rx.clone();
        tokio::spawn(async move { checker.run(rx).await })
    };

    let scraper_handle = {
        let scraper = state.scraper.clone();
        let rx = shutdown_rx.clone();
        tokio::spawn(async move { scraper.run(rx).await })
    };

    let listen_addr = state.settings.listen_addr.clone();
    let app = build_router(state);

    let listener = tokio::net::TcpListener::bind(&listen_addr).await?;
    info!(addr = %listen_addr, "listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("shutdown signal received, draining background tasks");
    let _ = shutdown_tx.send(true);

    let drain = async {
        let _ = health_handle.await;
        let _ = scraper_handle.await;
    };
    if tokio::time::timeout(DRAIN_TIMEOUT, drain).await.is_err() {
        error!("background tasks did not drain within {:?}, exiting anyway", DRAIN_TIMEOUT);
    }

    info!("f1stream stopped");
    Ok(())
}

/// Waits for SIGINT (Ctrl+C) or, on Unix, SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("failed to install Ctrl+C handler: {e}");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => error!("failed to install SIGTERM handler: {e}"),
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {}
        () = terminate => {}
    }
}
