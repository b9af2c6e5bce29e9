//! # Storefront Worker
//!
//! Runs the restock worker against the configured database until Ctrl+C
//! or SIGTERM.
//!
//! ## Usage
//! ```bash
//! storefront-worker [--config path/to/storefront.toml]
//! ```
//!
//! ## Log Levels
//! - `RUST_LOG=debug` - Show debug messages
//! - Default: `info,storefront=debug,sqlx=warn`

use std::path::PathBuf;

use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use storefront_orders::{Storefront, StorefrontConfig};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing();

    let config_path = parse_args()?;
    let config = StorefrontConfig::load(config_path)?;
    info!(
        db = %config.database.path.display(),
        poll_secs = config.worker.poll_interval_secs,
        restock_delay_secs = config.returns.restock_delay_secs,
        "Configuration loaded"
    );

    let store = Storefront::open(config).await?;
    info!("Database ready");

    let (worker, handle) = store.restock_worker();
    let join = tokio::spawn(worker.run());

    shutdown_signal().await;

    if let Err(e) = handle.shutdown().await {
        error!(?e, "Worker already stopped");
    }
    join.await?;

    store.db().close().await;
    info!("Worker shutdown complete");
    Ok(())
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,storefront=debug,sqlx=warn"));

    tracing_subscriber::fmt().with_env_filter(filter).init();
}

fn parse_args() -> Result<Option<PathBuf>, String> {
    let mut args = std::env::args().skip(1);
    let mut config_path = None;

    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--config" | "-c" => {
                let value = args.next().ok_or("--config needs a path")?;
                config_path = Some(PathBuf::from(value));
            }
            "--help" | "-h" => {
                println!("Usage: storefront-worker [--config <path>]");
                std::process::exit(0);
            }
            other => return Err(format!("Unknown argument: {other}")),
        }
    }

    Ok(config_path)
}

/// Resolves on Ctrl+C or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(?e, "Failed to listen for Ctrl+C");
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
                error!(?e, "Failed to install SIGTERM handler");
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

    info!("Shutdown signal received, stopping worker...");
}
