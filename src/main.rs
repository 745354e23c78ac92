//! Upload gateway server binary.
//!
//! Accepts multipart uploads into a directory tree under a configured
//! root, serves stored files back by path and answers liveness checks.
//! The main entry point loads configuration, builds the Axum router and
//! serves it until a termination signal arrives.

mod app;
mod atomic;
mod background;
mod config;
mod error;
mod etag;
mod files;
mod health;
mod http;
mod locking;
mod logging;
mod resolver;
mod storage;
mod upload;

use axum_server::Handle;
use clap::Parser;
use shadow_rs::shadow;
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tracing::info;

use crate::background::spawn_background_tasks;
use crate::config::{Args, GatewayConfig};
use crate::locking::LockManager;
use crate::storage::Storage;

shadow!(build);

/// Starts the gateway and blocks until shutdown.
#[tokio::main]
async fn main() -> Result<(), std::io::Error> {
    dotenvy::dotenv().ok();
    logging::init_logging();

    let args = Args::parse();
    let config = Arc::new(GatewayConfig::from_args(&args));
    let storage = Arc::new(Storage::new(
        PathBuf::from(&args.upload_dir),
        args.staging_path(),
    ));
    storage.ensure_root().await?;
    let locks = Arc::new(LockManager::new());

    let app = app::build_router(storage.clone(), locks, config.clone());

    let host = args
        .host
        .parse::<IpAddr>()
        .map_err(|err| std::io::Error::new(std::io::ErrorKind::InvalidInput, err.to_string()))?;
    let addr = SocketAddr::new(host, args.port);
    let handle = Handle::new();

    info!(
        %addr,
        upload_dir = ?storage.root_path(),
        base_url = config.base_url,
        max_file_size = config.max_file_size,
        "🚀 upload service started"
    );

    spawn_background_tasks(storage, Duration::from_secs(args.staging_ttl_secs));
    let server = axum_server::bind(addr)
        .handle(handle.clone())
        .serve(app.into_make_service_with_connect_info::<SocketAddr>());

    tokio::select! {
        result = server => result?,
        _ = shutdown_signal(handle) => {}
    }

    Ok(())
}

async fn shutdown_signal(handle: Handle) {
    let ctrl_c = async {
        if let Err(err) = signal::ctrl_c().await {
            tracing::error!(error = %err, "failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(err) => {
                tracing::error!(error = %err, "failed to install SIGTERM handler");
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

    info!("Received termination signal shutting down");
    handle.graceful_shutdown(Some(Duration::from_secs(10)));
}
