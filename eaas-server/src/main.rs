// SPDX-License-Identifier: MIT
//
// EaaS: Entropy as a Service
// Copyright (c) 2025 EaaS Contributors
//
// https://github.com/thesp1der/eaas

//! EaaS Server - serves random bytes from the local kernel entropy device

use anyhow::{Context, Result};
use clap::Parser;
use eaas_core::{config::ServerConfig, device::EntropyDevice, metrics::Metrics, shutdown};
use eaas_server::{router, serve, AppState};
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

#[derive(Parser, Debug)]
#[command(name = "eaas-server")]
#[command(about = "EaaS Server - Serves kernel entropy via REST API", long_about = None)]
struct Args {
    /// Path to configuration file (environment variables are used when omitted)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Parse arguments
    let args = Args::parse();

    // Initialize tracing
    let log_level = args.log_level.parse::<tracing::Level>()
        .unwrap_or(tracing::Level::INFO);

    tracing_subscriber::fmt()
        .with_max_level(log_level)
        .with_target(false)
        .with_thread_ids(true)
        .json()
        .init();

    info!("EaaS Server v{}", eaas_core::VERSION);

    // Load configuration
    let config = match &args.config {
        Some(path) => {
            info!("Loading configuration from file: {:?}", path);
            ServerConfig::from_file(path).context("Failed to load configuration from file")?
        }
        None => {
            info!("Loading configuration from environment variables");
            ServerConfig::from_env().context("Failed to load configuration from environment")?
        }
    };

    let addr = config.listen_address().context("Invalid listen address")?;
    info!("Entropy device: {}", config.device_path);
    info!("Connection timeout: {:?}", config.connection_timeout());

    let state = AppState::new(
        Arc::new(EntropyDevice::new(&config.device_path)),
        Metrics::new(),
        config.connection_timeout(),
    );
    let app = router(state);

    info!("Starting server on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;

    let shutdown_token = CancellationToken::new();
    let mut server_handle = tokio::spawn(serve(
        listener,
        app,
        config.connection_timeout(),
        shutdown_token.clone(),
    ));

    // Run until a signal arrives or the server stops on its own
    tokio::select! {
        result = shutdown::wait_for_signal() => {
            if let Err(e) = result {
                error!("Signal handling failed: {}", e);
            }
        }
        result = &mut server_handle => {
            return result.context("Server task failed");
        }
    }

    info!("Shutting down, draining in-flight requests");
    shutdown_token.cancel();

    match tokio::time::timeout(config.shutdown_grace(), &mut server_handle).await {
        Ok(Ok(())) => info!("Server shut down gracefully"),
        Ok(Err(e)) => error!("Server task failed: {}", e),
        Err(_) => {
            warn!("Grace period of {:?} elapsed, aborting", config.shutdown_grace());
            server_handle.abort();
        }
    }

    info!("Shutdown sequence complete");
    Ok(())
}
