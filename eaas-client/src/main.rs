// SPDX-License-Identifier: MIT
//
// EaaS: Entropy as a Service
// Copyright (c) 2025 EaaS Contributors
//
// https://github.com/thesp1der/eaas

//! EaaS Client - keeps the local kernel entropy pool filled
//!
//! The client polls the kernel pool level and, when it falls below the
//! configured minimum, pulls entropy from a remote EaaS server and injects it.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────┐   GET /entropy   ┌──────────────┐   RNDADDENTROPY  ┌──────────────┐
//! │  EaaS Server │ <────────────────│    Client    │ ────────────────>│    Kernel    │
//! │   (remote)   │ ────────────────>│  (monitor)   │ <────────────────│     pool     │
//! └──────────────┘   base64 bytes   └──────────────┘   RNDGETENTCNT   └──────────────┘
//! ```
//!
//! Injecting entropy requires `CAP_SYS_ADMIN`.

use anyhow::{Context, Result};
use clap::Parser;
use eaas_core::{
    config::ClientConfig,
    device::EntropyDevice,
    fetcher::{EntropyFetcher, FetcherConfig},
    metrics::Metrics,
    monitor::EntropyMonitor,
    shutdown,
};
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

#[derive(Parser, Debug)]
#[command(name = "eaas-client")]
#[command(about = "EaaS Client - Replenishes kernel entropy from a remote peer", long_about = None)]
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
    // Parse command-line arguments
    let args = Args::parse();

    // Initialize tracing
    let log_level = args
        .log_level
        .parse::<tracing::Level>()
        .unwrap_or(tracing::Level::INFO);

    tracing_subscriber::fmt()
        .with_max_level(log_level)
        .with_target(false)
        .with_thread_ids(true)
        .json()
        .init();

    info!("EaaS Client v{}", eaas_core::VERSION);

    // Load configuration
    let config = match &args.config {
        Some(path) => {
            info!("Loading configuration from file: {:?}", path);
            ClientConfig::from_file(path).context("Failed to load configuration from file")?
        }
        None => {
            info!("Loading configuration from environment variables");
            ClientConfig::from_env().context("Failed to load configuration from environment")?
        }
    };

    let peer_url = config.peer_url().context("Invalid peer URL")?;
    info!("Entropy is fetched from: {}", peer_url);
    info!("Entropy device: {}", config.device_path);
    info!("Minimum entropy: {} bits", config.minimum_entropy_bits);
    info!("Poll interval: {:?}", config.poll_interval());

    let fetcher = EntropyFetcher::new(
        FetcherConfig::new(peer_url).with_timeout(config.request_timeout()),
    )
    .context("Failed to initialize fetcher")?;

    let metrics = Metrics::new();
    let monitor = EntropyMonitor::new(
        EntropyDevice::new(&config.device_path),
        fetcher,
        config.minimum_entropy_bits,
        config.poll_interval(),
        metrics.clone(),
    );

    let shutdown_token = CancellationToken::new();
    let mut monitor_handle = {
        let token = shutdown_token.clone();
        tokio::spawn(async move { monitor.run(token).await })
    };

    // Run until a signal arrives or the monitor stops on its own
    tokio::select! {
        result = shutdown::wait_for_signal() => {
            if let Err(e) = result {
                error!("Signal handling failed: {}", e);
            }
        }
        result = &mut monitor_handle => {
            result.context("Entropy monitor task failed")?;
            return Ok(());
        }
    }

    info!("Shutting down entropy client");
    shutdown_token.cancel();

    if let Err(e) = monitor_handle.await {
        error!("Entropy monitor task failed: {}", e);
    }

    info!(
        "Cycles: {}, injections: {}, bits injected: {}, fetch failures: {}, device failures: {}, exhausted cycles: {}",
        metrics.cycles_total(),
        metrics.injections_total(),
        metrics.bits_injected(),
        metrics.fetch_failures(),
        metrics.device_failures(),
        metrics.cycles_exhausted()
    );
    info!("Shutdown sequence complete");
    Ok(())
}
