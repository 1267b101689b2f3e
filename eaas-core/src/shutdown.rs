//! Process shutdown signal handling

use crate::{Error, Result};
use tracing::info;

/// Wait for a shutdown signal (SIGINT or SIGTERM, Ctrl+C on Windows)
pub async fn wait_for_signal() -> Result<()> {
    #[cfg(unix)]
    {
        use futures::stream::StreamExt;
        use signal_hook::consts::signal::*;
        use signal_hook_tokio::Signals;

        let mut signals = Signals::new([SIGINT, SIGTERM])
            .map_err(|e| Error::Internal(format!("Failed to register signal handlers: {}", e)))?;

        if let Some(signal) = signals.next().await {
            info!("Received signal: {:?}", signal);
        }
    }

    #[cfg(windows)]
    {
        tokio::signal::ctrl_c()
            .await
            .map_err(|e| Error::Internal(format!("Failed to listen for Ctrl+C: {}", e)))?;
        info!("Received Ctrl+C signal");
    }

    Ok(())
}
