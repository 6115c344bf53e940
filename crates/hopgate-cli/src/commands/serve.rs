//! `hopgate serve` - run one relay hop until Ctrl-C.

use anyhow::{Context, Result};
use hopgate_core::{DownstreamConfig, RelayConfig, SelectionMode};
use hopgate_proxy::RelayServer;
use std::path::Path;

pub async fn run_serve(config_path: &Path, mode: Option<SelectionMode>) -> Result<()> {
    let config = RelayConfig::load(config_path)
        .with_context(|| format!("failed to load config from {}", config_path.display()))?;

    if mode.is_some() && matches!(config.downstream, DownstreamConfig::Forward(_)) {
        tracing::warn!("--mode only applies to router hops, ignoring it");
    }

    let server = RelayServer::from_config(&config, mode).context("failed to start relay hop")?;
    let listener = server.bind().await?;

    tracing::info!(
        hop = %config.name,
        listen_addr = %config.listen.bind_address(),
        "Starting hopgate hop"
    );

    server
        .serve_until(listener, async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "Failed to listen for shutdown signal");
                std::future::pending::<()>().await;
            }
            tracing::info!("Shutdown signal received");
        })
        .await?;

    Ok(())
}
