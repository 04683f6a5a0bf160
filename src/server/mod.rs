// src/server/mod.rs

use crate::config::Config;
use crate::core::cluster::ConnectivityCluster;
use anyhow::Result;
use std::sync::Arc;
use tokio::signal;
use tracing::info;
use tracing_subscriber::{filter::EnvFilter, reload};

/// Brings the connectivity cluster up and runs it until an interrupt signal arrives.
pub async fn run(
    config: Config,
    _log_reload_handle: Arc<reload::Handle<EnvFilter, tracing_subscriber::Registry>>,
) -> Result<()> {
    let cluster = ConnectivityCluster::bind(&config.cluster).await?;
    info!("node {} ready at {}", cluster.my_id, cluster.local_addr());

    signal::ctrl_c().await?;
    info!(
        "shutdown signal received, closing {} peer connection(s)",
        cluster.get_peers_list().len().saturating_sub(1)
    );
    cluster.shutdown();

    Ok(())
}
