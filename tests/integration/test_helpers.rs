// tests/integration/test_helpers.rs

//! Shared setup for connectivity integration tests: every cluster in this suite binds to
//! an OS-assigned ephemeral port on loopback so tests never collide over a fixed port.

use latticedb::config::ClusterConfig;
use latticedb::core::cluster::ConnectivityCluster;
use std::sync::Arc;

pub fn ephemeral_config() -> ClusterConfig {
    ClusterConfig {
        host: "127.0.0.1".to_string(),
        port: 0,
        cluster_version: "1.0".to_string(),
        cluster_arch_bitsize: "64bit".to_string(),
        cluster_build_mode: "debug".to_string(),
        canonical_addresses: Vec::new(),
    }
}

pub async fn bind_node() -> Arc<ConnectivityCluster> {
    ConnectivityCluster::bind(&ephemeral_config())
        .await
        .expect("bind should succeed on an ephemeral loopback port")
}
