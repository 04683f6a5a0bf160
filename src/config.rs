// src/config.rs

//! Manages server configuration: loading, resolving dynamic values, and validation.

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};
use std::fs;

/// Configuration for the connectivity cluster: bind address, the three handshake
/// compatibility strings, and any canonical addresses peers should advertise on our behalf.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct ClusterConfig {
    #[serde(default = "default_host")]
    pub host: String,
    /// `0` asks the OS for an ephemeral port; the actually-bound port is resolved at startup.
    #[serde(default)]
    pub port: u16,
    #[serde(default = "default_cluster_version")]
    pub cluster_version: String,
    #[serde(default = "default_cluster_arch")]
    pub cluster_arch_bitsize: String,
    #[serde(default = "default_cluster_build_mode")]
    pub cluster_build_mode: String,
    /// Addresses this node should advertise to peers instead of its locally-bound address,
    /// e.g. when sitting behind a NAT or load balancer. Empty means "advertise what we bound".
    #[serde(default)]
    pub canonical_addresses: Vec<String>,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}
fn default_cluster_version() -> String {
    env!("CARGO_PKG_VERSION").to_string()
}
fn default_cluster_arch() -> String {
    if cfg!(target_pointer_width = "64") {
        "64bit".to_string()
    } else {
        "32bit".to_string()
    }
}
fn default_cluster_build_mode() -> String {
    if cfg!(debug_assertions) {
        "debug".to_string()
    } else {
        "release".to_string()
    }
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: 0,
            cluster_version: default_cluster_version(),
            cluster_arch_bitsize: default_cluster_arch(),
            cluster_build_mode: default_cluster_build_mode(),
            canonical_addresses: Vec::new(),
        }
    }
}

/// Configuration for the write-back cache backing every B-tree slice.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct CacheConfig {
    /// How often the flush task sweeps dirty blocks back to the serializer.
    #[serde(default = "default_flush_interval_ms")]
    pub flush_interval_ms: u64,
    /// Once this many dirty blocks accumulate, the cache flushes immediately rather
    /// than waiting for the next tick. `0` disables the watermark (flush on tick only).
    #[serde(default = "default_dirty_block_high_watermark")]
    pub dirty_block_high_watermark: usize,
}

fn default_flush_interval_ms() -> u64 {
    50
}
fn default_dirty_block_high_watermark() -> usize {
    1000
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            flush_interval_ms: default_flush_interval_ms(),
            dirty_block_high_watermark: default_dirty_block_high_watermark(),
        }
    }
}

/// A raw representation of the config file before defaults are layered in.
#[derive(Deserialize, Default)]
struct RawConfig {
    #[serde(default = "default_log_level")]
    log_level: String,
    #[serde(default)]
    cluster: ClusterConfig,
    #[serde(default)]
    cache: CacheConfig,
}

fn default_log_level() -> String {
    "info".to_string()
}

/// The final, validated server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub log_level: String,
    pub cluster: ClusterConfig,
    pub cache: CacheConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            cluster: ClusterConfig::default(),
            cache: CacheConfig::default(),
        }
    }
}

impl Config {
    /// Creates a new `Config` by reading and parsing a TOML file.
    pub fn from_file(path: &str) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file at '{path}'"))?;
        let raw: RawConfig = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse TOML from '{path}'"))?;

        let config = Config {
            log_level: raw.log_level,
            cluster: raw.cluster,
            cache: raw.cache,
        };
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.cluster.host.trim().is_empty() {
            return Err(anyhow!("cluster.host cannot be empty"));
        }
        if self.cache.flush_interval_ms == 0 {
            return Err(anyhow!("cache.flush_interval_ms cannot be 0"));
        }
        Ok(())
    }
}
