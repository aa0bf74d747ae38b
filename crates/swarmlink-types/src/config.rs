//! Coordination-layer configuration.
//!
//! `IpcConfig` is the slice of the process config that the coordination
//! core and the Redis transport need. All fields have sensible defaults so
//! a single-cluster development setup works from an empty TOML file.

use serde::{Deserialize, Serialize};

/// Configuration for one coordination participant.
///
/// Clusters use their non-negative cluster id; the job server joins the
/// same channels with the conventional responder id `-1`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IpcConfig {
    /// Redis connection URL.
    #[serde(default = "default_redis_url")]
    pub redis_url: String,

    /// Name of the shared coordination channel. The per-process channel is
    /// this name with the cluster id appended.
    #[serde(default = "default_channel")]
    pub channel: String,

    /// This process's cluster id (`-1` for the job server).
    #[serde(default)]
    pub cluster_id: i64,

    /// Human-readable cluster name, used in logs only.
    #[serde(default = "default_cluster_name")]
    pub cluster_name: String,

    /// Total number of clusters in the fleet. Broadcast requests expect
    /// this many responders by default.
    #[serde(default = "default_cluster_count")]
    pub cluster_count: usize,

    /// Shard ids owned by this cluster.
    #[serde(default)]
    pub shard_ids: Vec<u64>,
}

fn default_redis_url() -> String {
    "redis://127.0.0.1:6379".to_string()
}

fn default_channel() -> String {
    "swarmlink".to_string()
}

fn default_cluster_name() -> String {
    "cluster-0".to_string()
}

fn default_cluster_count() -> usize {
    1
}

impl Default for IpcConfig {
    fn default() -> Self {
        Self {
            redis_url: default_redis_url(),
            channel: default_channel(),
            cluster_id: 0,
            cluster_name: default_cluster_name(),
            cluster_count: default_cluster_count(),
            shard_ids: Vec::new(),
        }
    }
}
