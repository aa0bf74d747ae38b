//! Fleet-wide shard health aggregation.
//!
//! Each cluster answers diagnostic probes with the health of the shards it
//! owns; every process that sees the resulting `launcher/diag` envelopes
//! merges them into its own shard map. The map is last-write-wins per
//! shard id with no cross-probe ordering, so totals are a best-effort,
//! eventually-consistent snapshot -- never a synchronized point-in-time
//! view.

use std::collections::HashMap;

use dashmap::DashMap;

use swarmlink_types::diag::{DiagResponse, ShardHealth};

/// Supplies the health of the shards this process owns, for answering
/// diagnostic probes. Implemented by the embedding gateway client; the job
/// server uses [`NoShards`].
pub trait ShardStatusSource: Send + Sync {
    fn shard_health(&self) -> Vec<ShardHealth>;
}

/// A source for processes that own no shards.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoShards;

impl ShardStatusSource for NoShards {
    fn shard_health(&self) -> Vec<ShardHealth> {
        Vec::new()
    }
}

/// Totals reduced over the shard map.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FleetTotals {
    pub guilds: u64,
    pub users: u64,
    pub shards_up: usize,
    pub shards: usize,
}

/// Process-wide shard id -> health map.
#[derive(Debug, Default)]
pub struct ShardHealthMap {
    shards: DashMap<u64, ShardHealth>,
}

impl ShardHealthMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Merge one diagnostic response, overwriting per shard id.
    pub fn apply(&self, response: &DiagResponse) {
        for health in &response.data {
            self.shards.insert(health.id, health.clone());
        }
    }

    pub fn get(&self, shard_id: u64) -> Option<ShardHealth> {
        self.shards.get(&shard_id).map(|e| e.value().clone())
    }

    /// Copy of the current map.
    pub fn snapshot(&self) -> HashMap<u64, ShardHealth> {
        self.shards
            .iter()
            .map(|e| (*e.key(), e.value().clone()))
            .collect()
    }

    /// Reduce the map into fleet totals.
    pub fn totals(&self) -> FleetTotals {
        let mut totals = FleetTotals::default();
        for entry in self.shards.iter() {
            let health = entry.value();
            totals.shards += 1;
            totals.guilds += health.guild_count;
            totals.users += health.user_count;
            if health.up {
                totals.shards_up += 1;
            }
        }
        totals
    }

    pub fn len(&self) -> usize {
        self.shards.len()
    }

    pub fn is_empty(&self) -> bool {
        self.shards.is_empty()
    }
}
