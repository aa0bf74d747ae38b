//! Diagnostic probe and shard health wire types.
//!
//! The probe is a distinct message class, not a command envelope: the
//! supervisor publishes `{diag: true, id, nonce}` on the shared channel and
//! the addressed cluster answers with a `launcher/diag` envelope whose
//! `output` is the JSON-encoded [`DiagResponse`].

use serde::{Deserialize, Serialize};

/// A diagnostic probe addressed to one cluster.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiagProbe {
    /// Always `true`; distinguishes the probe from command envelopes.
    pub diag: bool,
    /// Cluster id the probe is addressed to.
    pub id: i64,
    /// Random nonce echoed back so the requester can match the response
    /// to this specific probe.
    pub nonce: String,
}

impl DiagProbe {
    pub fn new(id: i64, nonce: impl Into<String>) -> Self {
        Self {
            diag: true,
            id,
            nonce: nonce.into(),
        }
    }
}

/// Health of a single shard, produced by the cluster owning it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShardHealth {
    pub id: u64,
    pub up: bool,
    /// Gateway latency in milliseconds, if known.
    pub latency: f64,
    #[serde(rename = "guildCount")]
    pub guild_count: u64,
    #[serde(rename = "userCount")]
    pub user_count: u64,
}

/// Aggregated answer to a diagnostic probe: one entry per locally owned
/// shard, tagged with the probe's nonce.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiagResponse {
    #[serde(rename = "Nonce")]
    pub nonce: String,
    #[serde(rename = "Data")]
    pub data: Vec<ShardHealth>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn probe_wire_shape() {
        let probe = DiagProbe::new(7, "abc");
        assert_eq!(
            serde_json::to_value(&probe).unwrap(),
            json!({"diag": true, "id": 7, "nonce": "abc"})
        );
    }

    #[test]
    fn shard_health_uses_camel_case_counts() {
        let health = ShardHealth {
            id: 3,
            up: true,
            latency: 42.5,
            guild_count: 120,
            user_count: 4800,
        };
        let wire = serde_json::to_value(&health).unwrap();
        assert_eq!(
            wire,
            json!({"id": 3, "up": true, "latency": 42.5, "guildCount": 120, "userCount": 4800})
        );
    }

    #[test]
    fn diag_response_uses_capitalized_keys() {
        let resp = DiagResponse {
            nonce: "abc".to_string(),
            data: vec![],
        };
        let wire = serde_json::to_value(&resp).unwrap();
        assert_eq!(wire, json!({"Nonce": "abc", "Data": []}));
    }

    #[test]
    fn diag_response_roundtrip() {
        let resp = DiagResponse {
            nonce: "xyz".to_string(),
            data: vec![ShardHealth {
                id: 0,
                up: false,
                latency: 0.0,
                guild_count: 0,
                user_count: 0,
            }],
        };
        let wire = serde_json::to_string(&resp).unwrap();
        let back: DiagResponse = serde_json::from_str(&wire).unwrap();
        assert_eq!(back, resp);
    }
}
