//! The command envelope exchanged over the coordination channel.
//!
//! The underlying pub/sub primitive offers unordered broadcast only, so all
//! correlation and addressing metadata rides inside the envelope itself:
//! `command_id` ties responses back to requests, and the reserved `data`
//! keys `targetCluster`/`respCluster` carry routing information distinct
//! from the business payload.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Top-level namespace of an envelope's action.
///
/// `bot` is for process-local command invocations and lifecycle flags,
/// `jobserver` for cross-service calls to the job-execution service, and
/// `launcher` for supervisor lifecycle signals and diagnostics. Unknown
/// scopes deserialize into `Other` so a newer peer does not break older
/// processes.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Scope {
    Bot,
    Jobserver,
    Launcher,
    #[serde(untagged)]
    Other(String),
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scope::Bot => f.write_str("bot"),
            Scope::Jobserver => f.write_str("jobserver"),
            Scope::Launcher => f.write_str("launcher"),
            Scope::Other(s) => f.write_str(s),
        }
    }
}

/// Routing metadata carried in an envelope's `data` field.
///
/// The two reserved keys are typed; everything else (e.g. the task-poll
/// request's `task`/`start_from` fields) flattens into `extra`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RoutingData {
    /// Restricts delivery to the listed cluster ids. Absent means broadcast.
    #[serde(
        rename = "targetCluster",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub target_cluster: Option<Vec<i64>>,

    /// Marks the envelope as a response and identifies the responder.
    /// Clusters use their cluster id; the job server responds with `-1`.
    #[serde(
        rename = "respCluster",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub resp_cluster: Option<i64>,

    /// Non-reserved payload keys.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// The structured message unit exchanged over the pub/sub channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    pub scope: Scope,
    pub action: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub args: Option<Map<String, Value>>,

    /// Correlates a request to its response(s); generated by the sender
    /// if absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command_id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<RoutingData>,
}

impl Envelope {
    /// Build a bare envelope with the given scope and action.
    pub fn new(scope: Scope, action: impl Into<String>) -> Self {
        Self {
            scope,
            action: action.into(),
            args: None,
            command_id: None,
            output: None,
            data: None,
        }
    }

    /// Builder-style args setter.
    pub fn with_args(mut self, args: Map<String, Value>) -> Self {
        self.args = Some(args);
        self
    }

    /// Builder-style output setter.
    pub fn with_output(mut self, output: Value) -> Self {
        self.output = Some(output);
        self
    }

    /// Routing data, created on first access.
    pub fn data_mut(&mut self) -> &mut RoutingData {
        self.data.get_or_insert_with(RoutingData::default)
    }

    /// Responder id, if this envelope is a response.
    pub fn resp_cluster(&self) -> Option<i64> {
        self.data.as_ref().and_then(|d| d.resp_cluster)
    }

    /// Whether this envelope is itself a response to an earlier request.
    pub fn is_response(&self) -> bool {
        self.resp_cluster().is_some()
    }

    /// Whether delivery to the given cluster is permitted.
    ///
    /// True when no `targetCluster` restriction is present, or when the
    /// restriction includes `cluster_id`.
    pub fn is_addressed_to(&self, cluster_id: i64) -> bool {
        match self.data.as_ref().and_then(|d| d.target_cluster.as_ref()) {
            Some(targets) => targets.contains(&cluster_id),
            None => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn scope_serializes_lowercase() {
        assert_eq!(serde_json::to_string(&Scope::Bot).unwrap(), "\"bot\"");
        assert_eq!(
            serde_json::to_string(&Scope::Jobserver).unwrap(),
            "\"jobserver\""
        );
        assert_eq!(
            serde_json::to_string(&Scope::Launcher).unwrap(),
            "\"launcher\""
        );
    }

    #[test]
    fn unknown_scope_roundtrips_through_other() {
        let scope: Scope = serde_json::from_str("\"metrics\"").unwrap();
        assert_eq!(scope, Scope::Other("metrics".to_string()));
        assert_eq!(serde_json::to_string(&scope).unwrap(), "\"metrics\"");
    }

    #[test]
    fn envelope_omits_empty_fields() {
        let env = Envelope::new(Scope::Launcher, "launch_next");
        let wire = serde_json::to_value(&env).unwrap();
        assert_eq!(wire, json!({"scope": "launcher", "action": "launch_next"}));
    }

    #[test]
    fn routing_data_uses_reserved_wire_keys() {
        let mut env = Envelope::new(Scope::Bot, "statuses");
        env.data_mut().target_cluster = Some(vec![0, 2]);
        env.data_mut().resp_cluster = Some(-1);
        env.data_mut()
            .extra
            .insert("start_from".to_string(), json!(3));

        let wire = serde_json::to_value(&env).unwrap();
        assert_eq!(wire["data"]["targetCluster"], json!([0, 2]));
        assert_eq!(wire["data"]["respCluster"], json!(-1));
        assert_eq!(wire["data"]["start_from"], json!(3));
    }

    #[test]
    fn extra_data_keys_survive_roundtrip() {
        let raw = json!({
            "scope": "jobserver",
            "action": "get_task",
            "command_id": "abc",
            "data": {"task": "{\"task_id\":\"t1\"}", "start_from": 5}
        });
        let env: Envelope = serde_json::from_value(raw.clone()).unwrap();
        assert_eq!(env.scope, Scope::Jobserver);
        assert_eq!(
            env.data.as_ref().unwrap().extra.get("start_from"),
            Some(&json!(5))
        );
        assert_eq!(serde_json::to_value(&env).unwrap(), raw);
    }

    #[test]
    fn addressing_defaults_to_broadcast() {
        let env = Envelope::new(Scope::Bot, "ping");
        assert!(env.is_addressed_to(0));
        assert!(env.is_addressed_to(7));
    }

    #[test]
    fn addressing_respects_target_cluster() {
        let mut env = Envelope::new(Scope::Bot, "ping");
        env.data_mut().target_cluster = Some(vec![1, 3]);
        assert!(env.is_addressed_to(1));
        assert!(env.is_addressed_to(3));
        assert!(!env.is_addressed_to(2));
    }

    #[test]
    fn response_detection() {
        let mut env = Envelope::new(Scope::Bot, "statuses");
        assert!(!env.is_response());
        env.data_mut().resp_cluster = Some(4);
        assert!(env.is_response());
        assert_eq!(env.resp_cluster(), Some(4));
    }
}
