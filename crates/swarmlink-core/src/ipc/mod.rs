//! The coordination facade tying dispatcher, registry, pending requests,
//! health aggregation, and launch sequencing together.
//!
//! One [`Ipc`] instance exists per process. The transport feeds it inbound
//! payloads through [`Ipc::handle_message`] and drains its outbox; the rest
//! of the process issues requests through [`Ipc::send_request`] and the
//! task poll loop in [`crate::poll`].

mod context;
mod dispatcher;
mod pending;
mod registry;

pub use context::ResponseContext;
pub use pending::{DEFAULT_FETCH_TIMEOUT, FetchOptions, PendingRequests, RequestHandle};
pub use registry::{CommandError, CommandRegistry, CommandResult};

use std::sync::Arc;

use serde_json::{Map, json};
use tokio::sync::mpsc;
use uuid::Uuid;

use swarmlink_types::config::IpcConfig;
use swarmlink_types::envelope::{Envelope, Scope};

use crate::health::{ShardHealthMap, ShardStatusSource};
use crate::launch::LaunchState;
use crate::outbox::{DEFAULT_OUTBOX_CAPACITY, Outbound, Outbox, SendError};

/// Identity of this coordination participant.
#[derive(Debug, Clone)]
pub struct IpcIdentity {
    /// Cluster id, or `-1` for the job server.
    pub cluster_id: i64,
    /// Name used in logs.
    pub cluster_name: String,
    /// Total known cluster count; the default responder expectation for
    /// broadcasts.
    pub cluster_count: usize,
}

impl IpcIdentity {
    pub fn from_config(config: &IpcConfig) -> Self {
        Self {
            cluster_id: config.cluster_id,
            cluster_name: config.cluster_name.clone(),
            cluster_count: config.cluster_count,
        }
    }
}

/// Channel names this process publishes and subscribes on.
///
/// The shared channel carries fleet-wide coordination; the per-process
/// channel (shared name with the cluster id appended) carries high-volume
/// cross-service traffic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelNames {
    pub shared: String,
    pub own: String,
}

impl ChannelNames {
    pub fn new(base: &str, cluster_id: i64) -> Self {
        Self {
            shared: base.to_string(),
            own: format!("{base}{cluster_id}"),
        }
    }

    pub fn from_config(config: &IpcConfig) -> Self {
        Self::new(&config.channel, config.cluster_id)
    }

    /// Both channels, for subscribing.
    pub fn all(&self) -> Vec<String> {
        vec![self.shared.clone(), self.own.clone()]
    }
}

/// Per-request send options.
#[derive(Debug, Clone, Default)]
pub struct SendOptions {
    /// Restrict delivery to these cluster ids.
    pub target_cluster: Option<Vec<i64>>,
    /// Publish on this channel instead of the scope default (shared for
    /// broadcasts, the per-process channel for `jobserver` calls).
    pub channel: Option<String>,
}

/// The per-process coordination component.
pub struct Ipc {
    identity: IpcIdentity,
    channels: ChannelNames,
    outbox: Outbox,
    pending: Arc<PendingRequests>,
    registry: CommandRegistry,
    health: ShardHealthMap,
    launch: LaunchState,
    shard_source: Arc<dyn ShardStatusSource>,
}

impl Ipc {
    /// Build the coordination component and the outbox receiver the
    /// transport must drain.
    pub fn new(
        identity: IpcIdentity,
        channels: ChannelNames,
        registry: CommandRegistry,
        shard_source: Arc<dyn ShardStatusSource>,
    ) -> (Self, mpsc::Receiver<Outbound>) {
        let (outbox, outbound_rx) = Outbox::channel(DEFAULT_OUTBOX_CAPACITY);
        let ipc = Self {
            identity,
            channels,
            outbox,
            pending: Arc::new(PendingRequests::new()),
            registry,
            health: ShardHealthMap::new(),
            launch: LaunchState::new(),
            shard_source,
        };
        (ipc, outbound_rx)
    }

    pub fn identity(&self) -> &IpcIdentity {
        &self.identity
    }

    pub fn outbox(&self) -> &Outbox {
        &self.outbox
    }

    pub fn pending(&self) -> &PendingRequests {
        &self.pending
    }

    pub fn registry(&self) -> &CommandRegistry {
        &self.registry
    }

    pub fn health(&self) -> &ShardHealthMap {
        &self.health
    }

    pub fn launch(&self) -> &LaunchState {
        &self.launch
    }

    pub fn shared_channel(&self) -> &str {
        &self.channels.shared
    }

    pub fn own_channel(&self) -> &str {
        &self.channels.own
    }

    pub(crate) fn shard_source(&self) -> &dyn ShardStatusSource {
        self.shard_source.as_ref()
    }

    /// Route one inbound payload from the subscription.
    pub async fn handle_message(&self, channel: &str, payload: &[u8]) {
        dispatcher::dispatch(self, channel, payload).await;
    }

    /// Issue a request and return the handle collecting its responses.
    ///
    /// Assigns a `command_id` if absent, strips any stray `respCluster`,
    /// applies `targetCluster` from the options, registers the handle
    /// *before* publishing (so a fast reply cannot be lost), then
    /// publishes. On a transport failure the handle is torn down first and
    /// the error propagated.
    pub async fn send_request(
        &self,
        mut envelope: Envelope,
        send: SendOptions,
        fetch: FetchOptions,
    ) -> Result<RequestHandle, SendError> {
        let command_id = envelope
            .command_id
            .get_or_insert_with(|| Uuid::now_v7().to_string())
            .clone();
        if let Some(data) = envelope.data.as_mut() {
            data.resp_cluster = None;
        }
        if let Some(targets) = send.target_cluster {
            envelope.data_mut().target_cluster = Some(targets);
        }

        let needed = fetch
            .num_clusters_needed
            .unwrap_or_else(|| match envelope.scope {
                Scope::Jobserver => 1,
                _ => self.identity.cluster_count,
            });
        let channel = send.channel.unwrap_or_else(|| match envelope.scope {
            Scope::Jobserver => self.channels.own.clone(),
            _ => self.channels.shared.clone(),
        });

        let handle = self.pending.register(
            command_id,
            envelope.scope.clone(),
            envelope.action.clone(),
            needed,
            fetch.timeout,
        );

        let payload = match serde_json::to_vec(&envelope) {
            Ok(payload) => payload,
            Err(err) => {
                handle.stop();
                return Err(err.into());
            }
        };
        if let Err(err) = self.outbox.publish(&channel, payload).await {
            handle.stop();
            return Err(err);
        }
        Ok(handle)
    }

    /// Fire-and-forget readiness signal so the supervisor can start the
    /// next cluster in sequence. No request handle is involved.
    pub async fn signal_ready(&self) -> Result<(), SendError> {
        let mut args = Map::new();
        args.insert("id".to_string(), json!(self.identity.cluster_id));
        let envelope = Envelope::new(Scope::Launcher, "launch_next").with_args(args);
        self.outbox
            .publish_envelope(&self.channels.shared, &envelope)
            .await
    }
}

impl std::fmt::Debug for Ipc {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Ipc")
            .field("cluster_id", &self.identity.cluster_id)
            .field("cluster_name", &self.identity.cluster_name)
            .field("pending_requests", &self.pending.len())
            .field("known_shards", &self.health.len())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
