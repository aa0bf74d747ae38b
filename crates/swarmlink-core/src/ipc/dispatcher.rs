//! Inbound message demultiplexer.
//!
//! Every payload read off the subscription lands here and is routed to one
//! of: diagnostic probe handling, acknowledgement/unknown logging, the
//! pending-request registry (responses), or command/lifecycle invocation.
//! Malformed payloads and handler failures are logged and never abort the
//! receive loop.

use serde_json::{Value, json};
use tracing::{debug, error, info, warn};

use swarmlink_types::diag::{DiagProbe, DiagResponse};
use swarmlink_types::envelope::{Envelope, Scope};

use super::context::ResponseContext;
use super::Ipc;

/// Built-in lifecycle actions handled before the command registry.
const ACTION_ALL_CLUSTERS_LAUNCHED: &str = "all_clusters_launched";
const ACTION_DIAG: &str = "diag";

/// Classification of one inbound payload.
enum Inbound {
    /// `{diag: true, id, nonce}` -- a diagnostic probe.
    Probe(DiagProbe),
    /// A command envelope with a non-empty action.
    Envelope(Box<Envelope>),
    /// JSON object without an action: acknowledgement or unknown.
    Bare(Value),
}

fn classify(payload: &[u8]) -> Result<Inbound, serde_json::Error> {
    let value: Value = serde_json::from_slice(payload)?;
    if value.get("diag").and_then(Value::as_bool) == Some(true) {
        return serde_json::from_value(value).map(Inbound::Probe);
    }
    match value.get("action").and_then(Value::as_str) {
        Some(action) if !action.is_empty() => serde_json::from_value(value)
            .map(|env| Inbound::Envelope(Box::new(env))),
        _ => Ok(Inbound::Bare(value)),
    }
}

pub(super) async fn dispatch(ipc: &Ipc, channel: &str, payload: &[u8]) {
    let inbound = match classify(payload) {
        Ok(inbound) => inbound,
        Err(err) => {
            warn!(%err, %channel, "dropping malformed payload");
            return;
        }
    };

    match inbound {
        Inbound::Probe(probe) => handle_probe(ipc, probe).await,
        Inbound::Bare(value) => handle_bare(value),
        Inbound::Envelope(envelope) => {
            let envelope = *envelope;
            // Targeted delivery: silently drop anything addressed away
            // from this process.
            if !envelope.is_addressed_to(ipc.identity().cluster_id) {
                return;
            }
            if envelope.is_response() {
                if !ipc.pending().feed(envelope) {
                    debug!("response without a pending handle dropped");
                }
                return;
            }
            handle_invocation(ipc, channel, envelope).await;
        }
    }
}

/// Acknowledgements carry a `command_id`/`output` pair and an empty
/// action; anything else without an action is unimplemented.
fn handle_bare(value: Value) {
    let is_ack = value.get("command_id").is_some() && value.get("output").is_some();
    if is_ack {
        debug!(
            command_id = value.get("command_id").and_then(serde_json::Value::as_str),
            "supervisor acknowledgement"
        );
    } else {
        warn!(payload = %value, "unimplemented payload without action");
    }
}

async fn handle_probe(ipc: &Ipc, probe: DiagProbe) {
    if probe.id != ipc.identity().cluster_id {
        return;
    }
    let response = DiagResponse {
        nonce: probe.nonce,
        data: ipc.shard_source().shard_health(),
    };
    let output = match serde_json::to_string(&response) {
        Ok(output) => output,
        Err(err) => {
            error!(%err, "failed to encode diagnostic response");
            return;
        }
    };
    let envelope =
        Envelope::new(Scope::Launcher, ACTION_DIAG).with_output(Value::String(output));
    if let Err(err) = ipc
        .outbox()
        .publish_envelope(ipc.shared_channel(), &envelope)
        .await
    {
        error!(%err, "failed to publish diagnostic response");
    }
}

async fn handle_invocation(ipc: &Ipc, channel: &str, envelope: Envelope) {
    match (&envelope.scope, envelope.action.as_str()) {
        (Scope::Bot, ACTION_ALL_CLUSTERS_LAUNCHED) => {
            info!("supervisor reports all clusters launched");
            ipc.launch().mark_all_launched();
        }
        (Scope::Launcher, ACTION_DIAG) => merge_diag_response(ipc, &envelope),
        (Scope::Launcher, action) => {
            debug!(action, "launcher signal not handled by this process");
        }
        (scope, action) => {
            let Some(handler) = ipc.registry().get(scope, action) else {
                // Cross-service requests echo back on our own channel, so
                // an unknown action here is routine, not alarming.
                debug!(%scope, action, "no handler registered, dropping");
                return;
            };
            invoke_handler(ipc, channel, envelope, handler).await;
        }
    }
}

/// Requester-side half of the health cycle: `launcher/diag` envelopes are
/// merged into the process-wide shard map.
fn merge_diag_response(ipc: &Ipc, envelope: &Envelope) {
    let Some(Value::String(raw)) = &envelope.output else {
        warn!("diagnostic response output is not a string");
        return;
    };
    match serde_json::from_str::<DiagResponse>(raw) {
        Ok(response) => ipc.health().apply(&response),
        Err(err) => warn!(%err, "could not decode diagnostic response"),
    }
}

async fn invoke_handler(
    ipc: &Ipc,
    channel: &str,
    envelope: Envelope,
    handler: super::registry::HandlerRef,
) {
    let ctx = ResponseContext::new(
        ipc.outbox().clone(),
        ipc.identity().cluster_id,
        channel,
        &envelope,
    );
    let scope = envelope.scope.clone();
    let action = envelope.action.clone();
    let has_command_id = envelope.command_id.is_some();

    match handler(envelope, ctx.clone()).await {
        Ok(Some(output)) => {
            if let Err(err) = ctx.respond(output).await {
                error!(%scope, action, %err, "failed to publish command response");
            }
        }
        Ok(None) => {}
        Err(err) => {
            error!(%scope, action, %err, "command handler failed");
            if has_command_id {
                if let Err(send_err) = ctx.respond(json!({"error": err.to_string()})).await {
                    error!(%scope, action, %send_err, "failed to publish error response");
                }
            }
        }
    }
}
