//! Response-capable context handed to command handlers.

use serde_json::{Value, json};

use swarmlink_types::envelope::{Envelope, Scope};

use crate::outbox::{Outbox, SendError};

/// Lets a handler answer the request it was invoked for.
///
/// `respond` copies the `command_id` and `targetCluster` of the originating
/// request into the reply, stamps `respCluster` with this process's
/// responder id, and publishes on the channel the request arrived on.
#[derive(Debug, Clone)]
pub struct ResponseContext {
    outbox: Outbox,
    responder_id: i64,
    reply_channel: String,
    scope: Scope,
    action: String,
    command_id: Option<String>,
    target_cluster: Option<Vec<i64>>,
}

impl ResponseContext {
    pub(crate) fn new(
        outbox: Outbox,
        responder_id: i64,
        reply_channel: &str,
        request: &Envelope,
    ) -> Self {
        Self {
            outbox,
            responder_id,
            reply_channel: reply_channel.to_string(),
            scope: request.scope.clone(),
            action: request.action.clone(),
            command_id: request.command_id.clone(),
            target_cluster: request
                .data
                .as_ref()
                .and_then(|d| d.target_cluster.clone()),
        }
    }

    /// Correlation id of the originating request, if any.
    pub fn command_id(&self) -> Option<&str> {
        self.command_id.as_deref()
    }

    /// Publish a response carrying the given output.
    pub async fn respond(&self, output: Value) -> Result<(), SendError> {
        let mut reply = Envelope::new(self.scope.clone(), &self.action);
        reply.command_id = self.command_id.clone();
        reply.output = Some(output);
        let data = reply.data_mut();
        data.resp_cluster = Some(self.responder_id);
        data.target_cluster = self.target_cluster.clone();
        self.outbox
            .publish_envelope(&self.reply_channel, &reply)
            .await
    }

    /// Publish an error response in the conventional `{"error": ...}` shape.
    pub async fn respond_error(&self, message: impl AsRef<str>) -> Result<(), SendError> {
        self.respond(json!({"error": message.as_ref()})).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn request() -> Envelope {
        let mut env = Envelope::new(Scope::Bot, "statuses");
        env.command_id = Some("cmd-9".to_string());
        env.data_mut().target_cluster = Some(vec![0, 1]);
        env
    }

    #[tokio::test]
    async fn respond_copies_correlation_and_targets() {
        let (outbox, mut rx) = Outbox::channel(8);
        let ctx = ResponseContext::new(outbox, 4, "chan", &request());

        ctx.respond(json!({"ok": true})).await.unwrap();

        let out = rx.recv().await.unwrap();
        assert_eq!(out.channel, "chan");
        let reply: Envelope = serde_json::from_slice(&out.payload).unwrap();
        assert_eq!(reply.scope, Scope::Bot);
        assert_eq!(reply.action, "statuses");
        assert_eq!(reply.command_id.as_deref(), Some("cmd-9"));
        assert_eq!(reply.resp_cluster(), Some(4));
        assert_eq!(
            reply.data.as_ref().unwrap().target_cluster,
            Some(vec![0, 1])
        );
        assert_eq!(reply.output, Some(json!({"ok": true})));
    }

    #[tokio::test]
    async fn respond_error_uses_error_shape() {
        let (outbox, mut rx) = Outbox::channel(8);
        let ctx = ResponseContext::new(outbox, -1, "chan", &request());

        ctx.respond_error("task not found").await.unwrap();

        let out = rx.recv().await.unwrap();
        let reply: Envelope = serde_json::from_slice(&out.payload).unwrap();
        assert_eq!(reply.output, Some(json!({"error": "task not found"})));
        assert_eq!(reply.resp_cluster(), Some(-1));
    }
}
