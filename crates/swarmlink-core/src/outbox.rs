//! Outbound message queue decoupling the core from the publish connection.
//!
//! Every publish in the coordination layer -- requests, responses, lifecycle
//! signals -- is pushed onto a bounded `mpsc` channel. The transport drains
//! the receiver on a connection dedicated to publishing, so handlers running
//! inside the receive loop can emit messages without ever waiting on the
//! loop that must also deliver their replies.

use thiserror::Error;
use tokio::sync::mpsc;

use swarmlink_types::envelope::Envelope;

/// Default outbox capacity. Publishing applies backpressure once this many
/// messages are queued.
pub const DEFAULT_OUTBOX_CAPACITY: usize = 256;

/// One message awaiting publication.
#[derive(Debug, Clone, PartialEq)]
pub struct Outbound {
    /// Concrete channel name to publish on.
    pub channel: String,
    /// Serialized payload.
    pub payload: Vec<u8>,
}

/// Errors surfaced by the publish path.
#[derive(Debug, Error)]
pub enum SendError {
    /// The transport side dropped the outbox receiver (connection torn
    /// down or never started).
    #[error("transport unavailable: outbox closed")]
    Closed,

    #[error("serialization error: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Cloneable sending half of the outbound queue.
#[derive(Debug, Clone)]
pub struct Outbox {
    tx: mpsc::Sender<Outbound>,
}

impl Outbox {
    /// Create an outbox and the receiver the transport drains.
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<Outbound>) {
        let (tx, rx) = mpsc::channel(capacity);
        (Self { tx }, rx)
    }

    /// Queue a raw payload for publication.
    pub async fn publish(&self, channel: &str, payload: Vec<u8>) -> Result<(), SendError> {
        self.tx
            .send(Outbound {
                channel: channel.to_string(),
                payload,
            })
            .await
            .map_err(|_| SendError::Closed)
    }

    /// Serialize an envelope and queue it for publication.
    pub async fn publish_envelope(
        &self,
        channel: &str,
        envelope: &Envelope,
    ) -> Result<(), SendError> {
        let payload = serde_json::to_vec(envelope)?;
        self.publish(channel, payload).await
    }
}
