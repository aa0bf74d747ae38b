//! Redis pub/sub transport.
//!
//! One transport per process. [`RedisTransport::run`] opens two paths to
//! the server: a `ConnectionManager` drained by a publish pump (fed from
//! the core's outbox) and a pub/sub subscription on the coordination
//! channels, whose payloads are handed to [`Ipc::handle_message`]. The
//! connection manager reconnects on its own; a dropped subscription ends
//! the run and the supervisor decides whether to restart the process.

use std::sync::Arc;

use futures_util::StreamExt;
use redis::aio::ConnectionManager;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use swarmlink_core::ipc::Ipc;
use swarmlink_core::outbox::Outbound;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error(transparent)]
    Redis(#[from] redis::RedisError),
}

/// Redis-backed carrier for coordination traffic.
pub struct RedisTransport {
    client: redis::Client,
    channels: Vec<String>,
}

impl RedisTransport {
    /// Build a transport for the given server and channel set. The
    /// connection is not opened until [`run`](Self::run).
    pub fn new(redis_url: &str, channels: Vec<String>) -> Result<Self, TransportError> {
        let client = redis::Client::open(redis_url)?;
        Ok(Self { client, channels })
    }

    /// Drive the transport until `shutdown` fires or the subscription
    /// drops.
    ///
    /// Consumes the outbox receiver handed out by [`Ipc::new`]; every
    /// inbound pub/sub payload is routed through `ipc`.
    pub async fn run(
        self,
        ipc: Arc<Ipc>,
        outbound: mpsc::Receiver<Outbound>,
        shutdown: CancellationToken,
    ) -> Result<(), TransportError> {
        let mut conn = self.client.get_connection_manager().await?;
        let _: String = redis::cmd("PING").query_async(&mut conn).await?;
        info!(channels = ?self.channels, "connected to redis");

        let pump = tokio::spawn(publish_pump(conn, outbound, shutdown.clone()));

        let mut pubsub = self.client.get_async_pubsub().await?;
        for channel in &self.channels {
            pubsub.subscribe(channel).await?;
        }

        let mut messages = pubsub.on_message();
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    info!("transport shutting down");
                    break;
                }
                msg = messages.next() => {
                    let Some(msg) = msg else {
                        warn!("subscription stream ended");
                        break;
                    };
                    let channel = msg.get_channel_name().to_string();
                    let payload = msg.get_payload_bytes();
                    debug!(%channel, bytes = payload.len(), "inbound payload");
                    ipc.handle_message(&channel, payload).await;
                }
            }
        }

        shutdown.cancel();
        let _ = pump.await;
        Ok(())
    }
}

/// Drains the outbox into PUBLISH commands. Publish failures are logged
/// and the payload dropped; request timeouts upstream absorb the loss.
async fn publish_pump(
    mut conn: ConnectionManager,
    mut outbound: mpsc::Receiver<Outbound>,
    shutdown: CancellationToken,
) {
    loop {
        let out = tokio::select! {
            _ = shutdown.cancelled() => break,
            out = outbound.recv() => match out {
                Some(out) => out,
                None => break,
            },
        };
        let result: Result<i64, redis::RedisError> = redis::cmd("PUBLISH")
            .arg(&out.channel)
            .arg(&out.payload)
            .query_async(&mut conn)
            .await;
        match result {
            Ok(receivers) => {
                debug!(channel = %out.channel, receivers, "published payload");
            }
            Err(err) => {
                warn!(channel = %out.channel, %err, "publish failed, payload dropped");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_malformed_url() {
        assert!(RedisTransport::new("not-a-url", vec!["coord".to_string()]).is_err());
    }

    #[test]
    fn accepts_standard_url() {
        let transport =
            RedisTransport::new("redis://127.0.0.1:6379", vec!["coord".to_string()]);
        assert!(transport.is_ok());
    }
}
