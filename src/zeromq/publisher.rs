//! Owner of the egress PUB socket. Publishes are serialized through a
//! single channel consumer, which preserves per-topic order; delivery is
//! fire-and-forget by design of PUB/SUB.

use anyhow::{Context, Result};
use serde::Serialize;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::wire;

struct OutboundFrame {
    topic: String,
    bytes: Vec<u8>,
}

pub struct ZmqPublisher {
    tx: mpsc::UnboundedSender<OutboundFrame>,
    _worker: JoinHandle<()>,
}

impl ZmqPublisher {
    pub fn bind(bind_address: &str) -> Result<Self> {
        let context = zmq::Context::new();
        let socket = context
            .socket(zmq::PUB)
            .context("failed to create PUB socket")?;
        socket
            .bind(bind_address)
            .with_context(|| format!("failed to bind publisher to {}", bind_address))?;

        tracing::info!(address = %bind_address, "publisher socket bound");

        let (tx, mut rx) = mpsc::unbounded_channel::<OutboundFrame>();

        let worker = tokio::task::spawn_blocking(move || {
            while let Some(frame) = rx.blocking_recv() {
                if let Err(err) = socket.send(&frame.bytes, 0) {
                    // Lossy channel: log and move on, never retry.
                    tracing::error!(
                        topic = %frame.topic,
                        error = %err,
                        "failed to publish frame"
                    );
                } else {
                    tracing::debug!(
                        topic = %frame.topic,
                        bytes = frame.bytes.len(),
                        "published frame"
                    );
                }
            }

            drop(socket);
            drop(context);
            tracing::info!("publisher socket closed");
        });

        Ok(Self {
            tx,
            _worker: worker,
        })
    }

    /// Serialize and queue a message for the publisher thread. Returns an
    /// error only when encoding fails or the publisher has shut down.
    pub fn publish<T: Serialize>(&self, topic: &str, payload: &T) -> Result<()> {
        let bytes = wire::encode_frame(topic, payload)?;
        self.tx
            .send(OutboundFrame {
                topic: topic.to_string(),
                bytes,
            })
            .map_err(|_| anyhow::anyhow!("publisher task is gone"))
    }
}
