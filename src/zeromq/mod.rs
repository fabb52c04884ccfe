//! ZeroMQ socket owners. The PULL ingress socket and the PUB egress socket
//! each live on their own blocking thread; the rest of the relay talks to
//! them through channels only.

mod publisher;

pub use publisher::ZmqPublisher;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::wire::{self, InboundMessage};

/// Owner of the ingress PULL socket. Frames are split, decoded and handed
/// to the message handler through an unbounded channel; malformed frames
/// are dropped with a log entry and never stop the loop.
pub struct ZmqServer {
    context: Arc<zmq::Context>,
    tx: mpsc::UnboundedSender<InboundMessage>,
    shutdown: Arc<AtomicBool>,
}

impl ZmqServer {
    pub fn new(tx: mpsc::UnboundedSender<InboundMessage>) -> Self {
        Self {
            context: Arc::new(zmq::Context::new()),
            tx,
            shutdown: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn start(&self, bind_address: &str) -> Result<JoinHandle<()>> {
        let socket = self
            .context
            .socket(zmq::PULL)
            .context("failed to create PULL socket")?;
        socket
            .bind(bind_address)
            .with_context(|| format!("failed to bind ingress socket to {}", bind_address))?;
        // Short receive timeout so the shutdown flag is observed promptly.
        socket
            .set_rcvtimeo(100)
            .context("failed to set ingress receive timeout")?;

        tracing::info!(address = %bind_address, "ingress socket bound");

        let tx = self.tx.clone();
        let shutdown = self.shutdown.clone();

        let handle = tokio::task::spawn_blocking(move || {
            while !shutdown.load(Ordering::Relaxed) {
                let raw = match socket.recv_bytes(0) {
                    Ok(raw) => raw,
                    Err(zmq::Error::EAGAIN) => continue,
                    Err(err) => {
                        tracing::error!(error = %err, "ingress receive failed");
                        continue;
                    }
                };

                let decoded = wire::split_frame(&raw)
                    .and_then(|frame| wire::decode_inbound(frame.payload));
                match decoded {
                    Ok(message) => {
                        if tx.send(message).is_err() {
                            tracing::warn!("ingress channel closed, stopping receiver");
                            break;
                        }
                    }
                    Err(err) => {
                        tracing::warn!(
                            error = %err,
                            bytes = raw.len(),
                            "dropping malformed ingress frame"
                        );
                    }
                }
            }

            drop(socket);
            tracing::info!("ingress socket closed");
        });

        Ok(handle)
    }

    pub fn stop(&self) {
        self.shutdown.store(true, Ordering::Relaxed);
    }
}
