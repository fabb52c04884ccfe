//! Ingress demultiplexer. One handler instance owns the decoded-message
//! stream; each message type has its own submodule. Dispatch is
//! panic-isolated so a bad handler can never take the pump down with it.

use std::sync::Arc;

use futures::FutureExt;
use tokio::sync::{broadcast, mpsc, watch};

use crate::config_feed::ConfigFeed;
use crate::connection_manager::ConnectionManager;
use crate::copy_engine::CopyEngine;
use crate::db::Database;
use crate::status::StatusService;
use crate::wire::InboundMessage;

mod config_request;
mod heartbeat;
mod sync;
mod trade_signal;
mod unregister;

pub struct MessageHandler {
    connections: Arc<ConnectionManager>,
    db: Arc<Database>,
    status: Arc<StatusService>,
    feed: Arc<ConfigFeed>,
    copy_engine: CopyEngine,
    events: broadcast::Sender<String>,
}

impl MessageHandler {
    pub fn new(
        connections: Arc<ConnectionManager>,
        db: Arc<Database>,
        status: Arc<StatusService>,
        feed: Arc<ConfigFeed>,
        events: broadcast::Sender<String>,
    ) -> Self {
        Self {
            connections,
            db,
            status,
            feed,
            copy_engine: CopyEngine::new(),
            events,
        }
    }

    pub async fn handle_message(&self, msg: InboundMessage) {
        match msg {
            InboundMessage::Heartbeat(msg) => self.handle_heartbeat(msg).await,
            InboundMessage::TradeSignal(signal) => self.handle_trade_signal(signal).await,
            InboundMessage::RequestConfig(msg) => self.handle_request_config(msg).await,
            InboundMessage::Unregister(msg) => self.handle_unregister(msg).await,
            InboundMessage::SyncRequest(msg) => self.handle_sync_request(msg).await,
            InboundMessage::PositionSnapshot(msg) => self.handle_position_snapshot(msg).await,
        }
    }
}

/// Drain the ingress channel until shutdown. Messages are processed one at
/// a time, which is what preserves per-master signal order end to end.
pub async fn run_ingress_pump(
    handler: Arc<MessageHandler>,
    mut rx: mpsc::UnboundedReceiver<InboundMessage>,
    mut shutdown: watch::Receiver<bool>,
) {
    loop {
        tokio::select! {
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
            }
            msg = rx.recv() => {
                let Some(msg) = msg else { break };
                let kind = msg.kind();
                let dispatch = std::panic::AssertUnwindSafe(handler.handle_message(msg));
                if let Err(panic) = dispatch.catch_unwind().await {
                    tracing::error!(message_kind = kind, ?panic, "message handler panicked");
                }
            }
        }
    }
    tracing::info!("ingress pump stopped");
}
