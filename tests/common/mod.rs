//! Shared wiring for the integration suites: a full relay core (in-memory
//! store, live publisher socket, status service, message handler) minus the
//! ingress socket and HTTP listener.

use std::sync::Arc;

use tokio::sync::broadcast;

use copyflow_relay::api::AppState;
use copyflow_relay::config::Config;
use copyflow_relay::config_feed::ConfigFeed;
use copyflow_relay::connection_manager::ConnectionManager;
use copyflow_relay::db::Database;
use copyflow_relay::log_buffer::create_log_buffer;
use copyflow_relay::message_handler::MessageHandler;
use copyflow_relay::port_resolver::ResolvedPorts;
use copyflow_relay::status::{RuntimeStatusMetrics, StatusService};
use copyflow_relay::wire::{EaRole, HeartbeatMessage, Platform};
use copyflow_relay::zeromq::ZmqPublisher;

pub struct TestRelay {
    pub db: Arc<Database>,
    pub connections: Arc<ConnectionManager>,
    pub status: Arc<StatusService>,
    pub feed: Arc<ConfigFeed>,
    pub handler: MessageHandler,
    pub events: broadcast::Sender<String>,
    pub metrics: Arc<RuntimeStatusMetrics>,
    pub publisher_port: u16,
}

pub async fn build_relay(publisher_port: u16) -> TestRelay {
    let db = Arc::new(Database::connect("sqlite::memory:").await.unwrap());
    let publisher = Arc::new(
        ZmqPublisher::bind(&format!("tcp://127.0.0.1:{}", publisher_port)).unwrap(),
    );
    let connections = Arc::new(ConnectionManager::new(30, 300));
    let metrics = Arc::new(RuntimeStatusMetrics::default());
    let feed = Arc::new(ConfigFeed::new(publisher));
    let (events, _) = broadcast::channel(256);
    let status = Arc::new(StatusService::new(
        db.clone(),
        connections.clone(),
        feed.clone(),
        metrics.clone(),
        events.clone(),
    ));
    let handler = MessageHandler::new(
        connections.clone(),
        db.clone(),
        status.clone(),
        feed.clone(),
        events.clone(),
    );

    TestRelay {
        db,
        connections,
        status,
        feed,
        handler,
        events,
        metrics,
        publisher_port,
    }
}

impl TestRelay {
    pub fn app_state(&self) -> AppState {
        let mut config = Config::default();
        config.cors.disable = true;
        AppState {
            db: self.db.clone(),
            connections: self.connections.clone(),
            status: self.status.clone(),
            feed: self.feed.clone(),
            events: self.events.clone(),
            log_buffer: create_log_buffer(),
            metrics: self.metrics.clone(),
            resolved_ports: Arc::new(ResolvedPorts {
                receiver_port: 5555,
                publisher_port: self.publisher_port,
                is_dynamic: false,
                generated_at: None,
            }),
            config: Arc::new(config),
        }
    }
}

#[allow(dead_code)]
pub fn heartbeat(account_id: &str, role: EaRole) -> HeartbeatMessage {
    HeartbeatMessage {
        message_type: "Heartbeat".to_string(),
        account_id: account_id.to_string(),
        role,
        platform: Platform::MT4,
        account_number: 12345,
        broker: "IC Markets".to_string(),
        account_name: "Main".to_string(),
        server: "ICMarkets-Live".to_string(),
        balance: 10_000.0,
        equity: 10_000.0,
        currency: "USD".to_string(),
        leverage: 100,
        open_positions: 0,
        is_trade_allowed: true,
        timestamp: chrono::Utc::now().to_rfc3339(),
        version: "test".to_string(),
        symbol_prefix: None,
        symbol_suffix: None,
    }
}
