//! End-to-end status flows across the store, connection registry,
//! evaluator and publisher: heartbeats drive members to Connected, a master
//! timing out drops its slaves to Standby with a named warning, and trade
//! signals come out transformed on the member topic.

mod common;

use chrono::{Duration as ChronoDuration, Utc};
use common::{build_relay, heartbeat};
use copyflow_relay::models::{SlaveSettings, STATUS_CONNECTED, STATUS_STANDBY};
use copyflow_relay::wire::{
    self, EaRole, InboundMessage, OrderType, SlaveConfigMessage, TradeAction, TradeSignal,
    WarningCode,
};

const MASTER_1: &str = "IC_Markets_12345";
const MASTER_2: &str = "FTMO_99001";
const SLAVE: &str = "XM_67890";

fn open_signal(symbol: &str) -> TradeSignal {
    TradeSignal {
        action: TradeAction::Open,
        ticket: 1001,
        source_account: MASTER_1.to_string(),
        timestamp: Utc::now().to_rfc3339(),
        symbol: Some(symbol.to_string()),
        order_type: Some(OrderType::Buy),
        lots: Some(1.0),
        open_price: Some(1.1),
        stop_loss: None,
        take_profit: None,
        magic_number: None,
        comment: None,
        close_ratio: None,
    }
}

#[tokio::test]
async fn master_heartbeat_provisions_its_trade_group() {
    let relay = build_relay(42101).await;

    relay
        .handler
        .handle_message(InboundMessage::Heartbeat(heartbeat(MASTER_1, EaRole::Master)))
        .await;

    let group = relay.db.get_trade_group(MASTER_1).await.unwrap().unwrap();
    assert!(group.enabled_flag);
    assert!(relay.connections.get(MASTER_1).await.is_some());
}

#[tokio::test]
async fn members_connect_when_slave_and_whole_cluster_are_up() {
    let relay = build_relay(42102).await;

    relay.db.create_trade_group(MASTER_1).await.unwrap();
    relay.db.create_trade_group(MASTER_2).await.unwrap();
    relay
        .db
        .add_member(MASTER_1, SLAVE, SlaveSettings::default())
        .await
        .unwrap();
    relay
        .db
        .add_member(MASTER_2, SLAVE, SlaveSettings::default())
        .await
        .unwrap();

    for (account, role) in [
        (MASTER_1, EaRole::Master),
        (MASTER_2, EaRole::Master),
        (SLAVE, EaRole::Slave),
    ] {
        relay
            .handler
            .handle_message(InboundMessage::Heartbeat(heartbeat(account, role)))
            .await;
    }

    for master in [MASTER_1, MASTER_2] {
        let member = relay.db.get_member(master, SLAVE).await.unwrap().unwrap();
        assert_eq!(member.runtime_status, STATUS_CONNECTED);
        assert!(member.warning_codes.is_empty());
    }
}

#[tokio::test]
async fn master_timeout_drops_the_slave_to_standby_with_a_named_warning() {
    let relay = build_relay(42103).await;

    relay.db.create_trade_group(MASTER_1).await.unwrap();
    relay.db.create_trade_group(MASTER_2).await.unwrap();
    relay
        .db
        .add_member(MASTER_1, SLAVE, SlaveSettings::default())
        .await
        .unwrap();
    relay
        .db
        .add_member(MASTER_2, SLAVE, SlaveSettings::default())
        .await
        .unwrap();

    for (account, role) in [
        (MASTER_1, EaRole::Master),
        (MASTER_2, EaRole::Master),
        (SLAVE, EaRole::Slave),
    ] {
        relay
            .handler
            .handle_message(InboundMessage::Heartbeat(heartbeat(account, role)))
            .await;
    }

    let before = relay.db.get_member(MASTER_1, SLAVE).await.unwrap().unwrap();
    assert_eq!(before.runtime_status, STATUS_CONNECTED);

    // Keep MASTER_1 and the slave fresh, let MASTER_2 go quiet past the
    // timeout, then run the sweep like the supervisor does.
    let later = Utc::now() + ChronoDuration::seconds(31);
    relay
        .connections
        .update_from_heartbeat_at(&heartbeat(MASTER_1, EaRole::Master), later)
        .await;
    relay
        .connections
        .update_from_heartbeat_at(&heartbeat(SLAVE, EaRole::Slave), later)
        .await;

    let timed_out = relay.connections.sweep_timeouts_at(later).await;
    assert_eq!(timed_out, vec![(MASTER_2.to_string(), EaRole::Master)]);
    for (account, role) in timed_out {
        relay.status.handle_connection_event(&account, role).await;
    }

    // Both memberships drop to Standby: the cluster rule requires every
    // master to be Connected.
    for master in [MASTER_1, MASTER_2] {
        let member = relay.db.get_member(master, SLAVE).await.unwrap().unwrap();
        assert_eq!(member.runtime_status, STATUS_STANDBY);
        assert_eq!(
            member.warning_codes,
            vec![WarningCode::MasterUnavailable {
                master: MASTER_2.to_string()
            }]
        );
        assert!(
            member.config_version > before.config_version,
            "status change must bump the config version"
        );
    }
}

#[tokio::test]
async fn transformed_signal_reaches_the_member_topic() {
    let relay = build_relay(42104).await;

    relay.db.create_trade_group(MASTER_1).await.unwrap();
    relay
        .db
        .update_master_settings(
            MASTER_1,
            copyflow_relay::models::MasterSettings {
                symbol_prefix: Some("pro.".to_string()),
                symbol_suffix: None,
                config_version: 0,
            },
        )
        .await
        .unwrap();
    relay
        .db
        .add_member(
            MASTER_1,
            SLAVE,
            SlaveSettings {
                symbol_suffix: Some(".m".to_string()),
                ..SlaveSettings::default()
            },
        )
        .await
        .unwrap();

    // Subscribe before driving the member to Connected so the slow-joiner
    // window is behind us when the signal goes out.
    let context = zmq::Context::new();
    let subscriber = context.socket(zmq::SUB).unwrap();
    subscriber
        .connect(&format!("tcp://127.0.0.1:{}", relay.publisher_port))
        .unwrap();
    subscriber.set_subscribe(b"trade/").unwrap();
    subscriber.set_rcvtimeo(5000).unwrap();
    tokio::time::sleep(std::time::Duration::from_millis(500)).await;

    for (account, role) in [(MASTER_1, EaRole::Master), (SLAVE, EaRole::Slave)] {
        relay
            .handler
            .handle_message(InboundMessage::Heartbeat(heartbeat(account, role)))
            .await;
    }
    let member = relay.db.get_member(MASTER_1, SLAVE).await.unwrap().unwrap();
    assert_eq!(member.runtime_status, STATUS_CONNECTED);

    relay
        .handler
        .handle_message(InboundMessage::TradeSignal(open_signal("pro.EURUSD")))
        .await;

    // The publisher socket also carries config frames; scan for the trade.
    let deadline = std::time::Instant::now() + std::time::Duration::from_secs(5);
    let frame = loop {
        assert!(std::time::Instant::now() < deadline, "no trade frame received");
        let raw = subscriber.recv_bytes(0).expect("subscriber receive");
        let frame = wire::split_frame(&raw).unwrap();
        if frame.topic.starts_with("trade/") {
            break (frame.topic.to_string(), frame.payload.to_vec());
        }
    };

    assert_eq!(frame.0, format!("trade/{}/{}", MASTER_1, SLAVE));
    let signal: TradeSignal = rmp_serde::from_slice(&frame.1).unwrap();
    assert_eq!(signal.symbol.as_deref(), Some("EURUSD.m"));
    assert_eq!(signal.order_type, Some(OrderType::Buy));
    assert_eq!(signal.lots, Some(1.0));
    assert_eq!(signal.source_account, MASTER_1);
}

#[tokio::test]
async fn slave_config_publishes_carry_monotonic_versions() {
    let relay = build_relay(42105).await;

    relay.db.create_trade_group(MASTER_1).await.unwrap();
    relay
        .db
        .add_member(MASTER_1, SLAVE, SlaveSettings::default())
        .await
        .unwrap();

    let context = zmq::Context::new();
    let subscriber = context.socket(zmq::SUB).unwrap();
    subscriber
        .connect(&format!("tcp://127.0.0.1:{}", relay.publisher_port))
        .unwrap();
    subscriber
        .set_subscribe(format!("config/{}", SLAVE).as_bytes())
        .unwrap();
    subscriber.set_rcvtimeo(5000).unwrap();
    tokio::time::sleep(std::time::Duration::from_millis(500)).await;

    // Two state transitions, each of which republishes the member config.
    for (account, role) in [(MASTER_1, EaRole::Master), (SLAVE, EaRole::Slave)] {
        relay
            .handler
            .handle_message(InboundMessage::Heartbeat(heartbeat(account, role)))
            .await;
    }
    relay
        .db
        .update_member_settings(
            MASTER_1,
            SLAVE,
            SlaveSettings {
                lot_multiplier: Some(2.0),
                ..SlaveSettings::default()
            },
        )
        .await
        .unwrap();
    relay
        .status
        .publish_member_config(MASTER_1, SLAVE)
        .await
        .unwrap();

    let mut last_version = 0;
    let mut seen = 0;
    while seen < 2 {
        let Ok(raw) = subscriber.recv_bytes(0) else { break };
        let frame = wire::split_frame(&raw).unwrap();
        let config: SlaveConfigMessage = rmp_serde::from_slice(frame.payload).unwrap();
        assert!(
            config.config_version >= last_version,
            "config versions must never go backwards"
        );
        last_version = config.config_version;
        seen += 1;
    }
    assert!(seen >= 2, "expected at least two config publishes");
}
