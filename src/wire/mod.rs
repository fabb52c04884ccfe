//! Wire codec: `<topic><space><MessagePack payload>` framing and the
//! tagged-variant decoder for everything EAs send. Pure data
//! transformation, no sockets.

mod messages;

pub use messages::*;

use serde::Deserialize;
use thiserror::Error;

/// Topic for per-account config delivery.
pub fn config_topic(account_id: &str) -> String {
    format!("config/{}", account_id)
}

/// Topic carrying fleet-wide config (VLogs settings).
pub const GLOBAL_CONFIG_TOPIC: &str = "config/global";

/// Topic for a transformed trade signal addressed to one member.
pub fn trade_topic(master_account: &str, slave_account: &str) -> String {
    format!("trade/{}/{}", master_account, slave_account)
}

/// Topic for SyncRequest/PositionSnapshot traffic of one member.
pub fn sync_topic(master_account: &str, slave_account: &str) -> String {
    format!("sync/{}/{}", master_account, slave_account)
}

#[derive(Debug, Error)]
pub enum WireError {
    #[error("frame has no topic separator")]
    MissingSeparator,
    #[error("frame topic is empty")]
    EmptyTopic,
    #[error("failed to decode payload: {0}")]
    Decode(#[from] rmp_serde::decode::Error),
    #[error("failed to encode payload: {0}")]
    Encode(#[from] rmp_serde::encode::Error),
    #[error("unknown message_type `{0}`")]
    UnknownMessageType(String),
    #[error("message has neither message_type nor action field")]
    MissingDiscriminator,
    #[error("invalid field: {0}")]
    InvalidField(&'static str),
}

/// A split but not yet decoded frame.
#[derive(Debug, Clone, Copy)]
pub struct Frame<'a> {
    pub topic: &'a str,
    pub payload: &'a [u8],
}

/// Split a raw frame at the first space. The topic must be non-empty ASCII;
/// the payload is whatever follows the separator.
pub fn split_frame(raw: &[u8]) -> Result<Frame<'_>, WireError> {
    let sep = raw
        .iter()
        .position(|b| *b == b' ')
        .ok_or(WireError::MissingSeparator)?;
    if sep == 0 {
        return Err(WireError::EmptyTopic);
    }
    let topic = std::str::from_utf8(&raw[..sep]).map_err(|_| WireError::EmptyTopic)?;
    Ok(Frame {
        topic,
        payload: &raw[sep + 1..],
    })
}

/// Serialize a payload as a named MessagePack map and prepend the topic.
pub fn encode_frame<T: serde::Serialize>(topic: &str, payload: &T) -> Result<Vec<u8>, WireError> {
    let body = rmp_serde::to_vec_named(payload)?;
    let mut frame = Vec::with_capacity(topic.len() + 1 + body.len());
    frame.extend_from_slice(topic.as_bytes());
    frame.push(b' ');
    frame.extend_from_slice(&body);
    Ok(frame)
}

/// Everything the relay accepts on the ingress socket.
#[derive(Debug, Clone)]
pub enum InboundMessage {
    Heartbeat(HeartbeatMessage),
    TradeSignal(TradeSignal),
    RequestConfig(RequestConfigMessage),
    Unregister(UnregisterMessage),
    SyncRequest(SyncRequestMessage),
    PositionSnapshot(PositionSnapshotMessage),
}

impl InboundMessage {
    pub fn kind(&self) -> &'static str {
        match self {
            InboundMessage::Heartbeat(_) => "Heartbeat",
            InboundMessage::TradeSignal(_) => "TradeSignal",
            InboundMessage::RequestConfig(_) => "RequestConfig",
            InboundMessage::Unregister(_) => "Unregister",
            InboundMessage::SyncRequest(_) => "SyncRequest",
            InboundMessage::PositionSnapshot(_) => "PositionSnapshot",
        }
    }
}

/// Peek structure used to pick the concrete type before a full decode.
#[derive(Debug, Deserialize)]
struct Discriminator {
    #[serde(default)]
    message_type: Option<String>,
    #[serde(default)]
    action: Option<String>,
}

/// Decode an ingress payload into a typed message. Unknown types, missing
/// required fields and out-of-range values are all reported as errors; the
/// caller drops the frame and logs.
pub fn decode_inbound(payload: &[u8]) -> Result<InboundMessage, WireError> {
    let discriminator: Discriminator = rmp_serde::from_slice(payload)?;

    if let Some(message_type) = discriminator.message_type {
        return match message_type.as_str() {
            "Heartbeat" => Ok(InboundMessage::Heartbeat(rmp_serde::from_slice(payload)?)),
            "RequestConfig" => Ok(InboundMessage::RequestConfig(rmp_serde::from_slice(
                payload,
            )?)),
            "Unregister" => Ok(InboundMessage::Unregister(rmp_serde::from_slice(payload)?)),
            "SyncRequest" => Ok(InboundMessage::SyncRequest(rmp_serde::from_slice(payload)?)),
            "PositionSnapshot" => Ok(InboundMessage::PositionSnapshot(rmp_serde::from_slice(
                payload,
            )?)),
            _ => Err(WireError::UnknownMessageType(message_type)),
        };
    }

    if discriminator.action.is_some() {
        let signal: TradeSignal = rmp_serde::from_slice(payload)?;
        validate_signal(&signal)?;
        return Ok(InboundMessage::TradeSignal(signal));
    }

    Err(WireError::MissingDiscriminator)
}

/// Per-action required fields, enforced after the structural decode.
fn validate_signal(signal: &TradeSignal) -> Result<(), WireError> {
    match signal.action {
        TradeAction::Open => {
            if signal.symbol.is_none() {
                return Err(WireError::InvalidField("symbol"));
            }
            if signal.order_type.is_none() {
                return Err(WireError::InvalidField("order_type"));
            }
            if signal.lots.is_none() {
                return Err(WireError::InvalidField("lots"));
            }
            if signal.open_price.is_none() {
                return Err(WireError::InvalidField("open_price"));
            }
        }
        TradeAction::Close => match signal.close_ratio {
            None => return Err(WireError::InvalidField("close_ratio")),
            Some(ratio) if !(0.0..=1.0).contains(&ratio) => {
                return Err(WireError::InvalidField("close_ratio"));
            }
            Some(_) => {}
        },
        TradeAction::Modify => {}
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn open_signal() -> TradeSignal {
        TradeSignal {
            action: TradeAction::Open,
            ticket: 1001,
            source_account: "IC_Markets_12345".to_string(),
            timestamp: "2025-06-01T12:00:00Z".to_string(),
            symbol: Some("pro.EURUSD".to_string()),
            order_type: Some(OrderType::Buy),
            lots: Some(1.0),
            open_price: Some(1.1),
            stop_loss: Some(1.09),
            take_profit: Some(1.11),
            magic_number: Some(42),
            comment: None,
            close_ratio: None,
        }
    }

    #[test]
    fn frame_splits_at_first_space() {
        let frame = split_frame(b"trade/M/S payload bytes").unwrap();
        assert_eq!(frame.topic, "trade/M/S");
        assert_eq!(frame.payload, b"payload bytes");
    }

    #[test]
    fn frame_without_separator_is_rejected() {
        assert!(matches!(
            split_frame(b"no-separator"),
            Err(WireError::MissingSeparator)
        ));
    }

    #[test]
    fn frame_with_empty_topic_is_rejected() {
        assert!(matches!(split_frame(b" payload"), Err(WireError::EmptyTopic)));
    }

    #[test]
    fn encode_then_split_round_trips_topic() {
        let raw = encode_frame("config/ACC_1", &open_signal()).unwrap();
        let frame = split_frame(&raw).unwrap();
        assert_eq!(frame.topic, "config/ACC_1");
    }

    #[test]
    fn trade_signal_round_trip() {
        let signal = open_signal();
        let bytes = rmp_serde::to_vec_named(&signal).unwrap();
        match decode_inbound(&bytes).unwrap() {
            InboundMessage::TradeSignal(decoded) => {
                assert_eq!(decoded.ticket, signal.ticket);
                assert_eq!(decoded.symbol, signal.symbol);
                assert_eq!(decoded.order_type, signal.order_type);
                assert_eq!(decoded.stop_loss, signal.stop_loss);
                assert_eq!(decoded.magic_number, signal.magic_number);
            }
            other => panic!("expected TradeSignal, got {:?}", other),
        }
    }

    #[test]
    fn heartbeat_round_trip() {
        let hb = HeartbeatMessage {
            message_type: "Heartbeat".to_string(),
            account_id: "XM_67890".to_string(),
            role: EaRole::Slave,
            platform: Platform::MT5,
            account_number: 67890,
            broker: "XM".to_string(),
            account_name: "Demo".to_string(),
            server: "XM-Live".to_string(),
            balance: 5000.0,
            equity: 5100.0,
            currency: "USD".to_string(),
            leverage: 200,
            open_positions: 1,
            is_trade_allowed: true,
            timestamp: "2025-06-01T12:00:00Z".to_string(),
            version: "1.4.2".to_string(),
            symbol_prefix: None,
            symbol_suffix: None,
        };
        let bytes = rmp_serde::to_vec_named(&hb).unwrap();
        match decode_inbound(&bytes).unwrap() {
            InboundMessage::Heartbeat(decoded) => {
                assert_eq!(decoded.account_id, "XM_67890");
                assert_eq!(decoded.role, EaRole::Slave);
                assert!(decoded.is_trade_allowed);
            }
            other => panic!("expected Heartbeat, got {:?}", other),
        }
    }

    #[test]
    fn master_and_slave_config_round_trip() {
        let master = MasterConfigMessage {
            account_id: "M".to_string(),
            status: 2,
            symbol_prefix: Some("pro.".to_string()),
            symbol_suffix: None,
            config_version: 7,
            warning_codes: vec![],
            timestamp: "2025-06-01T12:00:00Z".to_string(),
        };
        let bytes = rmp_serde::to_vec_named(&master).unwrap();
        let decoded: MasterConfigMessage = rmp_serde::from_slice(&bytes).unwrap();
        assert_eq!(decoded, master);

        let slave = SlaveConfigMessage {
            account_id: "S".to_string(),
            master_account: "M".to_string(),
            trade_group_id: "M".to_string(),
            status: 1,
            lot_calculation_mode: LotCalculationMode::Multiplier,
            lot_multiplier: Some(1.5),
            reverse_trade: true,
            symbol_prefix: Some(".m".to_string()),
            symbol_suffix: None,
            symbol_mappings: vec![SymbolMapping {
                source_symbol: "XAUUSD".to_string(),
                target_symbol: "GOLD".to_string(),
            }],
            filters: TradeFilters::default(),
            source_lot_min: None,
            source_lot_max: Some(10.0),
            sync_mode: SyncMode::LimitOrder,
            limit_order_expiry_min: Some(0),
            market_sync_max_pips: None,
            max_slippage: Some(30),
            max_retries: 3,
            max_signal_delay_ms: 5000,
            use_pending_order_for_delayed: false,
            copy_pending_orders: true,
            allow_new_orders: false,
            warning_codes: vec![WarningCode::MasterUnavailable {
                master: "M2".to_string(),
            }],
            config_version: 12,
            timestamp: "2025-06-01T12:00:00Z".to_string(),
        };
        let bytes = rmp_serde::to_vec_named(&slave).unwrap();
        let decoded: SlaveConfigMessage = rmp_serde::from_slice(&bytes).unwrap();
        assert_eq!(decoded, slave);
    }

    #[test]
    fn position_snapshot_round_trip() {
        let snapshot = PositionSnapshotMessage {
            message_type: "PositionSnapshot".to_string(),
            source_account: "M".to_string(),
            positions: vec![PositionInfo {
                ticket: 9,
                symbol: "EURUSD".to_string(),
                order_type: OrderType::Sell,
                lots: 0.3,
                open_price: 1.2,
                open_time: "2025-06-01T11:00:00Z".to_string(),
                stop_loss: None,
                take_profit: Some(1.15),
                magic_number: None,
                comment: Some("carry".to_string()),
            }],
            timestamp: "2025-06-01T12:00:00Z".to_string(),
        };
        let bytes = rmp_serde::to_vec_named(&snapshot).unwrap();
        match decode_inbound(&bytes).unwrap() {
            InboundMessage::PositionSnapshot(decoded) => {
                assert_eq!(decoded.positions.len(), 1);
                assert_eq!(decoded.positions[0].order_type, OrderType::Sell);
            }
            other => panic!("expected PositionSnapshot, got {:?}", other),
        }
    }

    #[test]
    fn unknown_message_type_is_rejected() {
        let payload = rmp_serde::to_vec_named(&serde_json::json!({
            "message_type": "SelfDestruct",
            "account_id": "X",
        }))
        .unwrap();
        assert!(matches!(
            decode_inbound(&payload),
            Err(WireError::UnknownMessageType(t)) if t == "SelfDestruct"
        ));
    }

    #[test]
    fn missing_discriminator_is_rejected() {
        let payload = rmp_serde::to_vec_named(&serde_json::json!({"account_id": "X"})).unwrap();
        assert!(matches!(
            decode_inbound(&payload),
            Err(WireError::MissingDiscriminator)
        ));
    }

    #[test]
    fn open_without_symbol_is_rejected() {
        let mut signal = open_signal();
        signal.symbol = None;
        let bytes = rmp_serde::to_vec_named(&signal).unwrap();
        assert!(matches!(
            decode_inbound(&bytes),
            Err(WireError::InvalidField("symbol"))
        ));
    }

    #[test]
    fn close_ratio_bounds_are_enforced() {
        let mut signal = open_signal();
        signal.action = TradeAction::Close;
        signal.close_ratio = Some(1.5);
        let bytes = rmp_serde::to_vec_named(&signal).unwrap();
        assert!(matches!(
            decode_inbound(&bytes),
            Err(WireError::InvalidField("close_ratio"))
        ));

        signal.close_ratio = Some(0.5);
        let bytes = rmp_serde::to_vec_named(&signal).unwrap();
        assert!(decode_inbound(&bytes).is_ok());
    }

    #[test]
    fn close_ratio_zero_and_one_both_mean_full_close() {
        assert_eq!(CloseKind::from_ratio(0.0), CloseKind::Full);
        assert_eq!(CloseKind::from_ratio(1.0), CloseKind::Full);
        assert_eq!(CloseKind::from_ratio(0.25), CloseKind::Partial(0.25));
    }

    #[test]
    fn warning_codes_sort_slave_side_first() {
        let mut codes = vec![
            WarningCode::MasterUnavailable {
                master: "M2".to_string(),
            },
            WarningCode::SlaveOffline,
            WarningCode::MasterIntentOff,
        ];
        WarningCode::sort_by_priority(&mut codes);
        assert_eq!(codes[0], WarningCode::SlaveOffline);
        assert_eq!(codes[1], WarningCode::MasterIntentOff);
    }

    #[test]
    fn warning_code_payload_carries_master_name() {
        let code = WarningCode::MasterUnavailable {
            master: "IC_Markets_12345".to_string(),
        };
        let bytes = rmp_serde::to_vec_named(&code).unwrap();
        let decoded: WarningCode = rmp_serde::from_slice(&bytes).unwrap();
        assert_eq!(decoded, code);
    }

    #[test]
    fn topics_follow_the_convention() {
        assert_eq!(config_topic("ACC"), "config/ACC");
        assert_eq!(trade_topic("M", "S"), "trade/M/S");
        assert_eq!(sync_topic("M", "S"), "sync/M/S");
    }
}
