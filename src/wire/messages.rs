//! Message types shared between the relay and the platform EAs.
//!
//! Every payload on the wire is a MessagePack named map. Inbound messages
//! carry a `message_type` discriminator, except trade signals which are
//! recognized by their `action` field (the fielded EAs predate the
//! discriminator convention for signals).

use serde::{Deserialize, Serialize};

/// Role of a connected EA.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EaRole {
    Master,
    Slave,
}

/// Trading platform the EA runs on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Platform {
    MT4,
    MT5,
}

/// Trade signal action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TradeAction {
    Open,
    Close,
    Modify,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderType {
    Buy,
    Sell,
    BuyLimit,
    SellLimit,
    BuyStop,
    SellStop,
}

impl OrderType {
    /// Limit and stop variants are pending orders.
    pub fn is_pending(&self) -> bool {
        !matches!(self, OrderType::Buy | OrderType::Sell)
    }

    /// Opposite direction, same order class.
    pub fn reversed(&self) -> OrderType {
        match self {
            OrderType::Buy => OrderType::Sell,
            OrderType::Sell => OrderType::Buy,
            OrderType::BuyLimit => OrderType::SellLimit,
            OrderType::SellLimit => OrderType::BuyLimit,
            OrderType::BuyStop => OrderType::SellStop,
            OrderType::SellStop => OrderType::BuyStop,
        }
    }
}

/// Periodic liveness report from an EA. The first heartbeat from an unknown
/// account also serves as its registration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HeartbeatMessage {
    pub message_type: String, // "Heartbeat"
    pub account_id: String,
    pub role: EaRole,
    pub platform: Platform,
    pub account_number: i64,
    pub broker: String,
    pub account_name: String,
    pub server: String,
    pub balance: f64,
    pub equity: f64,
    pub currency: String,
    pub leverage: i64,
    pub open_positions: i32,
    pub is_trade_allowed: bool,
    pub timestamp: String, // ISO 8601
    /// EA build descriptor
    pub version: String,
    // Master-only symbol affixes
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub symbol_prefix: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub symbol_suffix: Option<String>,
}

/// A trade event on the Master account, and (after transformation) the copy
/// instruction delivered to a Slave.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradeSignal {
    pub action: TradeAction,
    pub ticket: i64,
    pub source_account: String,
    pub timestamp: String, // ISO 8601
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub symbol: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub order_type: Option<OrderType>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lots: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub open_price: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stop_loss: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub take_profit: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub magic_number: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
    /// Close fraction in [0, 1]. 0 and 1 both mean a full close; anything
    /// strictly between means a partial close.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub close_ratio: Option<f64>,
}

/// Interpretation of a close_ratio value.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CloseKind {
    Full,
    Partial(f64),
}

impl CloseKind {
    pub fn from_ratio(ratio: f64) -> CloseKind {
        if ratio == 0.0 || ratio == 1.0 {
            CloseKind::Full
        } else {
            CloseKind::Partial(ratio)
        }
    }
}

/// Explicit request for the latest config snapshot, sent by an EA after a
/// successful heartbeat when it suspects it missed a publish.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestConfigMessage {
    pub message_type: String, // "RequestConfig"
    pub account_id: String,
    pub role: EaRole,
    pub timestamp: String,
}

/// Sent when an EA shuts down cleanly.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnregisterMessage {
    pub message_type: String, // "Unregister"
    pub account_id: String,
    pub timestamp: String,
}

/// Slave asks its Master for the currently open positions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncRequestMessage {
    pub message_type: String, // "SyncRequest"
    pub slave_account: String,
    pub master_account: String,
    pub timestamp: String,
}

/// One open position on the Master, as reported in a snapshot. Symbols are
/// pre-cleaned by the Master (affixes already stripped); the relay forwards
/// snapshots untouched.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PositionInfo {
    pub ticket: i64,
    pub symbol: String,
    pub order_type: OrderType,
    pub lots: f64,
    pub open_price: f64,
    pub open_time: String, // ISO 8601
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stop_loss: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub take_profit: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub magic_number: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
}

/// Master's reply to a SyncRequest: the full set of open positions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PositionSnapshotMessage {
    pub message_type: String, // "PositionSnapshot"
    pub source_account: String,
    pub positions: Vec<PositionInfo>,
    pub timestamp: String,
}

/// Structured explanation of a degraded runtime status, delivered alongside
/// config. Slave-side causes take display precedence over Master-side ones.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "code", rename_all = "snake_case")]
pub enum WarningCode {
    SlaveIntentOff,
    SlaveOffline,
    SlaveAlgoOff,
    MasterIntentOff,
    MasterOffline,
    MasterAlgoOff,
    NoMasterAssigned,
    MasterUnavailable { master: String },
}

impl WarningCode {
    /// Display priority; lower sorts first.
    pub fn priority(&self) -> u8 {
        match self {
            WarningCode::SlaveIntentOff => 10,
            WarningCode::SlaveOffline => 20,
            WarningCode::SlaveAlgoOff => 30,
            WarningCode::MasterIntentOff => 40,
            WarningCode::MasterOffline => 50,
            WarningCode::MasterAlgoOff => 60,
            WarningCode::NoMasterAssigned => 70,
            WarningCode::MasterUnavailable { .. } => 80,
        }
    }

    pub fn sort_by_priority(codes: &mut [WarningCode]) {
        codes.sort_by_key(|c| c.priority());
    }
}

/// One (source, target) symbol rename. First matching entry wins.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SymbolMapping {
    pub source_symbol: String,
    pub target_symbol: String,
}

/// Allow/block filters for a member. An absent or empty allow list means
/// "no filter"; an absent block list blocks nothing.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TradeFilters {
    #[serde(default)]
    pub allowed_symbols: Option<Vec<String>>,
    #[serde(default)]
    pub blocked_symbols: Option<Vec<String>>,
    #[serde(default)]
    pub allowed_magic_numbers: Option<Vec<i64>>,
    #[serde(default)]
    pub blocked_magic_numbers: Option<Vec<i64>>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LotCalculationMode {
    #[default]
    Multiplier,
    MarginRatio,
}

/// How a freshly connected Slave reconciles positions already open on the
/// Master.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncMode {
    /// Only copy new trades.
    #[default]
    Skip,
    /// Place limit orders at the Master's open price.
    LimitOrder,
    /// Place market orders, skipping when the price drifted too far.
    MarketOrder,
}

/// Config snapshot delivered to a Master EA on `config/{account_id}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MasterConfigMessage {
    pub account_id: String,
    /// 0 = ManualOff, 2 = Connected. Masters have no Standby state.
    pub status: i32,
    #[serde(default)]
    pub symbol_prefix: Option<String>,
    #[serde(default)]
    pub symbol_suffix: Option<String>,
    pub config_version: u32,
    #[serde(default)]
    pub warning_codes: Vec<WarningCode>,
    pub timestamp: String,
}

/// Config snapshot for one (Master, Slave) membership, delivered on
/// `config/{account_id}`. A slave belonging to several masters receives one
/// message per membership, each naming its master.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SlaveConfigMessage {
    pub account_id: String,
    pub master_account: String,
    pub trade_group_id: String,
    /// 0 = ManualOff, 1 = Standby, 2 = Connected.
    pub status: i32,
    #[serde(default)]
    pub lot_calculation_mode: LotCalculationMode,
    #[serde(default)]
    pub lot_multiplier: Option<f64>,
    pub reverse_trade: bool,
    #[serde(default)]
    pub symbol_prefix: Option<String>,
    #[serde(default)]
    pub symbol_suffix: Option<String>,
    pub symbol_mappings: Vec<SymbolMapping>,
    pub filters: TradeFilters,
    #[serde(default)]
    pub source_lot_min: Option<f64>,
    #[serde(default)]
    pub source_lot_max: Option<f64>,
    #[serde(default)]
    pub sync_mode: SyncMode,
    #[serde(default)]
    pub limit_order_expiry_min: Option<i32>,
    #[serde(default)]
    pub market_sync_max_pips: Option<f64>,
    #[serde(default)]
    pub max_slippage: Option<i32>,
    pub max_retries: i32,
    pub max_signal_delay_ms: i32,
    #[serde(default)]
    pub use_pending_order_for_delayed: bool,
    #[serde(default)]
    pub copy_pending_orders: bool,
    /// Derived: true exactly when status is Connected, which in turn
    /// requires every master of this slave to be Connected.
    pub allow_new_orders: bool,
    #[serde(default)]
    pub warning_codes: Vec<WarningCode>,
    pub config_version: u32,
    pub timestamp: String,
}

/// Fleet-wide log-shipping config, broadcast to every EA on `config/global`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VLogsConfigMessage {
    pub enabled: bool,
    pub endpoint: String,
    /// Minimum level the EAs should ship: "DEBUG", "INFO", "WARN", "ERROR".
    pub log_level: String,
    pub timestamp: String,
}
