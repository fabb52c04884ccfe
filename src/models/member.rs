//! TradeGroupMember: one Slave's subscription inside a TradeGroup. A single
//! slave account may be a member of several groups (N:N).

use serde::{Deserialize, Serialize};

use crate::wire::{LotCalculationMode, SymbolMapping, SyncMode, TradeFilters, WarningCode};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradeGroupMember {
    /// Surrogate id (REST clients address members by group + slave, this is
    /// informational).
    pub id: i64,
    /// Master account id of the owning group.
    pub trade_group_id: String,
    pub slave_account: String,
    pub slave_settings: SlaveSettings,
    /// User intent for this membership.
    pub enabled_flag: bool,
    /// 0 = ManualOff, 1 = Standby, 2 = Connected. Written only by the
    /// runtime-status evaluator, never by the UI.
    pub runtime_status: i32,
    pub warning_codes: Vec<WarningCode>,
    /// Bumped on every settings, intent or runtime-status change.
    pub config_version: u32,
    pub created_at: String,
    pub updated_at: String,
}

impl TradeGroupMember {
    pub fn is_connected(&self) -> bool {
        self.runtime_status == crate::models::STATUS_CONNECTED
    }
}

/// Slave-side settings stored as a JSON blob inside the member row. The
/// derived `allow_new_orders` flag is intentionally absent: it is computed
/// per config snapshot, never stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SlaveSettings {
    #[serde(default)]
    pub lot_calculation_mode: LotCalculationMode,
    /// Required when mode is Multiplier; applied on the slave side.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lot_multiplier: Option<f64>,
    #[serde(default)]
    pub reverse_trade: bool,
    /// Decoration added to outgoing symbols for this slave's broker.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub symbol_prefix: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub symbol_suffix: Option<String>,
    #[serde(default)]
    pub symbol_mappings: Vec<SymbolMapping>,
    #[serde(default)]
    pub filters: TradeFilters,
    /// Inclusive bounds checked against the Master's original lot size.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_lot_min: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_lot_max: Option<f64>,
    #[serde(default)]
    pub sync_mode: SyncMode,
    /// Limit-order lifetime in minutes; 0 = good-till-cancel.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub limit_order_expiry_min: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub market_sync_max_pips: Option<f64>,
    /// Max slippage in points when the slave opens positions.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_slippage: Option<i32>,
    #[serde(default = "default_max_retries")]
    pub max_retries: i32,
    #[serde(default = "default_max_signal_delay_ms")]
    pub max_signal_delay_ms: i32,
    #[serde(default)]
    pub use_pending_order_for_delayed: bool,
    #[serde(default)]
    pub copy_pending_orders: bool,
}

fn default_max_retries() -> i32 {
    3
}

fn default_max_signal_delay_ms() -> i32 {
    5000
}

impl Default for SlaveSettings {
    fn default() -> Self {
        Self {
            lot_calculation_mode: LotCalculationMode::default(),
            lot_multiplier: Some(1.0),
            reverse_trade: false,
            symbol_prefix: None,
            symbol_suffix: None,
            symbol_mappings: Vec::new(),
            filters: TradeFilters::default(),
            source_lot_min: None,
            source_lot_max: None,
            sync_mode: SyncMode::default(),
            limit_order_expiry_min: None,
            market_sync_max_pips: None,
            max_slippage: None,
            max_retries: default_max_retries(),
            max_signal_delay_ms: default_max_signal_delay_ms(),
            use_pending_order_for_delayed: false,
            copy_pending_orders: false,
        }
    }
}
