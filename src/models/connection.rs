use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::wire::{EaRole, HeartbeatMessage, Platform};

/// Liveness of a connected EA as tracked by the registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConnectionStatus {
    Online,
    Offline,
    Timeout,
}

/// In-memory record of one live EA, keyed by account id. Created on the
/// first heartbeat from an unknown account, refreshed on every heartbeat,
/// and evicted a grace period after the EA goes quiet.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EaConnection {
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
    #[serde(skip_serializing_if = "Option::is_none")]
    pub symbol_prefix: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub symbol_suffix: Option<String>,
    pub last_heartbeat: DateTime<Utc>,
    pub connected_at: DateTime<Utc>,
    pub status: ConnectionStatus,
}

impl EaConnection {
    pub fn from_heartbeat(msg: &HeartbeatMessage, now: DateTime<Utc>) -> Self {
        Self {
            account_id: msg.account_id.clone(),
            role: msg.role,
            platform: msg.platform,
            account_number: msg.account_number,
            broker: msg.broker.clone(),
            account_name: msg.account_name.clone(),
            server: msg.server.clone(),
            balance: msg.balance,
            equity: msg.equity,
            currency: msg.currency.clone(),
            leverage: msg.leverage,
            open_positions: msg.open_positions,
            is_trade_allowed: msg.is_trade_allowed,
            symbol_prefix: msg.symbol_prefix.clone(),
            symbol_suffix: msg.symbol_suffix.clone(),
            last_heartbeat: now,
            connected_at: now,
            status: ConnectionStatus::Online,
        }
    }

    /// Fold a later heartbeat into this record.
    pub fn refresh(&mut self, msg: &HeartbeatMessage, now: DateTime<Utc>) {
        self.balance = msg.balance;
        self.equity = msg.equity;
        self.open_positions = msg.open_positions;
        self.is_trade_allowed = msg.is_trade_allowed;
        self.symbol_prefix = msg.symbol_prefix.clone();
        self.symbol_suffix = msg.symbol_suffix.clone();
        self.last_heartbeat = now;
        self.status = ConnectionStatus::Online;
    }

    pub fn is_online(&self) -> bool {
        self.status == ConnectionStatus::Online
    }
}
