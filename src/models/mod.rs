//! Domain models persisted by the store or held by the connection registry.

mod connection;
mod member;
mod trade_group;

pub use connection::{ConnectionStatus, EaConnection};
pub use member::{SlaveSettings, TradeGroupMember};
pub use trade_group::{MasterSettings, TradeGroup};

/// Runtime status values shared by masters and members.
pub const STATUS_MANUAL_OFF: i32 = 0;
pub const STATUS_STANDBY: i32 = 1;
pub const STATUS_CONNECTED: i32 = 2;
