//! TradeGroup: one Master account plus the settings applying to every
//! member copying from it. The group id IS the master account id, in the
//! stable `{broker}_{account_number}` form.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradeGroup {
    /// Master account id; doubles as the group id.
    pub id: String,
    pub master_settings: MasterSettings,
    /// User intent: whether copying from this master is wanted at all.
    pub enabled_flag: bool,
    pub created_at: String,
    pub updated_at: String,
}

/// Master-side settings stored as a JSON blob inside the group row.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MasterSettings {
    /// Broker decoration the Master's raw symbols carry, stripped by the
    /// relay to obtain the canonical symbol.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub symbol_prefix: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub symbol_suffix: Option<String>,
    #[serde(default)]
    pub config_version: u32,
}
