//! Signal filtering and transformation. Pure: the message handler resolves
//! group + member rows and asks the engine what (if anything) to publish
//! for each member.
//!
//! The relay deliberately leaves lot sizing, retries, slippage and sync
//! execution to the slave side; only symbol identity and direction are
//! rewritten here.

use crate::models::{MasterSettings, SlaveSettings, TradeGroupMember, TradeGroup};
use crate::wire::{SymbolMapping, TradeAction, TradeSignal};

/// Strips the master's broker decoration and applies the slave's.
/// `canonical` and `finalize` bracket the filter/mapping steps, which all
/// operate on the canonical symbol.
#[derive(Debug, Clone, Default)]
pub struct SymbolPipeline {
    strip_prefix: Option<String>,
    strip_suffix: Option<String>,
    add_prefix: Option<String>,
    add_suffix: Option<String>,
}

impl SymbolPipeline {
    pub fn from_settings(master: &MasterSettings, slave: &SlaveSettings) -> Self {
        Self {
            strip_prefix: master.symbol_prefix.clone(),
            strip_suffix: master.symbol_suffix.clone(),
            add_prefix: slave.symbol_prefix.clone(),
            add_suffix: slave.symbol_suffix.clone(),
        }
    }

    /// Remove the master affixes where they actually occur. Idempotent for
    /// affixes that cannot stack.
    pub fn canonical(&self, raw: &str) -> String {
        let mut symbol = raw;
        if let Some(prefix) = self.strip_prefix.as_deref() {
            if !prefix.is_empty() {
                symbol = symbol.strip_prefix(prefix).unwrap_or(symbol);
            }
        }
        if let Some(suffix) = self.strip_suffix.as_deref() {
            if !suffix.is_empty() {
                symbol = symbol.strip_suffix(suffix).unwrap_or(symbol);
            }
        }
        symbol.to_string()
    }

    /// Decorate a (possibly mapped) canonical symbol for the slave broker.
    pub fn finalize(&self, symbol: String) -> String {
        let prefix = self.add_prefix.as_deref().unwrap_or("");
        let suffix = self.add_suffix.as_deref().unwrap_or("");
        format!("{}{}{}", prefix, symbol, suffix)
    }
}

/// First matching mapping wins; comparison is case-sensitive.
fn apply_mapping(symbol: String, mappings: &[SymbolMapping]) -> String {
    mappings
        .iter()
        .find(|mapping| mapping.source_symbol == symbol)
        .map(|mapping| mapping.target_symbol.clone())
        .unwrap_or(symbol)
}

pub struct CopyEngine;

impl CopyEngine {
    pub fn new() -> Self {
        Self
    }

    /// Run the whole per-member pipeline. `None` means the signal is not
    /// for this member; `Some` carries the payload ready for
    /// `trade/{master}/{slave}`.
    pub fn prepare(
        &self,
        signal: &TradeSignal,
        group: &TradeGroup,
        member: &TradeGroupMember,
    ) -> Option<TradeSignal> {
        // Eligibility gate: Connected implies the whole cluster is up and
        // therefore allow_new_orders.
        if !member.is_connected() {
            tracing::debug!(
                slave_account = %member.slave_account,
                runtime_status = member.runtime_status,
                "member not connected, skipping signal"
            );
            return None;
        }

        let settings = &member.slave_settings;
        let pipeline = SymbolPipeline::from_settings(&group.master_settings, settings);

        if signal.action == TradeAction::Open {
            if let Some(order_type) = signal.order_type {
                if order_type.is_pending() && !settings.copy_pending_orders {
                    tracing::debug!(
                        slave_account = %member.slave_account,
                        "pending orders are not copied for this member"
                    );
                    return None;
                }
            }
        }

        let canonical = signal.symbol.as_deref().map(|raw| pipeline.canonical(raw));

        if signal.action == TradeAction::Open {
            // Source-lot bounds check the master's original size, before
            // any slave-side sizing.
            if let Some(lots) = signal.lots {
                if let Some(min) = settings.source_lot_min {
                    if lots < min {
                        tracing::debug!(lots, min, "source lots below minimum");
                        return None;
                    }
                }
                if let Some(max) = settings.source_lot_max {
                    if lots > max {
                        tracing::debug!(lots, max, "source lots above maximum");
                        return None;
                    }
                }
            }

            if let Some(symbol) = canonical.as_deref() {
                if let Some(allowed) = &settings.filters.allowed_symbols {
                    if !allowed.is_empty() && !allowed.iter().any(|s| s == symbol) {
                        tracing::debug!(symbol, "symbol not in allow list");
                        return None;
                    }
                }
                if let Some(blocked) = &settings.filters.blocked_symbols {
                    if blocked.iter().any(|s| s == symbol) {
                        tracing::debug!(symbol, "symbol is blocked");
                        return None;
                    }
                }
            }

            // Absent magic number filters as 0.
            let magic = signal.magic_number.unwrap_or(0);
            if let Some(allowed) = &settings.filters.allowed_magic_numbers {
                if !allowed.is_empty() && !allowed.contains(&magic) {
                    tracing::debug!(magic, "magic number not in allow list");
                    return None;
                }
            }
            if let Some(blocked) = &settings.filters.blocked_magic_numbers {
                if blocked.contains(&magic) {
                    tracing::debug!(magic, "magic number is blocked");
                    return None;
                }
            }
        }

        let mut out = signal.clone();

        if let Some(symbol) = canonical {
            let mapped = apply_mapping(symbol, &settings.symbol_mappings);
            out.symbol = Some(pipeline.finalize(mapped));
        }

        if settings.reverse_trade {
            // Only the order type flips; SL/TP prices travel unchanged and
            // the slave re-interprets sides for the reversed direction.
            out.order_type = signal.order_type.map(|t| t.reversed());
        }

        Some(out)
    }
}

impl Default for CopyEngine {
    fn default() -> Self {
        Self::new()
    }
}
