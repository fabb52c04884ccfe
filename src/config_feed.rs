//! Config snapshot assembly and publication. Builders are pure; the feed
//! wraps them around the publisher. Subscribers that miss a publish recover
//! through the RequestConfig path, so sends are never retried here.

use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::db::VLogsSettings;
use crate::models::{TradeGroup, TradeGroupMember};
use crate::status::{MasterEvaluation, SlaveEvaluation};
use crate::wire::{
    self, MasterConfigMessage, SlaveConfigMessage, VLogsConfigMessage, GLOBAL_CONFIG_TOPIC,
};
use crate::zeromq::ZmqPublisher;

pub struct ConfigFeed {
    publisher: Arc<ZmqPublisher>,
}

impl ConfigFeed {
    pub fn new(publisher: Arc<ZmqPublisher>) -> Self {
        Self { publisher }
    }

    pub fn master_config(
        group: &TradeGroup,
        evaluation: &MasterEvaluation,
        now: DateTime<Utc>,
    ) -> MasterConfigMessage {
        MasterConfigMessage {
            account_id: group.id.clone(),
            status: evaluation.status,
            symbol_prefix: group.master_settings.symbol_prefix.clone(),
            symbol_suffix: group.master_settings.symbol_suffix.clone(),
            config_version: group.master_settings.config_version,
            warning_codes: evaluation.warning_codes.clone(),
            timestamp: now.to_rfc3339(),
        }
    }

    pub fn slave_config(
        member: &TradeGroupMember,
        evaluation: &SlaveEvaluation,
        now: DateTime<Utc>,
    ) -> SlaveConfigMessage {
        let settings = &member.slave_settings;
        SlaveConfigMessage {
            account_id: member.slave_account.clone(),
            master_account: member.trade_group_id.clone(),
            trade_group_id: member.trade_group_id.clone(),
            status: evaluation.status,
            lot_calculation_mode: settings.lot_calculation_mode,
            lot_multiplier: settings.lot_multiplier,
            reverse_trade: settings.reverse_trade,
            symbol_prefix: settings.symbol_prefix.clone(),
            symbol_suffix: settings.symbol_suffix.clone(),
            symbol_mappings: settings.symbol_mappings.clone(),
            filters: settings.filters.clone(),
            source_lot_min: settings.source_lot_min,
            source_lot_max: settings.source_lot_max,
            sync_mode: settings.sync_mode,
            limit_order_expiry_min: settings.limit_order_expiry_min,
            market_sync_max_pips: settings.market_sync_max_pips,
            max_slippage: settings.max_slippage,
            max_retries: settings.max_retries,
            max_signal_delay_ms: settings.max_signal_delay_ms,
            use_pending_order_for_delayed: settings.use_pending_order_for_delayed,
            copy_pending_orders: settings.copy_pending_orders,
            allow_new_orders: evaluation.allow_new_orders,
            warning_codes: evaluation.warning_codes.clone(),
            config_version: member.config_version,
            timestamp: now.to_rfc3339(),
        }
    }

    pub fn vlogs_config(settings: &VLogsSettings, now: DateTime<Utc>) -> VLogsConfigMessage {
        VLogsConfigMessage {
            enabled: settings.enabled,
            endpoint: settings.endpoint.clone(),
            log_level: settings.log_level.clone(),
            timestamp: now.to_rfc3339(),
        }
    }

    pub fn publish_master(&self, group: &TradeGroup, evaluation: &MasterEvaluation) {
        let config = Self::master_config(group, evaluation, Utc::now());
        let topic = wire::config_topic(&config.account_id);
        if let Err(err) = self.publisher.publish(&topic, &config) {
            tracing::error!(topic = %topic, error = %err, "failed to publish master config");
        } else {
            tracing::info!(
                master_account = %config.account_id,
                status = config.status,
                config_version = config.config_version,
                "published master config"
            );
        }
    }

    pub fn publish_member(&self, member: &TradeGroupMember, evaluation: &SlaveEvaluation) {
        let config = Self::slave_config(member, evaluation, Utc::now());
        let topic = wire::config_topic(&config.account_id);
        if let Err(err) = self.publisher.publish(&topic, &config) {
            tracing::error!(topic = %topic, error = %err, "failed to publish slave config");
        } else {
            tracing::info!(
                slave_account = %config.account_id,
                master_account = %config.master_account,
                status = config.status,
                allow_new_orders = config.allow_new_orders,
                config_version = config.config_version,
                "published slave config"
            );
        }
    }

    pub fn publish_vlogs(&self, settings: &VLogsSettings) {
        let config = Self::vlogs_config(settings, Utc::now());
        if let Err(err) = self.publisher.publish(GLOBAL_CONFIG_TOPIC, &config) {
            tracing::error!(error = %err, "failed to publish vlogs config");
        } else {
            tracing::info!(
                enabled = config.enabled,
                endpoint = %config.endpoint,
                "published vlogs config to the fleet"
            );
        }
    }

    /// Relay a raw payload on an arbitrary topic (sync protocol traffic).
    pub fn relay<T: serde::Serialize>(&self, topic: &str, payload: &T) {
        if let Err(err) = self.publisher.publish(topic, payload) {
            tracing::error!(topic = %topic, error = %err, "failed to relay message");
        }
    }
}
