//! Orchestration around the pure evaluator: locate the members affected by
//! an event, recompute them, persist what changed and republish config.
//!
//! A master-side change ripples further than its own group: every slave in
//! the group may belong to other groups, and those member rows embed the
//! same cluster snapshot, so they are recomputed too.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::broadcast;

use super::engine::{
    evaluate_master_status, evaluate_slave_status, ClusterSnapshot, MasterClusterEntry,
    MasterEvaluation, MasterInput, SlaveInput,
};
use super::metrics::RuntimeStatusMetrics;
use crate::config_feed::ConfigFeed;
use crate::connection_manager::ConnectionManager;
use crate::db::{Database, StoreResult};
use crate::models::{TradeGroup, TradeGroupMember, STATUS_MANUAL_OFF};
use crate::wire::EaRole;

/// Master evaluations computed once per recompute pass.
type MasterEvalCache = HashMap<String, Option<(TradeGroup, MasterEvaluation)>>;

pub struct StatusService {
    db: Arc<Database>,
    connections: Arc<ConnectionManager>,
    feed: Arc<ConfigFeed>,
    metrics: Arc<RuntimeStatusMetrics>,
    events: broadcast::Sender<String>,
}

impl StatusService {
    pub fn new(
        db: Arc<Database>,
        connections: Arc<ConnectionManager>,
        feed: Arc<ConfigFeed>,
        metrics: Arc<RuntimeStatusMetrics>,
        events: broadcast::Sender<String>,
    ) -> Self {
        Self {
            db,
            connections,
            feed,
            metrics,
            events,
        }
    }

    pub fn metrics(&self) -> &RuntimeStatusMetrics {
        &self.metrics
    }

    /// Evaluate one master from intent + liveness. `None` means the group
    /// could not be loaded (missing or store failure).
    pub async fn evaluate_master(
        &self,
        master_account: &str,
    ) -> Option<(TradeGroup, MasterEvaluation)> {
        let group = match self.db.get_trade_group(master_account).await {
            Ok(Some(group)) => group,
            Ok(None) => {
                tracing::debug!(
                    master_account = %master_account,
                    "no trade group for master evaluation"
                );
                self.metrics.record_master_eval_failure();
                return None;
            }
            Err(err) => {
                tracing::error!(
                    master_account = %master_account,
                    error = %err,
                    "failed to load trade group for master evaluation"
                );
                crate::db::escalate_if_fatal(&err);
                self.metrics.record_master_eval_failure();
                return None;
            }
        };

        let connection = self.connections.get(master_account).await;
        let input = MasterInput {
            enabled_flag: group.enabled_flag,
            is_online: connection.as_ref().map(|c| c.is_online()).unwrap_or(false),
            is_trade_allowed: connection
                .as_ref()
                .map(|c| c.is_trade_allowed)
                .unwrap_or(false),
        };
        let evaluation = evaluate_master_status(input);
        self.metrics.record_master_eval_success();

        tracing::debug!(
            target: "status_engine",
            master_account = %master_account,
            status = evaluation.status,
            warnings = ?evaluation.warning_codes,
            "evaluated master status"
        );

        Some((group, evaluation))
    }

    async fn evaluate_master_cached(
        &self,
        cache: &mut MasterEvalCache,
        master_account: &str,
    ) -> Option<(TradeGroup, MasterEvaluation)> {
        if let Some(cached) = cache.get(master_account) {
            return cached.clone();
        }
        let result = self.evaluate_master(master_account).await;
        cache.insert(master_account.to_string(), result.clone());
        result
    }

    /// Statuses of every master the slave belongs to. Masters whose group
    /// row cannot be loaded count as ManualOff rather than vanishing, so a
    /// store hiccup degrades rather than falsely connects.
    async fn cluster_for(
        &self,
        cache: &mut MasterEvalCache,
        slave_account: &str,
    ) -> StoreResult<ClusterSnapshot> {
        let masters = self.db.list_masters_of(slave_account).await?;
        let mut entries = Vec::with_capacity(masters.len());
        for master in masters {
            let status = match self.evaluate_master_cached(cache, &master).await {
                Some((_, evaluation)) => evaluation.status,
                None => STATUS_MANUAL_OFF,
            };
            entries.push(MasterClusterEntry {
                master_account: master,
                status,
            });
        }
        Ok(ClusterSnapshot::new(entries))
    }

    async fn evaluate_member(
        &self,
        cache: &mut MasterEvalCache,
        member: &TradeGroupMember,
    ) -> StoreResult<(super::SlaveEvaluation, usize)> {
        let cluster = self.cluster_for(cache, &member.slave_account).await?;
        let connection = self.connections.get(&member.slave_account).await;
        let input = SlaveInput {
            enabled_flag: member.enabled_flag,
            is_online: connection.as_ref().map(|c| c.is_online()).unwrap_or(false),
            is_trade_allowed: connection
                .as_ref()
                .map(|c| c.is_trade_allowed)
                .unwrap_or(false),
            cluster: &cluster,
        };
        let evaluation = evaluate_slave_status(input);
        self.metrics.record_slave_eval_success();

        tracing::debug!(
            target: "status_engine",
            slave_account = %member.slave_account,
            master_account = %member.trade_group_id,
            previous_status = member.runtime_status,
            status = evaluation.status,
            allow_new_orders = evaluation.allow_new_orders,
            cluster_size = cluster.masters.len(),
            warnings = ?evaluation.warning_codes,
            "evaluated member status"
        );

        Ok((evaluation, cluster.masters.len()))
    }

    /// Recompute one member; persist and republish only when the outcome
    /// moved. Returns whether anything changed.
    async fn reconcile_member(
        &self,
        cache: &mut MasterEvalCache,
        member: &TradeGroupMember,
    ) -> StoreResult<bool> {
        let (evaluation, cluster_size) = self.evaluate_member(cache, member).await?;

        let changed = self
            .db
            .update_runtime_status(
                &member.trade_group_id,
                &member.slave_account,
                evaluation.status,
                &evaluation.warning_codes,
            )
            .await?;

        if changed {
            if let Some(updated) = self
                .db
                .get_member(&member.trade_group_id, &member.slave_account)
                .await?
            {
                self.feed.publish_member(&updated, &evaluation);
                self.metrics.record_slave_bundle(cluster_size as u64);
                self.emit_member_event(&updated);
            }
        }

        Ok(changed)
    }

    /// Recompute every membership of a slave account.
    pub async fn refresh_slave(&self, slave_account: &str) {
        let mut cache = MasterEvalCache::new();
        self.refresh_slave_with_cache(&mut cache, slave_account).await;
    }

    async fn refresh_slave_with_cache(&self, cache: &mut MasterEvalCache, slave_account: &str) {
        let members = match self.db.list_members_for_slave(slave_account).await {
            Ok(members) => members,
            Err(err) => {
                tracing::error!(
                    slave_account = %slave_account,
                    error = %err,
                    "failed to load memberships for slave refresh"
                );
                crate::db::escalate_if_fatal(&err);
                self.metrics.record_slave_eval_failure();
                return;
            }
        };

        for member in &members {
            if let Err(err) = self.reconcile_member(cache, member).await {
                tracing::error!(
                    slave_account = %member.slave_account,
                    master_account = %member.trade_group_id,
                    error = %err,
                    "failed to reconcile member"
                );
                crate::db::escalate_if_fatal(&err);
                self.metrics.record_slave_eval_failure();
            }
        }
    }

    /// Recompute everything a master-side change can touch: the master's
    /// own config, the members of its group, and transitively every other
    /// membership of those slaves.
    pub async fn refresh_master(&self, master_account: &str) {
        let mut cache = MasterEvalCache::new();

        if let Some((group, evaluation)) =
            self.evaluate_master_cached(&mut cache, master_account).await
        {
            self.feed.publish_master(&group, &evaluation);
        }

        let members = match self.db.list_members_of(master_account).await {
            Ok(members) => members,
            Err(err) => {
                tracing::error!(
                    master_account = %master_account,
                    error = %err,
                    "failed to load members for master refresh"
                );
                return;
            }
        };

        let mut seen = std::collections::HashSet::new();
        for member in &members {
            if seen.insert(member.slave_account.clone()) {
                self.refresh_slave_with_cache(&mut cache, &member.slave_account)
                    .await;
            }
        }
    }

    /// Entry point for liveness transitions (heartbeat state change,
    /// timeout, unregister).
    pub async fn handle_connection_event(&self, account_id: &str, role: EaRole) {
        match role {
            EaRole::Master => self.refresh_master(account_id).await,
            EaRole::Slave => self.refresh_slave(account_id).await,
        }
    }

    /// Publish the master's current config unconditionally (RequestConfig
    /// path and UI mutations).
    pub async fn publish_master_config(&self, master_account: &str) -> bool {
        match self.evaluate_master(master_account).await {
            Some((group, evaluation)) => {
                self.feed.publish_master(&group, &evaluation);
                true
            }
            None => false,
        }
    }

    /// Evaluate, persist-if-changed and publish one member's config
    /// unconditionally.
    pub async fn publish_member_config(
        &self,
        master_account: &str,
        slave_account: &str,
    ) -> StoreResult<()> {
        let mut cache = MasterEvalCache::new();
        let member = self
            .db
            .get_member(master_account, slave_account)
            .await?
            .ok_or(crate::db::StoreError::NotFound("trade group member"))?;

        let (evaluation, cluster_size) = self.evaluate_member(&mut cache, &member).await?;
        self.db
            .update_runtime_status(
                master_account,
                slave_account,
                evaluation.status,
                &evaluation.warning_codes,
            )
            .await?;

        let current = self
            .db
            .get_member(master_account, slave_account)
            .await?
            .ok_or(crate::db::StoreError::NotFound("trade group member"))?;
        self.feed.publish_member(&current, &evaluation);
        self.metrics.record_slave_bundle(cluster_size as u64);
        Ok(())
    }

    /// Answer a RequestConfig: masters get their group config, slaves get
    /// one config per membership.
    pub async fn publish_configs_for(&self, account_id: &str, role: EaRole) {
        match role {
            EaRole::Master => {
                self.publish_master_config(account_id).await;
            }
            EaRole::Slave => {
                let members = match self.db.list_members_for_slave(account_id).await {
                    Ok(members) => members,
                    Err(err) => {
                        tracing::error!(
                            slave_account = %account_id,
                            error = %err,
                            "failed to load memberships for config request"
                        );
                        return;
                    }
                };
                if members.is_empty() {
                    tracing::debug!(
                        slave_account = %account_id,
                        "config requested but slave has no memberships"
                    );
                }
                for member in &members {
                    if let Err(err) = self
                        .publish_member_config(&member.trade_group_id, &member.slave_account)
                        .await
                    {
                        tracing::error!(
                            slave_account = %member.slave_account,
                            master_account = %member.trade_group_id,
                            error = %err,
                            "failed to publish member config"
                        );
                    }
                }
            }
        }
    }

    fn emit_member_event(&self, member: &TradeGroupMember) {
        if let Ok(json) = serde_json::to_string(member) {
            let _ = self.events.send(format!("member_updated:{}", json));
        }
    }
}
