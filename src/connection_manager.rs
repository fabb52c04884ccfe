//! In-memory registry of live EAs, keyed by account id. The map is the only
//! shared state; every operation takes the lock briefly and never performs
//! I/O while holding it.

use std::collections::HashMap;

use chrono::{DateTime, Duration, Utc};
use tokio::sync::RwLock;

use crate::models::{ConnectionStatus, EaConnection};
use crate::wire::{EaRole, HeartbeatMessage};

/// What a heartbeat did to the registry. The caller uses this to decide
/// whether to push config and to nudge the status evaluator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeartbeatEffect {
    /// First heartbeat from this account since it was last evicted.
    pub is_new: bool,
    /// The entry left Offline/Timeout and is Online again.
    pub came_online: bool,
    /// The terminal's auto-trading switch flipped.
    pub trade_allowed_changed: bool,
}

impl HeartbeatEffect {
    /// True when the runtime status of dependent members may have moved.
    pub fn needs_evaluation(&self) -> bool {
        self.is_new || self.came_online || self.trade_allowed_changed
    }
}

pub struct ConnectionManager {
    connections: RwLock<HashMap<String, EaConnection>>,
    timeout_seconds: i64,
    /// How long a Timeout/Offline entry lingers before eviction.
    offline_grace_seconds: i64,
}

impl ConnectionManager {
    pub fn new(timeout_seconds: i64, offline_grace_seconds: i64) -> Self {
        Self {
            connections: RwLock::new(HashMap::new()),
            timeout_seconds,
            offline_grace_seconds,
        }
    }

    /// Upsert from a heartbeat. Unknown accounts are materialized from the
    /// heartbeat fields (auto-registration).
    pub async fn update_from_heartbeat(&self, msg: &HeartbeatMessage) -> HeartbeatEffect {
        self.update_from_heartbeat_at(msg, Utc::now()).await
    }

    pub async fn update_from_heartbeat_at(
        &self,
        msg: &HeartbeatMessage,
        now: DateTime<Utc>,
    ) -> HeartbeatEffect {
        let mut connections = self.connections.write().await;

        match connections.get_mut(&msg.account_id) {
            Some(conn) => {
                let was_online = conn.is_online();
                let trade_allowed_changed = conn.is_trade_allowed != msg.is_trade_allowed;
                conn.refresh(msg, now);
                HeartbeatEffect {
                    is_new: false,
                    came_online: !was_online,
                    trade_allowed_changed,
                }
            }
            None => {
                tracing::info!(
                    account_id = %msg.account_id,
                    role = ?msg.role,
                    platform = ?msg.platform,
                    broker = %msg.broker,
                    "registering EA from first heartbeat"
                );
                connections.insert(
                    msg.account_id.clone(),
                    EaConnection::from_heartbeat(msg, now),
                );
                HeartbeatEffect {
                    is_new: true,
                    came_online: true,
                    trade_allowed_changed: false,
                }
            }
        }
    }

    /// Mark an account gone after an explicit Unregister. The entry stays
    /// visible as Offline until the grace sweep evicts it.
    pub async fn mark_unregistered(&self, account_id: &str) -> Option<EaRole> {
        let mut connections = self.connections.write().await;
        let conn = connections.get_mut(account_id)?;
        conn.status = ConnectionStatus::Offline;
        tracing::info!(account_id = %account_id, role = ?conn.role, "EA unregistered");
        Some(conn.role)
    }

    /// Flip stale Online entries to Timeout and evict entries that have been
    /// quiet past the grace period. Returns the accounts that timed out in
    /// this pass so the evaluator can recompute their members.
    pub async fn sweep_timeouts(&self) -> Vec<(String, EaRole)> {
        self.sweep_timeouts_at(Utc::now()).await
    }

    pub async fn sweep_timeouts_at(&self, now: DateTime<Utc>) -> Vec<(String, EaRole)> {
        let timeout = Duration::seconds(self.timeout_seconds);
        let eviction = Duration::seconds(self.timeout_seconds + self.offline_grace_seconds);

        let mut connections = self.connections.write().await;
        let mut timed_out = Vec::new();

        connections.retain(|account_id, conn| {
            let silent_for = now.signed_duration_since(conn.last_heartbeat);
            match conn.status {
                ConnectionStatus::Online if silent_for > timeout => {
                    tracing::warn!(
                        account_id = %account_id,
                        silent_secs = silent_for.num_seconds(),
                        "EA heartbeat timed out"
                    );
                    conn.status = ConnectionStatus::Timeout;
                    timed_out.push((account_id.clone(), conn.role));
                    true
                }
                ConnectionStatus::Timeout | ConnectionStatus::Offline if silent_for > eviction => {
                    tracing::info!(account_id = %account_id, "evicting stale EA connection");
                    false
                }
                _ => true,
            }
        });

        timed_out
    }

    pub async fn get(&self, account_id: &str) -> Option<EaConnection> {
        self.connections.read().await.get(account_id).cloned()
    }

    /// Snapshot of every tracked connection, for the UI and cluster queries.
    pub async fn snapshot(&self) -> Vec<EaConnection> {
        let mut all: Vec<EaConnection> =
            self.connections.read().await.values().cloned().collect();
        all.sort_by(|a, b| a.account_id.cmp(&b.account_id));
        all
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wire::Platform;

    fn heartbeat(account_id: &str, role: EaRole) -> HeartbeatMessage {
        HeartbeatMessage {
            message_type: "Heartbeat".to_string(),
            account_id: account_id.to_string(),
            role,
            platform: Platform::MT4,
            account_number: 12345,
            broker: "IC Markets".to_string(),
            account_name: "Main".to_string(),
            server: "ICMarkets-Live".to_string(),
            balance: 10_000.0,
            equity: 10_000.0,
            currency: "USD".to_string(),
            leverage: 100,
            open_positions: 0,
            is_trade_allowed: true,
            timestamp: Utc::now().to_rfc3339(),
            version: "test".to_string(),
            symbol_prefix: None,
            symbol_suffix: None,
        }
    }

    #[tokio::test]
    async fn first_heartbeat_registers_the_account() {
        let manager = ConnectionManager::new(30, 300);
        let effect = manager
            .update_from_heartbeat(&heartbeat("M1", EaRole::Master))
            .await;

        assert!(effect.is_new);
        assert!(effect.needs_evaluation());

        let conn = manager.get("M1").await.unwrap();
        assert_eq!(conn.status, ConnectionStatus::Online);
        assert_eq!(conn.role, EaRole::Master);
    }

    #[tokio::test]
    async fn repeated_heartbeat_refreshes_balances() {
        let manager = ConnectionManager::new(30, 300);
        manager
            .update_from_heartbeat(&heartbeat("M1", EaRole::Master))
            .await;

        let mut next = heartbeat("M1", EaRole::Master);
        next.balance = 12_000.0;
        next.equity = 11_500.0;
        next.open_positions = 3;
        let effect = manager.update_from_heartbeat(&next).await;

        assert!(!effect.is_new);
        assert!(!effect.needs_evaluation());

        let conn = manager.get("M1").await.unwrap();
        assert_eq!(conn.balance, 12_000.0);
        assert_eq!(conn.equity, 11_500.0);
        assert_eq!(conn.open_positions, 3);
    }

    #[tokio::test]
    async fn trade_allowed_transition_is_reported() {
        let manager = ConnectionManager::new(30, 300);
        manager
            .update_from_heartbeat(&heartbeat("S1", EaRole::Slave))
            .await;

        let mut next = heartbeat("S1", EaRole::Slave);
        next.is_trade_allowed = false;
        let effect = manager.update_from_heartbeat(&next).await;

        assert!(effect.trade_allowed_changed);
        assert!(effect.needs_evaluation());
        assert!(!manager.get("S1").await.unwrap().is_trade_allowed);
    }

    #[tokio::test]
    async fn timeout_boundary_is_strict() {
        let manager = ConnectionManager::new(30, 300);
        let start = Utc::now();
        manager
            .update_from_heartbeat_at(&heartbeat("M1", EaRole::Master), start)
            .await;

        // Exactly at the threshold the EA is still considered online.
        let at_threshold = start + Duration::seconds(30);
        assert!(manager.sweep_timeouts_at(at_threshold).await.is_empty());
        assert_eq!(
            manager.get("M1").await.unwrap().status,
            ConnectionStatus::Online
        );

        // One second past it the EA times out.
        let past_threshold = start + Duration::seconds(31);
        let timed_out = manager.sweep_timeouts_at(past_threshold).await;
        assert_eq!(timed_out, vec![("M1".to_string(), EaRole::Master)]);
        assert_eq!(
            manager.get("M1").await.unwrap().status,
            ConnectionStatus::Timeout
        );
    }

    #[tokio::test]
    async fn heartbeat_after_timeout_comes_back_online() {
        let manager = ConnectionManager::new(30, 300);
        let start = Utc::now();
        manager
            .update_from_heartbeat_at(&heartbeat("M1", EaRole::Master), start)
            .await;
        manager.sweep_timeouts_at(start + Duration::seconds(40)).await;

        let effect = manager
            .update_from_heartbeat_at(&heartbeat("M1", EaRole::Master), start + Duration::seconds(41))
            .await;
        assert!(!effect.is_new);
        assert!(effect.came_online);
        assert_eq!(
            manager.get("M1").await.unwrap().status,
            ConnectionStatus::Online
        );
    }

    #[tokio::test]
    async fn stale_entries_are_evicted_after_the_grace_period() {
        let manager = ConnectionManager::new(30, 60);
        let start = Utc::now();
        manager
            .update_from_heartbeat_at(&heartbeat("M1", EaRole::Master), start)
            .await;

        manager.sweep_timeouts_at(start + Duration::seconds(40)).await;
        assert!(manager.get("M1").await.is_some());

        // timeout (30) + grace (60) = 90 seconds of silence, then gone.
        manager.sweep_timeouts_at(start + Duration::seconds(91)).await;
        assert!(manager.get("M1").await.is_none());
    }

    #[tokio::test]
    async fn unregister_marks_offline_until_evicted() {
        let manager = ConnectionManager::new(30, 60);
        let start = Utc::now();
        manager
            .update_from_heartbeat_at(&heartbeat("S1", EaRole::Slave), start)
            .await;

        let role = manager.mark_unregistered("S1").await;
        assert_eq!(role, Some(EaRole::Slave));
        assert_eq!(
            manager.get("S1").await.unwrap().status,
            ConnectionStatus::Offline
        );

        manager.sweep_timeouts_at(start + Duration::seconds(91)).await;
        assert!(manager.get("S1").await.is_none());
    }

    #[tokio::test]
    async fn unknown_unregister_is_ignored() {
        let manager = ConnectionManager::new(30, 60);
        assert!(manager.mark_unregistered("GHOST").await.is_none());
    }
}
