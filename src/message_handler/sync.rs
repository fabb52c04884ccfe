//! Position sync relay. SyncRequests travel Slave→Master, snapshots travel
//! back Master→Slave, both over `sync/{master}/{slave}` topics. The relay
//! never transforms snapshot payloads; Masters send pre-cleaned symbols.

use super::MessageHandler;
use crate::wire::{self, PositionSnapshotMessage, SyncRequestMessage};

impl MessageHandler {
    pub(super) async fn handle_sync_request(&self, request: SyncRequestMessage) {
        tracing::info!(
            slave_account = %request.slave_account,
            master_account = %request.master_account,
            "processing sync request"
        );

        // Only members of the addressed group may request a sync.
        match self
            .db
            .get_member(&request.master_account, &request.slave_account)
            .await
        {
            Ok(Some(_)) => {}
            Ok(None) => {
                tracing::warn!(
                    slave_account = %request.slave_account,
                    master_account = %request.master_account,
                    "sync request from non-member rejected"
                );
                return;
            }
            Err(err) => {
                tracing::error!(
                    master_account = %request.master_account,
                    error = %err,
                    "failed to verify sync request membership"
                );
                return;
            }
        }

        let topic = wire::sync_topic(&request.master_account, &request.slave_account);
        self.feed.relay(&topic, &request);
    }

    pub(super) async fn handle_position_snapshot(&self, snapshot: PositionSnapshotMessage) {
        tracing::info!(
            source_account = %snapshot.source_account,
            positions = snapshot.positions.len(),
            "relaying position snapshot"
        );

        let members = match self.db.list_members_of(&snapshot.source_account).await {
            Ok(members) => members,
            Err(err) => {
                tracing::error!(
                    source_account = %snapshot.source_account,
                    error = %err,
                    "failed to load members for snapshot relay"
                );
                return;
            }
        };

        if members.is_empty() {
            tracing::debug!(
                source_account = %snapshot.source_account,
                "no members to relay snapshot to"
            );
            return;
        }

        // The snapshot does not address a slave; relay it on every member's
        // sync topic and let slaves ignore snapshots they did not ask for.
        for member in &members {
            let topic = wire::sync_topic(&snapshot.source_account, &member.slave_account);
            self.feed.relay(&topic, &snapshot);
        }
    }
}
