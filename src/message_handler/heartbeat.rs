//! Heartbeat path: registry upsert, Master auto-provisioning, and the
//! config pushes owed to a freshly (re)connected EA.

use super::MessageHandler;
use crate::wire::{EaRole, HeartbeatMessage};

impl MessageHandler {
    pub(super) async fn handle_heartbeat(&self, msg: HeartbeatMessage) {
        let account_id = msg.account_id.clone();
        let role = msg.role;

        let effect = self.connections.update_from_heartbeat(&msg).await;

        // The first heartbeat from an unknown Master materializes its
        // TradeGroup with default settings.
        if role == EaRole::Master && effect.is_new {
            if let Err(err) = self.db.create_trade_group(&account_id).await {
                tracing::error!(
                    master_account = %account_id,
                    error = %err,
                    "failed to auto-provision trade group"
                );
            }
        }

        if effect.is_new {
            let _ = self.events.send(format!("ea_connected:{}", account_id));

            // A new subscriber missed everything published before it
            // connected: hand it its config and the fleet-wide settings.
            self.status.publish_configs_for(&account_id, role).await;
            match self.db.get_vlogs_settings().await {
                Ok(settings) => self.feed.publish_vlogs(&settings),
                Err(err) => {
                    tracing::error!(error = %err, "failed to load vlogs settings for new EA")
                }
            }
        }

        if effect.needs_evaluation() {
            self.status.handle_connection_event(&account_id, role).await;
        }
    }
}
