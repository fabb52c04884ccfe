//! Unregister path: mark the connection gone and recompute the members it
//! was holding up.

use super::MessageHandler;
use crate::wire::UnregisterMessage;

impl MessageHandler {
    pub(super) async fn handle_unregister(&self, msg: UnregisterMessage) {
        let account_id = &msg.account_id;

        let Some(role) = self.connections.mark_unregistered(account_id).await else {
            tracing::debug!(account_id = %account_id, "unregister for unknown account");
            return;
        };

        let _ = self.events.send(format!("ea_disconnected:{}", account_id));
        self.status.handle_connection_event(account_id, role).await;
    }
}
