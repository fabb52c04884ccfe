//! RequestConfig path: the EA suspects it missed a publish, so re-evaluate
//! and re-publish its snapshot(s), plus the fleet-wide settings.

use super::MessageHandler;
use crate::wire::RequestConfigMessage;

impl MessageHandler {
    pub(super) async fn handle_request_config(&self, msg: RequestConfigMessage) {
        tracing::info!(
            account_id = %msg.account_id,
            role = ?msg.role,
            "config requested"
        );

        self.status
            .publish_configs_for(&msg.account_id, msg.role)
            .await;

        match self.db.get_vlogs_settings().await {
            Ok(settings) => self.feed.publish_vlogs(&settings),
            Err(err) => {
                tracing::error!(error = %err, "failed to load vlogs settings for config request")
            }
        }
    }
}
