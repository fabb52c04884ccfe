//! Trade signal path: fan a Master's signal out to every eligible member,
//! transformed per member, preserving arrival order.

use super::MessageHandler;
use crate::wire::{self, TradeSignal};

impl MessageHandler {
    pub(super) async fn handle_trade_signal(&self, signal: TradeSignal) {
        tracing::info!(
            source_account = %signal.source_account,
            action = ?signal.action,
            ticket = signal.ticket,
            "processing trade signal"
        );

        let group = match self.db.get_trade_group(&signal.source_account).await {
            Ok(Some(group)) => group,
            Ok(None) => {
                tracing::warn!(
                    source_account = %signal.source_account,
                    "trade signal from account without a trade group"
                );
                return;
            }
            Err(err) => {
                tracing::error!(
                    source_account = %signal.source_account,
                    error = %err,
                    "failed to load trade group for signal"
                );
                crate::db::escalate_if_fatal(&err);
                return;
            }
        };

        let members = match self.db.list_members_of(&signal.source_account).await {
            Ok(members) => members,
            Err(err) => {
                tracing::error!(
                    source_account = %signal.source_account,
                    error = %err,
                    "failed to load members for signal"
                );
                crate::db::escalate_if_fatal(&err);
                return;
            }
        };

        for member in &members {
            let Some(transformed) = self.copy_engine.prepare(&signal, &group, member) else {
                continue;
            };

            let topic = wire::trade_topic(&group.id, &member.slave_account);
            tracing::info!(
                slave_account = %member.slave_account,
                symbol = transformed.symbol.as_deref().unwrap_or("-"),
                topic = %topic,
                "copying trade to member"
            );
            self.feed.relay(&topic, &transformed);
        }
    }
}
