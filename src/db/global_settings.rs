//! Fleet-wide settings singleton. Currently this is the VLogs shipping
//! config distributed to every EA on the global config topic; the relay
//! itself never ships logs there.

use serde::{Deserialize, Serialize};
use sqlx::Row;

use super::{with_busy_retry, Database, StoreResult};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VLogsSettings {
    pub enabled: bool,
    pub endpoint: String,
    pub log_level: String,
}

impl Default for VLogsSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            endpoint: String::new(),
            log_level: "INFO".to_string(),
        }
    }
}

impl Database {
    /// Read the singleton, materializing the default row on first access.
    pub async fn get_vlogs_settings(&self) -> StoreResult<VLogsSettings> {
        with_busy_retry(|| {
            sqlx::query("INSERT OR IGNORE INTO global_settings (id) VALUES (1)")
                .execute(&self.pool)
        })
        .await?;

        let row = sqlx::query(
            "SELECT vlogs_enabled, vlogs_endpoint, vlogs_log_level
             FROM global_settings WHERE id = 1",
        )
        .fetch_one(&self.pool)
        .await?;

        Ok(VLogsSettings {
            enabled: row.get::<i64, _>("vlogs_enabled") != 0,
            endpoint: row.get("vlogs_endpoint"),
            log_level: row.get("vlogs_log_level"),
        })
    }

    pub async fn update_vlogs_settings(
        &self,
        settings: &VLogsSettings,
    ) -> StoreResult<VLogsSettings> {
        with_busy_retry(|| {
            sqlx::query(
                "INSERT INTO global_settings (id, vlogs_enabled, vlogs_endpoint, vlogs_log_level)
                 VALUES (1, ?, ?, ?)
                 ON CONFLICT(id) DO UPDATE SET
                     vlogs_enabled = excluded.vlogs_enabled,
                     vlogs_endpoint = excluded.vlogs_endpoint,
                     vlogs_log_level = excluded.vlogs_log_level,
                     updated_at = CURRENT_TIMESTAMP",
            )
            .bind(settings.enabled as i64)
            .bind(&settings.endpoint)
            .bind(&settings.log_level)
            .execute(&self.pool)
        })
        .await?;

        self.get_vlogs_settings().await
    }
}
