//! TradeGroup persistence. Groups are keyed by the master account id and
//! carry their settings as a JSON blob plus the user-intent flag as a
//! dedicated column. Version bumps happen inside the UPDATE statement
//! itself (reading the stored blob via json_extract), so two racing writers
//! can never lose an increment.

use sqlx::Row;

use super::{with_busy_retry, Database, StoreError, StoreResult};
use crate::models::{MasterSettings, TradeGroup};

fn group_from_row(row: &sqlx::sqlite::SqliteRow) -> StoreResult<TradeGroup> {
    let settings_json: String = row.get("master_settings");
    Ok(TradeGroup {
        id: row.get("id"),
        master_settings: serde_json::from_str(&settings_json)?,
        enabled_flag: row.get::<i64, _>("enabled_flag") != 0,
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    })
}

impl Database {
    /// Create a group for a master account if it does not exist yet.
    /// Idempotent: a second call returns the existing record untouched.
    pub async fn create_trade_group(&self, master_account: &str) -> StoreResult<TradeGroup> {
        let settings_json = serde_json::to_string(&MasterSettings::default())?;
        with_busy_retry(|| {
            sqlx::query(
                "INSERT OR IGNORE INTO trade_groups (id, master_settings, enabled_flag)
                 VALUES (?, ?, 1)",
            )
            .bind(master_account)
            .bind(&settings_json)
            .execute(&self.pool)
        })
        .await?;

        self.get_trade_group(master_account)
            .await?
            .ok_or(StoreError::NotFound("trade group"))
    }

    pub async fn get_trade_group(&self, master_account: &str) -> StoreResult<Option<TradeGroup>> {
        let row = sqlx::query(
            "SELECT id, master_settings, enabled_flag, created_at, updated_at
             FROM trade_groups WHERE id = ?",
        )
        .bind(master_account)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(group_from_row).transpose()
    }

    pub async fn list_trade_groups(&self) -> StoreResult<Vec<TradeGroup>> {
        let rows = sqlx::query(
            "SELECT id, master_settings, enabled_flag, created_at, updated_at
             FROM trade_groups ORDER BY id",
        )
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(group_from_row).collect()
    }

    /// Replace the master settings. The stored config version is read and
    /// incremented inside the statement, so the emitted snapshots stay
    /// monotonic no matter what version the caller sent.
    pub async fn update_master_settings(
        &self,
        master_account: &str,
        settings: MasterSettings,
    ) -> StoreResult<TradeGroup> {
        let settings_json = serde_json::to_string(&settings)?;

        let result = with_busy_retry(|| {
            sqlx::query(
                "UPDATE trade_groups
                 SET master_settings = json_set(
                         ?,
                         '$.config_version',
                         COALESCE(json_extract(master_settings, '$.config_version'), 0) + 1
                     ),
                     updated_at = CURRENT_TIMESTAMP
                 WHERE id = ?",
            )
            .bind(&settings_json)
            .bind(master_account)
            .execute(&self.pool)
        })
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound("trade group"));
        }

        self.get_trade_group(master_account)
            .await?
            .ok_or(StoreError::NotFound("trade group"))
    }

    /// Set the user intent flag. The guard in the statement makes the write
    /// fire only on a real flip, so a repeated toggle changes nothing and
    /// bumps nothing. Returns the record and whether anything changed.
    pub async fn set_trade_group_enabled(
        &self,
        master_account: &str,
        enabled: bool,
    ) -> StoreResult<(TradeGroup, bool)> {
        let result = with_busy_retry(|| {
            sqlx::query(
                "UPDATE trade_groups
                 SET enabled_flag = ?,
                     master_settings = json_set(
                         master_settings,
                         '$.config_version',
                         COALESCE(json_extract(master_settings, '$.config_version'), 0) + 1
                     ),
                     updated_at = CURRENT_TIMESTAMP
                 WHERE id = ? AND enabled_flag <> ?",
            )
            .bind(enabled as i64)
            .bind(master_account)
            .bind(enabled as i64)
            .execute(&self.pool)
        })
        .await?;

        let group = self
            .get_trade_group(master_account)
            .await?
            .ok_or(StoreError::NotFound("trade group"))?;
        Ok((group, result.rows_affected() > 0))
    }

    /// Delete the group and, via the FK cascade, every member in it.
    pub async fn delete_trade_group(&self, master_account: &str) -> StoreResult<()> {
        let result = with_busy_retry(|| {
            sqlx::query("DELETE FROM trade_groups WHERE id = ?")
                .bind(master_account)
                .execute(&self.pool)
        })
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound("trade group"));
        }
        Ok(())
    }
}
