//! TradeGroupMember persistence. `(trade_group_id, slave_account)` is
//! unique; the same slave account may appear under any number of groups.

use sqlx::Row;

use super::{with_busy_retry, Database, StoreError, StoreResult};
use crate::models::{SlaveSettings, TradeGroupMember};
use crate::wire::WarningCode;

fn member_from_row(row: &sqlx::sqlite::SqliteRow) -> StoreResult<TradeGroupMember> {
    let settings_json: String = row.get("slave_settings");
    let warnings_json: String = row.get("warning_codes");
    Ok(TradeGroupMember {
        id: row.get("id"),
        trade_group_id: row.get("trade_group_id"),
        slave_account: row.get("slave_account"),
        slave_settings: serde_json::from_str(&settings_json)?,
        enabled_flag: row.get::<i64, _>("enabled_flag") != 0,
        runtime_status: row.get("runtime_status"),
        warning_codes: serde_json::from_str(&warnings_json)?,
        config_version: row.get::<i64, _>("config_version") as u32,
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    })
}

const MEMBER_COLUMNS: &str = "id, trade_group_id, slave_account, slave_settings, enabled_flag,
     runtime_status, warning_codes, config_version, created_at, updated_at";

impl Database {
    /// Add a slave to a group. Fails NotFound when the group is missing and
    /// Conflict when the pairing already exists.
    pub async fn add_member(
        &self,
        master_account: &str,
        slave_account: &str,
        settings: SlaveSettings,
    ) -> StoreResult<TradeGroupMember> {
        if self.get_trade_group(master_account).await?.is_none() {
            return Err(StoreError::NotFound("trade group"));
        }

        let settings_json = serde_json::to_string(&settings)?;
        let result = with_busy_retry(|| {
            sqlx::query(
                "INSERT INTO trade_group_members
                     (trade_group_id, slave_account, slave_settings, enabled_flag, runtime_status)
                 VALUES (?, ?, ?, 1, 0)",
            )
            .bind(master_account)
            .bind(slave_account)
            .bind(&settings_json)
            .execute(&self.pool)
        })
        .await;

        match result {
            Ok(_) => self
                .get_member(master_account, slave_account)
                .await?
                .ok_or(StoreError::NotFound("trade group member")),
            Err(err) if StoreError::is_unique_violation(&err) => Err(StoreError::Conflict(
                format!(
                    "slave {} is already a member of trade group {}",
                    slave_account, master_account
                ),
            )),
            Err(err) => Err(err.into()),
        }
    }

    pub async fn get_member(
        &self,
        master_account: &str,
        slave_account: &str,
    ) -> StoreResult<Option<TradeGroupMember>> {
        let row = sqlx::query(&format!(
            "SELECT {MEMBER_COLUMNS} FROM trade_group_members
             WHERE trade_group_id = ? AND slave_account = ?"
        ))
        .bind(master_account)
        .bind(slave_account)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(member_from_row).transpose()
    }

    /// All members of one group, ordered by slave account.
    pub async fn list_members_of(&self, master_account: &str) -> StoreResult<Vec<TradeGroupMember>> {
        let rows = sqlx::query(&format!(
            "SELECT {MEMBER_COLUMNS} FROM trade_group_members
             WHERE trade_group_id = ? ORDER BY slave_account"
        ))
        .bind(master_account)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(member_from_row).collect()
    }

    /// All master accounts a slave is subscribed to (its cluster).
    pub async fn list_masters_of(&self, slave_account: &str) -> StoreResult<Vec<String>> {
        let rows = sqlx::query(
            "SELECT DISTINCT trade_group_id FROM trade_group_members
             WHERE slave_account = ? ORDER BY trade_group_id",
        )
        .bind(slave_account)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.iter().map(|row| row.get("trade_group_id")).collect())
    }

    /// Every membership row of a slave across all groups, used when a
    /// cluster-wide recompute is needed.
    pub async fn list_members_for_slave(
        &self,
        slave_account: &str,
    ) -> StoreResult<Vec<TradeGroupMember>> {
        let rows = sqlx::query(&format!(
            "SELECT {MEMBER_COLUMNS} FROM trade_group_members
             WHERE slave_account = ? ORDER BY trade_group_id"
        ))
        .bind(slave_account)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(member_from_row).collect()
    }

    /// Replace the member settings and bump the config version.
    pub async fn update_member_settings(
        &self,
        master_account: &str,
        slave_account: &str,
        settings: SlaveSettings,
    ) -> StoreResult<TradeGroupMember> {
        let settings_json = serde_json::to_string(&settings)?;
        let result = with_busy_retry(|| {
            sqlx::query(
                "UPDATE trade_group_members
                 SET slave_settings = ?, config_version = config_version + 1,
                     updated_at = CURRENT_TIMESTAMP
                 WHERE trade_group_id = ? AND slave_account = ?",
            )
            .bind(&settings_json)
            .bind(master_account)
            .bind(slave_account)
            .execute(&self.pool)
        })
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound("trade group member"));
        }

        self.get_member(master_account, slave_account)
            .await?
            .ok_or(StoreError::NotFound("trade group member"))
    }

    /// Set the user intent flag. The guarded statement writes (and bumps
    /// the version) only on a real flip; repeating a toggle is a no-op on
    /// state. Returns the record and whether anything changed.
    pub async fn set_member_enabled(
        &self,
        master_account: &str,
        slave_account: &str,
        enabled: bool,
    ) -> StoreResult<(TradeGroupMember, bool)> {
        let result = with_busy_retry(|| {
            sqlx::query(
                "UPDATE trade_group_members
                 SET enabled_flag = ?, config_version = config_version + 1,
                     updated_at = CURRENT_TIMESTAMP
                 WHERE trade_group_id = ? AND slave_account = ? AND enabled_flag <> ?",
            )
            .bind(enabled as i64)
            .bind(master_account)
            .bind(slave_account)
            .bind(enabled as i64)
            .execute(&self.pool)
        })
        .await?;

        let member = self
            .get_member(master_account, slave_account)
            .await?
            .ok_or(StoreError::NotFound("trade group member"))?;
        Ok((member, result.rows_affected() > 0))
    }

    /// Record an evaluator result. Writes (and bumps the config version)
    /// only when the status or the warning set differ from what is stored;
    /// returns whether a write happened. Called only by the evaluator.
    pub async fn update_runtime_status(
        &self,
        master_account: &str,
        slave_account: &str,
        runtime_status: i32,
        warning_codes: &[WarningCode],
    ) -> StoreResult<bool> {
        let current = self
            .get_member(master_account, slave_account)
            .await?
            .ok_or(StoreError::NotFound("trade group member"))?;

        if current.runtime_status == runtime_status && current.warning_codes == warning_codes {
            return Ok(false);
        }

        let warnings_json = serde_json::to_string(warning_codes)?;
        with_busy_retry(|| {
            sqlx::query(
                "UPDATE trade_group_members
                 SET runtime_status = ?, warning_codes = ?,
                     config_version = config_version + 1, updated_at = CURRENT_TIMESTAMP
                 WHERE trade_group_id = ? AND slave_account = ?",
            )
            .bind(runtime_status)
            .bind(&warnings_json)
            .bind(master_account)
            .bind(slave_account)
            .execute(&self.pool)
        })
        .await?;

        Ok(true)
    }

    pub async fn delete_member(
        &self,
        master_account: &str,
        slave_account: &str,
    ) -> StoreResult<()> {
        let result = with_busy_retry(|| {
            sqlx::query(
                "DELETE FROM trade_group_members
                 WHERE trade_group_id = ? AND slave_account = ?",
            )
            .bind(master_account)
            .bind(slave_account)
            .execute(&self.pool)
        })
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound("trade group member"));
        }
        Ok(())
    }
}
