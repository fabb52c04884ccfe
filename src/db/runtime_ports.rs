//! Singleton row mirroring the runtime-ports file: the pub/pull ports that
//! were actually bound when the config requested OS-assigned ports.

use serde::{Deserialize, Serialize};
use sqlx::Row;

use super::{with_busy_retry, Database, StoreResult};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuntimePorts {
    pub receiver_port: u16,
    pub publisher_port: u16,
    pub generated_at: String,
}

impl Database {
    pub async fn set_runtime_ports(&self, ports: &RuntimePorts) -> StoreResult<()> {
        with_busy_retry(|| {
            sqlx::query(
                "INSERT INTO runtime_ports (id, receiver_port, publisher_port, generated_at)
                 VALUES (1, ?, ?, ?)
                 ON CONFLICT(id) DO UPDATE SET
                     receiver_port = excluded.receiver_port,
                     publisher_port = excluded.publisher_port,
                     generated_at = excluded.generated_at",
            )
            .bind(ports.receiver_port as i64)
            .bind(ports.publisher_port as i64)
            .bind(&ports.generated_at)
            .execute(&self.pool)
        })
        .await?;
        Ok(())
    }

    pub async fn get_runtime_ports(&self) -> StoreResult<Option<RuntimePorts>> {
        let row = sqlx::query(
            "SELECT receiver_port, publisher_port, generated_at FROM runtime_ports WHERE id = 1",
        )
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|row| RuntimePorts {
            receiver_port: row.get::<i64, _>("receiver_port") as u16,
            publisher_port: row.get::<i64, _>("publisher_port") as u16,
            generated_at: row.get("generated_at"),
        }))
    }
}
