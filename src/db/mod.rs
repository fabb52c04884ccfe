//! Persistent store: trade groups, members, runtime ports and global
//! settings in a single SQLite file (WAL journal). The pool is capped at one
//! connection, which serializes writers the way the store contract demands.
//! Lock contention is handled in two layers: a bounded busy timeout on the
//! connection, and a three-attempt retry around every mutation for the
//! SQLITE_BUSY results that still get through; after that the error
//! surfaces.

use std::future::Future;
use std::str::FromStr;
use std::time::Duration;

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::SqlitePool;
use thiserror::Error;

mod global_settings;
mod members;
mod runtime_ports;
mod trade_groups;

pub use global_settings::VLogsSettings;
pub use runtime_ports::RuntimePorts;


/// Domain error surfaced by every store operation. The API layer maps these
/// onto problem-details responses (404 / 409 / 500).
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("{0} not found")]
    NotFound(&'static str),
    #[error("{0}")]
    Conflict(String),
    #[error("database error: {0}")]
    Backend(#[from] sqlx::Error),
    #[error("settings encoding error: {0}")]
    Encoding(#[from] serde_json::Error),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Supervisor escalation for runtime store failures: anything the store
/// cannot recover from takes the whole relay down with a nonzero exit, per
/// the error-handling contract.
pub fn escalate_if_fatal(err: &StoreError) {
    if err.is_fatal() {
        tracing::error!(error = %err, "unrecoverable store failure, halting relay");
        std::process::exit(1);
    }
}

const BUSY_ATTEMPTS: u32 = 3;

fn is_busy(err: &sqlx::Error) -> bool {
    matches!(
        err,
        sqlx::Error::Database(db) if {
            let message = db.message();
            message.contains("database is locked")
                || message.contains("database table is locked")
                || message.contains("busy")
        }
    )
}

/// Re-issue a mutation that lost the SQLITE_BUSY race, up to three attempts
/// in total. The closure rebuilds the query each time; anything other than
/// a busy error surfaces immediately.
pub(crate) async fn with_busy_retry<T, F, Fut>(mut op: F) -> Result<T, sqlx::Error>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, sqlx::Error>>,
{
    let mut attempt = 1;
    loop {
        match op().await {
            Err(err) if is_busy(&err) && attempt < BUSY_ATTEMPTS => {
                tracing::warn!(attempt, error = %err, "store busy, retrying mutation");
                tokio::time::sleep(Duration::from_millis(50 * u64::from(attempt))).await;
                attempt += 1;
            }
            other => return other,
        }
    }
}

impl StoreError {
    /// True for errors no retry will fix: I/O failure, a full disk under
    /// the WAL, or file corruption. These halt the relay.
    pub fn is_fatal(&self) -> bool {
        match self {
            StoreError::Backend(sqlx::Error::Io(_)) => true,
            StoreError::Backend(sqlx::Error::Database(db)) => {
                let message = db.message();
                message.contains("disk") || message.contains("malformed")
            }
            _ => false,
        }
    }

    /// True when the underlying SQLite error is a UNIQUE violation.
    pub(crate) fn is_unique_violation(err: &sqlx::Error) -> bool {
        matches!(
            err,
            sqlx::Error::Database(db) if db.message().contains("UNIQUE constraint failed")
        )
    }
}

/// Forward-only migrations. Versions already recorded in
/// `schema_migrations` are skipped; each pending step runs in its own
/// transaction together with its version bookkeeping.
const MIGRATIONS: &[(i64, &str)] = &[
    (
        1,
        r#"
        CREATE TABLE trade_groups (
            id TEXT PRIMARY KEY,
            master_settings TEXT NOT NULL DEFAULT '{}',
            enabled_flag INTEGER NOT NULL DEFAULT 1,
            created_at DATETIME DEFAULT CURRENT_TIMESTAMP,
            updated_at DATETIME DEFAULT CURRENT_TIMESTAMP
        );
        CREATE TABLE trade_group_members (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            trade_group_id TEXT NOT NULL,
            slave_account TEXT NOT NULL,
            slave_settings TEXT NOT NULL DEFAULT '{}',
            enabled_flag INTEGER NOT NULL DEFAULT 1,
            runtime_status INTEGER NOT NULL DEFAULT 0,
            warning_codes TEXT NOT NULL DEFAULT '[]',
            config_version INTEGER NOT NULL DEFAULT 0,
            created_at DATETIME DEFAULT CURRENT_TIMESTAMP,
            updated_at DATETIME DEFAULT CURRENT_TIMESTAMP,
            UNIQUE (trade_group_id, slave_account),
            FOREIGN KEY (trade_group_id) REFERENCES trade_groups(id) ON DELETE CASCADE
        );
        CREATE INDEX idx_members_slave ON trade_group_members(slave_account);
        CREATE INDEX idx_members_runtime_status ON trade_group_members(runtime_status);
        "#,
    ),
    (
        2,
        r#"
        CREATE TABLE runtime_ports (
            id INTEGER PRIMARY KEY CHECK (id = 1),
            receiver_port INTEGER NOT NULL,
            publisher_port INTEGER NOT NULL,
            generated_at TEXT NOT NULL
        );
        "#,
    ),
    (
        3,
        r#"
        CREATE TABLE global_settings (
            id INTEGER PRIMARY KEY CHECK (id = 1),
            vlogs_enabled INTEGER NOT NULL DEFAULT 0,
            vlogs_endpoint TEXT NOT NULL DEFAULT '',
            vlogs_log_level TEXT NOT NULL DEFAULT 'INFO',
            updated_at DATETIME DEFAULT CURRENT_TIMESTAMP
        );
        "#,
    ),
];

pub struct Database {
    pool: SqlitePool,
}

impl Database {
    /// Open the database, apply pending migrations and verify the schema
    /// version table. Fatal errors here abort startup.
    pub async fn connect(database_url: &str) -> StoreResult<Self> {
        let options = SqliteConnectOptions::from_str(database_url)?
            .create_if_missing(true)
            .foreign_keys(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(Duration::from_secs(5));

        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await?;

        let db = Self { pool };
        db.apply_migrations().await?;
        Ok(db)
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    async fn apply_migrations(&self) -> StoreResult<()> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS schema_migrations (
                 version INTEGER PRIMARY KEY,
                 applied_at DATETIME DEFAULT CURRENT_TIMESTAMP
             )",
        )
        .execute(&self.pool)
        .await?;

        let current: Option<i64> =
            sqlx::query_scalar("SELECT MAX(version) FROM schema_migrations")
                .fetch_one(&self.pool)
                .await?;
        let current = current.unwrap_or(0);

        for (version, sql) in MIGRATIONS {
            if *version <= current {
                continue;
            }
            let mut tx = self.pool.begin().await?;
            sqlx::raw_sql(sql).execute(&mut *tx).await?;
            sqlx::query("INSERT INTO schema_migrations (version) VALUES (?)")
                .bind(version)
                .execute(&mut *tx)
                .await?;
            tx.commit().await?;
            tracing::info!(version, "applied schema migration");
        }

        Ok(())
    }

    /// Highest applied migration version.
    pub async fn schema_version(&self) -> StoreResult<i64> {
        let version: Option<i64> =
            sqlx::query_scalar("SELECT MAX(version) FROM schema_migrations")
                .fetch_one(&self.pool)
                .await?;
        Ok(version.unwrap_or(0))
    }
}
