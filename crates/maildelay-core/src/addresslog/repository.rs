//! Address log repository backed by `SQLite`.

use chrono::{DateTime, Utc};
use sqlx::Row;
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions, SqliteRow};
use tracing::debug;

use super::model::{AddressLogEntry, LogReason};
use super::store::LogStore;
use crate::Result;

/// Repository for address log storage and retrieval.
pub struct AddressLogRepository {
    pool: SqlitePool,
}

impl AddressLogRepository {
    /// Create a new repository with the given database path.
    ///
    /// Creates the database and tables if they don't exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the database connection fails or schema creation fails.
    pub async fn new(database_path: &str) -> Result<Self> {
        let url = format!("sqlite:{database_path}?mode=rwc");
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect(&url)
            .await?;

        let repo = Self { pool };
        repo.initialize().await?;
        Ok(repo)
    }

    /// Create an in-memory repository for testing.
    ///
    /// # Errors
    ///
    /// Returns an error if the database connection fails or schema creation fails.
    pub async fn in_memory() -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await?;

        let repo = Self { pool };
        repo.initialize().await?;
        Ok(repo)
    }

    /// Initialize database schema.
    async fn initialize(&self) -> Result<()> {
        sqlx::query(
            r"
            CREATE TABLE IF NOT EXISTS address_log (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                email TEXT NOT NULL,
                reason TEXT NOT NULL,
                attempt INTEGER NOT NULL DEFAULT 0,
                next_eligible_at TEXT,
                created_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP,
                updated_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP,
                UNIQUE(email, reason)
            )
            ",
        )
        .execute(&self.pool)
        .await?;

        // Reason-agnostic lookups and purges go by email alone
        sqlx::query(
            r"
            CREATE INDEX IF NOT EXISTS idx_address_log_email ON address_log(email)
            ",
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// All entries recorded for an address, oldest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails or a row is malformed.
    pub async fn entries_for(&self, email: &str) -> Result<Vec<AddressLogEntry>> {
        let rows = sqlx::query(
            r"
            SELECT email, reason, attempt, next_eligible_at
            FROM address_log
            WHERE email = ?
            ORDER BY id ASC
            ",
        )
        .bind(email)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_entry).collect()
    }
}

impl LogStore for AddressLogRepository {
    async fn get(&self, email: &str, reason: LogReason) -> Result<Option<AddressLogEntry>> {
        let row = sqlx::query(
            r"
            SELECT email, reason, attempt, next_eligible_at
            FROM address_log
            WHERE email = ? AND reason = ?
            ",
        )
        .bind(email)
        .bind(reason.as_str())
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(row_to_entry).transpose()
    }

    async fn get_any(&self, email: &str) -> Result<Option<AddressLogEntry>> {
        let row = sqlx::query(
            r"
            SELECT email, reason, attempt, next_eligible_at
            FROM address_log
            WHERE email = ?
            ORDER BY id ASC
            LIMIT 1
            ",
        )
        .bind(email)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(row_to_entry).transpose()
    }

    async fn put(&self, entry: &AddressLogEntry) -> Result<()> {
        sqlx::query(
            r"
            INSERT INTO address_log (email, reason, attempt, next_eligible_at)
            VALUES (?, ?, ?, ?)
            ON CONFLICT(email, reason) DO UPDATE SET
                attempt = excluded.attempt,
                next_eligible_at = excluded.next_eligible_at,
                updated_at = CURRENT_TIMESTAMP
            ",
        )
        .bind(&entry.email)
        .bind(entry.reason.as_str())
        .bind(entry.attempt)
        .bind(entry.next_eligible_at.map(|t| t.to_rfc3339()))
        .execute(&self.pool)
        .await?;

        debug!(email = %entry.email, reason = %entry.reason, attempt = entry.attempt, "Stored address log entry");
        Ok(())
    }

    async fn delete_all(&self, email: &str) -> Result<u64> {
        let result = sqlx::query("DELETE FROM address_log WHERE email = ?")
            .bind(email)
            .execute(&self.pool)
            .await?;

        let removed = result.rows_affected();
        debug!(email, removed, "Deleted address log entries");
        Ok(removed)
    }
}

/// Convert a database row to an `AddressLogEntry`.
fn row_to_entry(row: &SqliteRow) -> Result<AddressLogEntry> {
    let reason: String = row.get("reason");
    let reason = LogReason::parse(&reason)
        .ok_or_else(|| sqlx::Error::Decode(format!("unknown log reason '{reason}'").into()))?;

    let next_eligible_at = row
        .get::<Option<String>, _>("next_eligible_at")
        .map(|s| {
            DateTime::parse_from_rfc3339(&s)
                .map(|t| t.with_timezone(&Utc))
                .map_err(|e| sqlx::Error::Decode(Box::new(e)))
        })
        .transpose()?;

    Ok(AddressLogEntry {
        email: row.get("email"),
        reason,
        attempt: row.get::<u32, _>("attempt"),
        next_eligible_at,
    })
}
