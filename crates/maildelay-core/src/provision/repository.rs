//! Identity storage.

use std::future::Future;

use chrono::{DateTime, SecondsFormat, Utc};
use sqlx::Row;
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions, SqliteRow};
use tracing::debug;

use super::model::{AccountId, Identity};
use crate::{Error, Result};

/// Storage contract for identities.
pub trait IdentityStore: Send + Sync {
    /// Insert a pending identity unless one with the same username exists.
    ///
    /// An existing pending identity of the same account keeps its activation
    /// key, so a key that was already mailed stays valid; only the credential
    /// is refreshed. Confirmed identities are left untouched. Returns the
    /// stored identity and whether it was newly created.
    ///
    /// Fails with [`Error::IdentityTaken`] if the username belongs to another
    /// account.
    fn upsert_pending(
        &self,
        identity: &Identity,
    ) -> impl Future<Output = Result<(Identity, bool)>> + Send;

    /// Identity by username.
    fn find_by_username(
        &self,
        username: &str,
    ) -> impl Future<Output = Result<Option<Identity>>> + Send;

    /// Activate the pending identity holding `key` and clear the key.
    fn activate_by_key(&self, key: &str) -> impl Future<Output = Result<Option<Identity>>> + Send;

    /// All identities of an account.
    fn list_for_account(
        &self,
        account_id: AccountId,
    ) -> impl Future<Output = Result<Vec<Identity>>> + Send;

    /// Record a login. Returns `false` if no such identity exists.
    fn record_login(
        &self,
        username: &str,
        at: DateTime<Utc>,
    ) -> impl Future<Output = Result<bool>> + Send;
}

/// Repository for identities backed by `SQLite`.
pub struct IdentityRepository {
    pool: SqlitePool,
}

impl IdentityRepository {
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
            CREATE TABLE IF NOT EXISTS identities (
                username TEXT PRIMARY KEY NOT NULL,
                email TEXT NOT NULL,
                password_hash TEXT NOT NULL,
                account_id INTEGER NOT NULL,
                is_active INTEGER NOT NULL DEFAULT 0,
                activation_key TEXT UNIQUE,
                date_joined TEXT NOT NULL,
                last_login TEXT
            )
            ",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r"
            CREATE INDEX IF NOT EXISTS idx_identities_account ON identities(account_id)
            ",
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Insert an identity as is.
    #[cfg(test)]
    pub(crate) async fn insert(&self, identity: &Identity) -> Result<()> {
        sqlx::query(
            r"
            INSERT INTO identities
                (username, email, password_hash, account_id, is_active, activation_key, date_joined, last_login)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            ",
        )
        .bind(&identity.username)
        .bind(&identity.email)
        .bind(&identity.password_hash)
        .bind(identity.account_id.0)
        .bind(identity.is_active)
        .bind(&identity.activation_key)
        .bind(encode_time(identity.date_joined))
        .bind(identity.last_login.map(encode_time))
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

impl IdentityStore for IdentityRepository {
    async fn upsert_pending(&self, identity: &Identity) -> Result<(Identity, bool)> {
        let mut tx = self.pool.begin().await?;

        let inserted = sqlx::query(
            r"
            INSERT INTO identities
                (username, email, password_hash, account_id, is_active, activation_key, date_joined)
            VALUES (?, ?, ?, ?, 0, ?, ?)
            ON CONFLICT(username) DO NOTHING
            ",
        )
        .bind(&identity.username)
        .bind(&identity.email)
        .bind(&identity.password_hash)
        .bind(identity.account_id.0)
        .bind(&identity.activation_key)
        .bind(encode_time(identity.date_joined))
        .execute(&mut *tx)
        .await?;
        let created = inserted.rows_affected() == 1;

        if !created {
            // A mailed key must stay valid, so only a missing one is filled in
            sqlx::query(
                r"
                UPDATE identities
                SET password_hash = ?, activation_key = COALESCE(activation_key, ?)
                WHERE username = ? AND account_id = ? AND is_active = 0
                ",
            )
            .bind(&identity.password_hash)
            .bind(&identity.activation_key)
            .bind(&identity.username)
            .bind(identity.account_id.0)
            .execute(&mut *tx)
            .await?;
        }

        let row = sqlx::query(
            r"
            SELECT username, email, password_hash, account_id, is_active,
                   activation_key, date_joined, last_login
            FROM identities
            WHERE username = ?
            ",
        )
        .bind(&identity.username)
        .fetch_one(&mut *tx)
        .await?;
        let stored = row_to_identity(&row)?;

        if stored.account_id != identity.account_id {
            return Err(Error::IdentityTaken(identity.email.clone()));
        }

        tx.commit().await?;
        debug!(username = %identity.username, created, "Stored pending identity");
        Ok((stored, created))
    }

    async fn find_by_username(&self, username: &str) -> Result<Option<Identity>> {
        let row = sqlx::query(
            r"
            SELECT username, email, password_hash, account_id, is_active,
                   activation_key, date_joined, last_login
            FROM identities
            WHERE username = ?
            ",
        )
        .bind(username)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(row_to_identity).transpose()
    }

    async fn activate_by_key(&self, key: &str) -> Result<Option<Identity>> {
        let row = sqlx::query(
            r"
            UPDATE identities SET is_active = 1, activation_key = NULL
            WHERE activation_key = ? AND is_active = 0
            RETURNING username, email, password_hash, account_id, is_active,
                      activation_key, date_joined, last_login
            ",
        )
        .bind(key)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(row_to_identity).transpose()
    }

    async fn list_for_account(&self, account_id: AccountId) -> Result<Vec<Identity>> {
        let rows = sqlx::query(
            r"
            SELECT username, email, password_hash, account_id, is_active,
                   activation_key, date_joined, last_login
            FROM identities
            WHERE account_id = ?
            ",
        )
        .bind(account_id.0)
        .fetch_all(&self.pool)
        .await?;

        let mut identities = rows
            .iter()
            .map(row_to_identity)
            .collect::<Result<Vec<_>>>()?;
        // Most recent login first, never-logged-in last
        identities.sort_by(|a, b| b.last_login.cmp(&a.last_login));
        Ok(identities)
    }

    async fn record_login(&self, username: &str, at: DateTime<Utc>) -> Result<bool> {
        let result = sqlx::query("UPDATE identities SET last_login = ? WHERE username = ?")
            .bind(encode_time(at))
            .bind(username)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }
}

fn encode_time(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn decode_time(s: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| sqlx::Error::Decode(Box::new(e)).into())
}

/// Convert a database row to an `Identity`.
fn row_to_identity(row: &SqliteRow) -> Result<Identity> {
    let date_joined: String = row.get("date_joined");
    let last_login: Option<String> = row.get("last_login");

    Ok(Identity {
        username: row.get("username"),
        email: row.get("email"),
        password_hash: row.get("password_hash"),
        account_id: AccountId(row.get::<i64, _>("account_id")),
        is_active: row.get::<bool, _>("is_active"),
        activation_key: row.get("activation_key"),
        date_joined: decode_time(&date_joined)?,
        last_login: last_login.as_deref().map(decode_time).transpose()?,
    })
}
