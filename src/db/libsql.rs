use chrono::Utc;
use libsql::{params::IntoParams, Builder, Connection, Database, Value};
use uuid::Uuid;

use crate::types::{AppError, Result};

use super::account::{
    Account, LoginFailure, NewAccount, NewRefreshToken, ProfileChanges, RefreshTokenEntry,
};
use super::traits::AccountStore;

const ACCOUNT_COLUMNS: &str = "id, email, name, password_hash, email_verified, \
     otp_hash, otp_expires_at, otp_attempts, \
     reset_token_hash, reset_expires_at, verify_token_hash, verify_expires_at, \
     password_changed_at, login_attempts, lock_until, \
     phone, country, currency, created_at, updated_at";

fn db_err(e: libsql::Error) -> AppError {
    AppError::Database(e.to_string())
}

fn opt_text(row: &libsql::Row, idx: i32) -> Result<Option<String>> {
    match row.get_value(idx).map_err(db_err)? {
        Value::Null => Ok(None),
        Value::Text(s) => Ok(Some(s)),
        other => Err(AppError::Database(format!(
            "column {idx} holds unexpected type: {other:?}"
        ))),
    }
}

fn opt_i64(row: &libsql::Row, idx: i32) -> Result<Option<i64>> {
    match row.get_value(idx).map_err(db_err)? {
        Value::Null => Ok(None),
        Value::Integer(n) => Ok(Some(n)),
        other => Err(AppError::Database(format!(
            "column {idx} holds unexpected type: {other:?}"
        ))),
    }
}

fn row_to_account(row: &libsql::Row) -> Result<Account> {
    Ok(Account {
        id: row.get(0).map_err(db_err)?,
        email: row.get(1).map_err(db_err)?,
        name: row.get(2).map_err(db_err)?,
        password_hash: row.get(3).map_err(db_err)?,
        email_verified: row.get::<i64>(4).map_err(db_err)? != 0,
        otp_hash: opt_text(row, 5)?,
        otp_expires_at: opt_i64(row, 6)?,
        otp_attempts: row.get(7).map_err(db_err)?,
        reset_token_hash: opt_text(row, 8)?,
        reset_expires_at: opt_i64(row, 9)?,
        verify_token_hash: opt_text(row, 10)?,
        verify_expires_at: opt_i64(row, 11)?,
        password_changed_at: opt_i64(row, 12)?,
        login_attempts: row.get(13).map_err(db_err)?,
        lock_until: opt_i64(row, 14)?,
        phone: opt_text(row, 15)?,
        country: row.get(16).map_err(db_err)?,
        currency: row.get(17).map_err(db_err)?,
        created_at: row.get(18).map_err(db_err)?,
        updated_at: row.get(19).map_err(db_err)?,
    })
}

/// libsql-backed account store.
///
/// One connection is opened at construction and shared by every operation;
/// the in-memory backend gives each new connection its own empty database,
/// so handing out fresh connections would silently lose state. Every
/// statement here is individually atomic, which is what makes the shared
/// handle safe without explicit transactions.
pub struct LibsqlStore {
    conn: Connection,
}

impl LibsqlStore {
    /// Opens an ephemeral in-memory store.
    pub async fn new_memory() -> Result<Self> {
        let db = Builder::new_local(":memory:")
            .build()
            .await
            .map_err(|e| AppError::Database(format!("Failed to open in-memory database: {}", e)))?;

        Self::from_database(db).await
    }

    /// Opens (or creates) a local SQLite file store.
    pub async fn new_local(path: &str) -> Result<Self> {
        let db = Builder::new_local(path)
            .build()
            .await
            .map_err(|e| AppError::Database(format!("Failed to open database at {path}: {e}")))?;

        Self::from_database(db).await
    }

    /// Connects to a remote Turso database.
    pub async fn new_remote(url: String, auth_token: String) -> Result<Self> {
        let db = Builder::new_remote(url, auth_token)
            .build()
            .await
            .map_err(|e| AppError::Database(format!("Failed to connect to Turso: {}", e)))?;

        Self::from_database(db).await
    }

    async fn from_database(db: Database) -> Result<Self> {
        let conn = db
            .connect()
            .map_err(|e| AppError::Database(format!("Failed to get connection: {}", e)))?;

        let store = Self { conn };
        store.initialize_schema().await?;

        Ok(store)
    }

    /// Shared handle to the underlying connection.
    pub fn connection(&self) -> Connection {
        self.conn.clone()
    }

    async fn initialize_schema(&self) -> Result<()> {
        // Accounts table
        self.conn
            .execute(
                "CREATE TABLE IF NOT EXISTS accounts (
                    id TEXT PRIMARY KEY,
                    email TEXT UNIQUE NOT NULL,
                    name TEXT NOT NULL,
                    password_hash TEXT NOT NULL,
                    email_verified INTEGER NOT NULL DEFAULT 0,
                    otp_hash TEXT,
                    otp_expires_at INTEGER,
                    otp_attempts INTEGER NOT NULL DEFAULT 0,
                    reset_token_hash TEXT,
                    reset_expires_at INTEGER,
                    verify_token_hash TEXT,
                    verify_expires_at INTEGER,
                    password_changed_at INTEGER,
                    login_attempts INTEGER NOT NULL DEFAULT 0,
                    lock_until INTEGER,
                    phone TEXT,
                    country TEXT NOT NULL DEFAULT 'US',
                    currency TEXT NOT NULL DEFAULT 'USD',
                    created_at INTEGER NOT NULL,
                    updated_at INTEGER NOT NULL
                )",
                (),
            )
            .await
            .map_err(|e| AppError::Database(format!("Failed to create accounts table: {}", e)))?;

        // Refresh tokens table
        self.conn
            .execute(
                "CREATE TABLE IF NOT EXISTS refresh_tokens (
                    id TEXT PRIMARY KEY,
                    account_id TEXT NOT NULL,
                    token_hash TEXT UNIQUE NOT NULL,
                    created_at INTEGER NOT NULL,
                    expires_at INTEGER NOT NULL,
                    user_agent TEXT,
                    ip_address TEXT,
                    FOREIGN KEY (account_id) REFERENCES accounts(id)
                )",
                (),
            )
            .await
            .map_err(|e| {
                AppError::Database(format!("Failed to create refresh_tokens table: {}", e))
            })?;

        self.conn
            .execute(
                "CREATE INDEX IF NOT EXISTS idx_refresh_tokens_account
                 ON refresh_tokens (account_id)",
                (),
            )
            .await
            .map_err(|e| {
                AppError::Database(format!("Failed to create refresh_tokens index: {}", e))
            })?;

        Ok(())
    }

    async fn query_account(&self, sql: &str, params: impl IntoParams) -> Result<Option<Account>> {
        let mut rows = self
            .conn
            .query(sql, params)
            .await
            .map_err(|e| AppError::Database(format!("Failed to query account: {}", e)))?;

        if let Some(row) = rows.next().await.map_err(db_err)? {
            Ok(Some(row_to_account(&row)?))
        } else {
            Ok(None)
        }
    }

    /// Drops expired rows, inserts the new one, then trims to the newest
    /// `cap` entries. FIFO: eviction order is creation order.
    async fn append_refresh_token(
        &self,
        account_id: &str,
        token: &NewRefreshToken,
        cap: usize,
        now: i64,
    ) -> Result<()> {
        self.conn
            .execute(
                "DELETE FROM refresh_tokens WHERE account_id = ? AND expires_at <= ?",
                (account_id, now),
            )
            .await
            .map_err(|e| {
                AppError::Database(format!("Failed to prune expired refresh tokens: {}", e))
            })?;

        self.conn
            .execute(
                "INSERT INTO refresh_tokens
                     (id, account_id, token_hash, created_at, expires_at, user_agent, ip_address)
                 VALUES (?, ?, ?, ?, ?, ?, ?)",
                libsql::params![
                    Uuid::new_v4().to_string(),
                    account_id,
                    token.token_hash.as_str(),
                    now,
                    token.expires_at,
                    token.user_agent.as_deref(),
                    token.ip_address.as_deref()
                ],
            )
            .await
            .map_err(|e| AppError::Database(format!("Failed to store refresh token: {}", e)))?;

        self.conn
            .execute(
                "DELETE FROM refresh_tokens
                 WHERE account_id = ?1 AND id NOT IN (
                     SELECT id FROM refresh_tokens
                     WHERE account_id = ?1
                     ORDER BY created_at DESC, rowid DESC
                     LIMIT ?2
                 )",
                (account_id, cap as i64),
            )
            .await
            .map_err(|e| AppError::Database(format!("Failed to trim refresh tokens: {}", e)))?;

        Ok(())
    }
}

#[async_trait::async_trait]
impl AccountStore for LibsqlStore {
    async fn create_account(&self, account: &NewAccount) -> Result<()> {
        let now = Utc::now().timestamp();

        self.conn
            .execute(
                "INSERT INTO accounts
                     (id, email, name, password_hash,
                      otp_hash, otp_expires_at, verify_token_hash, verify_expires_at,
                      phone, country, currency, created_at, updated_at)
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
                libsql::params![
                    account.id.as_str(),
                    account.email.as_str(),
                    account.name.as_str(),
                    account.password_hash.as_str(),
                    account.otp_hash.as_str(),
                    account.otp_expires_at,
                    account.verify_token_hash.as_str(),
                    account.verify_expires_at,
                    account.phone.as_deref(),
                    account.country.as_str(),
                    account.currency.as_str(),
                    now,
                    now
                ],
            )
            .await
            .map_err(|e| {
                let msg = e.to_string();
                if msg.contains("UNIQUE constraint failed") {
                    AppError::AlreadyExists
                } else {
                    AppError::Database(format!("Failed to create account: {}", msg))
                }
            })?;

        Ok(())
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<Account>> {
        self.query_account(
            &format!("SELECT {ACCOUNT_COLUMNS} FROM accounts WHERE email = ?"),
            [email],
        )
        .await
    }

    async fn find_by_id(&self, id: &str) -> Result<Option<Account>> {
        self.query_account(
            &format!("SELECT {ACCOUNT_COLUMNS} FROM accounts WHERE id = ?"),
            [id],
        )
        .await
    }

    async fn find_by_reset_digest(&self, digest: &str, now: i64) -> Result<Option<Account>> {
        self.query_account(
            &format!(
                "SELECT {ACCOUNT_COLUMNS} FROM accounts
                 WHERE reset_token_hash = ? AND reset_expires_at > ?"
            ),
            (digest, now),
        )
        .await
    }

    async fn find_by_verify_digest(&self, digest: &str, now: i64) -> Result<Option<Account>> {
        self.query_account(
            &format!(
                "SELECT {ACCOUNT_COLUMNS} FROM accounts
                 WHERE verify_token_hash = ? AND verify_expires_at > ?"
            ),
            (digest, now),
        )
        .await
    }

    async fn update_profile(&self, id: &str, changes: &ProfileChanges) -> Result<()> {
        let now = Utc::now().timestamp();

        let affected = self
            .conn
            .execute(
                "UPDATE accounts SET
                     name = COALESCE(?, name),
                     phone = COALESCE(?, phone),
                     country = COALESCE(?, country),
                     currency = COALESCE(?, currency),
                     updated_at = ?
                 WHERE id = ?",
                (
                    changes.name.as_deref(),
                    changes.phone.as_deref(),
                    changes.country.as_deref(),
                    changes.currency.as_deref(),
                    now,
                    id,
                ),
            )
            .await
            .map_err(|e| AppError::Database(format!("Failed to update profile: {}", e)))?;

        if affected == 0 {
            return Err(AppError::NotFound("User".to_string()));
        }
        Ok(())
    }

    async fn set_email_challenge(
        &self,
        id: &str,
        otp_digest: &str,
        otp_expires_at: i64,
        verify_digest: &str,
        verify_expires_at: i64,
    ) -> Result<()> {
        let now = Utc::now().timestamp();

        let affected = self
            .conn
            .execute(
                "UPDATE accounts SET
                     otp_hash = ?, otp_expires_at = ?, otp_attempts = 0,
                     verify_token_hash = ?, verify_expires_at = ?,
                     updated_at = ?
                 WHERE id = ?",
                (
                    otp_digest,
                    otp_expires_at,
                    verify_digest,
                    verify_expires_at,
                    now,
                    id,
                ),
            )
            .await
            .map_err(|e| {
                AppError::Database(format!("Failed to store verification challenge: {}", e))
            })?;

        if affected == 0 {
            return Err(AppError::NotFound("User".to_string()));
        }
        Ok(())
    }

    async fn record_otp_failure(&self, id: &str) -> Result<()> {
        // Guarded on an open challenge so a concurrent success is not
        // penalized after the fact.
        self.conn
            .execute(
                "UPDATE accounts SET otp_attempts = otp_attempts + 1, updated_at = ?
                 WHERE id = ? AND otp_hash IS NOT NULL",
                (Utc::now().timestamp(), id),
            )
            .await
            .map_err(|e| AppError::Database(format!("Failed to record OTP failure: {}", e)))?;

        Ok(())
    }

    async fn mark_email_verified(&self, id: &str) -> Result<()> {
        let affected = self
            .conn
            .execute(
                "UPDATE accounts SET
                     email_verified = 1,
                     otp_hash = NULL, otp_expires_at = NULL, otp_attempts = 0,
                     verify_token_hash = NULL, verify_expires_at = NULL,
                     updated_at = ?
                 WHERE id = ?",
                (Utc::now().timestamp(), id),
            )
            .await
            .map_err(|e| AppError::Database(format!("Failed to mark email verified: {}", e)))?;

        if affected == 0 {
            return Err(AppError::NotFound("User".to_string()));
        }
        Ok(())
    }

    async fn set_reset_challenge(&self, id: &str, digest: &str, expires_at: i64) -> Result<()> {
        let affected = self
            .conn
            .execute(
                "UPDATE accounts SET
                     reset_token_hash = ?, reset_expires_at = ?, updated_at = ?
                 WHERE id = ?",
                (digest, expires_at, Utc::now().timestamp(), id),
            )
            .await
            .map_err(|e| AppError::Database(format!("Failed to store reset challenge: {}", e)))?;

        if affected == 0 {
            return Err(AppError::NotFound("User".to_string()));
        }
        Ok(())
    }

    async fn clear_reset_challenge(&self, id: &str) -> Result<()> {
        self.conn
            .execute(
                "UPDATE accounts SET
                     reset_token_hash = NULL, reset_expires_at = NULL, updated_at = ?
                 WHERE id = ?",
                (Utc::now().timestamp(), id),
            )
            .await
            .map_err(|e| AppError::Database(format!("Failed to clear reset challenge: {}", e)))?;

        Ok(())
    }

    async fn complete_password_reset(
        &self,
        id: &str,
        password_hash: &str,
        changed_at: i64,
    ) -> Result<()> {
        // Credential first; sessions are purged only once the new password
        // and its change stamp are in place.
        let affected = self
            .conn
            .execute(
                "UPDATE accounts SET
                     password_hash = ?, password_changed_at = ?,
                     reset_token_hash = NULL, reset_expires_at = NULL,
                     updated_at = ?
                 WHERE id = ?",
                (password_hash, changed_at, changed_at, id),
            )
            .await
            .map_err(|e| AppError::Database(format!("Failed to reset password: {}", e)))?;

        if affected == 0 {
            return Err(AppError::NotFound("User".to_string()));
        }

        self.conn
            .execute("DELETE FROM refresh_tokens WHERE account_id = ?", [id])
            .await
            .map_err(|e| AppError::Database(format!("Failed to revoke sessions: {}", e)))?;

        Ok(())
    }

    async fn record_login_failure(
        &self,
        id: &str,
        now: i64,
        threshold: u32,
        lock_duration: i64,
    ) -> Result<LoginFailure> {
        // Both CASE expressions see the pre-update row, so the expired-lock
        // branch and the threshold check agree on the same starting state.
        self.conn
            .execute(
                "UPDATE accounts SET
                     login_attempts = CASE
                         WHEN lock_until IS NOT NULL AND lock_until <= ?2 THEN 1
                         ELSE login_attempts + 1
                     END,
                     lock_until = CASE
                         WHEN lock_until IS NOT NULL AND lock_until <= ?2 THEN NULL
                         WHEN lock_until IS NULL AND login_attempts + 1 >= ?3 THEN ?2 + ?4
                         ELSE lock_until
                     END,
                     updated_at = ?2
                 WHERE id = ?1",
                (id, now, threshold as i64, lock_duration),
            )
            .await
            .map_err(|e| AppError::Database(format!("Failed to record login failure: {}", e)))?;

        let mut rows = self
            .conn
            .query(
                "SELECT login_attempts, lock_until FROM accounts WHERE id = ?",
                [id],
            )
            .await
            .map_err(|e| AppError::Database(format!("Failed to read lockout state: {}", e)))?;

        match rows.next().await.map_err(db_err)? {
            Some(row) => Ok(LoginFailure {
                attempts: row.get(0).map_err(db_err)?,
                lock_until: opt_i64(&row, 1)?,
            }),
            None => Err(AppError::NotFound("User".to_string())),
        }
    }

    async fn record_login_success(&self, id: &str) -> Result<()> {
        self.conn
            .execute(
                "UPDATE accounts SET login_attempts = 0, lock_until = NULL, updated_at = ?
                 WHERE id = ?",
                (Utc::now().timestamp(), id),
            )
            .await
            .map_err(|e| AppError::Database(format!("Failed to record login success: {}", e)))?;

        Ok(())
    }

    async fn add_refresh_token(
        &self,
        account_id: &str,
        token: &NewRefreshToken,
        cap: usize,
        now: i64,
    ) -> Result<()> {
        self.append_refresh_token(account_id, token, cap, now).await
    }

    async fn rotate_refresh_token(
        &self,
        presented_digest: &str,
        replacement: &NewRefreshToken,
        cap: usize,
        now: i64,
    ) -> Result<Option<String>> {
        let mut rows = self
            .conn
            .query(
                "SELECT account_id FROM refresh_tokens
                 WHERE token_hash = ? AND expires_at > ?",
                (presented_digest, now),
            )
            .await
            .map_err(|e| AppError::Database(format!("Failed to look up refresh token: {}", e)))?;

        let account_id: String = match rows.next().await.map_err(db_err)? {
            Some(row) => row.get(0).map_err(db_err)?,
            None => return Ok(None),
        };

        // The row count decides the race when the same token is presented
        // twice: exactly one caller deletes the row and gets the rotation.
        let consumed = self
            .conn
            .execute(
                "DELETE FROM refresh_tokens WHERE token_hash = ? AND expires_at > ?",
                (presented_digest, now),
            )
            .await
            .map_err(|e| AppError::Database(format!("Failed to consume refresh token: {}", e)))?;

        if consumed == 0 {
            return Ok(None);
        }

        self.append_refresh_token(&account_id, replacement, cap, now)
            .await?;

        Ok(Some(account_id))
    }

    async fn remove_refresh_token(&self, digest: &str) -> Result<()> {
        self.conn
            .execute("DELETE FROM refresh_tokens WHERE token_hash = ?", [digest])
            .await
            .map_err(|e| AppError::Database(format!("Failed to remove refresh token: {}", e)))?;

        Ok(())
    }

    async fn list_refresh_tokens(&self, account_id: &str) -> Result<Vec<RefreshTokenEntry>> {
        let mut rows = self
            .conn
            .query(
                "SELECT id, account_id, token_hash, created_at, expires_at, user_agent, ip_address
                 FROM refresh_tokens
                 WHERE account_id = ?
                 ORDER BY created_at ASC, rowid ASC",
                [account_id],
            )
            .await
            .map_err(|e| AppError::Database(format!("Failed to list refresh tokens: {}", e)))?;

        let mut entries = Vec::new();
        while let Some(row) = rows.next().await.map_err(db_err)? {
            entries.push(RefreshTokenEntry {
                id: row.get(0).map_err(db_err)?,
                account_id: row.get(1).map_err(db_err)?,
                token_hash: row.get(2).map_err(db_err)?,
                created_at: row.get(3).map_err(db_err)?,
                expires_at: row.get(4).map_err(db_err)?,
                user_agent: opt_text(&row, 5)?,
                ip_address: opt_text(&row, 6)?,
            });
        }

        Ok(entries)
    }
}
