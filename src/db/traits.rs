//! Account store abstraction
//!
//! This module provides the `AccountStore` trait that abstracts over the
//! record store backing authentication (in-memory SQLite, file-based SQLite,
//! remote Turso).
//!
//! # Example
//!
//! ```rust,ignore
//! use fintrack::db::StoreBackend;
//!
//! // In-memory store (default for development/testing)
//! let store = StoreBackend::Memory.create_store().await?;
//!
//! // File-based SQLite
//! let store = StoreBackend::Local { path: "data.db".into() }.create_store().await?;
//!
//! // Remote Turso
//! let store = StoreBackend::Remote { url, auth_token }.create_store().await?;
//! ```

use async_trait::async_trait;
use std::sync::Arc;

use crate::types::Result;

use super::account::{
    Account, LoginFailure, NewAccount, NewRefreshToken, ProfileChanges, RefreshTokenEntry,
};

/// Store backend configuration
#[derive(Debug, Clone, Default)]
pub enum StoreBackend {
    /// In-memory database (ephemeral, lost on restart)
    #[default]
    Memory,
    /// File-based SQLite database
    Local {
        /// Path to the database file
        path: String,
    },
    /// Remote Turso database (requires network access)
    Remote {
        /// The database URL (e.g., `libsql://your-db.turso.io`)
        url: String,
        /// Authentication token for the database
        auth_token: String,
    },
}

impl StoreBackend {
    /// Open a store for this backend configuration
    pub async fn create_store(&self) -> Result<Arc<dyn AccountStore>> {
        match self {
            StoreBackend::Memory => {
                let store = super::libsql::LibsqlStore::new_memory().await?;
                Ok(Arc::new(store))
            }
            StoreBackend::Local { path } => {
                let store = super::libsql::LibsqlStore::new_local(path).await?;
                Ok(Arc::new(store))
            }
            StoreBackend::Remote { url, auth_token } => {
                let store =
                    super::libsql::LibsqlStore::new_remote(url.clone(), auth_token.clone()).await?;
                Ok(Arc::new(store))
            }
        }
    }

    /// Create from environment variables or use defaults
    pub fn from_env() -> Self {
        // Remote configuration wins when both halves are present
        if let (Ok(url), Ok(token)) = (
            std::env::var("TURSO_DATABASE_URL"),
            std::env::var("TURSO_AUTH_TOKEN"),
        ) {
            if !url.is_empty() && !token.is_empty() {
                return StoreBackend::Remote {
                    url,
                    auth_token: token,
                };
            }
        }

        if let Ok(path) = std::env::var("DATABASE_PATH") {
            if !path.is_empty() && path != ":memory:" {
                return StoreBackend::Local { path };
            }
        }

        StoreBackend::Memory
    }
}

/// Abstract trait for the account record store
///
/// Every mutation that feeds a security decision (lockout counters, refresh
/// rotation, challenge state) is a single conditional statement inside the
/// implementation; callers never read-modify-write those fields. Email
/// arguments are expected in canonical (normalized) form.
#[async_trait]
pub trait AccountStore: Send + Sync {
    // ============== Account Operations ==============

    /// Insert a fresh account with its initial verification challenge.
    /// The unique-email constraint arbitrates concurrent registration.
    async fn create_account(&self, account: &NewAccount) -> Result<()>;

    /// Look up an account by canonical email
    async fn find_by_email(&self, email: &str) -> Result<Option<Account>>;

    /// Look up an account by id
    async fn find_by_id(&self, id: &str) -> Result<Option<Account>>;

    /// Find the account holding a live (unexpired) password-reset digest
    async fn find_by_reset_digest(&self, digest: &str, now: i64) -> Result<Option<Account>>;

    /// Find the account holding a live email-verification link digest
    async fn find_by_verify_digest(&self, digest: &str, now: i64) -> Result<Option<Account>>;

    /// Apply profile changes; `None` fields stay as they are
    async fn update_profile(&self, id: &str, changes: &ProfileChanges) -> Result<()>;

    // ============== Verification Challenge Operations ==============

    /// Store a fresh OTP digest and verification-link digest, replacing any
    /// open challenge and resetting the attempt counter
    async fn set_email_challenge(
        &self,
        id: &str,
        otp_digest: &str,
        otp_expires_at: i64,
        verify_digest: &str,
        verify_expires_at: i64,
    ) -> Result<()>;

    /// Count one failed OTP presentation against the open challenge
    async fn record_otp_failure(&self, id: &str) -> Result<()>;

    /// Mark the email verified and consume both challenge forms
    async fn mark_email_verified(&self, id: &str) -> Result<()>;

    // ============== Password Reset Operations ==============

    /// Store a password-reset digest, replacing any open reset challenge
    async fn set_reset_challenge(&self, id: &str, digest: &str, expires_at: i64) -> Result<()>;

    /// Drop an open reset challenge without completing it
    async fn clear_reset_challenge(&self, id: &str) -> Result<()>;

    /// Install a new password hash, stamp `password_changed_at`, consume the
    /// reset challenge, and drop every refresh token the account holds
    async fn complete_password_reset(
        &self,
        id: &str,
        password_hash: &str,
        changed_at: i64,
    ) -> Result<()>;

    // ============== Lockout Operations ==============

    /// Count one failed login. An expired lock restarts the counter at 1;
    /// reaching `threshold` failures engages a lock of `lock_duration`
    /// seconds. Returns the resulting counter state.
    async fn record_login_failure(
        &self,
        id: &str,
        now: i64,
        threshold: u32,
        lock_duration: i64,
    ) -> Result<LoginFailure>;

    /// Reset the failure counter and clear any lock after a successful login
    async fn record_login_success(&self, id: &str) -> Result<()>;

    // ============== Refresh Token Operations ==============

    /// Append a refresh-token digest, pruning expired rows and evicting the
    /// oldest entries beyond `cap`
    async fn add_refresh_token(
        &self,
        account_id: &str,
        token: &NewRefreshToken,
        cap: usize,
        now: i64,
    ) -> Result<()>;

    /// Consume a live presented digest and append its replacement in one
    /// operation. Returns the owning account id, or `None` when the digest
    /// is unknown, expired, or already used (single-use rotation).
    async fn rotate_refresh_token(
        &self,
        presented_digest: &str,
        replacement: &NewRefreshToken,
        cap: usize,
        now: i64,
    ) -> Result<Option<String>>;

    /// Remove a refresh-token digest if present; absence is not an error
    async fn remove_refresh_token(&self, digest: &str) -> Result<()>;

    /// All stored refresh-token rows for an account, oldest first
    async fn list_refresh_tokens(&self, account_id: &str) -> Result<Vec<RefreshTokenEntry>>;
}
