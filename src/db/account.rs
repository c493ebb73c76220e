/// A stored account row.
///
/// No `Serialize` impl: rows leave the crate only through the sanitized
/// `types::AccountProfile` view, so the password hash and challenge digests
/// cannot end up in a response body.
#[derive(Debug, Clone)]
pub struct Account {
    pub id: String,
    /// Canonical (trimmed, lowercased) email.
    pub email: String,
    pub name: String,
    pub password_hash: String,
    pub email_verified: bool,
    pub otp_hash: Option<String>,
    pub otp_expires_at: Option<i64>,
    pub otp_attempts: i64,
    pub reset_token_hash: Option<String>,
    pub reset_expires_at: Option<i64>,
    pub verify_token_hash: Option<String>,
    pub verify_expires_at: Option<i64>,
    /// Set only by password changes, never at registration.
    pub password_changed_at: Option<i64>,
    pub login_attempts: i64,
    pub lock_until: Option<i64>,
    pub phone: Option<String>,
    pub country: String,
    pub currency: String,
    pub created_at: i64,
    pub updated_at: i64,
}

impl Account {
    /// Lock state is derived: locked while `lock_until` is in the future.
    pub fn is_locked(&self, now: i64) -> bool {
        matches!(self.lock_until, Some(until) if now < until)
    }

    /// An access token issued strictly before the last password change is
    /// dead regardless of its own expiry.
    pub fn token_is_stale(&self, issued_at: i64) -> bool {
        matches!(self.password_changed_at, Some(changed) if issued_at < changed)
    }

    /// True while an OTP challenge exists and its attempt budget is spent.
    pub fn otp_attempts_exhausted(&self, limit: i64) -> bool {
        self.otp_hash.is_some() && self.otp_attempts >= limit
    }
}

/// Field set for inserting a fresh account. The verification challenge is
/// created in the same write as the row itself.
#[derive(Debug, Clone)]
pub struct NewAccount {
    pub id: String,
    pub email: String,
    pub name: String,
    pub password_hash: String,
    pub phone: Option<String>,
    pub country: String,
    pub currency: String,
    pub otp_hash: String,
    pub otp_expires_at: i64,
    pub verify_token_hash: String,
    pub verify_expires_at: i64,
}

/// One row of the refresh-token set.
#[derive(Debug, Clone)]
pub struct RefreshTokenEntry {
    pub id: String,
    pub account_id: String,
    pub token_hash: String,
    pub created_at: i64,
    pub expires_at: i64,
    pub user_agent: Option<String>,
    pub ip_address: Option<String>,
}

/// Field set for appending a refresh token; `created_at` and the row id are
/// assigned by the store.
#[derive(Debug, Clone)]
pub struct NewRefreshToken {
    pub token_hash: String,
    pub expires_at: i64,
    pub user_agent: Option<String>,
    pub ip_address: Option<String>,
}

/// Counter state after a recorded login failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoginFailure {
    pub attempts: i64,
    pub lock_until: Option<i64>,
}

/// Profile fields a caller may change; `None` leaves a field untouched.
#[derive(Debug, Clone, Default)]
pub struct ProfileChanges {
    pub name: Option<String>,
    pub phone: Option<String>,
    pub country: Option<String>,
    pub currency: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn account() -> Account {
        Account {
            id: "acct-1".to_string(),
            email: "jane@example.com".to_string(),
            name: "Jane Doe".to_string(),
            password_hash: "$argon2id$stub".to_string(),
            email_verified: false,
            otp_hash: None,
            otp_expires_at: None,
            otp_attempts: 0,
            reset_token_hash: None,
            reset_expires_at: None,
            verify_token_hash: None,
            verify_expires_at: None,
            password_changed_at: None,
            login_attempts: 0,
            lock_until: None,
            phone: None,
            country: "US".to_string(),
            currency: "USD".to_string(),
            created_at: 1_000,
            updated_at: 1_000,
        }
    }

    #[test]
    fn lock_state_is_derived_from_lock_until() {
        let mut acct = account();
        assert!(!acct.is_locked(2_000));

        acct.lock_until = Some(3_000);
        assert!(acct.is_locked(2_000), "future lock_until means locked");
        assert!(!acct.is_locked(3_000), "lock expires at the boundary");
        assert!(!acct.is_locked(4_000), "past lock_until means unlocked");
    }

    #[test]
    fn tokens_issued_before_password_change_are_stale() {
        let mut acct = account();
        assert!(
            !acct.token_is_stale(500),
            "no password change means nothing is stale"
        );

        acct.password_changed_at = Some(2_000);
        assert!(acct.token_is_stale(1_999));
        assert!(
            !acct.token_is_stale(2_000),
            "a token issued in the same second survives"
        );
    }

    #[test]
    fn otp_attempt_budget() {
        let mut acct = account();
        assert!(
            !acct.otp_attempts_exhausted(5),
            "no open challenge, nothing to exhaust"
        );

        acct.otp_hash = Some("digest".to_string());
        acct.otp_attempts = 4;
        assert!(!acct.otp_attempts_exhausted(5));

        acct.otp_attempts = 5;
        assert!(acct.otp_attempts_exhausted(5));
    }
}
