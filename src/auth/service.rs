use std::sync::Arc;

use chrono::Utc;
use uuid::Uuid;

use crate::db::{Account, AccountStore, NewAccount, NewRefreshToken};
use crate::mailer::{templates, Mailer};
use crate::types::{normalize_email, AppError, RegisterRequest, Result, TokenPair};
use crate::utils::config::{AuthConfig, MailConfig};

use super::secrets;
use super::tokens::TokenIssuer;

/// Wrong OTP presentations tolerated before the challenge is dead.
const OTP_ATTEMPT_LIMIT: i64 = 5;

const VERIFY_TOKEN_BYTES: usize = 32;
const RESET_TOKEN_BYTES: usize = 32;

/// Request-scoped client details recorded alongside a refresh token.
#[derive(Debug, Clone, Default)]
pub struct SessionMeta {
    pub user_agent: Option<String>,
    pub ip_address: Option<String>,
}

/// Outcome of a successful registration.
#[derive(Debug)]
pub struct NewRegistration {
    pub account_id: String,
    pub email: String,
}

/// An authenticated session: the account plus a fresh token pair whose
/// refresh half is already recorded in the store.
#[derive(Debug)]
pub struct AuthenticatedSession {
    pub account: Account,
    pub tokens: TokenPair,
}

/// Orchestrates the authentication flows.
///
/// Two per-account state tracks run through here. The verification track:
/// a challenge (OTP plus link token) is issued at registration, replaced on
/// resend, and consumed by either proof. The lockout track: consecutive
/// login failures feed a counter that engages a time-boxed lock at the
/// configured threshold. Both tracks are mutated only through the store's
/// conditional statements, so concurrent requests cannot under-count.
pub struct AuthService {
    store: Arc<dyn AccountStore>,
    mailer: Arc<dyn Mailer>,
    tokens: TokenIssuer,
    policy: AuthConfig,
    mail: MailConfig,
}

impl AuthService {
    /// Wires the service to its collaborators. The token issuer is derived
    /// from the policy's secret and expiries.
    pub fn new(
        store: Arc<dyn AccountStore>,
        mailer: Arc<dyn Mailer>,
        policy: AuthConfig,
        mail: MailConfig,
    ) -> Self {
        let tokens = TokenIssuer::new(
            policy.jwt_secret.clone(),
            policy.jwt_access_expiry,
            policy.jwt_refresh_expiry,
        );
        Self {
            store,
            mailer,
            tokens,
            policy,
            mail,
        }
    }

    /// Creates an unverified account and requests delivery of the
    /// verification email (code plus link).
    ///
    /// A dead mail transport does not undo the registration; the caller
    /// still gets the "check your email" outcome and can ask for a resend.
    pub async fn register(&self, req: &RegisterRequest) -> Result<NewRegistration> {
        let email = normalize_email(&req.email);

        if self.store.find_by_email(&email).await?.is_some() {
            return Err(AppError::AlreadyExists);
        }

        let password_hash = secrets::hash_password(&req.password)?;
        let otp = secrets::generate_otp();
        let verify_token = secrets::random_hex(VERIFY_TOKEN_BYTES);
        let now = Utc::now().timestamp();

        let account = NewAccount {
            id: Uuid::new_v4().to_string(),
            email: email.clone(),
            name: req.name.trim().to_string(),
            password_hash,
            phone: req.phone.clone(),
            country: req.country.clone().unwrap_or_else(|| "US".to_string()),
            currency: req.currency.clone().unwrap_or_else(|| "USD".to_string()),
            otp_hash: secrets::sha256_hex(&otp),
            otp_expires_at: now + self.policy.otp_expiry,
            verify_token_hash: secrets::sha256_hex(&verify_token),
            verify_expires_at: now + self.policy.verify_token_expiry,
        };

        // The unique-email constraint catches a concurrent registration
        // that slipped past the lookup above.
        self.store.create_account(&account).await?;

        if let Err(e) = self
            .send_verification(&account.email, &account.name, &otp, &verify_token)
            .await
        {
            tracing::warn!(account_id = %account.id, error = %e, "verification email failed at registration");
        }

        tracing::info!(account_id = %account.id, "account registered");

        Ok(NewRegistration {
            account_id: account.id,
            email,
        })
    }

    /// Proves email ownership with the six-digit code and opens the first
    /// session.
    ///
    /// The attempt budget is checked before the code is compared: once five
    /// wrong codes have been counted, even the correct one is turned away
    /// until a fresh challenge is issued.
    pub async fn verify_otp(
        &self,
        email: &str,
        code: &str,
        meta: SessionMeta,
    ) -> Result<AuthenticatedSession> {
        let email = normalize_email(email);
        let account = self
            .store
            .find_by_email(&email)
            .await?
            .ok_or_else(|| AppError::NotFound("User".to_string()))?;

        if account.email_verified {
            return Err(AppError::AlreadyVerified);
        }
        if account.otp_attempts_exhausted(OTP_ATTEMPT_LIMIT) {
            return Err(AppError::TooManyAttempts);
        }

        let now = Utc::now().timestamp();
        let code_digest = secrets::sha256_hex(code);
        let accepted = matches!(
            (&account.otp_hash, account.otp_expires_at),
            (Some(digest), Some(expires)) if *digest == code_digest && now < expires
        );

        if !accepted {
            self.store.record_otp_failure(&account.id).await?;
            return Err(AppError::InvalidOrExpired("OTP".to_string()));
        }

        self.store.mark_email_verified(&account.id).await?;
        tracing::info!(account_id = %account.id, "email verified via OTP");

        let account = self
            .store
            .find_by_id(&account.id)
            .await?
            .ok_or_else(|| AppError::NotFound("User".to_string()))?;

        self.open_session(account, meta).await
    }

    /// Replaces the open verification challenge with fresh secrets and
    /// requests delivery. Here a dead transport does surface, and the new
    /// challenge stays stored for a later resend.
    pub async fn resend_otp(&self, email: &str) -> Result<()> {
        let email = normalize_email(email);
        let account = self
            .store
            .find_by_email(&email)
            .await?
            .ok_or_else(|| AppError::NotFound("User".to_string()))?;

        if account.email_verified {
            return Err(AppError::AlreadyVerified);
        }

        let otp = secrets::generate_otp();
        let verify_token = secrets::random_hex(VERIFY_TOKEN_BYTES);
        let now = Utc::now().timestamp();

        self.store
            .set_email_challenge(
                &account.id,
                &secrets::sha256_hex(&otp),
                now + self.policy.otp_expiry,
                &secrets::sha256_hex(&verify_token),
                now + self.policy.verify_token_expiry,
            )
            .await?;

        self.send_verification(&account.email, &account.name, &otp, &verify_token)
            .await
            .map_err(|e| {
                tracing::warn!(account_id = %account.id, error = %e, "OTP resend delivery failed");
                AppError::DeliveryFailed("Failed to send OTP email".to_string())
            })?;

        tracing::info!(account_id = %account.id, "verification challenge reissued");
        Ok(())
    }

    /// Checks credentials and opens a session.
    ///
    /// Unknown email and wrong password fail identically. A locked account
    /// is rejected before the password is checked, so attempts made while
    /// locked never feed the counter.
    pub async fn login(
        &self,
        email: &str,
        password: &str,
        meta: SessionMeta,
    ) -> Result<AuthenticatedSession> {
        let email = normalize_email(email);
        let Some(account) = self.store.find_by_email(&email).await? else {
            return Err(AppError::InvalidCredentials);
        };

        let now = Utc::now().timestamp();
        if account.is_locked(now) {
            return Err(AppError::AccountLocked);
        }

        if !secrets::verify_password(password, &account.password_hash)? {
            let failure = self
                .store
                .record_login_failure(
                    &account.id,
                    now,
                    self.policy.lockout_threshold,
                    self.policy.lockout_duration,
                )
                .await?;
            if failure.lock_until.is_some() {
                tracing::warn!(
                    account_id = %account.id,
                    attempts = failure.attempts,
                    "account locked after repeated login failures"
                );
            }
            return Err(AppError::InvalidCredentials);
        }

        self.store.record_login_success(&account.id).await?;
        tracing::info!(account_id = %account.id, "login");

        self.open_session(account, meta).await
    }

    /// Exchanges a live refresh token for a fresh pair.
    ///
    /// Rotation is single-use: the presented token is consumed in the same
    /// store operation that records its replacement, so presenting it twice
    /// fails the second time.
    pub async fn refresh(&self, presented: &str, meta: SessionMeta) -> Result<TokenPair> {
        let now = Utc::now().timestamp();
        let replacement = self.tokens.issue_refresh_token();
        let entry = NewRefreshToken {
            token_hash: secrets::sha256_hex(&replacement),
            expires_at: now + self.tokens.refresh_expiry(),
            user_agent: meta.user_agent,
            ip_address: meta.ip_address,
        };

        let Some(account_id) = self
            .store
            .rotate_refresh_token(
                &secrets::sha256_hex(presented),
                &entry,
                self.policy.max_sessions,
                now,
            )
            .await?
        else {
            return Err(AppError::InvalidRefreshToken);
        };

        let access_token = self.tokens.issue_access_token(&account_id)?;
        tracing::debug!(account_id = %account_id, "refresh token rotated");

        Ok(TokenPair {
            access_token,
            refresh_token: replacement,
        })
    }

    /// Drops the presented refresh token's session if it exists. Absence is
    /// not an error: logout always succeeds.
    pub async fn logout(&self, refresh_token: Option<&str>) -> Result<()> {
        if let Some(token) = refresh_token {
            self.store
                .remove_refresh_token(&secrets::sha256_hex(token))
                .await?;
        }
        Ok(())
    }

    /// Opens a password-reset challenge and requests delivery of the link.
    ///
    /// Returns `Ok` for unknown emails too; the HTTP surface sends one fixed
    /// body either way so the endpoint cannot be used to probe for accounts.
    /// If delivery fails, the stored challenge is rolled back before the
    /// failure surfaces.
    pub async fn forgot_password(&self, email: &str) -> Result<()> {
        let email = normalize_email(email);
        let Some(account) = self.store.find_by_email(&email).await? else {
            return Ok(());
        };

        let reset_token = secrets::random_hex(RESET_TOKEN_BYTES);
        let now = Utc::now().timestamp();

        self.store
            .set_reset_challenge(
                &account.id,
                &secrets::sha256_hex(&reset_token),
                now + self.policy.reset_token_expiry,
            )
            .await?;

        let reset_url = format!(
            "{}/reset-password?token={}",
            self.mail.frontend_url, reset_token
        );
        let message = templates::password_reset_email(&self.mail.from_name, &account.name, &reset_url);

        if let Err(e) = self.mailer.deliver(&account.email, &message).await {
            self.store.clear_reset_challenge(&account.id).await?;
            tracing::warn!(account_id = %account.id, error = %e, "reset email delivery failed");
            return Err(AppError::DeliveryFailed(
                "Failed to send reset email".to_string(),
            ));
        }

        tracing::info!(account_id = %account.id, "password reset requested");
        Ok(())
    }

    /// Completes a reset: new password, `password_changed_at` stamped, the
    /// challenge consumed, and every refresh token revoked. Access tokens
    /// issued before this moment become stale.
    pub async fn reset_password(&self, raw_token: &str, new_password: &str) -> Result<()> {
        let now = Utc::now().timestamp();
        let account = self
            .store
            .find_by_reset_digest(&secrets::sha256_hex(raw_token), now)
            .await?
            .ok_or_else(|| AppError::InvalidOrExpired("reset token".to_string()))?;

        let password_hash = secrets::hash_password(new_password)?;
        self.store
            .complete_password_reset(&account.id, &password_hash, now)
            .await?;

        tracing::info!(account_id = %account.id, "password reset; all sessions revoked");
        Ok(())
    }

    /// Link-flow sibling of [`verify_otp`](Self::verify_otp): marks the
    /// email verified and consumes both challenge forms. No session is
    /// opened.
    pub async fn verify_email_token(&self, raw_token: &str) -> Result<()> {
        let now = Utc::now().timestamp();
        let account = self
            .store
            .find_by_verify_digest(&secrets::sha256_hex(raw_token), now)
            .await?
            .ok_or_else(|| AppError::InvalidOrExpired("verification token".to_string()))?;

        self.store.mark_email_verified(&account.id).await?;
        tracing::info!(account_id = %account.id, "email verified via link");
        Ok(())
    }

    /// Resolves an access token to its account for the request gatekeeper:
    /// verify signature and expiry, load the account, reject locked
    /// accounts and tokens issued before the last password change.
    pub async fn resolve_access(&self, token: &str) -> Result<Account> {
        let claims = self.tokens.verify_access_token(token)?;
        let account = self
            .store
            .find_by_id(&claims.sub)
            .await?
            .ok_or_else(|| AppError::InvalidToken("Invalid token. User not found.".to_string()))?;

        let now = Utc::now().timestamp();
        if account.is_locked(now) {
            return Err(AppError::AccountLocked);
        }
        if account.token_is_stale(claims.iat as i64) {
            return Err(AppError::StaleToken);
        }

        Ok(account)
    }

    async fn open_session(
        &self,
        account: Account,
        meta: SessionMeta,
    ) -> Result<AuthenticatedSession> {
        let tokens = self.tokens.issue_pair(&account.id)?;
        let now = Utc::now().timestamp();

        let entry = NewRefreshToken {
            token_hash: secrets::sha256_hex(&tokens.refresh_token),
            expires_at: now + self.tokens.refresh_expiry(),
            user_agent: meta.user_agent,
            ip_address: meta.ip_address,
        };
        self.store
            .add_refresh_token(&account.id, &entry, self.policy.max_sessions, now)
            .await?;

        Ok(AuthenticatedSession { account, tokens })
    }

    async fn send_verification(
        &self,
        email: &str,
        name: &str,
        otp: &str,
        verify_token: &str,
    ) -> Result<()> {
        let verify_url = format!(
            "{}/verify-email?token={}",
            self.mail.frontend_url, verify_token
        );
        let message = templates::verification_email(&self.mail.from_name, name, otp, &verify_url);
        self.mailer.deliver(email, &message).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::LibsqlStore;
    use crate::mailer::{MemoryMailer, MockMailer};

    fn policy() -> AuthConfig {
        AuthConfig {
            jwt_secret: "test-secret-key-that-is-at-least-32-chars".to_string(),
            jwt_access_expiry: 900,
            jwt_refresh_expiry: 604800,
            lockout_threshold: 5,
            lockout_duration: 7200,
            otp_expiry: 600,
            reset_token_expiry: 600,
            verify_token_expiry: 86400,
            max_sessions: 5,
        }
    }

    fn mail_config() -> MailConfig {
        MailConfig {
            from_name: "FinTrack".to_string(),
            frontend_url: "http://localhost:5173".to_string(),
        }
    }

    async fn service_with_policy(
        policy: AuthConfig,
    ) -> (AuthService, Arc<MemoryMailer>, Arc<LibsqlStore>) {
        let store = Arc::new(
            LibsqlStore::new_memory()
                .await
                .expect("in-memory store should open"),
        );
        let mailer = Arc::new(MemoryMailer::new());
        let service = AuthService::new(store.clone(), mailer.clone(), policy, mail_config());
        (service, mailer, store)
    }

    async fn test_service() -> (AuthService, Arc<MemoryMailer>, Arc<LibsqlStore>) {
        service_with_policy(policy()).await
    }

    fn register_input(email: &str) -> RegisterRequest {
        RegisterRequest {
            name: "Jane Doe".to_string(),
            email: email.to_string(),
            password: "Str0ng!pass".to_string(),
            phone: None,
            country: None,
            currency: None,
        }
    }

    /// Pulls the six-digit code out of a captured verification email.
    fn extract_otp(mailer: &MemoryMailer, to: &str) -> String {
        let message = mailer.last_to(to).expect("a verification email was sent");
        message
            .body
            .split_whitespace()
            .find(|word| word.len() == 6 && word.chars().all(|c| c.is_ascii_digit()))
            .expect("body should contain a six-digit code")
            .to_string()
    }

    /// Pulls the raw token out of the first `token=` link in a captured email.
    fn extract_link_token(mailer: &MemoryMailer, to: &str) -> String {
        let message = mailer.last_to(to).expect("an email was sent");
        let start = message
            .body
            .find("token=")
            .expect("body should contain a token link")
            + "token=".len();
        message.body[start..]
            .split_whitespace()
            .next()
            .expect("token should end at whitespace")
            .to_string()
    }

    #[tokio::test]
    async fn register_verify_login_round_trip() {
        let (service, mailer, store) = test_service().await;

        let registration = service
            .register(&register_input("jane@example.com"))
            .await
            .expect("registration should succeed");
        assert_eq!(registration.email, "jane@example.com");

        let otp = extract_otp(&mailer, "jane@example.com");
        let session = service
            .verify_otp("jane@example.com", &otp, SessionMeta::default())
            .await
            .expect("correct code should verify");

        assert!(session.account.email_verified);
        assert!(session.account.otp_hash.is_none(), "challenge is consumed");
        assert!(!session.tokens.access_token.is_empty());

        let tokens = store
            .list_refresh_tokens(&registration.account_id)
            .await
            .expect("list should succeed");
        assert_eq!(tokens.len(), 1, "verification opened one session");

        let login = service
            .login("jane@example.com", "Str0ng!pass", SessionMeta::default())
            .await
            .expect("login should succeed after verification");
        assert_eq!(login.account.login_attempts, 0);
    }

    #[tokio::test]
    async fn register_rejects_duplicate_email_case_insensitively() {
        let (service, _mailer, _store) = test_service().await;

        service
            .register(&register_input("jane@example.com"))
            .await
            .expect("first registration should succeed");

        let result = service.register(&register_input("JANE@Example.COM")).await;
        assert!(matches!(result, Err(AppError::AlreadyExists)));
    }

    #[tokio::test]
    async fn registration_survives_mail_outage_and_resend_recovers() {
        let (service, mailer, _store) = test_service().await;
        mailer.set_failing(true);

        service
            .register(&register_input("jane@example.com"))
            .await
            .expect("registration should succeed despite mail outage");
        assert!(mailer.sent().is_empty());

        let result = service.resend_otp("jane@example.com").await;
        assert!(
            matches!(result, Err(AppError::DeliveryFailed(_))),
            "resend surfaces the outage"
        );

        mailer.set_failing(false);
        service
            .resend_otp("jane@example.com")
            .await
            .expect("resend should succeed once the transport recovers");

        let otp = extract_otp(&mailer, "jane@example.com");
        service
            .verify_otp("jane@example.com", &otp, SessionMeta::default())
            .await
            .expect("the resent code should verify");
    }

    #[tokio::test]
    async fn otp_attempts_saturate_and_reset_on_reissue() {
        let (service, mailer, _store) = test_service().await;
        service
            .register(&register_input("jane@example.com"))
            .await
            .expect("registration should succeed");
        let correct = extract_otp(&mailer, "jane@example.com");

        for _ in 0..5 {
            let result = service
                .verify_otp("jane@example.com", "000000", SessionMeta::default())
                .await;
            assert!(matches!(result, Err(AppError::InvalidOrExpired(_))));
        }

        // Budget spent: even the correct code is refused now.
        let result = service
            .verify_otp("jane@example.com", &correct, SessionMeta::default())
            .await;
        assert!(matches!(result, Err(AppError::TooManyAttempts)));

        service
            .resend_otp("jane@example.com")
            .await
            .expect("resend should succeed");
        let fresh = extract_otp(&mailer, "jane@example.com");
        service
            .verify_otp("jane@example.com", &fresh, SessionMeta::default())
            .await
            .expect("a fresh challenge starts with a clean attempt budget");
    }

    #[tokio::test]
    async fn expired_otp_is_rejected() {
        let mut p = policy();
        p.otp_expiry = -10;
        let (service, mailer, _store) = service_with_policy(p).await;

        service
            .register(&register_input("jane@example.com"))
            .await
            .expect("registration should succeed");
        let otp = extract_otp(&mailer, "jane@example.com");

        let result = service
            .verify_otp("jane@example.com", &otp, SessionMeta::default())
            .await;
        assert!(matches!(result, Err(AppError::InvalidOrExpired(_))));
    }

    #[tokio::test]
    async fn verify_otp_for_unknown_or_verified_account() {
        let (service, mailer, _store) = test_service().await;

        let result = service
            .verify_otp("ghost@example.com", "123456", SessionMeta::default())
            .await;
        assert!(matches!(result, Err(AppError::NotFound(_))));

        service
            .register(&register_input("jane@example.com"))
            .await
            .expect("registration should succeed");
        let otp = extract_otp(&mailer, "jane@example.com");
        service
            .verify_otp("jane@example.com", &otp, SessionMeta::default())
            .await
            .expect("verification should succeed");

        let result = service
            .verify_otp("jane@example.com", &otp, SessionMeta::default())
            .await;
        assert!(matches!(result, Err(AppError::AlreadyVerified)));

        let result = service.resend_otp("jane@example.com").await;
        assert!(matches!(result, Err(AppError::AlreadyVerified)));
    }

    #[tokio::test]
    async fn verification_link_works_once() {
        let (service, mailer, store) = test_service().await;
        let registration = service
            .register(&register_input("jane@example.com"))
            .await
            .expect("registration should succeed");

        let token = extract_link_token(&mailer, "jane@example.com");
        service
            .verify_email_token(&token)
            .await
            .expect("link token should verify");

        let account = store
            .find_by_id(&registration.account_id)
            .await
            .expect("lookup should succeed")
            .expect("account exists");
        assert!(account.email_verified);
        assert!(account.verify_token_hash.is_none());
        assert!(account.otp_hash.is_none(), "both challenge forms consumed");

        let result = service.verify_email_token(&token).await;
        assert!(
            matches!(result, Err(AppError::InvalidOrExpired(_))),
            "a consumed link is dead"
        );
    }

    #[tokio::test]
    async fn fifth_failure_locks_even_against_the_correct_password() {
        let (service, _mailer, store) = test_service().await;
        service
            .register(&register_input("jane@example.com"))
            .await
            .expect("registration should succeed");

        for _ in 0..5 {
            let result = service
                .login("jane@example.com", "Wr0ng!pass", SessionMeta::default())
                .await;
            assert!(matches!(result, Err(AppError::InvalidCredentials)));
        }

        let result = service
            .login("jane@example.com", "Str0ng!pass", SessionMeta::default())
            .await;
        assert!(
            matches!(result, Err(AppError::AccountLocked)),
            "the lock holds even for the correct password"
        );

        let account = store
            .find_by_email("jane@example.com")
            .await
            .expect("lookup should succeed")
            .expect("account exists");
        assert_eq!(account.login_attempts, 5);
        assert!(account.lock_until.is_some());
    }

    #[tokio::test]
    async fn failure_after_lock_expiry_restarts_the_counter() {
        let mut p = policy();
        p.lockout_threshold = 2;
        p.lockout_duration = -5; // lock engages already expired
        let (service, _mailer, store) = service_with_policy(p).await;

        service
            .register(&register_input("jane@example.com"))
            .await
            .expect("registration should succeed");

        for _ in 0..2 {
            let _ = service
                .login("jane@example.com", "Wr0ng!pass", SessionMeta::default())
                .await;
        }
        // Third failure lands on an expired lock: counter restarts at 1.
        let _ = service
            .login("jane@example.com", "Wr0ng!pass", SessionMeta::default())
            .await;

        let account = store
            .find_by_email("jane@example.com")
            .await
            .expect("lookup should succeed")
            .expect("account exists");
        assert_eq!(account.login_attempts, 1);
        assert!(account.lock_until.is_none());

        service
            .login("jane@example.com", "Str0ng!pass", SessionMeta::default())
            .await
            .expect("correct password works after the lock expired");
    }

    #[tokio::test]
    async fn successful_login_resets_the_counter() {
        let (service, _mailer, store) = test_service().await;
        service
            .register(&register_input("jane@example.com"))
            .await
            .expect("registration should succeed");

        for _ in 0..3 {
            let _ = service
                .login("jane@example.com", "Wr0ng!pass", SessionMeta::default())
                .await;
        }
        service
            .login("jane@example.com", "Str0ng!pass", SessionMeta::default())
            .await
            .expect("login should succeed below the threshold");

        let account = store
            .find_by_email("jane@example.com")
            .await
            .expect("lookup should succeed")
            .expect("account exists");
        assert_eq!(account.login_attempts, 0);
    }

    #[tokio::test]
    async fn refresh_tokens_are_single_use() {
        let (service, _mailer, _store) = test_service().await;
        service
            .register(&register_input("jane@example.com"))
            .await
            .expect("registration should succeed");
        let session = service
            .login("jane@example.com", "Str0ng!pass", SessionMeta::default())
            .await
            .expect("login should succeed");

        let first = session.tokens.refresh_token.clone();
        let rotated = service
            .refresh(&first, SessionMeta::default())
            .await
            .expect("first presentation rotates");
        assert_ne!(rotated.refresh_token, first);

        let replay = service.refresh(&first, SessionMeta::default()).await;
        assert!(
            matches!(replay, Err(AppError::InvalidRefreshToken)),
            "a consumed refresh token is dead"
        );

        service
            .refresh(&rotated.refresh_token, SessionMeta::default())
            .await
            .expect("the replacement token is live");
    }

    #[tokio::test]
    async fn session_cap_evicts_the_oldest_token() {
        let (service, _mailer, store) = test_service().await;
        let registration = service
            .register(&register_input("jane@example.com"))
            .await
            .expect("registration should succeed");

        let mut refresh_tokens = Vec::new();
        for _ in 0..6 {
            let session = service
                .login("jane@example.com", "Str0ng!pass", SessionMeta::default())
                .await
                .expect("login should succeed");
            refresh_tokens.push(session.tokens.refresh_token);
        }

        let stored = store
            .list_refresh_tokens(&registration.account_id)
            .await
            .expect("list should succeed");
        assert_eq!(stored.len(), 5, "the set never exceeds the cap");

        let evicted = service
            .refresh(&refresh_tokens[0], SessionMeta::default())
            .await;
        assert!(
            matches!(evicted, Err(AppError::InvalidRefreshToken)),
            "the oldest token was evicted"
        );
        service
            .refresh(&refresh_tokens[5], SessionMeta::default())
            .await
            .expect("the newest token is live");
    }

    #[tokio::test]
    async fn logout_is_idempotent() {
        let (service, _mailer, store) = test_service().await;
        let registration = service
            .register(&register_input("jane@example.com"))
            .await
            .expect("registration should succeed");
        let session = service
            .login("jane@example.com", "Str0ng!pass", SessionMeta::default())
            .await
            .expect("login should succeed");

        service
            .logout(Some(&session.tokens.refresh_token))
            .await
            .expect("logout should succeed");
        let stored = store
            .list_refresh_tokens(&registration.account_id)
            .await
            .expect("list should succeed");
        assert!(stored.is_empty());

        service
            .logout(Some(&session.tokens.refresh_token))
            .await
            .expect("a second logout is still fine");
        service
            .logout(None)
            .await
            .expect("logout without a token is still fine");
    }

    #[tokio::test]
    async fn forgot_password_is_silent_for_unknown_emails() {
        let (service, mailer, _store) = test_service().await;

        service
            .forgot_password("ghost@example.com")
            .await
            .expect("unknown email still reports success");
        assert!(mailer.sent().is_empty(), "nothing was delivered");
    }

    #[tokio::test]
    async fn forgot_password_rolls_back_on_delivery_failure() {
        let (service, mailer, store) = test_service().await;
        let registration = service
            .register(&register_input("jane@example.com"))
            .await
            .expect("registration should succeed");

        mailer.set_failing(true);
        let result = service.forgot_password("jane@example.com").await;
        assert!(matches!(result, Err(AppError::DeliveryFailed(_))));

        let account = store
            .find_by_id(&registration.account_id)
            .await
            .expect("lookup should succeed")
            .expect("account exists");
        assert!(
            account.reset_token_hash.is_none(),
            "undelivered challenge was rolled back"
        );

        mailer.set_failing(false);
        service
            .forgot_password("jane@example.com")
            .await
            .expect("retry should succeed");
        let token = extract_link_token(&mailer, "jane@example.com");
        service
            .reset_password(&token, "N3w!passwd")
            .await
            .expect("delivered token should reset");
    }

    #[tokio::test]
    async fn password_reset_revokes_sessions_and_stales_access_tokens() {
        let (service, mailer, store) = test_service().await;
        let registration = service
            .register(&register_input("jane@example.com"))
            .await
            .expect("registration should succeed");

        let session = service
            .login("jane@example.com", "Str0ng!pass", SessionMeta::default())
            .await
            .expect("login should succeed");
        service
            .login("jane@example.com", "Str0ng!pass", SessionMeta::default())
            .await
            .expect("second login should succeed");

        // The stale check compares whole seconds; step past the boundary.
        tokio::time::sleep(std::time::Duration::from_millis(1100)).await;

        service
            .forgot_password("jane@example.com")
            .await
            .expect("request should succeed");
        let token = extract_link_token(&mailer, "jane@example.com");
        service
            .reset_password(&token, "N3w!passwd")
            .await
            .expect("reset should succeed");

        let stored = store
            .list_refresh_tokens(&registration.account_id)
            .await
            .expect("list should succeed");
        assert!(stored.is_empty(), "every session was revoked");

        let replay = service
            .refresh(&session.tokens.refresh_token, SessionMeta::default())
            .await;
        assert!(matches!(replay, Err(AppError::InvalidRefreshToken)));

        let stale = service.resolve_access(&session.tokens.access_token).await;
        assert!(
            matches!(stale, Err(AppError::StaleToken)),
            "pre-reset access tokens are stale"
        );

        let result = service
            .login("jane@example.com", "Str0ng!pass", SessionMeta::default())
            .await;
        assert!(
            matches!(result, Err(AppError::InvalidCredentials)),
            "the old password is gone"
        );
        service
            .login("jane@example.com", "N3w!passwd", SessionMeta::default())
            .await
            .expect("the new password works");
    }

    #[tokio::test]
    async fn reset_with_bad_token_fails() {
        let (service, _mailer, _store) = test_service().await;

        let result = service.reset_password("not-a-real-token", "N3w!passwd").await;
        assert!(matches!(result, Err(AppError::InvalidOrExpired(_))));
    }

    #[tokio::test]
    async fn expired_reset_token_fails() {
        let mut p = policy();
        p.reset_token_expiry = -10;
        let (service, mailer, _store) = service_with_policy(p).await;

        service
            .register(&register_input("jane@example.com"))
            .await
            .expect("registration should succeed");
        service
            .forgot_password("jane@example.com")
            .await
            .expect("request should succeed");

        let token = extract_link_token(&mailer, "jane@example.com");
        let result = service.reset_password(&token, "N3w!passwd").await;
        assert!(matches!(result, Err(AppError::InvalidOrExpired(_))));
    }

    #[tokio::test]
    async fn resolve_access_rejects_locked_accounts() {
        let (service, _mailer, _store) = test_service().await;
        service
            .register(&register_input("jane@example.com"))
            .await
            .expect("registration should succeed");
        let session = service
            .login("jane@example.com", "Str0ng!pass", SessionMeta::default())
            .await
            .expect("login should succeed");

        for _ in 0..5 {
            let _ = service
                .login("jane@example.com", "Wr0ng!pass", SessionMeta::default())
                .await;
        }

        let result = service.resolve_access(&session.tokens.access_token).await;
        assert!(
            matches!(result, Err(AppError::AccountLocked)),
            "a lock bars even valid tokens"
        );
    }

    #[tokio::test]
    async fn resolve_access_rejects_unknown_subjects() {
        let (service, _mailer, _store) = test_service().await;

        let foreign = TokenIssuer::new(
            "test-secret-key-that-is-at-least-32-chars".to_string(),
            900,
            604800,
        );
        let token = foreign
            .issue_access_token("no-such-account")
            .expect("should sign");

        let result = service.resolve_access(&token).await;
        assert!(matches!(result, Err(AppError::InvalidToken(_))));
    }

    #[tokio::test]
    async fn mailer_contract_is_one_delivery_per_issue() {
        let store = Arc::new(
            LibsqlStore::new_memory()
                .await
                .expect("in-memory store should open"),
        );
        let mut mock = MockMailer::new();
        mock.expect_deliver()
            .withf(|to, message| {
                to == "jane@example.com" && message.subject.contains("Verify Your Email")
            })
            .times(2)
            .returning(|_, _| Ok(()));

        let service = AuthService::new(store, Arc::new(mock), policy(), mail_config());

        service
            .register(&register_input("jane@example.com"))
            .await
            .expect("registration should succeed");
        service
            .resend_otp("jane@example.com")
            .await
            .expect("resend should succeed");
    }
}
