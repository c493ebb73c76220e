use chrono::{Duration, Utc};
use jsonwebtoken::{
    decode, encode, errors::ErrorKind, Algorithm, DecodingKey, EncodingKey, Header, Validation,
};
use serde::{Deserialize, Serialize};

use crate::types::{AppError, Result, TokenPair};

use super::secrets;

/// Claims carried by an access token.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// Account id the token was issued to.
    pub sub: String,
    /// Issued-at, seconds since the epoch.
    pub iat: usize,
    /// Expiry, seconds since the epoch.
    pub exp: usize,
}

const REFRESH_TOKEN_BYTES: usize = 40;

/// Issues and verifies session credentials.
///
/// Access tokens are short-lived HS256 JWTs carrying `{sub, iat, exp}` and
/// nothing else. Refresh tokens are opaque random strings with no embedded
/// claims; whether one is live is decided entirely by the account store.
pub struct TokenIssuer {
    jwt_secret: String,
    access_expiry: i64,
    refresh_expiry: i64,
}

impl TokenIssuer {
    /// Creates an issuer.
    ///
    /// # Arguments
    /// * `jwt_secret` - Secret key for signing JWTs (should be at least 32 chars)
    /// * `access_expiry` - Access token validity in seconds
    /// * `refresh_expiry` - Refresh token validity in seconds
    pub fn new(jwt_secret: String, access_expiry: i64, refresh_expiry: i64) -> Self {
        Self {
            jwt_secret,
            access_expiry,
            refresh_expiry,
        }
    }

    /// Access token validity in seconds.
    pub fn access_expiry(&self) -> i64 {
        self.access_expiry
    }

    /// Refresh token validity in seconds.
    pub fn refresh_expiry(&self) -> i64 {
        self.refresh_expiry
    }

    /// Signs an access token for the account.
    pub fn issue_access_token(&self, account_id: &str) -> Result<String> {
        let now = Utc::now();
        let claims = Claims {
            sub: account_id.to_string(),
            iat: now.timestamp() as usize,
            exp: (now + Duration::seconds(self.access_expiry)).timestamp() as usize,
        };

        encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &EncodingKey::from_secret(self.jwt_secret.as_bytes()),
        )
        .map_err(|e| AppError::Internal(format!("Failed to sign token: {}", e)))
    }

    /// Mints an opaque refresh token.
    ///
    /// The returned value is worthless until its digest is recorded in the
    /// account's refresh set.
    pub fn issue_refresh_token(&self) -> String {
        secrets::random_hex(REFRESH_TOKEN_BYTES)
    }

    /// Issues a fresh access/refresh pair.
    pub fn issue_pair(&self, account_id: &str) -> Result<TokenPair> {
        Ok(TokenPair {
            access_token: self.issue_access_token(account_id)?,
            refresh_token: self.issue_refresh_token(),
        })
    }

    /// Verifies signature and expiry of an access token and returns its
    /// claims. Expiry is reported distinctly from malformed or forged input.
    pub fn verify_access_token(&self, token: &str) -> Result<Claims> {
        let validation = Validation::new(Algorithm::HS256);

        decode::<Claims>(
            token,
            &DecodingKey::from_secret(self.jwt_secret.as_bytes()),
            &validation,
        )
        .map(|data| data.claims)
        .map_err(|e| match e.kind() {
            ErrorKind::ExpiredSignature => AppError::TokenExpired,
            _ => AppError::InvalidToken("Invalid or expired token.".to_string()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_test_issuer() -> TokenIssuer {
        TokenIssuer::new(
            "test-secret-key-that-is-at-least-32-chars".to_string(),
            900,    // 15 minutes
            604800, // 7 days
        )
    }

    #[test]
    fn test_access_token_round_trip() {
        let issuer = create_test_issuer();
        let now = Utc::now().timestamp() as usize;

        let token = issuer
            .issue_access_token("account-123")
            .expect("should sign token");
        let claims = issuer
            .verify_access_token(&token)
            .expect("should verify token");

        assert_eq!(claims.sub, "account-123", "subject should match account id");
        assert!(
            claims.iat >= now && claims.iat <= now + 5,
            "iat should be close to now"
        );
        assert_eq!(
            claims.exp,
            claims.iat + 900,
            "exp should be iat plus the access expiry"
        );
    }

    #[test]
    fn test_expired_token_is_reported_as_expired() {
        // Past the decoder's 60 second leeway.
        let issuer = TokenIssuer::new(
            "test-secret-key-that-is-at-least-32-chars".to_string(),
            -300,
            604800,
        );

        let token = issuer
            .issue_access_token("account-123")
            .expect("should sign token");
        let result = issuer.verify_access_token(&token);

        assert!(
            matches!(result, Err(AppError::TokenExpired)),
            "expired token should map to the expiry error, got {result:?}"
        );
    }

    #[test]
    fn test_wrong_secret_rejected() {
        let issuer1 = TokenIssuer::new("secret-one-that-is-32-chars-long".to_string(), 900, 604800);
        let issuer2 = TokenIssuer::new("secret-two-that-is-32-chars-long".to_string(), 900, 604800);

        let token = issuer1
            .issue_access_token("account-789")
            .expect("should sign");
        let result = issuer2.verify_access_token(&token);

        assert!(
            matches!(result, Err(AppError::InvalidToken(_))),
            "token signed with a different secret should fail"
        );
    }

    #[test]
    fn test_garbage_token_rejected() {
        let issuer = create_test_issuer();

        let result = issuer.verify_access_token("invalid.token.here");

        assert!(matches!(result, Err(AppError::InvalidToken(_))));
    }

    #[test]
    fn test_refresh_token_shape() {
        let issuer = create_test_issuer();

        let token = issuer.issue_refresh_token();

        assert_eq!(token.len(), 80, "40 random bytes hex-encoded");
        assert!(token.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(
            token,
            issuer.issue_refresh_token(),
            "refresh tokens should not repeat"
        );
    }

    #[test]
    fn test_pair_contains_distinct_tokens() {
        let issuer = create_test_issuer();

        let pair = issuer.issue_pair("account-123").expect("should issue pair");

        assert!(!pair.access_token.is_empty());
        assert!(!pair.refresh_token.is_empty());
        assert_ne!(pair.access_token, pair.refresh_token);
    }
}
