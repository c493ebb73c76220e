use serde::Deserialize;
use std::env;

use crate::types::{AppError, Result};

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub auth: AuthConfig,
    pub mail: MailConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub environment: String,
    pub cors_origin: Option<String>,
}

impl ServerConfig {
    pub fn is_production(&self) -> bool {
        self.environment == "production"
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct AuthConfig {
    pub jwt_secret: String,
    pub jwt_access_expiry: i64,
    pub jwt_refresh_expiry: i64,
    pub lockout_threshold: u32,
    pub lockout_duration: i64,
    pub otp_expiry: i64,
    pub reset_token_expiry: i64,
    pub verify_token_expiry: i64,
    pub max_sessions: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MailConfig {
    pub from_name: String,
    pub frontend_url: String,
}

fn required(key: &str) -> Result<String> {
    env::var(key).map_err(|_| AppError::Config(format!("{key} must be set")))
}

fn parsed<T: std::str::FromStr>(key: &str, default: &str) -> Result<T> {
    let raw = env::var(key).unwrap_or_else(|_| default.to_string());
    raw.parse()
        .map_err(|_| AppError::Config(format!("{key} has an invalid value: {raw}")))
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();

        Ok(Config {
            server: ServerConfig {
                host: env::var("HOST").unwrap_or_else(|_| "127.0.0.1".to_string()),
                port: parsed("PORT", "3001")?,
                environment: env::var("APP_ENV").unwrap_or_else(|_| "development".to_string()),
                cors_origin: env::var("CORS_ORIGIN").ok(),
            },
            auth: AuthConfig {
                jwt_secret: required("JWT_SECRET")?,
                jwt_access_expiry: parsed("JWT_ACCESS_EXPIRY", "900")?,
                jwt_refresh_expiry: parsed("JWT_REFRESH_EXPIRY", "604800")?,
                lockout_threshold: parsed("LOCKOUT_THRESHOLD", "5")?,
                lockout_duration: parsed("LOCKOUT_DURATION", "7200")?,
                otp_expiry: parsed("OTP_EXPIRY", "600")?,
                reset_token_expiry: parsed("RESET_TOKEN_EXPIRY", "600")?,
                verify_token_expiry: parsed("VERIFY_TOKEN_EXPIRY", "86400")?,
                max_sessions: parsed("MAX_SESSIONS", "5")?,
            },
            mail: MailConfig {
                from_name: env::var("MAIL_FROM_NAME").unwrap_or_else(|_| "FinTrack".to_string()),
                frontend_url: env::var("FRONTEND_URL")
                    .unwrap_or_else(|_| "http://localhost:5173".to_string()),
            },
        })
    }
}
