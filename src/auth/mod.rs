//! Account Authentication and Session Lifecycle
//!
//! This module carries the credential and token machinery for the FinTrack
//! API, from registration with email proof through login, token rotation,
//! and password recovery.
//!
//! # Module Structure
//!
//! - [`auth::secrets`](crate::auth::secrets) - Password hashing, digests, and random secrets
//! - [`auth::tokens`](crate::auth::tokens) - JWT access tokens and opaque refresh tokens
//! - [`auth::service`](crate::auth::service) - The orchestrating flows (register, login, reset, ...)
//! - [`auth::middleware`](crate::auth::middleware) - Axum layers and extractors for protected routes
//!
//! # Security Features
//!
//! - **Password Hashing**: Argon2id (memory-hard) with per-password salts
//! - **Access Tokens**: Short-lived HS256 JWTs, never stored server-side
//! - **Refresh Tokens**: Opaque 80-hex-character secrets, stored only as
//!   SHA-256 digests and rotated on every use
//! - **Email Proof**: Six-digit OTP with an attempt budget, plus a long-form
//!   link token, both time-boxed and single-use
//! - **Brute-force Lockout**: Consecutive login failures engage a time-boxed
//!   account lock
//!
//! # Usage
//!
//! ## Opening a session
//!
//! ```ignore
//! use fintrack::auth::{AuthService, SessionMeta};
//!
//! let session = auth.login(&email, &password, SessionMeta::default()).await?;
//! println!("access token: {}", session.tokens.access_token);
//! ```
//!
//! ## Protecting routes
//!
//! ```ignore
//! use axum::middleware::from_fn_with_state;
//! use fintrack::auth::middleware::require_auth;
//!
//! let app = Router::new()
//!     .route("/api/profile", get(handler))
//!     .layer(from_fn_with_state(state.clone(), require_auth));
//! ```
//!
//! ## Reading the caller in a handler
//!
//! ```ignore
//! use fintrack::auth::CurrentAccount;
//!
//! async fn handler(CurrentAccount(account): CurrentAccount) -> impl IntoResponse {
//!     format!("Hello, {}!", account.name)
//! }
//! ```
//!
//! # Configuration
//!
//! Configure via environment variables:
//! ```text
//! JWT_SECRET=change-me            # Required, use a strong random value
//! JWT_ACCESS_EXPIRY=900           # Access token lifetime in seconds
//! JWT_REFRESH_EXPIRY=604800       # Refresh token lifetime in seconds
//! LOCKOUT_THRESHOLD=5             # Failures before the account locks
//! LOCKOUT_DURATION=7200           # Lock length in seconds
//! ```

/// Authentication middleware and extractors for protected routes.
pub mod middleware;
/// Password hashing, digesting, and random secret generation.
pub mod secrets;
/// The authentication flows: registration, login, rotation, recovery.
pub mod service;
/// Access token signing and verification, refresh token minting.
pub mod tokens;

pub use middleware::CurrentAccount;
pub use service::{AuthService, AuthenticatedSession, NewRegistration, SessionMeta};
pub use tokens::{Claims, TokenIssuer};
