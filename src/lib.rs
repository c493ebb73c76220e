//! # FinTrack - Personal Finance Backend
//!
//! A personal finance backend whose core is hardened account authentication:
//! email-verified registration, brute-force login lockout, short-lived access
//! tokens paired with rotating refresh tokens, and time-boxed one-time codes
//! for email verification and password reset.
//!
//! ## Overview
//!
//! FinTrack can be used in two ways:
//!
//! 1. **As a standalone server** - Run the `fintrack-server` binary
//! 2. **As a library** - Import components into your own Rust project
//!
//! ## Quick Start (Library Usage)
//!
//! Add to your `Cargo.toml`:
//!
//! ```toml
//! [dependencies]
//! fintrack-server = "0.3"
//! ```
//!
//! ### Basic Example
//!
//! ```rust,ignore
//! use fintrack::auth::{AuthService, SessionMeta};
//! use fintrack::db::LibsqlStore;
//! use fintrack::mailer::LogMailer;
//! use fintrack::utils::config::Config;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::from_env()?;
//!     let store = Arc::new(LibsqlStore::new_memory().await?);
//!     let auth = AuthService::new(
//!         store,
//!         Arc::new(LogMailer),
//!         config.auth.clone(),
//!         config.mail.clone(),
//!     );
//!
//!     let session = auth
//!         .login("jane@example.com", "Str0ng!pass", SessionMeta::default())
//!         .await?;
//!     println!("access token: {}", session.tokens.access_token);
//!
//!     Ok(())
//! }
//! ```
//!
//! ### Serving the API
//!
//! ```rust,ignore
//! use fintrack::api::routes::build_router;
//!
//! let app = build_router(state);
//! let listener = tokio::net::TcpListener::bind("127.0.0.1:3001").await?;
//! axum::serve(listener, app).await?;
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Description |
//! |---------|-------------|
//! | `swagger-ui` | Interactive API documentation at `/swagger-ui/` |
//!
//! ## Modules
//!
//! - [`api`] - REST API handlers and routes
//! - [`auth`] - Credential handling, tokens, flows, and middleware
//! - [`cli`] - Command-line interface for the server binary
//! - [`db`] - Account and session storage (libsql: memory, file, or remote)
//! - [`mailer`] - Outbound email delivery behind a swappable trait
//! - [`types`] - Request/response types and error handling
//! - [`utils`] - Environment-driven configuration
//!
//! ## Architecture
//!
//! Secrets never rest in the store: passwords are kept as Argon2id hashes,
//! while refresh tokens, one-time codes, and emailed link tokens are kept as
//! SHA-256 digests. Every store mutation that arbitrates a race (lockout
//! counting, challenge consumption, token rotation) is a single conditional
//! SQL statement, so two concurrent requests cannot both win.

#![cfg_attr(docsrs, feature(doc_cfg))]
#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]

/// HTTP API handlers and routes.
pub mod api;
/// Authentication flows, tokens, and middleware.
pub mod auth;
/// Command-line interface parsing and terminal output.
pub mod cli;
/// Account and session storage over libsql.
pub mod db;
/// Outbound email delivery.
pub mod mailer;
/// Core types (requests, responses, errors).
pub mod types;
/// Configuration utilities.
pub mod utils;

// Re-export commonly used types
pub use auth::{AuthService, CurrentAccount, SessionMeta};
pub use db::{AccountStore, LibsqlStore, StoreBackend};
pub use types::{AppError, Result};

use std::sync::Arc;

use crate::utils::config::Config;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    /// Environment-derived configuration
    pub config: Arc<Config>,
    /// Account and session store
    pub store: Arc<dyn AccountStore>,
    /// Authentication service
    pub auth: Arc<AuthService>,
}
