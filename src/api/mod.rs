//! HTTP API Handlers and Routes
//!
//! This module provides the REST API layer for FinTrack, built on the Axum
//! web framework.
//!
//! # Module Structure
//!
//! - [`api::handlers`](crate::api::handlers) - Request handlers for each endpoint
//! - [`api::routes`](crate::api::routes) - Route definitions and router configuration
//!
//! # API Endpoints
//!
//! ## Authentication (`/api/auth`)
//! - `POST /api/auth/register` - Register and receive a verification email
//! - `POST /api/auth/verify-otp` - Prove email ownership with the six-digit code
//! - `POST /api/auth/resend-otp` - Reissue the verification challenge
//! - `GET /api/auth/verify-email/{token}` - Prove email ownership via the emailed link
//! - `POST /api/auth/login` - Login and receive an access/refresh token pair
//! - `POST /api/auth/refresh` - Rotate the refresh token
//! - `POST /api/auth/logout` - End the session and clear cookies
//! - `POST /api/auth/forgot-password` - Request a password reset link
//! - `POST /api/auth/reset-password/{token}` - Set a new password
//! - `GET /api/auth/profile` - Fetch the caller's profile
//!
//! ## Profile (`/api/profile`)
//! - `GET /api/profile` - Fetch the caller's profile
//! - `PUT /api/profile` - Update name, phone, country, or currency
//!
//! ## Health (`/health`)
//! - `GET /health` - Liveness probe
//!
//! # Authentication
//!
//! Protected endpoints accept the access token either way:
//! ```text
//! Authorization: Bearer <token>
//! ```
//! or the `accessToken` cookie set at login. Tokens come in pairs: a
//! short-lived JWT access token and an opaque refresh token that is rotated
//! on every use.
//!
//! # OpenAPI Documentation
//!
//! When the `swagger-ui` feature is enabled, interactive API documentation
//! is available at `/swagger-ui/`. The raw document is also printed by
//! `fintrack-server openapi`.

use utoipa::OpenApi;

use crate::types;

/// Request and response handlers for all API endpoints.
pub mod handlers;
/// Router configuration and route definitions.
pub mod routes;

/// The OpenAPI document for the whole HTTP surface.
#[derive(OpenApi)]
#[openapi(
    info(
        title = "FinTrack API",
        description = "Personal finance backend: account authentication, session lifecycle, and profile management"
    ),
    paths(
        handlers::auth::register,
        handlers::auth::verify_otp,
        handlers::auth::resend_otp,
        handlers::auth::verify_email,
        handlers::auth::login,
        handlers::auth::refresh,
        handlers::auth::logout,
        handlers::auth::forgot_password,
        handlers::auth::reset_password,
        handlers::profile::get_profile,
        handlers::profile::update_profile,
        handlers::health::health,
    ),
    components(schemas(
        types::RegisterRequest,
        types::LoginRequest,
        types::VerifyOtpRequest,
        types::ResendOtpRequest,
        types::RefreshRequest,
        types::LogoutRequest,
        types::ForgotPasswordRequest,
        types::ResetPasswordRequest,
        types::UpdateProfileRequest,
        types::MessageResponse,
        types::RegisterResponse,
        types::TokenPair,
        types::SessionResponse,
        types::RefreshResponse,
        types::UpdateProfileResponse,
        types::AccountProfile,
        types::HealthResponse,
    )),
    tags(
        (name = "auth", description = "Registration, login, token lifecycle, and recovery"),
        (name = "profile", description = "Authenticated profile access"),
        (name = "health", description = "Liveness")
    )
)]
pub struct ApiDoc;
