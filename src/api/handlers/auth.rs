use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::{header, HeaderMap, StatusCode},
    Json,
};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use time::Duration;

use crate::{
    auth::middleware::{ACCESS_TOKEN_COOKIE, REFRESH_TOKEN_COOKIE},
    auth::{CurrentAccount, SessionMeta},
    types::{
        AccountProfile, AppError, ForgotPasswordRequest, LoginRequest, LogoutRequest,
        MessageResponse, RefreshRequest, RefreshResponse, RegisterRequest, RegisterResponse,
        ResendOtpRequest, ResetPasswordRequest, Result, SessionResponse, TokenPair,
        VerifyOtpRequest,
    },
    utils::config::Config,
    AppState,
};

fn session_meta(headers: &HeaderMap) -> SessionMeta {
    let user_agent = headers
        .get(header::USER_AGENT)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    let ip_address = headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(|v| v.trim().to_string());

    SessionMeta {
        user_agent,
        ip_address,
    }
}

fn session_cookie(name: &'static str, value: String, max_age: i64, secure: bool) -> Cookie<'static> {
    Cookie::build((name, value))
        .http_only(true)
        .secure(secure)
        .same_site(SameSite::Strict)
        .path("/")
        .max_age(Duration::seconds(max_age))
        .build()
}

fn session_cookies(jar: CookieJar, tokens: &TokenPair, config: &Config) -> CookieJar {
    let secure = config.server.is_production();
    jar.add(session_cookie(
        ACCESS_TOKEN_COOKIE,
        tokens.access_token.clone(),
        config.auth.jwt_access_expiry,
        secure,
    ))
    .add(session_cookie(
        REFRESH_TOKEN_COOKIE,
        tokens.refresh_token.clone(),
        config.auth.jwt_refresh_expiry,
        secure,
    ))
}

fn expired_cookie(name: &'static str) -> Cookie<'static> {
    Cookie::build(name).path("/").build()
}

fn clear_session_cookies(jar: CookieJar) -> CookieJar {
    jar.remove(expired_cookie(ACCESS_TOKEN_COOKIE))
        .remove(expired_cookie(REFRESH_TOKEN_COOKIE))
}

/// Register a new account and send the verification email
#[utoipa::path(
    post,
    path = "/api/auth/register",
    request_body = RegisterRequest,
    responses(
        (status = 201, description = "Account created, verification email requested", body = RegisterResponse),
        (status = 400, description = "Validation failed or email already registered")
    ),
    tag = "auth"
)]
pub async fn register(
    State(state): State<AppState>,
    Json(payload): Json<RegisterRequest>,
) -> Result<(StatusCode, Json<RegisterResponse>)> {
    payload.validate()?;

    let registration = state.auth.register(&payload).await?;

    Ok((
        StatusCode::CREATED,
        Json(RegisterResponse {
            message: "Registration successful. Please check your email for the verification code."
                .to_string(),
            user_id: registration.account_id,
            email: registration.email,
            requires_verification: true,
        }),
    ))
}

/// Verify the email address with the six-digit code and open a session
#[utoipa::path(
    post,
    path = "/api/auth/verify-otp",
    request_body = VerifyOtpRequest,
    responses(
        (status = 200, description = "Email verified, session opened", body = SessionResponse),
        (status = 400, description = "Wrong or expired code, or already verified"),
        (status = 404, description = "No account with this email"),
        (status = 429, description = "Attempt budget exhausted, request a new code")
    ),
    tag = "auth"
)]
pub async fn verify_otp(
    State(state): State<AppState>,
    headers: HeaderMap,
    jar: CookieJar,
    Json(payload): Json<VerifyOtpRequest>,
) -> Result<(CookieJar, Json<SessionResponse>)> {
    payload.validate()?;

    let session = state
        .auth
        .verify_otp(&payload.email, &payload.otp, session_meta(&headers))
        .await?;

    let jar = session_cookies(jar, &session.tokens, &state.config);
    Ok((
        jar,
        Json(SessionResponse {
            message: "Email verified successfully".to_string(),
            user: AccountProfile::from(&session.account),
            tokens: session.tokens,
        }),
    ))
}

/// Replace the pending verification challenge and resend the email
#[utoipa::path(
    post,
    path = "/api/auth/resend-otp",
    request_body = ResendOtpRequest,
    responses(
        (status = 200, description = "Fresh code sent", body = MessageResponse),
        (status = 400, description = "Email is already verified"),
        (status = 404, description = "No account with this email"),
        (status = 500, description = "Email delivery failed")
    ),
    tag = "auth"
)]
pub async fn resend_otp(
    State(state): State<AppState>,
    Json(payload): Json<ResendOtpRequest>,
) -> Result<Json<MessageResponse>> {
    payload.validate()?;

    state.auth.resend_otp(&payload.email).await?;

    Ok(Json(MessageResponse::new("OTP sent successfully")))
}

/// Verify the email address through the emailed link token
#[utoipa::path(
    get,
    path = "/api/auth/verify-email/{token}",
    params(("token" = String, Path, description = "Raw verification token from the emailed link")),
    responses(
        (status = 200, description = "Email verified", body = MessageResponse),
        (status = 400, description = "Unknown, expired, or already consumed token")
    ),
    tag = "auth"
)]
pub async fn verify_email(
    State(state): State<AppState>,
    Path(token): Path<String>,
) -> Result<Json<MessageResponse>> {
    state.auth.verify_email_token(&token).await?;

    Ok(Json(MessageResponse::new("Email verified successfully")))
}

/// Login with email and password
#[utoipa::path(
    post,
    path = "/api/auth/login",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Login successful", body = SessionResponse),
        (status = 400, description = "Invalid credentials"),
        (status = 423, description = "Account temporarily locked")
    ),
    tag = "auth"
)]
pub async fn login(
    State(state): State<AppState>,
    headers: HeaderMap,
    jar: CookieJar,
    Json(payload): Json<LoginRequest>,
) -> Result<(CookieJar, Json<SessionResponse>)> {
    payload.validate()?;

    let session = state
        .auth
        .login(&payload.email, &payload.password, session_meta(&headers))
        .await?;

    let jar = session_cookies(jar, &session.tokens, &state.config);
    Ok((
        jar,
        Json(SessionResponse {
            message: "Login successful".to_string(),
            user: AccountProfile::from(&session.account),
            tokens: session.tokens,
        }),
    ))
}

/// Rotate the refresh token and mint a new access token
#[utoipa::path(
    post,
    path = "/api/auth/refresh",
    request_body = RefreshRequest,
    responses(
        (status = 200, description = "New token pair issued", body = RefreshResponse),
        (status = 401, description = "Missing, unknown, expired, or already used refresh token")
    ),
    tag = "auth"
)]
pub async fn refresh(
    State(state): State<AppState>,
    headers: HeaderMap,
    jar: CookieJar,
    body: Result<Json<RefreshRequest>, JsonRejection>,
) -> Result<(CookieJar, Json<RefreshResponse>)> {
    // Browser clients carry the token in a cookie and may send no body at all.
    let presented = body
        .ok()
        .and_then(|Json(req)| req.refresh_token)
        .or_else(|| jar.get(REFRESH_TOKEN_COOKIE).map(|c| c.value().to_string()))
        .ok_or(AppError::InvalidRefreshToken)?;

    let tokens = state.auth.refresh(&presented, session_meta(&headers)).await?;

    let jar = session_cookies(jar, &tokens, &state.config);
    Ok((
        jar,
        Json(RefreshResponse {
            message: "Token refreshed successfully".to_string(),
            tokens,
        }),
    ))
}

/// End the session and clear the session cookies
#[utoipa::path(
    post,
    path = "/api/auth/logout",
    request_body = LogoutRequest,
    responses(
        (status = 200, description = "Session ended; always succeeds", body = MessageResponse)
    ),
    tag = "auth"
)]
pub async fn logout(
    State(state): State<AppState>,
    current: Option<CurrentAccount>,
    jar: CookieJar,
    body: Result<Json<LogoutRequest>, JsonRejection>,
) -> Result<(CookieJar, Json<MessageResponse>)> {
    let presented = body
        .ok()
        .and_then(|Json(req)| req.refresh_token)
        .or_else(|| jar.get(REFRESH_TOKEN_COOKIE).map(|c| c.value().to_string()));

    state.auth.logout(presented.as_deref()).await?;

    if let Some(CurrentAccount(account)) = current {
        tracing::debug!(account_id = %account.id, "logout");
    }

    let jar = clear_session_cookies(jar);
    Ok((jar, Json(MessageResponse::new("Logout successful"))))
}

/// Request a password reset link
#[utoipa::path(
    post,
    path = "/api/auth/forgot-password",
    request_body = ForgotPasswordRequest,
    responses(
        (status = 200, description = "Same response whether or not the account exists", body = MessageResponse),
        (status = 500, description = "Email delivery failed")
    ),
    tag = "auth"
)]
pub async fn forgot_password(
    State(state): State<AppState>,
    Json(payload): Json<ForgotPasswordRequest>,
) -> Result<Json<MessageResponse>> {
    payload.validate()?;

    state.auth.forgot_password(&payload.email).await?;

    Ok(Json(MessageResponse::new(
        "If the email exists, a reset link has been sent.",
    )))
}

/// Set a new password using the emailed reset token
#[utoipa::path(
    post,
    path = "/api/auth/reset-password/{token}",
    params(("token" = String, Path, description = "Raw reset token from the emailed link")),
    request_body = ResetPasswordRequest,
    responses(
        (status = 200, description = "Password changed, every session revoked", body = MessageResponse),
        (status = 400, description = "Unknown, expired, or already consumed token")
    ),
    tag = "auth"
)]
pub async fn reset_password(
    State(state): State<AppState>,
    Path(token): Path<String>,
    Json(payload): Json<ResetPasswordRequest>,
) -> Result<Json<MessageResponse>> {
    payload.validate()?;

    state.auth.reset_password(&token, &payload.password).await?;

    Ok(Json(MessageResponse::new(
        "Password reset successful. Please login with your new password.",
    )))
}
