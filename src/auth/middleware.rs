use axum::{
    extract::{FromRequestParts, OptionalFromRequestParts, Request, State},
    http::{header, request::Parts, HeaderMap},
    middleware::Next,
    response::Response,
};
use axum_extra::extract::CookieJar;
use std::convert::Infallible;

use crate::db::Account;
use crate::types::AppError;
use crate::AppState;

/// Cookie carrying the access token for browser clients.
pub const ACCESS_TOKEN_COOKIE: &str = "accessToken";
/// Cookie carrying the refresh token for browser clients.
pub const REFRESH_TOKEN_COOKIE: &str = "refreshToken";

fn bearer_or_cookie_token(headers: &HeaderMap, jar: &CookieJar) -> Option<String> {
    let bearer = headers
        .get(header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "))
        .map(str::to_string);

    bearer.or_else(|| jar.get(ACCESS_TOKEN_COOKIE).map(|c| c.value().to_string()))
}

/// Rejects the request unless it carries a usable access token, either as an
/// `Authorization: Bearer` header or in the `accessToken` cookie.
///
/// On success the resolved [`Account`] is placed in the request extensions
/// for [`CurrentAccount`] to pick up.
pub async fn require_auth(
    State(state): State<AppState>,
    jar: CookieJar,
    mut req: Request,
    next: Next,
) -> Result<Response, AppError> {
    let token = bearer_or_cookie_token(req.headers(), &jar)
        .ok_or_else(|| AppError::InvalidToken("Access denied. No token provided.".to_string()))?;

    let account = state.auth.resolve_access(&token).await?;
    req.extensions_mut().insert(account);

    Ok(next.run(req).await)
}

/// Like [`require_auth`] but never rejects: an absent or unusable token just
/// leaves the request anonymous. Used on logout so a browser with expired
/// cookies can still clear them.
pub async fn optional_auth(
    State(state): State<AppState>,
    jar: CookieJar,
    mut req: Request,
    next: Next,
) -> Response {
    if let Some(token) = bearer_or_cookie_token(req.headers(), &jar) {
        if let Ok(account) = state.auth.resolve_access(&token).await {
            req.extensions_mut().insert(account);
        }
    }

    next.run(req).await
}

/// Extractor handing the authenticated account to a handler.
#[derive(Debug, Clone)]
pub struct CurrentAccount(pub Account);

impl<S> FromRequestParts<S> for CurrentAccount
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<Account>()
            .cloned()
            .map(CurrentAccount)
            .ok_or_else(|| AppError::InvalidToken("Access denied. No token provided.".to_string()))
    }
}

impl<S> OptionalFromRequestParts<S> for CurrentAccount
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(
        parts: &mut Parts,
        _state: &S,
    ) -> Result<Option<Self>, Self::Rejection> {
        Ok(parts.extensions.get::<Account>().cloned().map(CurrentAccount))
    }
}
