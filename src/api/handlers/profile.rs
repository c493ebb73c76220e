use axum::{extract::State, Json};

use crate::{
    auth::CurrentAccount,
    db::ProfileChanges,
    types::{AccountProfile, AppError, Result, UpdateProfileRequest, UpdateProfileResponse},
    AppState,
};

/// Fetch the authenticated account's profile
#[utoipa::path(
    get,
    path = "/api/profile",
    responses(
        (status = 200, description = "The caller's profile", body = AccountProfile),
        (status = 401, description = "Missing or unusable access token")
    ),
    tag = "profile"
)]
pub async fn get_profile(CurrentAccount(account): CurrentAccount) -> Json<AccountProfile> {
    Json(AccountProfile::from(&account))
}

/// Update name, phone, country, or currency
#[utoipa::path(
    put,
    path = "/api/profile",
    request_body = UpdateProfileRequest,
    responses(
        (status = 200, description = "Profile updated", body = UpdateProfileResponse),
        (status = 400, description = "Validation failed or empty update"),
        (status = 401, description = "Missing or unusable access token"),
        (status = 403, description = "Email not verified yet")
    ),
    tag = "profile"
)]
pub async fn update_profile(
    State(state): State<AppState>,
    CurrentAccount(account): CurrentAccount,
    Json(payload): Json<UpdateProfileRequest>,
) -> Result<Json<UpdateProfileResponse>> {
    payload.validate()?;
    if payload.is_empty() {
        return Err(AppError::Validation("No fields to update".to_string()));
    }
    if !account.email_verified {
        return Err(AppError::EmailNotVerified);
    }

    let changes = ProfileChanges {
        name: payload.name.map(|n| n.trim().to_string()),
        phone: payload.phone,
        country: payload.country,
        currency: payload.currency,
    };
    state.store.update_profile(&account.id, &changes).await?;

    // Re-read so the response reflects the stored row, not the request.
    let account = state
        .store
        .find_by_id(&account.id)
        .await?
        .ok_or_else(|| AppError::NotFound("User".to_string()))?;

    Ok(Json(UpdateProfileResponse {
        message: "Profile updated successfully".to_string(),
        user: AccountProfile::from(&account),
    }))
}
