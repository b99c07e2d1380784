use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};

use crate::{
    dtos::auth::{
        OkResponse, PasswordResetConfirmRequest, PasswordResetRequest,
        PasswordResetValidateRequest,
    },
    dtos::ErrorResponse,
    error::AppError,
    utils::ValidatedJson,
    AppState,
};

/// Request a password reset link by email
#[utoipa::path(
    post,
    path = "/auth/password-reset/request",
    request_body = PasswordResetRequest,
    responses(
        (status = 200, description = "Always succeeds; account existence is not disclosed", body = OkResponse),
        (status = 422, description = "Validation error", body = ErrorResponse)
    ),
    tag = "Password Reset"
)]
pub async fn request_password_reset(
    State(state): State<AppState>,
    ValidatedJson(req): ValidatedJson<PasswordResetRequest>,
) -> Result<impl IntoResponse, AppError> {
    state.auth.request_password_reset(&req.email).await?;
    Ok((StatusCode::OK, Json(OkResponse { ok: true })))
}

/// Check a reset code without consuming it
#[utoipa::path(
    post,
    path = "/auth/password-reset/validate",
    request_body = PasswordResetValidateRequest,
    responses(
        (status = 200, description = "Code is valid for this challenge", body = OkResponse),
        (status = 400, description = "Wrong code, wrong purpose, expired or spent challenge", body = ErrorResponse),
        (status = 404, description = "Unknown challenge", body = ErrorResponse)
    ),
    tag = "Password Reset"
)]
pub async fn validate_password_reset_token(
    State(state): State<AppState>,
    Json(req): Json<PasswordResetValidateRequest>,
) -> Result<impl IntoResponse, AppError> {
    state
        .auth
        .validate_password_reset_token(req.challenge_id, &req.code)
        .await?;
    Ok((StatusCode::OK, Json(OkResponse { ok: true })))
}

/// Consume a reset challenge and set a new password
#[utoipa::path(
    post,
    path = "/auth/password-reset/confirm",
    request_body = PasswordResetConfirmRequest,
    responses(
        (status = 200, description = "Password changed"),
        (status = 400, description = "Wrong code, wrong purpose, expired or spent challenge", body = ErrorResponse),
        (status = 404, description = "Unknown challenge", body = ErrorResponse),
        (status = 422, description = "Validation error", body = ErrorResponse)
    ),
    tag = "Password Reset"
)]
pub async fn confirm_password_reset(
    State(state): State<AppState>,
    ValidatedJson(req): ValidatedJson<PasswordResetConfirmRequest>,
) -> Result<impl IntoResponse, AppError> {
    state
        .auth
        .reset_password(req.challenge_id, &req.code, &req.new_password)
        .await?;

    Ok((
        StatusCode::OK,
        Json(serde_json::json!({
            "message": "Password has been reset"
        })),
    ))
}
