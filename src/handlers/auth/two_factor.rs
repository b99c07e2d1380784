use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use chrono::Utc;

use crate::{
    dtos::auth::{
        ChallengeResponse, ConfirmTwoFactorRequest, SendTwoFactorRequest,
        TwoFactorEnabledResponse,
    },
    dtos::ErrorResponse,
    error::AppError,
    middleware::AuthUser,
    AppState,
};

/// Start two-factor enrollment over the chosen channel
#[utoipa::path(
    post,
    path = "/auth/2fa/send",
    request_body = SendTwoFactorRequest,
    responses(
        (status = 200, description = "Enrollment challenge issued", body = ChallengeResponse),
        (status = 400, description = "Account has no destination for the channel", body = ErrorResponse),
        (status = 401, description = "Invalid token", body = ErrorResponse)
    ),
    tag = "Two-Factor",
    security(("bearer_auth" = []))
)]
pub async fn send_two_factor(
    State(state): State<AppState>,
    user: AuthUser,
    Json(req): Json<SendTwoFactorRequest>,
) -> Result<impl IntoResponse, AppError> {
    let challenge = state
        .auth
        .send_enable_two_factor(user.0.sub, req.channel)
        .await?;

    Ok((
        StatusCode::OK,
        Json(ChallengeResponse {
            challenge_id: challenge.challenge_id,
            expires_in: (challenge.expiry_utc - Utc::now()).num_seconds(),
        }),
    ))
}

/// Confirm enrollment and switch the account to the verified channel
#[utoipa::path(
    post,
    path = "/auth/2fa/confirm",
    request_body = ConfirmTwoFactorRequest,
    responses(
        (status = 200, description = "Two-factor enabled", body = TwoFactorEnabledResponse),
        (status = 400, description = "Wrong code, wrong purpose, foreign or spent challenge", body = ErrorResponse),
        (status = 401, description = "Invalid token", body = ErrorResponse),
        (status = 404, description = "Unknown challenge", body = ErrorResponse)
    ),
    tag = "Two-Factor",
    security(("bearer_auth" = []))
)]
pub async fn confirm_two_factor(
    State(state): State<AppState>,
    user: AuthUser,
    Json(req): Json<ConfirmTwoFactorRequest>,
) -> Result<impl IntoResponse, AppError> {
    let channel = state
        .auth
        .confirm_enable_two_factor(user.0.sub, req.challenge_id, &req.code)
        .await?;

    Ok((
        StatusCode::OK,
        Json(TwoFactorEnabledResponse {
            two_factor_enabled: true,
            method: channel,
        }),
    ))
}
