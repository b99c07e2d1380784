use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use chrono::Utc;

use crate::{
    dtos::auth::{
        ChallengeResponse, IntrospectRequest, IntrospectResponse, LoginRequest, LoginResponse,
        RefreshRequest, ResendOtpRequest, VerifyLoginOtpRequest,
    },
    dtos::ErrorResponse,
    error::AppError,
    middleware::AuthUser,
    services::{LoginOutcome, TokenResponse},
    utils::ValidatedJson,
    AppState,
};

/// Login with email or phone plus password
#[utoipa::path(
    post,
    path = "/auth/login",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Tokens issued, or a second-factor challenge when 2FA is enabled"),
        (status = 401, description = "Invalid credentials", body = ErrorResponse),
        (status = 422, description = "Validation error", body = ErrorResponse)
    ),
    tag = "Authentication"
)]
pub async fn login(
    State(state): State<AppState>,
    ValidatedJson(req): ValidatedJson<LoginRequest>,
) -> Result<impl IntoResponse, AppError> {
    let outcome = state.auth.login(&req.identifier, &req.password).await?;

    let body = match outcome {
        LoginOutcome::Tokens(tokens) => LoginResponse::Tokens {
            requires_two_factor: false,
            tokens,
        },
        LoginOutcome::TwoFactorRequired(challenge) => LoginResponse::TwoFactorRequired {
            requires_two_factor: true,
            challenge_id: challenge.challenge_id,
            expires_in: (challenge.expiry_utc - Utc::now()).num_seconds(),
        },
    };

    Ok((StatusCode::OK, Json(body)))
}

/// Redeem a login challenge for tokens
#[utoipa::path(
    post,
    path = "/auth/login/verify-otp",
    request_body = VerifyLoginOtpRequest,
    responses(
        (status = 200, description = "Tokens issued", body = TokenResponse),
        (status = 400, description = "Wrong code, wrong purpose, expired or spent challenge", body = ErrorResponse),
        (status = 404, description = "Unknown challenge", body = ErrorResponse)
    ),
    tag = "Authentication"
)]
pub async fn verify_login_otp(
    State(state): State<AppState>,
    Json(req): Json<VerifyLoginOtpRequest>,
) -> Result<impl IntoResponse, AppError> {
    let tokens = state
        .auth
        .verify_login_otp(req.challenge_id, &req.code)
        .await?;
    Ok((StatusCode::OK, Json(tokens)))
}

/// Re-send a pending challenge with a fresh code
#[utoipa::path(
    post,
    path = "/auth/otp/resend",
    request_body = ResendOtpRequest,
    responses(
        (status = 200, description = "Challenge re-issued", body = ChallengeResponse),
        (status = 400, description = "Challenge already consumed", body = ErrorResponse),
        (status = 404, description = "Unknown challenge", body = ErrorResponse)
    ),
    tag = "Authentication"
)]
pub async fn resend_otp(
    State(state): State<AppState>,
    Json(req): Json<ResendOtpRequest>,
) -> Result<impl IntoResponse, AppError> {
    let challenge = state.auth.resend_otp(req.challenge_id).await?;

    Ok((
        StatusCode::OK,
        Json(ChallengeResponse {
            challenge_id: challenge.challenge_id,
            expires_in: (challenge.expiry_utc - Utc::now()).num_seconds(),
        }),
    ))
}

/// Rotate a refresh token into a fresh token pair
#[utoipa::path(
    post,
    path = "/auth/refresh",
    request_body = RefreshRequest,
    responses(
        (status = 200, description = "Tokens rotated", body = TokenResponse),
        (status = 401, description = "Invalid, expired or superseded refresh token", body = ErrorResponse)
    ),
    tag = "Authentication"
)]
pub async fn refresh(
    State(state): State<AppState>,
    Json(req): Json<RefreshRequest>,
) -> Result<impl IntoResponse, AppError> {
    let tokens = state.auth.refresh(&req.refresh_token).await?;
    Ok((StatusCode::OK, Json(tokens)))
}

/// Log out everywhere: invalidates every outstanding token for the account
#[utoipa::path(
    post,
    path = "/auth/logout",
    responses(
        (status = 200, description = "All sessions invalidated"),
        (status = 401, description = "Invalid token", body = ErrorResponse)
    ),
    tag = "Authentication",
    security(("bearer_auth" = []))
)]
pub async fn logout(
    State(state): State<AppState>,
    user: AuthUser,
) -> Result<impl IntoResponse, AppError> {
    state.auth.logout(user.0.sub).await?;

    Ok((
        StatusCode::OK,
        Json(serde_json::json!({
            "message": "Logged out successfully"
        })),
    ))
}

/// Revoke only the access token used for this request
#[utoipa::path(
    post,
    path = "/auth/token/revoke",
    responses(
        (status = 200, description = "This access token is now invalid; other sessions are untouched"),
        (status = 401, description = "Invalid token", body = ErrorResponse)
    ),
    tag = "Authentication",
    security(("bearer_auth" = []))
)]
pub async fn revoke_current_token(
    State(state): State<AppState>,
    user: AuthUser,
) -> Result<impl IntoResponse, AppError> {
    let claims = user.0;
    state
        .auth
        .revoke_access_token(claims.sub, &claims.jti, claims.exp)
        .await?;

    Ok((
        StatusCode::OK,
        Json(serde_json::json!({
            "message": "Access token revoked"
        })),
    ))
}

/// Report whether an access token is currently usable
#[utoipa::path(
    post,
    path = "/auth/introspect",
    request_body = IntrospectRequest,
    responses(
        (status = 200, description = "Token status returned", body = IntrospectResponse)
    ),
    tag = "Authentication"
)]
pub async fn introspect(
    State(state): State<AppState>,
    Json(req): Json<IntrospectRequest>,
) -> impl IntoResponse {
    let body = match state.auth.validate_incoming(&req.token).await {
        Ok(claims) => IntrospectResponse {
            active: true,
            sub: Some(claims.sub),
            email: Some(claims.email),
            role: Some(claims.role),
            exp: Some(claims.exp),
            iat: Some(claims.iat),
            jti: Some(claims.jti),
        },
        Err(_) => IntrospectResponse::inactive(),
    };

    Json(body)
}
