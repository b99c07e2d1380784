use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use crate::models::OtpChannel;
use crate::services::TokenResponse;

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct LoginRequest {
    /// Email address or phone number.
    #[validate(length(min = 1, message = "Identifier is required"))]
    #[schema(example = "user@example.com")]
    pub identifier: String,

    #[validate(length(min = 1, message = "Password is required"))]
    #[schema(example = "password123")]
    pub password: String,
}

/// Login either completes with tokens or parks on a pending second-factor
/// challenge; `requires_two_factor` tells the two apart.
#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum LoginResponse {
    Tokens {
        requires_two_factor: bool,
        #[serde(flatten)]
        tokens: TokenResponse,
    },
    TwoFactorRequired {
        requires_two_factor: bool,
        challenge_id: Uuid,
        expires_in: i64,
    },
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct VerifyLoginOtpRequest {
    pub challenge_id: Uuid,
    #[schema(example = "123456")]
    pub code: String,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct ResendOtpRequest {
    pub challenge_id: Uuid,
}

/// Handle plus fresh expiry, returned whenever a challenge is (re)issued.
#[derive(Debug, Serialize, ToSchema)]
pub struct ChallengeResponse {
    pub challenge_id: Uuid,
    pub expires_in: i64,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct RefreshRequest {
    #[schema(example = "refresh-token-123")]
    pub refresh_token: String,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct PasswordResetRequest {
    #[validate(email(message = "Invalid email format"))]
    #[schema(example = "user@example.com")]
    pub email: String,
}

/// Deliberately content-free so the endpoint confirms nothing about account
/// existence.
#[derive(Debug, Serialize, ToSchema)]
pub struct OkResponse {
    pub ok: bool,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct PasswordResetValidateRequest {
    pub challenge_id: Uuid,
    pub code: String,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct PasswordResetConfirmRequest {
    pub challenge_id: Uuid,

    #[validate(length(min = 1, message = "Code is required"))]
    pub code: String,

    #[validate(length(min = 8, message = "Password must be at least 8 characters"))]
    #[schema(example = "newpassword123", min_length = 8)]
    pub new_password: String,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct SendTwoFactorRequest {
    pub channel: OtpChannel,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct ConfirmTwoFactorRequest {
    pub challenge_id: Uuid,
    pub code: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct TwoFactorEnabledResponse {
    pub two_factor_enabled: bool,
    pub method: OtpChannel,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct IntrospectRequest {
    #[schema(example = "access-token-123")]
    pub token: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct IntrospectResponse {
    pub active: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sub: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exp: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub iat: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub jti: Option<String>,
}

impl IntrospectResponse {
    pub fn inactive() -> Self {
        Self {
            active: false,
            sub: None,
            email: None,
            role: None,
            exp: None,
            iat: None,
            jti: None,
        }
    }
}
