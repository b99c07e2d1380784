use axum::{
    extract::{FromRequestParts, Request, State},
    http::{header, request::Parts},
    middleware::Next,
    response::Response,
};

use crate::error::AppError;
use crate::services::AccessTokenClaims;
use crate::AppState;

/// Gate for authenticated routes. Runs the full token validation (signature,
/// expiry, account state, token version, revocation) and stashes the claims
/// in request extensions for handlers to pick up.
pub async fn auth_middleware(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, AppError> {
    let token = req
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .ok_or_else(|| {
            AppError::Unauthenticated(anyhow::anyhow!("Missing bearer credential"))
        })?;

    let claims = state.auth.validate_incoming(token).await?;

    req.extensions_mut().insert(claims);

    Ok(next.run(req).await)
}

/// Extractor handing handlers the validated claims of the caller.
pub struct AuthUser(pub AccessTokenClaims);

#[axum::async_trait]
impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let claims = parts.extensions.get::<AccessTokenClaims>().ok_or_else(|| {
            AppError::InternalError(anyhow::anyhow!(
                "Auth claims missing from request extensions"
            ))
        })?;

        Ok(AuthUser(claims.clone()))
    }
}
