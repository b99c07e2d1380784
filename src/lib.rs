pub mod config;
pub mod db;
pub mod dtos;
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod observability;
pub mod services;
pub mod utils;

use axum::{
    middleware::{from_fn, from_fn_with_state},
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use utoipa::{openapi::security::SecurityScheme, Modify, OpenApi};
use utoipa_swagger_ui::SwaggerUi;

use crate::config::AuthConfig;
use crate::error::AppError;
use crate::middleware::{
    auth_middleware, ip_rate_limit_middleware, request_id_middleware,
    security_headers_middleware, IpRateLimiter,
};
use crate::services::{AuthService, CredentialStore, RevocationStore};

#[derive(OpenApi)]
#[openapi(
    paths(
        health_check,
        handlers::auth::session::login,
        handlers::auth::session::verify_login_otp,
        handlers::auth::session::resend_otp,
        handlers::auth::session::refresh,
        handlers::auth::session::logout,
        handlers::auth::session::revoke_current_token,
        handlers::auth::session::introspect,
        handlers::auth::password::request_password_reset,
        handlers::auth::password::validate_password_reset_token,
        handlers::auth::password::confirm_password_reset,
        handlers::auth::two_factor::send_two_factor,
        handlers::auth::two_factor::confirm_two_factor,
    ),
    components(
        schemas(
            dtos::ErrorResponse,
            dtos::auth::LoginRequest,
            dtos::auth::VerifyLoginOtpRequest,
            dtos::auth::ResendOtpRequest,
            dtos::auth::ChallengeResponse,
            dtos::auth::RefreshRequest,
            dtos::auth::PasswordResetRequest,
            dtos::auth::PasswordResetValidateRequest,
            dtos::auth::PasswordResetConfirmRequest,
            dtos::auth::OkResponse,
            dtos::auth::SendTwoFactorRequest,
            dtos::auth::ConfirmTwoFactorRequest,
            dtos::auth::TwoFactorEnabledResponse,
            dtos::auth::IntrospectRequest,
            dtos::auth::IntrospectResponse,
            services::TokenResponse,
            models::OtpChannel,
            models::OtpPurpose,
        )
    ),
    modifiers(&SecurityAddon),
    tags(
        (name = "Authentication", description = "Login, tokens and revocation"),
        (name = "Password Reset", description = "Challenge-based password recovery"),
        (name = "Two-Factor", description = "Second-factor enrollment"),
        (name = "Observability", description = "Service health")
    )
)]
pub struct ApiDoc;

struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer_auth",
                SecurityScheme::Http(
                    utoipa::openapi::security::HttpBuilder::new()
                        .scheme(utoipa::openapi::security::HttpAuthScheme::Bearer)
                        .bearer_format("JWT")
                        .build(),
                ),
            );
        }
    }
}

#[derive(Clone)]
pub struct AppState {
    pub config: AuthConfig,
    pub auth: AuthService,
    pub accounts: Arc<dyn CredentialStore>,
    pub revocations: Arc<dyn RevocationStore>,
    pub login_rate_limiter: IpRateLimiter,
    pub otp_resend_rate_limiter: IpRateLimiter,
    pub password_reset_rate_limiter: IpRateLimiter,
    pub ip_rate_limiter: IpRateLimiter,
}

pub fn build_router(state: AppState) -> Result<Router, AppError> {
    // Brute-forceable endpoints get their own, tighter limiters.
    let login_route = Router::new()
        .route("/auth/login", post(handlers::auth::login))
        .layer(from_fn_with_state(
            state.login_rate_limiter.clone(),
            ip_rate_limit_middleware,
        ));

    let resend_route = Router::new()
        .route("/auth/otp/resend", post(handlers::auth::resend_otp))
        .layer(from_fn_with_state(
            state.otp_resend_rate_limiter.clone(),
            ip_rate_limit_middleware,
        ));

    let reset_request_route = Router::new()
        .route(
            "/auth/password-reset/request",
            post(handlers::auth::request_password_reset),
        )
        .layer(from_fn_with_state(
            state.password_reset_rate_limiter.clone(),
            ip_rate_limit_middleware,
        ));

    let authenticated_routes = Router::new()
        .route("/auth/logout", post(handlers::auth::logout))
        .route(
            "/auth/token/revoke",
            post(handlers::auth::revoke_current_token),
        )
        .route("/auth/2fa/send", post(handlers::auth::send_two_factor))
        .route("/auth/2fa/confirm", post(handlers::auth::confirm_two_factor))
        .layer(from_fn_with_state(state.clone(), auth_middleware));

    let mut app = Router::new().route("/health", get(health_check));

    if state.config.swagger_enabled {
        app = app.merge(
            SwaggerUi::new("/docs").url("/.well-known/openapi.json", ApiDoc::openapi()),
        );
    } else {
        // Keep the spec reachable for tooling even without the UI.
        app = app.route(
            "/.well-known/openapi.json",
            get(|| async { axum::Json(ApiDoc::openapi()) }),
        );
    }

    let app = app
        .route(
            "/auth/login/verify-otp",
            post(handlers::auth::verify_login_otp),
        )
        .route("/auth/refresh", post(handlers::auth::refresh))
        .route("/auth/introspect", post(handlers::auth::introspect))
        .route(
            "/auth/password-reset/validate",
            post(handlers::auth::validate_password_reset_token),
        )
        .route(
            "/auth/password-reset/confirm",
            post(handlers::auth::confirm_password_reset),
        )
        .merge(login_route)
        .merge(resend_route)
        .merge(reset_request_route)
        .merge(authenticated_routes)
        .with_state(state.clone())
        .layer(from_fn_with_state(
            state.ip_rate_limiter.clone(),
            ip_rate_limit_middleware,
        ))
        .layer(TraceLayer::new_for_http().make_span_with(
            |request: &axum::http::Request<_>| {
                let request_id = request
                    .headers()
                    .get("x-request-id")
                    .and_then(|value| value.to_str().ok())
                    .unwrap_or("-");

                tracing::info_span!(
                    "http_request",
                    request_id = %request_id,
                    method = %request.method(),
                    uri = %request.uri(),
                )
            },
        ))
        .layer(from_fn(request_id_middleware))
        .layer(from_fn(security_headers_middleware))
        .layer(
            CorsLayer::new()
                .allow_origin(
                    state
                        .config
                        .security
                        .allowed_origins
                        .iter()
                        .filter_map(|o| match o.parse::<axum::http::HeaderValue>() {
                            Ok(value) => Some(value),
                            Err(e) => {
                                tracing::error!(origin = %o, error = %e, "Skipping invalid CORS origin");
                                None
                            }
                        })
                        .collect::<Vec<axum::http::HeaderValue>>(),
                )
                .allow_methods([axum::http::Method::GET, axum::http::Method::POST])
                .allow_headers([
                    axum::http::header::AUTHORIZATION,
                    axum::http::header::CONTENT_TYPE,
                ]),
        );

    Ok(app)
}

/// Service health check
#[utoipa::path(
    get,
    path = "/health",
    responses(
        (status = 200, description = "Service is healthy"),
        (status = 500, description = "A backing store is unreachable")
    ),
    tag = "Observability"
)]
pub async fn health_check(
    axum::extract::State(state): axum::extract::State<AppState>,
) -> Result<axum::Json<serde_json::Value>, AppError> {
    state.accounts.health_check().await.map_err(|e| {
        tracing::error!(error = %e, "Credential store health check failed");
        AppError::InternalError(e)
    })?;

    state.revocations.health_check().await.map_err(|e| {
        tracing::error!(error = %e, "Revocation store health check failed");
        AppError::InternalError(e)
    })?;

    Ok(axum::Json(serde_json::json!({
        "status": "healthy",
        "service": state.config.service_name,
        "version": state.config.service_version,
    })))
}
