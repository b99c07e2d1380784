use staffhub_auth::{
    build_router,
    config::AuthConfig,
    db,
    middleware::create_ip_rate_limiter,
    observability::init_tracing,
    services::{
        spawn_expiry_sweeper, AuthService, ChallengeStore, CredentialStore, Database,
        DeliveryRouter, EmailSender, HttpSmsService, JwtService, OtpManager,
        RedisRevocationStore, RevocationStore, SmsSender, SmtpEmailService,
    },
    AppState,
};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;

#[tokio::main]
async fn main() -> Result<(), staffhub_auth::error::AppError> {
    dotenvy::dotenv().ok();

    // Load configuration - fail fast if invalid.
    let config = AuthConfig::from_env()?;

    init_tracing(&config.log_level, &config.environment);

    tracing::info!(
        service = %config.service_name,
        version = %config.service_version,
        environment = ?config.environment,
        "Starting authentication service"
    );

    let pool = db::create_pool(&config.database)
        .await
        .map_err(|e| staffhub_auth::error::AppError::DatabaseError(anyhow::anyhow!(e)))?;
    db::run_migrations(&pool)
        .await
        .map_err(|e| staffhub_auth::error::AppError::DatabaseError(anyhow::anyhow!(e)))?;

    let database = Database::new(pool);
    let accounts: Arc<dyn CredentialStore> = Arc::new(database.clone());
    let challenges: Arc<dyn ChallengeStore> = Arc::new(database);

    let revocations: Arc<dyn RevocationStore> = Arc::new(
        RedisRevocationStore::connect(&config.redis)
            .await
            .map_err(staffhub_auth::error::AppError::InternalError)?,
    );
    tracing::info!("Revocation store initialized");

    let email: Arc<dyn EmailSender> = Arc::new(SmtpEmailService::new(&config.smtp)?);
    let sms: Arc<dyn SmsSender> = Arc::new(HttpSmsService::new(config.sms.clone())?);

    let jwt = JwtService::new(&config.jwt);
    tracing::info!("Token issuer initialized");

    let delivery = DeliveryRouter::new(
        email.clone(),
        sms.clone(),
        config.security.public_base_url.clone(),
    );
    let otp = OtpManager::new(challenges.clone(), delivery, config.otp.clone());

    let auth = AuthService::new(
        accounts.clone(),
        revocations.clone(),
        otp,
        jwt,
        email,
        sms,
        config.password.clone(),
    );

    let login_rate_limiter = create_ip_rate_limiter(
        config.rate_limit.login_attempts,
        config.rate_limit.login_window_seconds,
    );
    let otp_resend_rate_limiter = create_ip_rate_limiter(
        config.rate_limit.otp_resend_attempts,
        config.rate_limit.otp_resend_window_seconds,
    );
    let password_reset_rate_limiter = create_ip_rate_limiter(
        config.rate_limit.password_reset_attempts,
        config.rate_limit.password_reset_window_seconds,
    );
    let ip_rate_limiter = create_ip_rate_limiter(
        config.rate_limit.global_ip_limit,
        config.rate_limit.global_ip_window_seconds,
    );

    // Storage GC for expired challenge and revocation rows.
    let sweeper = spawn_expiry_sweeper(
        challenges,
        revocations.clone(),
        Duration::from_secs(config.sweep_interval_seconds),
    );

    let state = AppState {
        config: config.clone(),
        auth,
        accounts,
        revocations,
        login_rate_limiter,
        otp_resend_rate_limiter,
        password_reset_rate_limiter,
        ip_rate_limiter,
    };

    let app = build_router(state)?;

    let addr = SocketAddr::from(([0, 0, 0, 0], config.http.port));
    tracing::info!(address = %addr, "Listening");

    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    sweeper.abort();
    tracing::info!("Service shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received SIGINT, starting graceful shutdown");
        },
        _ = terminate => {
            tracing::info!("Received SIGTERM, starting graceful shutdown");
        },
    }
}
