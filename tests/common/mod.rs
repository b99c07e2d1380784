//! Shared setup for router-level integration tests.
//!
//! Tests run against the real router with in-memory stores and recording
//! mock senders, so no PostgreSQL, Redis or SMTP is needed.

#![allow(dead_code)]

use axum::{
    body::Body,
    http::{header, Request, StatusCode},
    Router,
};
use secrecy::SecretString;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use tower::util::ServiceExt;

use staffhub_auth::{
    build_router,
    config::{
        AuthConfig, DatabaseConfig, Environment, HttpConfig, JwtConfig, OtpConfig,
        PasswordConfig, RateLimitConfig, RedisConfig, SecurityConfig, SmsConfig, SmtpConfig,
    },
    middleware::create_ip_rate_limiter,
    models::{Account, OtpChannel},
    services::{
        AuthService, DeliveryRouter, JwtService, MemoryRevocationStore, MemoryStore,
        MockEmailSender, MockSmsSender, OtpManager, SentEmail,
    },
    utils::{hash_password, Password},
    AppState,
};

static NEXT_ACCOUNT_ID: AtomicI64 = AtomicI64::new(1);

pub const TEST_BASE_URL: &str = "http://localhost:8080";

pub struct TestApp {
    pub router: Router,
    pub store: Arc<MemoryStore>,
    pub revocations: Arc<MemoryRevocationStore>,
    pub email: Arc<MockEmailSender>,
    pub sms: Arc<MockSmsSender>,
    pub config: AuthConfig,
}

pub fn test_config() -> AuthConfig {
    AuthConfig {
        environment: Environment::Dev,
        service_name: "staffhub-auth".to_string(),
        service_version: "test".to_string(),
        log_level: "error".to_string(),
        http: HttpConfig { port: 8080 },
        database: DatabaseConfig {
            url: "postgres://unused".to_string(),
            max_connections: 1,
            min_connections: 1,
        },
        redis: RedisConfig {
            url: "redis://unused".to_string(),
        },
        jwt: JwtConfig {
            access_secret: SecretString::new("test-access-secret".to_string()),
            refresh_secret: SecretString::new("test-refresh-secret".to_string()),
            access_token_expiry_minutes: 15,
            refresh_token_expiry_days: 7,
        },
        otp: OtpConfig {
            code_length: 6,
            ttl_seconds: 300,
            max_attempts: 5,
        },
        password: PasswordConfig {
            memory_kib: 8,
            iterations: 1,
            parallelism: 1,
        },
        smtp: SmtpConfig {
            host: "smtp.example.com".to_string(),
            user: "noreply@example.com".to_string(),
            password: SecretString::new("unused".to_string()),
        },
        sms: SmsConfig {
            gateway_url: "https://sms.example.com/send".to_string(),
            api_token: SecretString::new("unused".to_string()),
            from_number: "+15550000000".to_string(),
        },
        security: SecurityConfig {
            allowed_origins: vec!["http://localhost:3000".to_string()],
            public_base_url: TEST_BASE_URL.to_string(),
        },
        rate_limit: RateLimitConfig {
            login_attempts: 5,
            login_window_seconds: 900,
            otp_resend_attempts: 5,
            otp_resend_window_seconds: 900,
            password_reset_attempts: 5,
            password_reset_window_seconds: 3600,
            global_ip_limit: 1000,
            global_ip_window_seconds: 60,
        },
        swagger_enabled: false,
        sweep_interval_seconds: 300,
    }
}

impl TestApp {
    pub fn spawn() -> Self {
        Self::spawn_with_config(test_config())
    }

    pub fn spawn_with_config(config: AuthConfig) -> Self {
        let store = Arc::new(MemoryStore::new());
        let revocations = Arc::new(MemoryRevocationStore::new());
        let email = Arc::new(MockEmailSender::new());
        let sms = Arc::new(MockSmsSender::new());

        let jwt = JwtService::new(&config.jwt);
        let delivery = DeliveryRouter::new(
            email.clone(),
            sms.clone(),
            config.security.public_base_url.clone(),
        );
        let otp = OtpManager::new(store.clone(), delivery, config.otp.clone());
        let auth = AuthService::new(
            store.clone(),
            revocations.clone(),
            otp,
            jwt,
            email.clone(),
            sms.clone(),
            config.password.clone(),
        );

        let state = AppState {
            config: config.clone(),
            auth,
            accounts: store.clone(),
            revocations: revocations.clone(),
            login_rate_limiter: create_ip_rate_limiter(
                config.rate_limit.login_attempts,
                config.rate_limit.login_window_seconds,
            ),
            otp_resend_rate_limiter: create_ip_rate_limiter(
                config.rate_limit.otp_resend_attempts,
                config.rate_limit.otp_resend_window_seconds,
            ),
            password_reset_rate_limiter: create_ip_rate_limiter(
                config.rate_limit.password_reset_attempts,
                config.rate_limit.password_reset_window_seconds,
            ),
            ip_rate_limiter: create_ip_rate_limiter(
                config.rate_limit.global_ip_limit,
                config.rate_limit.global_ip_window_seconds,
            ),
        };

        let router = build_router(state).expect("Failed to build router");

        Self {
            router,
            store,
            revocations,
            email,
            sms,
            config,
        }
    }

    /// Seed an account directly into the credential store.
    pub fn create_account(
        &self,
        email: &str,
        phone: Option<&str>,
        password: &str,
        two_factor: Option<OtpChannel>,
    ) -> i64 {
        let account_id = NEXT_ACCOUNT_ID.fetch_add(1, Ordering::SeqCst);
        let password_hash = hash_password(
            &Password::new(password.to_string()),
            &self.config.password,
        )
        .expect("Failed to hash test password");

        self.store.insert_account(Account {
            account_id,
            email: email.to_string(),
            phone: phone.map(|p| p.to_string()),
            role_code: "employee".to_string(),
            password_hash_text: password_hash.into_string(),
            active_flag: true,
            two_factor_enabled_flag: two_factor.is_some(),
            two_factor_method_code: two_factor.map(|m| m.as_str().to_string()),
            token_version: 0,
            last_login_utc: None,
            created_utc: chrono::Utc::now(),
        });

        account_id
    }

    pub async fn post_json(
        &self,
        path: &str,
        body: serde_json::Value,
    ) -> (StatusCode, serde_json::Value) {
        self.request(path, None, Some(body)).await
    }

    pub async fn post_authed(
        &self,
        path: &str,
        token: &str,
        body: Option<serde_json::Value>,
    ) -> (StatusCode, serde_json::Value) {
        self.request(path, Some(token), body).await
    }

    async fn request(
        &self,
        path: &str,
        token: Option<&str>,
        body: Option<serde_json::Value>,
    ) -> (StatusCode, serde_json::Value) {
        let mut builder = Request::builder()
            .method("POST")
            .uri(path)
            .header(header::CONTENT_TYPE, "application/json")
            .extension(axum::extract::ConnectInfo(SocketAddr::from((
                [127, 0, 0, 1],
                8080,
            ))));

        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
        }

        let payload = body.unwrap_or_else(|| serde_json::json!({}));
        let request = builder
            .body(Body::from(payload.to_string()))
            .expect("Failed to build request");

        let response = self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("Request failed");

        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("Failed to read body");
        let json = if bytes.is_empty() {
            serde_json::Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or(serde_json::Value::Null)
        };

        (status, json)
    }

    /// The most recent OTP code dispatched by email.
    pub fn last_email_otp_code(&self) -> Option<String> {
        self.email.sent().into_iter().rev().find_map(|m| match m {
            SentEmail::Otp { code, .. } => Some(code),
            _ => None,
        })
    }

    /// The most recent password reset link dispatched by email.
    pub fn last_reset_link(&self) -> Option<String> {
        self.email.sent().into_iter().rev().find_map(|m| match m {
            SentEmail::PasswordReset { link, .. } => Some(link),
            _ => None,
        })
    }

    /// Pull the challenge handle and code back out of a reset link.
    pub fn parse_reset_link(link: &str) -> (uuid::Uuid, String) {
        let query = link.split('?').nth(1).expect("link has a query string");
        let mut challenge_id = None;
        let mut code = None;
        for pair in query.split('&') {
            match pair.split_once('=') {
                Some(("challenge_id", v)) => challenge_id = Some(v.to_string()),
                Some(("code", v)) => code = Some(v.to_string()),
                _ => {}
            }
        }
        (
            challenge_id
                .expect("link carries challenge_id")
                .parse()
                .expect("challenge_id is a uuid"),
            code.expect("link carries code"),
        )
    }

    /// Log an account in and return `(access_token, refresh_token)`.
    /// The account must not have two-factor enabled.
    pub async fn login_tokens(&self, identifier: &str, password: &str) -> (String, String) {
        let (status, body) = self
            .post_json(
                "/auth/login",
                serde_json::json!({ "identifier": identifier, "password": password }),
            )
            .await;
        assert_eq!(status, StatusCode::OK, "login failed: {}", body);
        (
            body["access_token"].as_str().expect("access token").to_string(),
            body["refresh_token"].as_str().expect("refresh token").to_string(),
        )
    }
}
