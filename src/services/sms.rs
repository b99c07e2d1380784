use async_trait::async_trait;
use secrecy::ExposeSecret;
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use crate::config::SmsConfig;
use crate::error::AppError;

/// Outbound SMS contract. Like email, production delivery happens in an
/// external gateway; this crate only speaks its HTTP API.
#[async_trait]
pub trait SmsSender: Send + Sync {
    async fn send_otp(&self, to: &str, code: &str) -> Result<(), AppError>;

    async fn send_password_reset_success(&self, to: &str) -> Result<(), AppError>;
}

#[derive(Debug, Serialize)]
struct SmsPayload<'a> {
    from: &'a str,
    to: &'a str,
    body: String,
}

/// JSON-over-HTTP client for the SMS gateway.
#[derive(Clone)]
pub struct HttpSmsService {
    client: reqwest::Client,
    config: SmsConfig,
}

impl HttpSmsService {
    pub fn new(config: SmsConfig) -> Result<Self, AppError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| AppError::InternalError(anyhow::anyhow!(e)))?;

        tracing::info!(gateway = %config.gateway_url, "SMS service initialized");

        Ok(Self { client, config })
    }

    async fn send(&self, to: &str, body: String) -> Result<(), AppError> {
        let payload = SmsPayload {
            from: &self.config.from_number,
            to,
            body,
        };

        let response = self
            .client
            .post(&self.config.gateway_url)
            .bearer_auth(self.config.api_token.expose_secret())
            .json(&payload)
            .send()
            .await
            .map_err(|e| {
                tracing::error!(error = %e, to = %to, "Failed to reach SMS gateway");
                AppError::DeliveryError(e.to_string())
            })?;

        if !response.status().is_success() {
            tracing::error!(status = %response.status(), to = %to, "SMS gateway rejected message");
            return Err(AppError::DeliveryError(format!(
                "SMS gateway returned {}",
                response.status()
            )));
        }

        tracing::info!(to = %to, "SMS sent");
        Ok(())
    }
}

#[async_trait]
impl SmsSender for HttpSmsService {
    async fn send_otp(&self, to: &str, code: &str) -> Result<(), AppError> {
        self.send(to, format!("Your Staffhub verification code is {}", code))
            .await
    }

    async fn send_password_reset_success(&self, to: &str) -> Result<(), AppError> {
        self.send(
            to,
            "Your Staffhub password was changed. Contact HR if this wasn't you.".to_string(),
        )
        .await
    }
}

/// What a mock sender saw go out, for test assertions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SentSms {
    Otp { to: String, code: String },
    PasswordResetSuccess { to: String },
}

#[derive(Default)]
pub struct MockSmsSender {
    sent: Mutex<Vec<SentSms>>,
    failing: AtomicBool,
}

impl MockSmsSender {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn sent(&self) -> Vec<SentSms> {
        self.sent.lock().expect("sent sms log poisoned").clone()
    }

    fn record(&self, sms: SentSms) -> Result<(), AppError> {
        self.sent
            .lock()
            .map_err(|e| AppError::InternalError(anyhow::anyhow!("Sent sms log poisoned: {}", e)))?
            .push(sms);
        if self.failing.load(Ordering::SeqCst) {
            return Err(AppError::DeliveryError("mock sms failure".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl SmsSender for MockSmsSender {
    async fn send_otp(&self, to: &str, code: &str) -> Result<(), AppError> {
        self.record(SentSms::Otp {
            to: to.to_string(),
            code: code.to_string(),
        })
    }

    async fn send_password_reset_success(&self, to: &str) -> Result<(), AppError> {
        self.record(SentSms::PasswordResetSuccess { to: to.to_string() })
    }
}
