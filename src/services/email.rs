use async_trait::async_trait;
use lettre::{
    message::header::ContentType, transport::smtp::authentication::Credentials, Message,
    SmtpTransport, Transport,
};
use secrecy::ExposeSecret;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use crate::config::SmtpConfig;
use crate::error::AppError;

/// Outbound email contract consumed by the delivery router and the password
/// reset flow. Implemented elsewhere in production terms; this crate ships an
/// SMTP implementation and a recording mock.
#[async_trait]
pub trait EmailSender: Send + Sync {
    async fn send_otp(&self, to: &str, code: &str) -> Result<(), AppError>;

    async fn send_password_reset(&self, to: &str, link: &str) -> Result<(), AppError>;

    async fn send_password_reset_success(&self, to: &str) -> Result<(), AppError>;
}

#[derive(Clone)]
pub struct SmtpEmailService {
    mailer: SmtpTransport,
    from_email: String,
}

impl SmtpEmailService {
    pub fn new(config: &SmtpConfig) -> Result<Self, AppError> {
        let creds = Credentials::new(
            config.user.clone(),
            config.password.expose_secret().clone(),
        );

        let mailer = SmtpTransport::relay(&config.host)
            .map_err(|e| AppError::InternalError(anyhow::anyhow!(e.to_string())))?
            .credentials(creds)
            .port(587)
            .timeout(Some(Duration::from_secs(10)))
            .build();

        tracing::info!(host = %config.host, "Email service initialized");

        Ok(Self {
            mailer,
            from_email: config.user.clone(),
        })
    }

    async fn send_email(
        &self,
        to_email: &str,
        subject: &str,
        plain_body: &str,
        html_body: &str,
    ) -> Result<(), AppError> {
        let email = Message::builder()
            .from(self.from_email.parse().map_err(
                |e: lettre::address::AddressError| AppError::InternalError(e.into()),
            )?)
            .to(to_email.parse().map_err(
                |e: lettre::address::AddressError| AppError::InternalError(e.into()),
            )?)
            .subject(subject)
            .multipart(
                lettre::message::MultiPart::alternative()
                    .singlepart(
                        lettre::message::SinglePart::builder()
                            .header(ContentType::TEXT_PLAIN)
                            .body(plain_body.to_string()),
                    )
                    .singlepart(
                        lettre::message::SinglePart::builder()
                            .header(ContentType::TEXT_HTML)
                            .body(html_body.to_string()),
                    ),
            )
            .map_err(|e| AppError::InternalError(e.into()))?;

        // lettre's SmtpTransport is blocking; keep it off the async runtime.
        let mailer = self.mailer.clone();
        let result = tokio::task::spawn_blocking(move || mailer.send(&email))
            .await
            .map_err(|e| AppError::InternalError(e.into()))?;

        match result {
            Ok(_) => {
                tracing::info!(to = %to_email, subject = %subject, "Email sent");
                Ok(())
            }
            Err(e) => {
                tracing::error!(error = %e.to_string(), to = %to_email, "Failed to send email");
                Err(AppError::DeliveryError(e.to_string()))
            }
        }
    }
}

#[async_trait]
impl EmailSender for SmtpEmailService {
    async fn send_otp(&self, to: &str, code: &str) -> Result<(), AppError> {
        let html_body = format!(
            r#"<html>
                <body style="font-family: Arial, sans-serif;">
                    <h2>Your verification code</h2>
                    <p style="font-size: 24px; letter-spacing: 4px;"><b>{}</b></p>
                    <p style="color: #666; font-size: 12px;">
                        The code expires in a few minutes. If you didn't request it, you can ignore this email.
                    </p>
                </body>
            </html>"#,
            code
        );

        let plain_body = format!(
            "Your verification code is: {}\n\nThe code expires in a few minutes. If you didn't request it, you can ignore this email.",
            code
        );

        self.send_email(to, "Your verification code", &plain_body, &html_body)
            .await
    }

    async fn send_password_reset(&self, to: &str, link: &str) -> Result<(), AppError> {
        let html_body = format!(
            r#"<html>
                <body style="font-family: Arial, sans-serif;">
                    <h2>Password reset requested</h2>
                    <p>Click the link below to choose a new password:</p>
                    <p>
                        <a href="{}" style="background-color: #2196F3; color: white; padding: 14px 20px; text-decoration: none; border-radius: 4px;">
                            Reset password
                        </a>
                    </p>
                    <p style="color: #666; font-size: 12px;">
                        If you didn't request this, please ignore this email.
                    </p>
                </body>
            </html>"#,
            link
        );

        let plain_body = format!(
            "Password reset requested\n\nVisit the following link to choose a new password:\n\n{}\n\nIf you didn't request this, please ignore this email.",
            link
        );

        self.send_email(to, "Reset your password", &plain_body, &html_body)
            .await
    }

    async fn send_password_reset_success(&self, to: &str) -> Result<(), AppError> {
        let html_body = r#"<html>
                <body style="font-family: Arial, sans-serif;">
                    <h2>Your password was changed</h2>
                    <p>If this wasn't you, contact your HR administrator immediately.</p>
                </body>
            </html>"#;

        let plain_body =
            "Your password was changed.\n\nIf this wasn't you, contact your HR administrator immediately.";

        self.send_email(to, "Your password was changed", plain_body, html_body)
            .await
    }
}

/// What a mock sender saw go out, for test assertions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SentEmail {
    Otp { to: String, code: String },
    PasswordReset { to: String, link: String },
    PasswordResetSuccess { to: String },
}

/// Recording mock. Failures can be toggled to exercise the swallow-and-log
/// paths; the attempt is recorded either way so tests can assert it was made.
#[derive(Default)]
pub struct MockEmailSender {
    sent: Mutex<Vec<SentEmail>>,
    failing: AtomicBool,
}

impl MockEmailSender {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn sent(&self) -> Vec<SentEmail> {
        self.sent.lock().expect("sent mail log poisoned").clone()
    }

    fn record(&self, mail: SentEmail) -> Result<(), AppError> {
        self.sent
            .lock()
            .map_err(|e| AppError::InternalError(anyhow::anyhow!("Sent mail log poisoned: {}", e)))?
            .push(mail);
        if self.failing.load(Ordering::SeqCst) {
            return Err(AppError::DeliveryError("mock email failure".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl EmailSender for MockEmailSender {
    async fn send_otp(&self, to: &str, code: &str) -> Result<(), AppError> {
        self.record(SentEmail::Otp {
            to: to.to_string(),
            code: code.to_string(),
        })
    }

    async fn send_password_reset(&self, to: &str, link: &str) -> Result<(), AppError> {
        self.record(SentEmail::PasswordReset {
            to: to.to_string(),
            link: link.to_string(),
        })
    }

    async fn send_password_reset_success(&self, to: &str) -> Result<(), AppError> {
        self.record(SentEmail::PasswordResetSuccess { to: to.to_string() })
    }
}
