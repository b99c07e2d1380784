//! OTP challenge model - one in-flight verification code.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;
use uuid::Uuid;

/// What a challenge may be redeemed for. A code issued for one purpose can
/// never complete a different flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum OtpPurpose {
    Login,
    Enable2fa,
    ResetPassword,
}

impl OtpPurpose {
    pub fn as_str(&self) -> &'static str {
        match self {
            OtpPurpose::Login => "login",
            OtpPurpose::Enable2fa => "enable_2fa",
            OtpPurpose::ResetPassword => "reset_password",
        }
    }

    pub fn parse(code: &str) -> Option<Self> {
        match code {
            "login" => Some(OtpPurpose::Login),
            "enable_2fa" => Some(OtpPurpose::Enable2fa),
            "reset_password" => Some(OtpPurpose::ResetPassword),
            _ => None,
        }
    }
}

/// Delivery channel of a challenge, also used as an account's configured
/// two-factor method.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum OtpChannel {
    Email,
    Sms,
    All,
}

impl OtpChannel {
    pub fn as_str(&self) -> &'static str {
        match self {
            OtpChannel::Email => "email",
            OtpChannel::Sms => "sms",
            OtpChannel::All => "all",
        }
    }

    pub fn parse(code: &str) -> Option<Self> {
        match code {
            "email" => Some(OtpChannel::Email),
            "sms" => Some(OtpChannel::Sms),
            "all" => Some(OtpChannel::All),
            _ => None,
        }
    }
}

/// Where a challenge is delivered. Resolved once at creation time from the
/// channel and the account's contact fields, then carried unchanged through
/// send and resend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Destination {
    Email(String),
    Phone(String),
    Both { email: String, phone: String },
}

impl Destination {
    pub fn email(&self) -> Option<&str> {
        match self {
            Destination::Email(addr) => Some(addr),
            Destination::Both { email, .. } => Some(email),
            Destination::Phone(_) => None,
        }
    }

    pub fn phone(&self) -> Option<&str> {
        match self {
            Destination::Phone(num) => Some(num),
            Destination::Both { phone, .. } => Some(phone),
            Destination::Email(_) => None,
        }
    }
}

/// OTP challenge entity. The plaintext code is never stored; only a salted
/// one-way hash of it.
#[derive(Debug, Clone, FromRow)]
pub struct OtpChallenge {
    pub challenge_id: Uuid,
    pub account_id: Option<i64>,
    pub channel_code: String,
    pub purpose_code: String,
    pub email_to: Option<String>,
    pub phone_to: Option<String>,
    pub code_salt_text: String,
    pub code_hash_text: String,
    pub expiry_utc: DateTime<Utc>,
    pub consumed_utc: Option<DateTime<Utc>>,
    pub attempt_count: i32,
    pub attempt_max: i32,
    pub created_utc: DateTime<Utc>,
}

impl OtpChallenge {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        account_id: Option<i64>,
        destination: &Destination,
        channel: OtpChannel,
        purpose: OtpPurpose,
        code_salt: String,
        code_hash: String,
        ttl_seconds: i64,
        attempt_max: i32,
    ) -> Self {
        Self {
            challenge_id: Uuid::new_v4(),
            account_id,
            channel_code: channel.as_str().to_string(),
            purpose_code: purpose.as_str().to_string(),
            email_to: destination.email().map(|s| s.to_string()),
            phone_to: destination.phone().map(|s| s.to_string()),
            code_salt_text: code_salt,
            code_hash_text: code_hash,
            expiry_utc: Utc::now() + Duration::seconds(ttl_seconds),
            consumed_utc: None,
            attempt_count: 0,
            attempt_max,
            created_utc: Utc::now(),
        }
    }

    pub fn purpose(&self) -> Option<OtpPurpose> {
        OtpPurpose::parse(&self.purpose_code)
    }

    pub fn channel(&self) -> Option<OtpChannel> {
        OtpChannel::parse(&self.channel_code)
    }

    pub fn is_consumed(&self) -> bool {
        self.consumed_utc.is_some()
    }

    pub fn is_expired(&self) -> bool {
        Utc::now() > self.expiry_utc
    }

    /// Rebuild the destination captured at creation time.
    pub fn destination(&self) -> Option<Destination> {
        match (self.email_to.as_deref(), self.phone_to.as_deref()) {
            (Some(email), Some(phone)) => Some(Destination::Both {
                email: email.to_string(),
                phone: phone.to_string(),
            }),
            (Some(email), None) => Some(Destination::Email(email.to_string())),
            (None, Some(phone)) => Some(Destination::Phone(phone.to_string())),
            (None, None) => None,
        }
    }
}
