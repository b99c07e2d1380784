//! Services layer: storage boundaries, token issuing, OTP lifecycle and the
//! auth orchestrator.

pub mod auth;
pub mod database;
pub mod delivery;
pub mod email;
pub mod error;
pub mod jwt;
pub mod otp;
pub mod revocation;
pub mod sms;
pub mod sweeper;

pub use auth::{AuthService, LoginOutcome};
pub use database::{ChallengeStore, CredentialStore, Database, MemoryStore};
pub use delivery::DeliveryRouter;
pub use email::{EmailSender, MockEmailSender, SentEmail, SmtpEmailService};
pub use error::ServiceError;
pub use jwt::{AccessTokenClaims, JwtService, RefreshTokenClaims, TokenResponse};
pub use otp::OtpManager;
pub use revocation::{MemoryRevocationStore, RedisRevocationStore, RevocationStore};
pub use sms::{HttpSmsService, MockSmsSender, SentSms, SmsSender};
pub use sweeper::spawn_expiry_sweeper;
