//! Delivery router - fans a challenge's plaintext code out to the right
//! channel(s).
//!
//! Dispatch is best-effort by design: the challenge row is already persisted
//! when this runs, and surfacing a transport failure to the caller would leak
//! whether a destination exists. Failures are logged and swallowed.

use std::sync::Arc;

use crate::models::{OtpChallenge, OtpPurpose};

use super::email::EmailSender;
use super::sms::SmsSender;

#[derive(Clone)]
pub struct DeliveryRouter {
    email: Arc<dyn EmailSender>,
    sms: Arc<dyn SmsSender>,
    public_base_url: String,
}

impl DeliveryRouter {
    pub fn new(
        email: Arc<dyn EmailSender>,
        sms: Arc<dyn SmsSender>,
        public_base_url: String,
    ) -> Self {
        Self {
            email,
            sms,
            public_base_url: public_base_url.trim_end_matches('/').to_string(),
        }
    }

    /// The link a password-reset email carries: handle and code travel as
    /// query parameters so the frontend can replay them against the confirm
    /// endpoint.
    pub fn reset_link(&self, challenge: &OtpChallenge, code: &str) -> String {
        format!(
            "{}/auth/password-reset/confirm?challenge_id={}&code={}",
            self.public_base_url, challenge.challenge_id, code
        )
    }

    /// Send the plaintext code over every destination the challenge captured
    /// at creation. Each channel is attempted independently.
    pub async fn dispatch(&self, challenge: &OtpChallenge, code: &str) {
        if let Some(to) = challenge.email_to.as_deref() {
            let outcome = if challenge.purpose() == Some(OtpPurpose::ResetPassword) {
                let link = self.reset_link(challenge, code);
                self.email.send_password_reset(to, &link).await
            } else {
                self.email.send_otp(to, code).await
            };

            if let Err(e) = outcome {
                tracing::warn!(
                    challenge_id = %challenge.challenge_id,
                    channel = "email",
                    error = %e,
                    "OTP delivery failed"
                );
            }
        }

        if let Some(to) = challenge.phone_to.as_deref() {
            if let Err(e) = self.sms.send_otp(to, code).await {
                tracing::warn!(
                    challenge_id = %challenge.challenge_id,
                    channel = "sms",
                    error = %e,
                    "OTP delivery failed"
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Destination, OtpChannel};
    use crate::services::email::{MockEmailSender, SentEmail};
    use crate::services::sms::{MockSmsSender, SentSms};

    fn challenge(destination: &Destination, purpose: OtpPurpose) -> OtpChallenge {
        OtpChallenge::new(
            Some(1),
            destination,
            OtpChannel::All,
            purpose,
            "salt".to_string(),
            "hash".to_string(),
            300,
            5,
        )
    }

    fn router() -> (DeliveryRouter, Arc<MockEmailSender>, Arc<MockSmsSender>) {
        let email = Arc::new(MockEmailSender::new());
        let sms = Arc::new(MockSmsSender::new());
        let router = DeliveryRouter::new(
            email.clone(),
            sms.clone(),
            "http://localhost:8080/".to_string(),
        );
        (router, email, sms)
    }

    #[tokio::test]
    async fn all_channel_fans_out_to_both_senders() {
        let (router, email, sms) = router();
        let destination = Destination::Both {
            email: "pat@example.com".to_string(),
            phone: "+15551234567".to_string(),
        };

        router
            .dispatch(&challenge(&destination, OtpPurpose::Login), "123456")
            .await;

        assert_eq!(
            email.sent(),
            vec![SentEmail::Otp {
                to: "pat@example.com".to_string(),
                code: "123456".to_string(),
            }]
        );
        assert_eq!(
            sms.sent(),
            vec![SentSms::Otp {
                to: "+15551234567".to_string(),
                code: "123456".to_string(),
            }]
        );
    }

    #[tokio::test]
    async fn reset_challenges_go_out_as_links() {
        let (router, email, _sms) = router();
        let destination = Destination::Email("pat@example.com".to_string());
        let c = challenge(&destination, OtpPurpose::ResetPassword);

        router.dispatch(&c, "654321").await;

        let expected_link = format!(
            "http://localhost:8080/auth/password-reset/confirm?challenge_id={}&code=654321",
            c.challenge_id
        );
        assert_eq!(
            email.sent(),
            vec![SentEmail::PasswordReset {
                to: "pat@example.com".to_string(),
                link: expected_link,
            }]
        );
    }

    #[tokio::test]
    async fn sender_failure_does_not_propagate() {
        let (router, email, sms) = router();
        email.set_failing(true);
        sms.set_failing(true);
        let destination = Destination::Both {
            email: "pat@example.com".to_string(),
            phone: "+15551234567".to_string(),
        };

        // Must not panic or error; both attempts are still recorded.
        router
            .dispatch(&challenge(&destination, OtpPurpose::Login), "123456")
            .await;

        assert_eq!(email.sent().len(), 1);
        assert_eq!(sms.sent().len(), 1);
    }
}
