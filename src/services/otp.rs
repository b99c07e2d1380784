//! OTP challenge manager.
//!
//! Owns the lifecycle of one-time codes: creation, delivery, attempt
//! accounting, verification and resend. Codes come from the OS CSPRNG and
//! are stored only as a salted SHA-256 hash; candidate comparison is
//! constant-time.

use chrono::{Duration, Utc};
use rand::{rngs::OsRng, Rng, RngCore};
use sha2::{Digest, Sha256};
use std::sync::Arc;
use subtle::ConstantTimeEq;
use uuid::Uuid;

use crate::config::OtpConfig;
use crate::models::{Destination, OtpChallenge, OtpChannel, OtpPurpose};

use super::database::ChallengeStore;
use super::delivery::DeliveryRouter;
use super::error::ServiceError;

#[derive(Clone)]
pub struct OtpManager {
    challenges: Arc<dyn ChallengeStore>,
    delivery: DeliveryRouter,
    config: OtpConfig,
}

impl OtpManager {
    pub fn new(
        challenges: Arc<dyn ChallengeStore>,
        delivery: DeliveryRouter,
        config: OtpConfig,
    ) -> Self {
        Self {
            challenges,
            delivery,
            config,
        }
    }

    /// Create a challenge, persist it, then dispatch the code. The returned
    /// record never contains the plaintext code; delivery failures do not
    /// fail creation.
    #[tracing::instrument(skip(self), fields(channel = ?channel, purpose = ?purpose))]
    pub async fn create_and_send(
        &self,
        account_id: Option<i64>,
        destination: &Destination,
        channel: OtpChannel,
        purpose: OtpPurpose,
    ) -> Result<OtpChallenge, ServiceError> {
        let code = generate_code(self.config.code_length);
        let salt = generate_salt();
        let hash = hash_code(&salt, &code);

        let challenge = OtpChallenge::new(
            account_id,
            destination,
            channel,
            purpose,
            salt,
            hash,
            self.config.ttl_seconds,
            self.config.max_attempts,
        );

        self.challenges
            .insert_challenge(&challenge)
            .await
            .map_err(ServiceError::Database)?;

        tracing::info!(challenge_id = %challenge.challenge_id, "OTP challenge created");

        self.delivery.dispatch(&challenge, &code).await;

        Ok(challenge)
    }

    /// Verify a candidate code and consume the challenge on success. Consuming
    /// is a compare-and-set, so of two racing correct guesses only one wins.
    #[tracing::instrument(skip(self, candidate_code))]
    pub async fn verify_and_consume(
        &self,
        challenge_id: Uuid,
        candidate_code: &str,
    ) -> Result<OtpChallenge, ServiceError> {
        let mut challenge = self.check_code(challenge_id, candidate_code).await?;

        let now = Utc::now();
        let won = self
            .challenges
            .mark_consumed(challenge_id, now)
            .await
            .map_err(ServiceError::Database)?;
        if !won {
            return Err(ServiceError::ChallengeAlreadyUsed);
        }
        challenge.consumed_utc = Some(now);

        tracing::info!(challenge_id = %challenge_id, "OTP challenge consumed");
        Ok(challenge)
    }

    /// Verify a candidate code without consuming the challenge. Attempt and
    /// expiry bookkeeping is identical to `verify_and_consume`; the counter
    /// is shared between both entry points.
    #[tracing::instrument(skip(self, candidate_code))]
    pub async fn validate(
        &self,
        challenge_id: Uuid,
        candidate_code: &str,
    ) -> Result<OtpChallenge, ServiceError> {
        self.check_code(challenge_id, candidate_code).await
    }

    /// Replace the code of a pending challenge and re-dispatch it over the
    /// channel captured at creation. The handle stays stable; attempts reset
    /// to zero and the previous code stops verifying.
    #[tracing::instrument(skip(self))]
    pub async fn resend(&self, challenge_id: Uuid) -> Result<OtpChallenge, ServiceError> {
        let challenge = self
            .challenges
            .find_challenge(challenge_id)
            .await
            .map_err(ServiceError::Database)?
            .ok_or(ServiceError::ChallengeNotFound)?;

        if challenge.is_consumed() {
            return Err(ServiceError::ChallengeAlreadyUsed);
        }

        let code = generate_code(self.config.code_length);
        let salt = generate_salt();
        let hash = hash_code(&salt, &code);
        let expiry = Utc::now() + Duration::seconds(self.config.ttl_seconds);

        self.challenges
            .replace_code(challenge_id, &salt, &hash, expiry)
            .await
            .map_err(ServiceError::Database)?;

        let challenge = OtpChallenge {
            code_salt_text: salt,
            code_hash_text: hash,
            expiry_utc: expiry,
            attempt_count: 0,
            ..challenge
        };

        tracing::info!(challenge_id = %challenge_id, "OTP challenge re-issued");

        self.delivery.dispatch(&challenge, &code).await;

        Ok(challenge)
    }

    /// Shared verification bookkeeping. The attempt counter is incremented
    /// atomically *before* the code comparison; once it reaches the ceiling
    /// the challenge is a permanent dead end, correct code or not.
    async fn check_code(
        &self,
        challenge_id: Uuid,
        candidate_code: &str,
    ) -> Result<OtpChallenge, ServiceError> {
        let challenge = self
            .challenges
            .find_challenge(challenge_id)
            .await
            .map_err(ServiceError::Database)?
            .ok_or(ServiceError::ChallengeNotFound)?;

        if challenge.is_consumed() {
            return Err(ServiceError::ChallengeAlreadyUsed);
        }

        if challenge.is_expired() {
            return Err(ServiceError::ChallengeExpired);
        }

        let attempts = self
            .challenges
            .increment_attempts(challenge_id)
            .await
            .map_err(ServiceError::Database)?;

        if attempts >= challenge.attempt_max {
            tracing::warn!(challenge_id = %challenge_id, attempts, "OTP attempt ceiling reached");
            return Err(ServiceError::AttemptsExceeded);
        }

        if !code_matches(&challenge.code_salt_text, &challenge.code_hash_text, candidate_code) {
            return Err(ServiceError::InvalidCode);
        }

        Ok(OtpChallenge {
            attempt_count: attempts,
            ..challenge
        })
    }
}

/// Random numeric code of the given length, drawn from the OS CSPRNG.
fn generate_code(length: usize) -> String {
    let mut rng = OsRng;
    (0..length)
        .map(|_| char::from(b'0' + rng.gen_range(0..10)))
        .collect()
}

/// Random per-challenge salt, hex-encoded for storage.
fn generate_salt() -> String {
    let mut bytes = [0u8; 16];
    OsRng.fill_bytes(&mut bytes);
    hex::encode(bytes)
}

/// SHA-256 over salt bytes followed by the code.
fn hash_code(salt_hex: &str, code: &str) -> String {
    let mut hasher = Sha256::new();
    if let Ok(salt) = hex::decode(salt_hex) {
        hasher.update(&salt);
    }
    hasher.update(code.as_bytes());
    hex::encode(hasher.finalize())
}

/// Hash the candidate under the stored salt and compare digests in constant
/// time.
fn code_matches(salt_hex: &str, stored_hash: &str, candidate: &str) -> bool {
    let computed = hash_code(salt_hex, candidate);
    computed.as_bytes().ct_eq(stored_hash.as_bytes()).into()
}
