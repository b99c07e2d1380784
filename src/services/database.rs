//! Storage boundary for credentials and OTP challenges.
//!
//! The credential store is owned by the wider HR platform; this subsystem
//! consumes it and mutates only the security columns. Both stores are traits
//! so tests can run against the in-memory implementation.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgPool;
use std::collections::HashMap;
use std::sync::Mutex;
use uuid::Uuid;

use crate::models::{Account, OtpChallenge, OtpChannel};

/// Durable account records: password hash, role, two-factor settings and the
/// per-account token version.
#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// Look up an active account by login identifier (email or phone).
    async fn find_account_by_identifier(
        &self,
        identifier: &str,
    ) -> Result<Option<Account>, anyhow::Error>;

    async fn find_account_by_id(&self, account_id: i64) -> Result<Option<Account>, anyhow::Error>;

    /// Look up by email without an active filter; callers that must hide
    /// account existence check the flag themselves.
    async fn find_account_by_email(&self, email: &str) -> Result<Option<Account>, anyhow::Error>;

    async fn update_password_hash(
        &self,
        account_id: i64,
        password_hash: &str,
    ) -> Result<(), anyhow::Error>;

    /// Atomically increment the token version and return the new value.
    /// Invalidates every outstanding token signed under the old version.
    async fn bump_token_version(&self, account_id: i64) -> Result<i32, anyhow::Error>;

    async fn set_two_factor(
        &self,
        account_id: i64,
        enabled: bool,
        method: Option<OtpChannel>,
    ) -> Result<(), anyhow::Error>;

    async fn record_last_login(&self, account_id: i64) -> Result<(), anyhow::Error>;

    async fn health_check(&self) -> Result<(), anyhow::Error>;
}

/// Durable OTP challenge rows. All mutations are single atomic statements so
/// concurrent guesses against one handle serialize at the row.
#[async_trait]
pub trait ChallengeStore: Send + Sync {
    async fn insert_challenge(&self, challenge: &OtpChallenge) -> Result<(), anyhow::Error>;

    async fn find_challenge(
        &self,
        challenge_id: Uuid,
    ) -> Result<Option<OtpChallenge>, anyhow::Error>;

    /// Increment the attempt counter and return the new value, in one step.
    async fn increment_attempts(&self, challenge_id: Uuid) -> Result<i32, anyhow::Error>;

    /// Compare-and-set consumption. Returns false when the challenge was
    /// already consumed, so at most one caller wins.
    async fn mark_consumed(
        &self,
        challenge_id: Uuid,
        at: DateTime<Utc>,
    ) -> Result<bool, anyhow::Error>;

    /// Replace the code hash and expiry and reset the attempt counter, used
    /// by resend. The handle stays the same.
    async fn replace_code(
        &self,
        challenge_id: Uuid,
        code_salt: &str,
        code_hash: &str,
        expiry_utc: DateTime<Utc>,
    ) -> Result<(), anyhow::Error>;

    /// Delete rows whose expiry is before the cutoff. Best-effort, idempotent.
    async fn delete_expired(&self, cutoff: DateTime<Utc>) -> Result<u64, anyhow::Error>;
}

/// PostgreSQL-backed implementation of both stores.
#[derive(Clone)]
pub struct Database {
    pool: PgPool,
}

impl Database {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl CredentialStore for Database {
    async fn find_account_by_identifier(
        &self,
        identifier: &str,
    ) -> Result<Option<Account>, anyhow::Error> {
        sqlx::query_as::<_, Account>(
            "SELECT * FROM accounts WHERE (LOWER(email) = LOWER($1) OR phone = $1) AND active_flag = true",
        )
        .bind(identifier)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| anyhow::anyhow!(e))
    }

    async fn find_account_by_id(&self, account_id: i64) -> Result<Option<Account>, anyhow::Error> {
        sqlx::query_as::<_, Account>("SELECT * FROM accounts WHERE account_id = $1")
            .bind(account_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| anyhow::anyhow!(e))
    }

    async fn find_account_by_email(&self, email: &str) -> Result<Option<Account>, anyhow::Error> {
        sqlx::query_as::<_, Account>("SELECT * FROM accounts WHERE LOWER(email) = LOWER($1)")
            .bind(email)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| anyhow::anyhow!(e))
    }

    async fn update_password_hash(
        &self,
        account_id: i64,
        password_hash: &str,
    ) -> Result<(), anyhow::Error> {
        sqlx::query("UPDATE accounts SET password_hash_text = $1 WHERE account_id = $2")
            .bind(password_hash)
            .bind(account_id)
            .execute(&self.pool)
            .await
            .map_err(|e| anyhow::anyhow!(e))?;
        Ok(())
    }

    async fn bump_token_version(&self, account_id: i64) -> Result<i32, anyhow::Error> {
        sqlx::query_scalar::<_, i32>(
            "UPDATE accounts SET token_version = token_version + 1 WHERE account_id = $1 RETURNING token_version",
        )
        .bind(account_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| anyhow::anyhow!(e))?
        .ok_or_else(|| anyhow::anyhow!("Account {} not found", account_id))
    }

    async fn set_two_factor(
        &self,
        account_id: i64,
        enabled: bool,
        method: Option<OtpChannel>,
    ) -> Result<(), anyhow::Error> {
        sqlx::query(
            "UPDATE accounts SET two_factor_enabled_flag = $1, two_factor_method_code = $2 WHERE account_id = $3",
        )
        .bind(enabled)
        .bind(method.map(|m| m.as_str()))
        .bind(account_id)
        .execute(&self.pool)
        .await
        .map_err(|e| anyhow::anyhow!(e))?;
        Ok(())
    }

    async fn record_last_login(&self, account_id: i64) -> Result<(), anyhow::Error> {
        sqlx::query("UPDATE accounts SET last_login_utc = NOW() WHERE account_id = $1")
            .bind(account_id)
            .execute(&self.pool)
            .await
            .map_err(|e| anyhow::anyhow!(e))?;
        Ok(())
    }

    async fn health_check(&self) -> Result<(), anyhow::Error> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(|e| anyhow::anyhow!("Database health check failed: {}", e))?;
        Ok(())
    }
}

#[async_trait]
impl ChallengeStore for Database {
    async fn insert_challenge(&self, challenge: &OtpChallenge) -> Result<(), anyhow::Error> {
        sqlx::query(
            r#"
            INSERT INTO otp_challenges (challenge_id, account_id, channel_code, purpose_code, email_to, phone_to, code_salt_text, code_hash_text, expiry_utc, consumed_utc, attempt_count, attempt_max, created_utc)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
            "#,
        )
        .bind(challenge.challenge_id)
        .bind(challenge.account_id)
        .bind(&challenge.channel_code)
        .bind(&challenge.purpose_code)
        .bind(&challenge.email_to)
        .bind(&challenge.phone_to)
        .bind(&challenge.code_salt_text)
        .bind(&challenge.code_hash_text)
        .bind(challenge.expiry_utc)
        .bind(challenge.consumed_utc)
        .bind(challenge.attempt_count)
        .bind(challenge.attempt_max)
        .bind(challenge.created_utc)
        .execute(&self.pool)
        .await
        .map_err(|e| anyhow::anyhow!(e))?;
        Ok(())
    }

    async fn find_challenge(
        &self,
        challenge_id: Uuid,
    ) -> Result<Option<OtpChallenge>, anyhow::Error> {
        sqlx::query_as::<_, OtpChallenge>("SELECT * FROM otp_challenges WHERE challenge_id = $1")
            .bind(challenge_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| anyhow::anyhow!(e))
    }

    async fn increment_attempts(&self, challenge_id: Uuid) -> Result<i32, anyhow::Error> {
        sqlx::query_scalar::<_, i32>(
            "UPDATE otp_challenges SET attempt_count = attempt_count + 1 WHERE challenge_id = $1 RETURNING attempt_count",
        )
        .bind(challenge_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| anyhow::anyhow!(e))?
        .ok_or_else(|| anyhow::anyhow!("Challenge {} not found", challenge_id))
    }

    async fn mark_consumed(
        &self,
        challenge_id: Uuid,
        at: DateTime<Utc>,
    ) -> Result<bool, anyhow::Error> {
        let result = sqlx::query(
            "UPDATE otp_challenges SET consumed_utc = $2 WHERE challenge_id = $1 AND consumed_utc IS NULL",
        )
        .bind(challenge_id)
        .bind(at)
        .execute(&self.pool)
        .await
        .map_err(|e| anyhow::anyhow!(e))?;
        Ok(result.rows_affected() == 1)
    }

    async fn replace_code(
        &self,
        challenge_id: Uuid,
        code_salt: &str,
        code_hash: &str,
        expiry_utc: DateTime<Utc>,
    ) -> Result<(), anyhow::Error> {
        sqlx::query(
            "UPDATE otp_challenges SET code_salt_text = $2, code_hash_text = $3, expiry_utc = $4, attempt_count = 0 WHERE challenge_id = $1",
        )
        .bind(challenge_id)
        .bind(code_salt)
        .bind(code_hash)
        .bind(expiry_utc)
        .execute(&self.pool)
        .await
        .map_err(|e| anyhow::anyhow!(e))?;
        Ok(())
    }

    async fn delete_expired(&self, cutoff: DateTime<Utc>) -> Result<u64, anyhow::Error> {
        let result = sqlx::query("DELETE FROM otp_challenges WHERE expiry_utc < $1")
            .bind(cutoff)
            .execute(&self.pool)
            .await
            .map_err(|e| anyhow::anyhow!(e))?;
        Ok(result.rows_affected())
    }
}

/// In-memory implementation of both stores, used by the integration tests.
/// Mutations take the map lock for their whole read-modify-write, which gives
/// the same per-row serialization the SQL statements provide.
#[derive(Default)]
pub struct MemoryStore {
    accounts: Mutex<HashMap<i64, Account>>,
    challenges: Mutex<HashMap<Uuid, OtpChallenge>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn accounts_guard(
        &self,
    ) -> Result<std::sync::MutexGuard<'_, HashMap<i64, Account>>, anyhow::Error> {
        self.accounts
            .lock()
            .map_err(|e| anyhow::anyhow!("Account map poisoned: {}", e))
    }

    fn challenges_guard(
        &self,
    ) -> Result<std::sync::MutexGuard<'_, HashMap<Uuid, OtpChallenge>>, anyhow::Error> {
        self.challenges
            .lock()
            .map_err(|e| anyhow::anyhow!("Challenge map poisoned: {}", e))
    }

    pub fn insert_account(&self, account: Account) {
        self.accounts
            .lock()
            .expect("account map poisoned")
            .insert(account.account_id, account);
    }

    pub fn account(&self, account_id: i64) -> Option<Account> {
        self.accounts
            .lock()
            .expect("account map poisoned")
            .get(&account_id)
            .cloned()
    }

    pub fn challenge(&self, challenge_id: Uuid) -> Option<OtpChallenge> {
        self.challenges
            .lock()
            .expect("challenge map poisoned")
            .get(&challenge_id)
            .cloned()
    }

    pub fn challenge_count(&self) -> usize {
        self.challenges.lock().expect("challenge map poisoned").len()
    }

    /// Insert a pre-built challenge row, bypassing the manager. Lets tests
    /// stage already-expired challenges without waiting out a TTL.
    pub fn insert_challenge_row(&self, challenge: OtpChallenge) {
        self.challenges
            .lock()
            .expect("challenge map poisoned")
            .insert(challenge.challenge_id, challenge);
    }
}

#[async_trait]
impl CredentialStore for MemoryStore {
    async fn find_account_by_identifier(
        &self,
        identifier: &str,
    ) -> Result<Option<Account>, anyhow::Error> {
        let accounts = self.accounts_guard()?;
        Ok(accounts
            .values()
            .find(|a| {
                a.active_flag
                    && (a.email.eq_ignore_ascii_case(identifier)
                        || a.phone.as_deref() == Some(identifier))
            })
            .cloned())
    }

    async fn find_account_by_id(&self, account_id: i64) -> Result<Option<Account>, anyhow::Error> {
        Ok(self.account(account_id))
    }

    async fn find_account_by_email(&self, email: &str) -> Result<Option<Account>, anyhow::Error> {
        let accounts = self.accounts_guard()?;
        Ok(accounts
            .values()
            .find(|a| a.email.eq_ignore_ascii_case(email))
            .cloned())
    }

    async fn update_password_hash(
        &self,
        account_id: i64,
        password_hash: &str,
    ) -> Result<(), anyhow::Error> {
        let mut accounts = self.accounts_guard()?;
        let account = accounts
            .get_mut(&account_id)
            .ok_or_else(|| anyhow::anyhow!("Account {} not found", account_id))?;
        account.password_hash_text = password_hash.to_string();
        Ok(())
    }

    async fn bump_token_version(&self, account_id: i64) -> Result<i32, anyhow::Error> {
        let mut accounts = self.accounts_guard()?;
        let account = accounts
            .get_mut(&account_id)
            .ok_or_else(|| anyhow::anyhow!("Account {} not found", account_id))?;
        account.token_version += 1;
        Ok(account.token_version)
    }

    async fn set_two_factor(
        &self,
        account_id: i64,
        enabled: bool,
        method: Option<OtpChannel>,
    ) -> Result<(), anyhow::Error> {
        let mut accounts = self.accounts_guard()?;
        let account = accounts
            .get_mut(&account_id)
            .ok_or_else(|| anyhow::anyhow!("Account {} not found", account_id))?;
        account.two_factor_enabled_flag = enabled;
        account.two_factor_method_code = method.map(|m| m.as_str().to_string());
        Ok(())
    }

    async fn record_last_login(&self, account_id: i64) -> Result<(), anyhow::Error> {
        let mut accounts = self.accounts_guard()?;
        let account = accounts
            .get_mut(&account_id)
            .ok_or_else(|| anyhow::anyhow!("Account {} not found", account_id))?;
        account.last_login_utc = Some(Utc::now());
        Ok(())
    }

    async fn health_check(&self) -> Result<(), anyhow::Error> {
        Ok(())
    }
}

#[async_trait]
impl ChallengeStore for MemoryStore {
    async fn insert_challenge(&self, challenge: &OtpChallenge) -> Result<(), anyhow::Error> {
        self.insert_challenge_row(challenge.clone());
        Ok(())
    }

    async fn find_challenge(
        &self,
        challenge_id: Uuid,
    ) -> Result<Option<OtpChallenge>, anyhow::Error> {
        Ok(self.challenge(challenge_id))
    }

    async fn increment_attempts(&self, challenge_id: Uuid) -> Result<i32, anyhow::Error> {
        let mut challenges = self.challenges_guard()?;
        let challenge = challenges
            .get_mut(&challenge_id)
            .ok_or_else(|| anyhow::anyhow!("Challenge {} not found", challenge_id))?;
        challenge.attempt_count += 1;
        Ok(challenge.attempt_count)
    }

    async fn mark_consumed(
        &self,
        challenge_id: Uuid,
        at: DateTime<Utc>,
    ) -> Result<bool, anyhow::Error> {
        let mut challenges = self.challenges_guard()?;
        let challenge = challenges
            .get_mut(&challenge_id)
            .ok_or_else(|| anyhow::anyhow!("Challenge {} not found", challenge_id))?;
        if challenge.consumed_utc.is_some() {
            return Ok(false);
        }
        challenge.consumed_utc = Some(at);
        Ok(true)
    }

    async fn replace_code(
        &self,
        challenge_id: Uuid,
        code_salt: &str,
        code_hash: &str,
        expiry_utc: DateTime<Utc>,
    ) -> Result<(), anyhow::Error> {
        let mut challenges = self.challenges_guard()?;
        let challenge = challenges
            .get_mut(&challenge_id)
            .ok_or_else(|| anyhow::anyhow!("Challenge {} not found", challenge_id))?;
        challenge.code_salt_text = code_salt.to_string();
        challenge.code_hash_text = code_hash.to_string();
        challenge.expiry_utc = expiry_utc;
        challenge.attempt_count = 0;
        Ok(())
    }

    async fn delete_expired(&self, cutoff: DateTime<Utc>) -> Result<u64, anyhow::Error> {
        let mut challenges = self.challenges_guard()?;
        let before = challenges.len();
        challenges.retain(|_, c| c.expiry_utc >= cutoff);
        Ok((before - challenges.len()) as u64)
    }
}
