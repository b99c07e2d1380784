//! Auth orchestrator - the only service the HTTP layer talks to.
//!
//! Coordinates the credential store, the OTP challenge manager, the token
//! issuer and the revocation store to implement the login, refresh, logout,
//! password reset and two-factor enrollment flows.

use chrono::Utc;
use std::sync::Arc;
use uuid::Uuid;

use crate::config::PasswordConfig;
use crate::models::{Account, Destination, OtpChallenge, OtpChannel, OtpPurpose};
use crate::utils::{hash_password, verify_password, Password, PasswordHashString};

use super::database::CredentialStore;
use super::error::ServiceError;
use super::jwt::{AccessTokenClaims, JwtService, TokenResponse};
use super::otp::OtpManager;
use super::revocation::RevocationStore;
use super::{EmailSender, SmsSender};

/// Result of a password login: either a finished session or a pending
/// second-factor challenge. Tokens are never issued in the challenge case.
pub enum LoginOutcome {
    Tokens(TokenResponse),
    TwoFactorRequired(OtpChallenge),
}

#[derive(Clone)]
pub struct AuthService {
    accounts: Arc<dyn CredentialStore>,
    revocations: Arc<dyn RevocationStore>,
    otp: OtpManager,
    jwt: JwtService,
    email: Arc<dyn EmailSender>,
    sms: Arc<dyn SmsSender>,
    password: PasswordConfig,
}

impl AuthService {
    pub fn new(
        accounts: Arc<dyn CredentialStore>,
        revocations: Arc<dyn RevocationStore>,
        otp: OtpManager,
        jwt: JwtService,
        email: Arc<dyn EmailSender>,
        sms: Arc<dyn SmsSender>,
        password: PasswordConfig,
    ) -> Self {
        Self {
            accounts,
            revocations,
            otp,
            jwt,
            email,
            sms,
            password,
        }
    }

    /// Password login by email or phone. Unknown identifiers and wrong
    /// passwords fail identically so the endpoint cannot be used to probe
    /// for accounts.
    #[tracing::instrument(skip(self, password))]
    pub async fn login(
        &self,
        identifier: &str,
        password: &str,
    ) -> Result<LoginOutcome, ServiceError> {
        let account = self
            .accounts
            .find_account_by_identifier(identifier)
            .await
            .map_err(ServiceError::Database)?
            .ok_or(ServiceError::InvalidCredentials)?;

        verify_password(
            &Password::new(password.to_string()),
            &PasswordHashString::new(account.password_hash_text.clone()),
        )
        .map_err(|_| ServiceError::InvalidCredentials)?;

        if !account.two_factor_enabled_flag {
            let tokens = self.issue_session(&account).await?;
            return Ok(LoginOutcome::Tokens(tokens));
        }

        let method = account
            .two_factor_method()
            .ok_or(ServiceError::MissingDestination)?;
        let destination = destination_for(&account, method)?;

        let challenge = self
            .otp
            .create_and_send(
                Some(account.account_id),
                &destination,
                method,
                OtpPurpose::Login,
            )
            .await?;

        tracing::info!(account_id = account.account_id, "Login pending second factor");

        Ok(LoginOutcome::TwoFactorRequired(challenge))
    }

    /// Redeem a login challenge. The only path by which a two-factor account
    /// obtains tokens.
    #[tracing::instrument(skip(self, code))]
    pub async fn verify_login_otp(
        &self,
        challenge_id: Uuid,
        code: &str,
    ) -> Result<TokenResponse, ServiceError> {
        let challenge = self.otp.verify_and_consume(challenge_id, code).await?;

        if challenge.purpose() != Some(OtpPurpose::Login) {
            return Err(ServiceError::PurposeMismatch);
        }

        let account_id = challenge.account_id.ok_or(ServiceError::AccountNotFound)?;
        let account = self
            .accounts
            .find_account_by_id(account_id)
            .await
            .map_err(ServiceError::Database)?
            .filter(Account::is_active)
            .ok_or(ServiceError::AccountNotFound)?;

        self.issue_session(&account).await
    }

    /// Re-dispatch a pending challenge with a fresh code.
    pub async fn resend_otp(&self, challenge_id: Uuid) -> Result<OtpChallenge, ServiceError> {
        self.otp.resend(challenge_id).await
    }

    /// Rotate a refresh token into a fresh token pair. Refresh tokens are
    /// checked against the account's token version, not the revocation
    /// store; logout invalidates them wholesale.
    #[tracing::instrument(skip(self, refresh_token))]
    pub async fn refresh(&self, refresh_token: &str) -> Result<TokenResponse, ServiceError> {
        let claims = self
            .jwt
            .decode_refresh_token(refresh_token)
            .map_err(|_| ServiceError::InvalidToken)?;

        let account = self
            .accounts
            .find_account_by_id(claims.sub)
            .await
            .map_err(ServiceError::Database)?
            .filter(Account::is_active)
            .ok_or(ServiceError::InvalidToken)?;

        if claims.token_version != account.token_version {
            return Err(ServiceError::InvalidToken);
        }

        let tokens = self
            .jwt
            .sign_session(&account)
            .map_err(ServiceError::Internal)?;

        tracing::info!(account_id = account.account_id, "Session refreshed");

        Ok(tokens)
    }

    /// Account-wide revocation: bump the token version so every outstanding
    /// access and refresh token dies at its next validation.
    #[tracing::instrument(skip(self))]
    pub async fn logout(&self, account_id: i64) -> Result<(), ServiceError> {
        let new_version = self
            .accounts
            .bump_token_version(account_id)
            .await
            .map_err(ServiceError::Database)?;

        tracing::info!(account_id, token_version = new_version, "Account logged out");

        Ok(())
    }

    /// Fine-grained revocation of a single access token by jti. Leaves the
    /// token version, and therefore every other session, untouched.
    pub async fn revoke_access_token(
        &self,
        account_id: i64,
        jti: &str,
        exp: i64,
    ) -> Result<(), ServiceError> {
        if jti.is_empty() {
            return Ok(());
        }

        let remaining = exp - Utc::now().timestamp();
        self.revocations
            .revoke(jti, account_id, remaining)
            .await
            .map_err(ServiceError::Database)?;

        tracing::info!(account_id, jti, "Access token revoked");

        Ok(())
    }

    /// Full validation of an incoming access token: signature and expiry,
    /// then account state, token version and the revocation store. Runs on
    /// every authenticated request.
    pub async fn validate_incoming(&self, token: &str) -> Result<AccessTokenClaims, ServiceError> {
        let claims = self
            .jwt
            .decode_access_token(token)
            .map_err(|_| ServiceError::InvalidToken)?;

        let account = self
            .accounts
            .find_account_by_id(claims.sub)
            .await
            .map_err(ServiceError::Database)?
            .filter(Account::is_active)
            .ok_or(ServiceError::InvalidToken)?;

        if claims.token_version != account.token_version {
            return Err(ServiceError::InvalidToken);
        }

        if !claims.jti.is_empty()
            && self
                .revocations
                .is_revoked(&claims.jti)
                .await
                .map_err(ServiceError::Database)?
        {
            return Err(ServiceError::InvalidToken);
        }

        Ok(claims)
    }

    /// Start a password reset. Always reports success; whether an account
    /// exists for the address must not be observable.
    #[tracing::instrument(skip(self))]
    pub async fn request_password_reset(&self, email: &str) -> Result<(), ServiceError> {
        let account = self
            .accounts
            .find_account_by_email(email)
            .await
            .map_err(ServiceError::Database)?
            .filter(Account::is_active);

        let Some(account) = account else {
            tracing::debug!("Password reset requested for unknown or inactive address");
            return Ok(());
        };

        self.otp
            .create_and_send(
                Some(account.account_id),
                &Destination::Email(account.email.clone()),
                OtpChannel::Email,
                OtpPurpose::ResetPassword,
            )
            .await?;

        tracing::info!(account_id = account.account_id, "Password reset requested");

        Ok(())
    }

    /// Check a reset code without spending it, so the frontend can collect
    /// the new password only after the code is known to be good.
    pub async fn validate_password_reset_token(
        &self,
        challenge_id: Uuid,
        code: &str,
    ) -> Result<(), ServiceError> {
        let challenge = self.otp.validate(challenge_id, code).await?;

        if challenge.purpose() != Some(OtpPurpose::ResetPassword) {
            return Err(ServiceError::PurposeMismatch);
        }

        Ok(())
    }

    /// Consume a reset challenge and set the new password. The change
    /// notifications afterwards are fire-and-forget: the reset has already
    /// happened and a transport failure must not undo it.
    #[tracing::instrument(skip(self, code, new_password))]
    pub async fn reset_password(
        &self,
        challenge_id: Uuid,
        code: &str,
        new_password: &str,
    ) -> Result<(), ServiceError> {
        let challenge = self.otp.verify_and_consume(challenge_id, code).await?;

        if challenge.purpose() != Some(OtpPurpose::ResetPassword) {
            return Err(ServiceError::PurposeMismatch);
        }

        let account_id = challenge.account_id.ok_or(ServiceError::AccountNotFound)?;
        let account = self
            .accounts
            .find_account_by_id(account_id)
            .await
            .map_err(ServiceError::Database)?
            .ok_or(ServiceError::AccountNotFound)?;

        let password_hash = hash_password(&Password::new(new_password.to_string()), &self.password)
            .map_err(ServiceError::Internal)?;

        self.accounts
            .update_password_hash(account.account_id, password_hash.as_str())
            .await
            .map_err(ServiceError::Database)?;

        tracing::info!(account_id = account.account_id, "Password reset completed");

        if let Err(e) = self.email.send_password_reset_success(&account.email).await {
            tracing::warn!(account_id = account.account_id, error = %e, "Password change email notification failed");
        }
        if let Some(phone) = account.phone.as_deref() {
            if let Err(e) = self.sms.send_password_reset_success(phone).await {
                tracing::warn!(account_id = account.account_id, error = %e, "Password change SMS notification failed");
            }
        }

        Ok(())
    }

    /// Issue an enrollment challenge for the requested two-factor channel.
    #[tracing::instrument(skip(self))]
    pub async fn send_enable_two_factor(
        &self,
        account_id: i64,
        channel: OtpChannel,
    ) -> Result<OtpChallenge, ServiceError> {
        let account = self
            .accounts
            .find_account_by_id(account_id)
            .await
            .map_err(ServiceError::Database)?
            .filter(Account::is_active)
            .ok_or(ServiceError::AccountNotFound)?;

        let destination = destination_for(&account, channel)?;

        self.otp
            .create_and_send(
                Some(account.account_id),
                &destination,
                channel,
                OtpPurpose::Enable2fa,
            )
            .await
    }

    /// Confirm enrollment: flips `two_factor_enabled` and records the channel
    /// the challenge was actually delivered over, replacing any previous
    /// method. Existing sessions stay valid; enrollment hardens future
    /// logins, it does not end current ones.
    #[tracing::instrument(skip(self, code))]
    pub async fn confirm_enable_two_factor(
        &self,
        account_id: i64,
        challenge_id: Uuid,
        code: &str,
    ) -> Result<OtpChannel, ServiceError> {
        let challenge = self.otp.verify_and_consume(challenge_id, code).await?;

        if challenge.purpose() != Some(OtpPurpose::Enable2fa) {
            return Err(ServiceError::PurposeMismatch);
        }

        if challenge.account_id != Some(account_id) {
            return Err(ServiceError::NotChallengeOwner);
        }

        let channel = challenge.channel().ok_or_else(|| {
            ServiceError::Internal(anyhow::anyhow!(
                "Challenge {} carries an unknown channel code",
                challenge_id
            ))
        })?;

        self.accounts
            .set_two_factor(account_id, true, Some(channel))
            .await
            .map_err(ServiceError::Database)?;

        tracing::info!(account_id, channel = channel.as_str(), "Two-factor enabled");

        Ok(channel)
    }

    async fn issue_session(&self, account: &Account) -> Result<TokenResponse, ServiceError> {
        let tokens = self
            .jwt
            .sign_session(account)
            .map_err(ServiceError::Internal)?;

        self.accounts
            .record_last_login(account.account_id)
            .await
            .map_err(ServiceError::Database)?;

        tracing::info!(account_id = account.account_id, "Session issued");

        Ok(tokens)
    }
}

/// Resolve the destination set for a channel from the account's contact
/// fields. A channel whose destination is missing on the account is a caller
/// error, not a delivery problem.
fn destination_for(account: &Account, channel: OtpChannel) -> Result<Destination, ServiceError> {
    match channel {
        OtpChannel::Email => Ok(Destination::Email(account.email.clone())),
        OtpChannel::Sms => account
            .phone
            .clone()
            .map(Destination::Phone)
            .ok_or(ServiceError::MissingDestination),
        OtpChannel::All => {
            let phone = account
                .phone
                .clone()
                .ok_or(ServiceError::MissingDestination)?;
            Ok(Destination::Both {
                email: account.email.clone(),
                phone,
            })
        }
    }
}
