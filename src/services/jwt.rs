use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use secrecy::ExposeSecret;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::config::JwtConfig;
use crate::models::Account;

/// Token issuer. Signs access and refresh tokens with HS256 under distinct
/// server-held secrets; symmetric signing keeps a single-issuer deployment
/// free of key-confusion pitfalls.
#[derive(Clone)]
pub struct JwtService {
    access_encoding: EncodingKey,
    access_decoding: DecodingKey,
    refresh_encoding: EncodingKey,
    refresh_decoding: DecodingKey,
    access_token_expiry_minutes: i64,
    refresh_token_expiry_days: i64,
}

/// Claims carried by a short-lived access token.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessTokenClaims {
    /// Account id.
    pub sub: i64,
    pub email: String,
    pub role: String,
    /// Must match the account's current token version to be accepted.
    pub token_version: i32,
    /// Unique per token; the unit of fine-grained revocation.
    pub jti: String,
    pub exp: i64,
    pub iat: i64,
}

/// Claims carried by a long-lived refresh token.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefreshTokenClaims {
    pub sub: i64,
    pub token_version: i32,
    pub jti: String,
    pub exp: i64,
    pub iat: i64,
}

/// Token pair returned to the client after successful authentication.
#[derive(Debug, Serialize, ToSchema)]
pub struct TokenResponse {
    pub access_token: String,
    pub refresh_token: String,
    pub token_type: String,
    pub expires_in: i64,
}

fn hs256_validation() -> Validation {
    // Pinning the algorithm list rejects tokens that claim anything else in
    // their header.
    Validation::new(Algorithm::HS256)
}

impl JwtService {
    pub fn new(config: &JwtConfig) -> Self {
        let access_secret = config.access_secret.expose_secret().as_bytes();
        let refresh_secret = config.refresh_secret.expose_secret().as_bytes();

        Self {
            access_encoding: EncodingKey::from_secret(access_secret),
            access_decoding: DecodingKey::from_secret(access_secret),
            refresh_encoding: EncodingKey::from_secret(refresh_secret),
            refresh_decoding: DecodingKey::from_secret(refresh_secret),
            access_token_expiry_minutes: config.access_token_expiry_minutes,
            refresh_token_expiry_days: config.refresh_token_expiry_days,
        }
    }

    /// Generate an access token for an account.
    pub fn generate_access_token(&self, account: &Account) -> Result<String, anyhow::Error> {
        let now = Utc::now();
        let exp = now + Duration::minutes(self.access_token_expiry_minutes);

        let claims = AccessTokenClaims {
            sub: account.account_id,
            email: account.email.clone(),
            role: account.role_code.clone(),
            token_version: account.token_version,
            jti: Uuid::new_v4().to_string(),
            exp: exp.timestamp(),
            iat: now.timestamp(),
        };

        encode(&Header::new(Algorithm::HS256), &claims, &self.access_encoding)
            .map_err(|e| anyhow::anyhow!("Failed to encode access token: {}", e))
    }

    /// Generate a refresh token for an account.
    pub fn generate_refresh_token(&self, account: &Account) -> Result<String, anyhow::Error> {
        let now = Utc::now();
        let exp = now + Duration::days(self.refresh_token_expiry_days);

        let claims = RefreshTokenClaims {
            sub: account.account_id,
            token_version: account.token_version,
            jti: Uuid::new_v4().to_string(),
            exp: exp.timestamp(),
            iat: now.timestamp(),
        };

        encode(&Header::new(Algorithm::HS256), &claims, &self.refresh_encoding)
            .map_err(|e| anyhow::anyhow!("Failed to encode refresh token: {}", e))
    }

    /// Sign a full session: one access token and one refresh token, each with
    /// its own jti.
    pub fn sign_session(&self, account: &Account) -> Result<TokenResponse, anyhow::Error> {
        let access_token = self.generate_access_token(account)?;
        let refresh_token = self.generate_refresh_token(account)?;

        Ok(TokenResponse {
            access_token,
            refresh_token,
            token_type: "Bearer".to_string(),
            expires_in: self.access_token_expiry_seconds(),
        })
    }

    /// Check signature and expiry of an access token and return its claims.
    pub fn decode_access_token(&self, token: &str) -> Result<AccessTokenClaims, anyhow::Error> {
        let token_data = decode::<AccessTokenClaims>(token, &self.access_decoding, &hs256_validation())
            .map_err(|e| anyhow::anyhow!("Invalid access token: {}", e))?;

        Ok(token_data.claims)
    }

    /// Check signature and expiry of a refresh token and return its claims.
    pub fn decode_refresh_token(&self, token: &str) -> Result<RefreshTokenClaims, anyhow::Error> {
        let token_data =
            decode::<RefreshTokenClaims>(token, &self.refresh_decoding, &hs256_validation())
                .map_err(|e| anyhow::anyhow!("Invalid refresh token: {}", e))?;

        Ok(token_data.claims)
    }

    pub fn access_token_expiry_seconds(&self) -> i64 {
        self.access_token_expiry_minutes * 60
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use secrecy::SecretString;

    fn test_account() -> Account {
        Account {
            account_id: 42,
            email: "pat@example.com".to_string(),
            phone: None,
            role_code: "employee".to_string(),
            password_hash_text: String::new(),
            active_flag: true,
            two_factor_enabled_flag: false,
            two_factor_method_code: None,
            token_version: 3,
            last_login_utc: None,
            created_utc: Utc::now(),
        }
    }

    fn test_service(access_minutes: i64) -> JwtService {
        JwtService::new(&JwtConfig {
            access_secret: SecretString::new("access-secret-for-tests".to_string()),
            refresh_secret: SecretString::new("refresh-secret-for-tests".to_string()),
            access_token_expiry_minutes: access_minutes,
            refresh_token_expiry_days: 7,
        })
    }

    #[test]
    fn access_token_round_trip() {
        let service = test_service(15);
        let token = service.generate_access_token(&test_account()).unwrap();

        let claims = service.decode_access_token(&token).unwrap();
        assert_eq!(claims.sub, 42);
        assert_eq!(claims.email, "pat@example.com");
        assert_eq!(claims.role, "employee");
        assert_eq!(claims.token_version, 3);
        assert!(!claims.jti.is_empty());
    }

    #[test]
    fn refresh_token_round_trip() {
        let service = test_service(15);
        let token = service.generate_refresh_token(&test_account()).unwrap();

        let claims = service.decode_refresh_token(&token).unwrap();
        assert_eq!(claims.sub, 42);
        assert_eq!(claims.token_version, 3);
    }

    #[test]
    fn session_tokens_carry_distinct_jtis() {
        let service = test_service(15);
        let pair = service.sign_session(&test_account()).unwrap();

        let access = service.decode_access_token(&pair.access_token).unwrap();
        let refresh = service.decode_refresh_token(&pair.refresh_token).unwrap();
        assert_ne!(access.jti, refresh.jti);
        assert_eq!(pair.token_type, "Bearer");
        assert_eq!(pair.expires_in, 900);
    }

    #[test]
    fn access_and_refresh_secrets_are_not_interchangeable() {
        let service = test_service(15);
        let access = service.generate_access_token(&test_account()).unwrap();
        let refresh = service.generate_refresh_token(&test_account()).unwrap();

        assert!(service.decode_refresh_token(&access).is_err());
        assert!(service.decode_access_token(&refresh).is_err());
    }

    #[test]
    fn expired_access_token_is_rejected() {
        // Negative expiry puts `exp` far enough in the past to defeat the
        // default decoding leeway.
        let service = test_service(-10);
        let token = service.generate_access_token(&test_account()).unwrap();

        assert!(service.decode_access_token(&token).is_err());
    }

    #[test]
    fn token_signed_with_other_secret_is_rejected() {
        let service = test_service(15);
        let other = JwtService::new(&JwtConfig {
            access_secret: SecretString::new("some-other-secret".to_string()),
            refresh_secret: SecretString::new("some-other-secret".to_string()),
            access_token_expiry_minutes: 15,
            refresh_token_expiry_days: 7,
        });

        let token = other.generate_access_token(&test_account()).unwrap();
        assert!(service.decode_access_token(&token).is_err());
    }
}
