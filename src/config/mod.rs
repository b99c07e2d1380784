use secrecy::SecretString;
use std::env;

use crate::error::AppError;

/// Process-wide configuration, built once in `main` and injected into each
/// component. No component performs ambient environment lookups.
#[derive(Debug, Clone)]
pub struct AuthConfig {
    pub environment: Environment,
    pub service_name: String,
    pub service_version: String,
    pub log_level: String,
    pub http: HttpConfig,
    pub database: DatabaseConfig,
    pub redis: RedisConfig,
    pub jwt: JwtConfig,
    pub otp: OtpConfig,
    pub password: PasswordConfig,
    pub smtp: SmtpConfig,
    pub sms: SmsConfig,
    pub security: SecurityConfig,
    pub rate_limit: RateLimitConfig,
    pub swagger_enabled: bool,
    pub sweep_interval_seconds: u64,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Environment {
    Dev,
    Prod,
}

#[derive(Debug, Clone)]
pub struct HttpConfig {
    pub port: u16,
}

#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub min_connections: u32,
}

#[derive(Debug, Clone)]
pub struct RedisConfig {
    pub url: String,
}

#[derive(Debug, Clone)]
pub struct JwtConfig {
    pub access_secret: SecretString,
    /// Falls back to `access_secret` when JWT_REFRESH_SECRET is unset.
    pub refresh_secret: SecretString,
    pub access_token_expiry_minutes: i64,
    pub refresh_token_expiry_days: i64,
}

#[derive(Debug, Clone)]
pub struct OtpConfig {
    pub code_length: usize,
    pub ttl_seconds: i64,
    pub max_attempts: i32,
}

/// Argon2id work factor. The values end up encoded in each hash, so they can
/// be raised without invalidating stored credentials.
#[derive(Debug, Clone)]
pub struct PasswordConfig {
    pub memory_kib: u32,
    pub iterations: u32,
    pub parallelism: u32,
}

#[derive(Debug, Clone)]
pub struct SmtpConfig {
    pub host: String,
    pub user: String,
    pub password: SecretString,
}

#[derive(Debug, Clone)]
pub struct SmsConfig {
    pub gateway_url: String,
    pub api_token: SecretString,
    pub from_number: String,
}

#[derive(Debug, Clone)]
pub struct SecurityConfig {
    pub allowed_origins: Vec<String>,
    /// Base URL used to build password reset links sent by email.
    pub public_base_url: String,
}

#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    pub login_attempts: u32,
    pub login_window_seconds: u64,
    pub otp_resend_attempts: u32,
    pub otp_resend_window_seconds: u64,
    pub password_reset_attempts: u32,
    pub password_reset_window_seconds: u64,
    pub global_ip_limit: u32,
    pub global_ip_window_seconds: u64,
}

impl AuthConfig {
    pub fn from_env() -> Result<Self, AppError> {
        let env_str = env::var("ENVIRONMENT").unwrap_or_else(|_| "dev".to_string());
        let environment: Environment = env_str
            .parse()
            .map_err(|e: String| AppError::ConfigError(anyhow::anyhow!(e)))?;
        let is_prod = environment == Environment::Prod;

        let access_secret = get_env("JWT_ACCESS_SECRET", Some("dev-access-secret"), is_prod)?;
        let refresh_secret = match env::var("JWT_REFRESH_SECRET") {
            Ok(val) => val,
            Err(_) => access_secret.clone(),
        };

        let config = AuthConfig {
            environment,
            service_name: get_env("SERVICE_NAME", Some("staffhub-auth"), is_prod)?,
            service_version: get_env("SERVICE_VERSION", Some(env!("CARGO_PKG_VERSION")), is_prod)?,
            log_level: get_env("LOG_LEVEL", Some("info"), is_prod)?,
            http: HttpConfig {
                port: parse_env("PORT", Some("8080"), is_prod)?,
            },
            database: DatabaseConfig {
                url: get_env("DATABASE_URL", None, is_prod)?,
                max_connections: parse_env("DATABASE_MAX_CONNECTIONS", Some("10"), is_prod)?,
                min_connections: parse_env("DATABASE_MIN_CONNECTIONS", Some("1"), is_prod)?,
            },
            redis: RedisConfig {
                url: get_env("REDIS_URL", None, is_prod)?,
            },
            jwt: JwtConfig {
                access_secret: SecretString::new(access_secret),
                refresh_secret: SecretString::new(refresh_secret),
                access_token_expiry_minutes: parse_env(
                    "JWT_ACCESS_TOKEN_EXPIRY_MINUTES",
                    Some("15"),
                    is_prod,
                )?,
                refresh_token_expiry_days: parse_env(
                    "JWT_REFRESH_TOKEN_EXPIRY_DAYS",
                    Some("7"),
                    is_prod,
                )?,
            },
            otp: OtpConfig {
                code_length: parse_env("OTP_CODE_LENGTH", Some("6"), is_prod)?,
                ttl_seconds: parse_env("OTP_TTL_SECONDS", Some("300"), is_prod)?,
                max_attempts: parse_env("OTP_MAX_ATTEMPTS", Some("5"), is_prod)?,
            },
            password: PasswordConfig {
                memory_kib: parse_env("PASSWORD_HASH_MEMORY_KIB", Some("19456"), is_prod)?,
                iterations: parse_env("PASSWORD_HASH_ITERATIONS", Some("2"), is_prod)?,
                parallelism: parse_env("PASSWORD_HASH_PARALLELISM", Some("1"), is_prod)?,
            },
            smtp: SmtpConfig {
                host: get_env("SMTP_HOST", Some("smtp.gmail.com"), is_prod)?,
                user: get_env("SMTP_USER", None, is_prod)?,
                password: SecretString::new(get_env("SMTP_PASSWORD", None, is_prod)?),
            },
            sms: SmsConfig {
                gateway_url: get_env("SMS_GATEWAY_URL", None, is_prod)?,
                api_token: SecretString::new(get_env("SMS_API_TOKEN", None, is_prod)?),
                from_number: get_env("SMS_FROM_NUMBER", None, is_prod)?,
            },
            security: SecurityConfig {
                allowed_origins: get_env(
                    "ALLOWED_ORIGINS",
                    Some("http://localhost:3000"),
                    is_prod,
                )?
                .split(',')
                .map(|s| s.trim().to_string())
                .collect(),
                public_base_url: get_env(
                    "PUBLIC_BASE_URL",
                    Some("http://localhost:8080"),
                    is_prod,
                )?,
            },
            rate_limit: RateLimitConfig {
                login_attempts: parse_env("RATE_LIMIT_LOGIN_ATTEMPTS", Some("5"), is_prod)?,
                login_window_seconds: parse_env(
                    "RATE_LIMIT_LOGIN_WINDOW_SECONDS",
                    Some("900"),
                    is_prod,
                )?,
                otp_resend_attempts: parse_env("RATE_LIMIT_OTP_RESEND_ATTEMPTS", Some("3"), is_prod)?,
                otp_resend_window_seconds: parse_env(
                    "RATE_LIMIT_OTP_RESEND_WINDOW_SECONDS",
                    Some("900"),
                    is_prod,
                )?,
                password_reset_attempts: parse_env(
                    "RATE_LIMIT_PASSWORD_RESET_ATTEMPTS",
                    Some("3"),
                    is_prod,
                )?,
                password_reset_window_seconds: parse_env(
                    "RATE_LIMIT_PASSWORD_RESET_WINDOW_SECONDS",
                    Some("3600"),
                    is_prod,
                )?,
                global_ip_limit: parse_env("RATE_LIMIT_GLOBAL_IP_LIMIT", Some("100"), is_prod)?,
                global_ip_window_seconds: parse_env(
                    "RATE_LIMIT_GLOBAL_IP_WINDOW_SECONDS",
                    Some("60"),
                    is_prod,
                )?,
            },
            swagger_enabled: parse_env("SWAGGER_ENABLED", Some("true"), is_prod)?,
            sweep_interval_seconds: parse_env("SWEEP_INTERVAL_SECONDS", Some("300"), is_prod)?,
        };

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), AppError> {
        if self.http.port == 0 {
            return Err(AppError::ConfigError(anyhow::anyhow!(
                "PORT must be greater than 0"
            )));
        }

        if self.jwt.access_token_expiry_minutes <= 0 {
            return Err(AppError::ConfigError(anyhow::anyhow!(
                "JWT_ACCESS_TOKEN_EXPIRY_MINUTES must be positive"
            )));
        }

        if self.jwt.refresh_token_expiry_days <= 0 {
            return Err(AppError::ConfigError(anyhow::anyhow!(
                "JWT_REFRESH_TOKEN_EXPIRY_DAYS must be positive"
            )));
        }

        if !(4..=10).contains(&self.otp.code_length) {
            return Err(AppError::ConfigError(anyhow::anyhow!(
                "OTP_CODE_LENGTH must be between 4 and 10"
            )));
        }

        if self.otp.ttl_seconds <= 0 {
            return Err(AppError::ConfigError(anyhow::anyhow!(
                "OTP_TTL_SECONDS must be positive"
            )));
        }

        if self.otp.max_attempts < 1 {
            return Err(AppError::ConfigError(anyhow::anyhow!(
                "OTP_MAX_ATTEMPTS must be at least 1"
            )));
        }

        if self.environment == Environment::Prod
            && self.security.allowed_origins.iter().any(|o| o == "*")
        {
            return Err(AppError::ConfigError(anyhow::anyhow!(
                "Wildcard CORS origin not allowed in production"
            )));
        }

        Ok(())
    }
}

fn get_env(key: &str, default: Option<&str>, is_prod: bool) -> Result<String, AppError> {
    match env::var(key) {
        Ok(val) => Ok(val),
        Err(_) => {
            if is_prod {
                Err(AppError::ConfigError(anyhow::anyhow!(
                    "{} is required in production but not set",
                    key
                )))
            } else if let Some(def) = default {
                Ok(def.to_string())
            } else {
                Err(AppError::ConfigError(anyhow::anyhow!(
                    "{} is required but not set",
                    key
                )))
            }
        }
    }
}

fn parse_env<T>(key: &str, default: Option<&str>, is_prod: bool) -> Result<T, AppError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    get_env(key, default, is_prod)?.parse().map_err(|e| {
        AppError::ConfigError(anyhow::anyhow!("{} has an invalid value: {}", key, e))
    })
}

impl std::str::FromStr for Environment {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "dev" => Ok(Environment::Dev),
            "prod" => Ok(Environment::Prod),
            _ => Err(format!("Invalid environment: {}", s)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config() -> AuthConfig {
        AuthConfig {
            environment: Environment::Dev,
            service_name: "staffhub-auth".to_string(),
            service_version: "0.0.0".to_string(),
            log_level: "info".to_string(),
            http: HttpConfig { port: 8080 },
            database: DatabaseConfig {
                url: "postgres://localhost/staffhub".to_string(),
                max_connections: 5,
                min_connections: 1,
            },
            redis: RedisConfig {
                url: "redis://localhost".to_string(),
            },
            jwt: JwtConfig {
                access_secret: SecretString::new("a".to_string()),
                refresh_secret: SecretString::new("r".to_string()),
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
                password: SecretString::new("pw".to_string()),
            },
            sms: SmsConfig {
                gateway_url: "https://sms.example.com/send".to_string(),
                api_token: SecretString::new("token".to_string()),
                from_number: "+15550000000".to_string(),
            },
            security: SecurityConfig {
                allowed_origins: vec!["http://localhost:3000".to_string()],
                public_base_url: "http://localhost:8080".to_string(),
            },
            rate_limit: RateLimitConfig {
                login_attempts: 5,
                login_window_seconds: 900,
                otp_resend_attempts: 3,
                otp_resend_window_seconds: 900,
                password_reset_attempts: 3,
                password_reset_window_seconds: 3600,
                global_ip_limit: 100,
                global_ip_window_seconds: 60,
            },
            swagger_enabled: true,
            sweep_interval_seconds: 300,
        }
    }

    #[test]
    fn valid_config_passes_validation() {
        assert!(test_config().validate().is_ok());
    }

    #[test]
    fn zero_port_is_rejected() {
        let mut config = test_config();
        config.http.port = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn otp_length_bounds_are_enforced() {
        let mut config = test_config();
        config.otp.code_length = 3;
        assert!(config.validate().is_err());
        config.otp.code_length = 11;
        assert!(config.validate().is_err());
    }

    #[test]
    fn wildcard_origin_rejected_in_prod() {
        let mut config = test_config();
        config.environment = Environment::Prod;
        config.security.allowed_origins = vec!["*".to_string()];
        assert!(config.validate().is_err());
    }
}
