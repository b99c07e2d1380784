//! Account model - the security-relevant view of an employee record.
//!
//! Business attributes of employees (department, payroll, leave balances)
//! live elsewhere; this subsystem only reads contact fields and mutates the
//! security columns (password hash, two-factor settings, token version).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use super::OtpChannel;

/// Account entity as stored in the credential store.
#[derive(Debug, Clone, FromRow)]
pub struct Account {
    pub account_id: i64,
    pub email: String,
    pub phone: Option<String>,
    pub role_code: String,
    pub password_hash_text: String,
    pub active_flag: bool,
    pub two_factor_enabled_flag: bool,
    pub two_factor_method_code: Option<String>,
    /// Bumped on logout; every token embeds the version it was signed under.
    pub token_version: i32,
    pub last_login_utc: Option<DateTime<Utc>>,
    pub created_utc: DateTime<Utc>,
}

impl Account {
    pub fn is_active(&self) -> bool {
        self.active_flag
    }

    /// The configured second-factor channel, if any.
    pub fn two_factor_method(&self) -> Option<OtpChannel> {
        self.two_factor_method_code
            .as_deref()
            .and_then(OtpChannel::parse)
    }
}

/// Role codes used by the wider HR platform.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Admin,
    HrManager,
    Employee,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::HrManager => "hr_manager",
            Role::Employee => "employee",
        }
    }
}
