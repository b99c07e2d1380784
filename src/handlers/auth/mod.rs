pub mod password;
pub mod session;
pub mod two_factor;

pub use password::{confirm_password_reset, request_password_reset, validate_password_reset_token};
pub use session::{introspect, login, logout, refresh, resend_otp, revoke_current_token, verify_login_otp};
pub use two_factor::{confirm_two_factor, send_two_factor};
