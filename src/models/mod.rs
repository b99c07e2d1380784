pub mod account;
pub mod otp_challenge;

pub use account::{Account, Role};
pub use otp_challenge::{Destination, OtpChallenge, OtpChannel, OtpPurpose};
