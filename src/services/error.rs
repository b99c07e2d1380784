use thiserror::Error;

use crate::error::AppError;

/// Failures surfaced by the service layer. The mapping into `AppError`
/// decides how much a caller gets to learn: credential and token failures
/// collapse into the opaque 401, challenge-state failures are descriptive
/// 400s, and storage faults become generic 500s.
#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("Storage error: {0}")]
    Database(anyhow::Error),

    #[error("Internal error: {0}")]
    Internal(anyhow::Error),

    #[error("Invalid credentials")]
    InvalidCredentials,

    #[error("Invalid token")]
    InvalidToken,

    #[error("Challenge not found")]
    ChallengeNotFound,

    #[error("Challenge has already been used")]
    ChallengeAlreadyUsed,

    #[error("Challenge has expired")]
    ChallengeExpired,

    #[error("Maximum verification attempts exceeded")]
    AttemptsExceeded,

    #[error("Incorrect code")]
    InvalidCode,

    #[error("Challenge was issued for a different purpose")]
    PurposeMismatch,

    #[error("Challenge does not belong to this account")]
    NotChallengeOwner,

    #[error("Account has no destination for the requested channel")]
    MissingDestination,

    #[error("Account not found")]
    AccountNotFound,
}

impl From<ServiceError> for AppError {
    fn from(err: ServiceError) -> Self {
        let message = err.to_string();
        match err {
            ServiceError::Database(e) => AppError::DatabaseError(e),
            ServiceError::Internal(e) => AppError::InternalError(e),
            ServiceError::InvalidCredentials | ServiceError::InvalidToken => {
                AppError::Unauthenticated(anyhow::anyhow!(message))
            }
            ServiceError::ChallengeNotFound => AppError::NotFound(anyhow::anyhow!(message)),
            ServiceError::ChallengeAlreadyUsed
            | ServiceError::ChallengeExpired
            | ServiceError::AttemptsExceeded
            | ServiceError::InvalidCode
            | ServiceError::PurposeMismatch
            | ServiceError::NotChallengeOwner
            | ServiceError::MissingDestination
            | ServiceError::AccountNotFound => AppError::BadRequest(anyhow::anyhow!(message)),
        }
    }
}
