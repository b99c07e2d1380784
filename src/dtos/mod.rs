pub mod auth;

use serde::Serialize;
use utoipa::ToSchema;

/// Error envelope shared by rejections raised outside the `AppError` path.
#[derive(Debug, Serialize, ToSchema)]
pub struct ErrorResponse {
    pub error: String,
}
