pub mod token;

pub use token::{AccessTokenResponse, RefreshTokenGrantParams, TokenGrantQuery};

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Generic error body for non-OAuth failures (conflict, internal).
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ErrorResponse {
    pub error: String,
}

/// OAuth-style error body for the token endpoint's 400 responses.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct OAuthErrorResponse {
    #[schema(example = "invalid_grant")]
    pub error: String,
    #[schema(example = "Invalid Refresh Token: Already Used")]
    pub error_description: String,
}
