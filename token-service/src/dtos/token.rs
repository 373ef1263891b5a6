use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::models::SanitizedUser;

/// Query string of `POST /token`.
#[derive(Debug, Default, Deserialize)]
pub struct TokenGrantQuery {
    pub grant_type: Option<String>,
}

/// Body of the refresh_token grant.
#[derive(Debug, Deserialize, ToSchema)]
pub struct RefreshTokenGrantParams {
    #[serde(default)]
    #[schema(example = "6f1f3f2e...")]
    pub refresh_token: String,
}

/// Successful token response.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct AccessTokenResponse {
    pub access_token: String,
    #[schema(example = "bearer")]
    pub token_type: String,
    /// Access token lifetime in seconds.
    pub expires_in: i64,
    /// Absolute expiry as a Unix timestamp.
    pub expires_at: i64,
    pub refresh_token: String,
    pub user: SanitizedUser,
}
