use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use thiserror::Error;

use crate::dtos::{ErrorResponse, OAuthErrorResponse};
use crate::services::jwt::MintError;
use crate::services::store::StoreError;

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("refresh_token required")]
    MissingRefreshToken,

    #[error("Could not read refresh token grant params: {0}")]
    MalformedGrantParams(String),

    #[error("The refresh_token grant type is the only one supported by this endpoint")]
    UnsupportedGrantType,

    #[error("Invalid Refresh Token: Refresh Token Not Found")]
    RefreshTokenNotFound,

    #[error("Invalid Refresh Token: User Banned")]
    UserBanned,

    #[error("Invalid Refresh Token: Session Expired")]
    SessionExpired,

    #[error("Invalid Refresh Token: Already Used")]
    RefreshTokenAlreadyUsed,

    #[error("Too many concurrent token refresh requests on the same session or refresh token")]
    TooManyRefreshRequests,

    #[error("Database error: {0}")]
    Store(#[from] StoreError),

    #[error("error generating jwt token: {0}")]
    Mint(#[from] MintError),

    #[error("Internal server error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl ServiceError {
    /// OAuth error code for the 400-class failures; `None` for everything
    /// that maps to a non-OAuth status.
    fn oauth_code(&self) -> Option<&'static str> {
        match self {
            ServiceError::MissingRefreshToken | ServiceError::MalformedGrantParams(_) => {
                Some("invalid_request")
            }
            ServiceError::UnsupportedGrantType => Some("unsupported_grant_type"),
            ServiceError::RefreshTokenNotFound
            | ServiceError::UserBanned
            | ServiceError::SessionExpired
            | ServiceError::RefreshTokenAlreadyUsed => Some("invalid_grant"),
            _ => None,
        }
    }
}

impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        if let Some(code) = self.oauth_code() {
            return (
                StatusCode::BAD_REQUEST,
                Json(OAuthErrorResponse {
                    error: code.to_string(),
                    error_description: self.to_string(),
                }),
            )
                .into_response();
        }

        let (status, error_message) = match &self {
            ServiceError::TooManyRefreshRequests => (StatusCode::CONFLICT, self.to_string()),
            ServiceError::Store(_) | ServiceError::Mint(_) | ServiceError::Internal(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Internal server error".to_string(),
            ),
            // OAuth errors are handled above; nothing else reaches here.
            _ => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Internal server error".to_string(),
            ),
        };

        if status == StatusCode::INTERNAL_SERVER_ERROR {
            tracing::error!(error = %self, "Token service error");
        }

        (
            status,
            Json(ErrorResponse {
                error: error_message,
            }),
        )
            .into_response()
    }
}
