use axum::{
    body::Body,
    extract::{ConnectInfo, Query, Request, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use axum_extra::extract::cookie::CookieJar;
use std::net::SocketAddr;

use crate::{
    dtos::{
        AccessTokenResponse, ErrorResponse, OAuthErrorResponse, RefreshTokenGrantParams,
        TokenGrantQuery,
    },
    services::ServiceError,
    utils::cookies,
    AppState,
};

/// Bodies larger than this are not token grant requests.
const MAX_BODY_BYTES: usize = 64 * 1024;

/// Exchange a refresh token for a new access token
#[utoipa::path(
    post,
    path = "/token",
    request_body = RefreshTokenGrantParams,
    params(
        ("grant_type" = String, Query, description = "Must be refresh_token")
    ),
    responses(
        (status = 200, description = "Token refreshed", body = AccessTokenResponse),
        (status = 400, description = "Invalid request or grant", body = OAuthErrorResponse),
        (status = 409, description = "Retry budget exhausted", body = ErrorResponse),
        (status = 429, description = "Rate limited"),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    ),
    tag = "Token"
)]
pub async fn token_grant(
    State(state): State<AppState>,
    Query(query): Query<TokenGrantQuery>,
    jar: CookieJar,
    request: Request,
) -> Response {
    let (parts, body) = request.into_parts();

    let ip_address = parts
        .extensions
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip().to_string());

    if query.grant_type.as_deref() != Some("refresh_token") {
        return ServiceError::UnsupportedGrantType.into_response();
    }

    let params = match read_grant_params(body).await {
        Ok(params) => params,
        Err(err) => return err.into_response(),
    };

    match state
        .refresh
        .refresh_token_grant(&params.refresh_token, ip_address)
        .await
    {
        Ok(response) => {
            let jar = cookies::set_cookie_tokens(&state.config.cookie, jar, &response);
            (StatusCode::OK, jar, Json(response)).into_response()
        }
        Err(err @ ServiceError::RefreshTokenAlreadyUsed) => {
            // Abuse detection: take the tokens away from the client before
            // the 400 goes out.
            let jar = cookies::clear_cookie_tokens(&state.config.cookie, jar);
            (jar, err.into_response()).into_response()
        }
        Err(err) => err.into_response(),
    }
}

async fn read_grant_params(body: Body) -> Result<RefreshTokenGrantParams, ServiceError> {
    let bytes = axum::body::to_bytes(body, MAX_BODY_BYTES)
        .await
        .map_err(|e| ServiceError::MalformedGrantParams(e.to_string()))?;

    serde_json::from_slice(&bytes).map_err(|e| ServiceError::MalformedGrantParams(e.to_string()))
}
