use axum::{http::header, response::IntoResponse, Json};
use utoipa::OpenApi;

use crate::ApiDoc;

/// Serve the generated OpenAPI document.
pub async fn openapi() -> impl IntoResponse {
    (
        [
            (header::CONTENT_TYPE, "application/json"),
            (header::CACHE_CONTROL, "public, max-age=3600"),
        ],
        Json(ApiDoc::openapi()),
    )
}
