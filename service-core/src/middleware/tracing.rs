use axum::http::HeaderValue;
use axum::{extract::Request, middleware::Next, response::Response};
use tracing::Instrument;
use uuid::Uuid;

pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Tag each request with an id and run the rest of the stack inside a
/// tracing span carrying it, so every log line written while the request
/// is being handled can be correlated. The id is taken from the caller
/// when it sent one, minted here otherwise, and echoed on the response.
pub async fn request_id_middleware(mut req: Request, next: Next) -> Response {
    let request_id = req
        .headers()
        .get(REQUEST_ID_HEADER)
        .and_then(|h| h.to_str().ok())
        .filter(|id| !id.is_empty())
        .map(str::to_owned)
        .unwrap_or_else(|| Uuid::new_v4().to_string());

    let span = tracing::info_span!("request", request_id = %request_id);

    match HeaderValue::from_str(&request_id) {
        Ok(header_value) => {
            req.headers_mut()
                .insert(REQUEST_ID_HEADER, header_value.clone());

            let mut response = next.run(req).instrument(span).await;
            response.headers_mut().insert(REQUEST_ID_HEADER, header_value);
            response
        }
        // A caller-supplied id that is not a valid header value still gets
        // a span, but is not echoed back.
        Err(_) => next.run(req).instrument(span).await,
    }
}
