use axum::body::Body;
use axum::response::Response;

#[inline]
pub(crate) fn ok_json_response(body_bytes: bytes::Bytes) -> Response {
    let mut response = Response::new(Body::from(body_bytes));
    *response.status_mut() = http::StatusCode::OK;
    response.headers_mut().insert(
        http::header::CONTENT_TYPE,
        http::HeaderValue::from_static("application/json"),
    );
    response
}

/// Serialize `value` as a 200 JSON response, or a 500 when serialization fails.
pub(crate) fn json_response<T: serde::Serialize>(value: &T) -> Response {
    match serde_json::to_vec(value) {
        Ok(bytes) => ok_json_response(bytes::Bytes::from(bytes)),
        Err(err) => crate::error::into_axum_response(&crate::error::BridgeError::Internal(
            format!("failed to encode response: {err}"),
        )),
    }
}

#[inline]
pub(crate) fn sse_ok_response(body: Body) -> Response {
    let mut response = Response::new(body);
    *response.status_mut() = http::StatusCode::OK;
    let headers = response.headers_mut();
    headers.insert(
        http::header::CONTENT_TYPE,
        http::HeaderValue::from_static("text/event-stream"),
    );
    headers.insert(
        http::header::CACHE_CONTROL,
        http::HeaderValue::from_static("no-cache"),
    );
    headers.insert(
        http::header::CONNECTION,
        http::HeaderValue::from_static("keep-alive"),
    );
    response
}
