use axum::body::Body;
use axum::response::Response;

const ALLOW_METHODS: &str = "GET, POST, OPTIONS";
const ALLOW_HEADERS: &str = "Content-Type, Authorization, x-api-key";
const MAX_AGE_SECS: &str = "86400";

/// Permissive CORS headers, applied to every response.
pub fn apply_cors_headers(headers: &mut http::HeaderMap) {
    headers.insert(
        http::header::ACCESS_CONTROL_ALLOW_ORIGIN,
        http::HeaderValue::from_static("*"),
    );
    headers.insert(
        http::header::ACCESS_CONTROL_ALLOW_METHODS,
        http::HeaderValue::from_static(ALLOW_METHODS),
    );
    headers.insert(
        http::header::ACCESS_CONTROL_ALLOW_HEADERS,
        http::HeaderValue::from_static(ALLOW_HEADERS),
    );
}

/// Answer to an `OPTIONS` preflight on any path.
#[must_use]
pub fn preflight_response() -> Response {
    let mut response = Response::new(Body::empty());
    *response.status_mut() = http::StatusCode::NO_CONTENT;
    let headers = response.headers_mut();
    apply_cors_headers(headers);
    headers.insert(
        http::header::ACCESS_CONTROL_MAX_AGE,
        http::HeaderValue::from_static(MAX_AGE_SECS),
    );
    response
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn preflight_allows_any_origin() {
        let response = preflight_response();
        assert_eq!(response.status(), http::StatusCode::NO_CONTENT);
        let headers = response.headers();
        assert_eq!(headers[http::header::ACCESS_CONTROL_ALLOW_ORIGIN], "*");
        assert!(headers[http::header::ACCESS_CONTROL_ALLOW_METHODS]
            .to_str()
            .unwrap()
            .contains("POST"));
        assert_eq!(headers[http::header::ACCESS_CONTROL_MAX_AGE], "86400");
    }
}
