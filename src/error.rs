use crate::protocol::error_shapes::openai_error_payload;

/// Error type shared by the request pipeline.
#[derive(Debug, thiserror::Error)]
pub enum BridgeError {
    #[error("Config error: {0}")]
    Config(String),
    #[error("Malformed input: {0}")]
    MalformedInput(String),
    #[error("Upstream unreachable: {0}")]
    UpstreamUnreachable(String),
    #[error("Upstream error: status={status}, message={message}")]
    Upstream { status: u16, message: String },
    #[error("Upstream protocol error: {0}")]
    UpstreamProtocol(String),
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Broad error category for status code selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    InvalidRequest,
    Authentication,
    Permission,
    RateLimit,
    BadGateway,
    ServerError,
    Unknown,
}

/// Map an upstream HTTP status code to an error category.
#[must_use]
pub fn category_from_upstream_status(status: u16) -> ErrorCategory {
    match status {
        400 => ErrorCategory::InvalidRequest,
        401 => ErrorCategory::Authentication,
        403 => ErrorCategory::Permission,
        429 => ErrorCategory::RateLimit,
        500..=599 => ErrorCategory::ServerError,
        _ => ErrorCategory::Unknown,
    }
}

impl BridgeError {
    #[must_use]
    pub fn category(&self) -> ErrorCategory {
        match self {
            BridgeError::MalformedInput(_) => ErrorCategory::InvalidRequest,
            BridgeError::UpstreamUnreachable(_) | BridgeError::UpstreamProtocol(_) => {
                ErrorCategory::BadGateway
            }
            BridgeError::Config(_) | BridgeError::Internal(_) => ErrorCategory::ServerError,
            BridgeError::Upstream { status, .. } => category_from_upstream_status(*status),
        }
    }

    /// Short machine-readable code used in `response.failed` payloads.
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            BridgeError::Config(_) => "config_error",
            BridgeError::MalformedInput(_) => "invalid_request",
            BridgeError::UpstreamUnreachable(_) => "upstream_unreachable",
            BridgeError::Upstream { .. } => "upstream_error",
            BridgeError::UpstreamProtocol(_) => "upstream_protocol_error",
            BridgeError::Internal(_) => "server_error",
        }
    }
}

// ---------------------------------------------------------------------------
// Category -> HTTP status code
// ---------------------------------------------------------------------------

fn http_status_for_category(cat: ErrorCategory) -> http::StatusCode {
    match cat {
        ErrorCategory::InvalidRequest => http::StatusCode::BAD_REQUEST,
        ErrorCategory::Authentication => http::StatusCode::UNAUTHORIZED,
        ErrorCategory::Permission => http::StatusCode::FORBIDDEN,
        ErrorCategory::RateLimit => http::StatusCode::TOO_MANY_REQUESTS,
        ErrorCategory::BadGateway => http::StatusCode::BAD_GATEWAY,
        ErrorCategory::ServerError | ErrorCategory::Unknown => {
            http::StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

/// Format an error, returning (`status_code`, JSON body).
#[must_use]
pub fn format_error(err: &BridgeError) -> (http::StatusCode, serde_json::Value) {
    let cat = err.category();
    let status = http_status_for_category(cat);
    let body = openai_error_payload(cat, &err.to_string());
    (status, body)
}

// ---------------------------------------------------------------------------
// Axum integration
// ---------------------------------------------------------------------------

/// Convert a `BridgeError` into an axum response.
#[must_use]
pub fn into_axum_response(err: &BridgeError) -> axum::response::Response {
    use axum::response::IntoResponse;
    let (status, body) = format_error(err);
    (status, axum::Json(body)).into_response()
}

impl axum::response::IntoResponse for BridgeError {
    fn into_response(self) -> axum::response::Response {
        into_axum_response(&self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn malformed_input_maps_to_400() {
        let (status, body) = format_error(&BridgeError::MalformedInput("bad".into()));
        assert_eq!(status, http::StatusCode::BAD_REQUEST);
        assert_eq!(body["error"]["type"], "invalid_request_error");
    }

    #[test]
    fn unreachable_maps_to_502() {
        let (status, _) = format_error(&BridgeError::UpstreamUnreachable("refused".into()));
        assert_eq!(status, http::StatusCode::BAD_GATEWAY);
    }

    #[test]
    fn upstream_status_keeps_category() {
        let err = BridgeError::Upstream {
            status: 429,
            message: "slow down".into(),
        };
        assert_eq!(err.category(), ErrorCategory::RateLimit);
        let (status, body) = format_error(&err);
        assert_eq!(status, http::StatusCode::TOO_MANY_REQUESTS);
        assert!(body["error"]["message"]
            .as_str()
            .is_some_and(|m| m.contains("slow down")));
    }

    #[test]
    fn internal_maps_to_500() {
        let (status, _) = format_error(&BridgeError::Internal("boom".into()));
        assert_eq!(status, http::StatusCode::INTERNAL_SERVER_ERROR);
    }
}
