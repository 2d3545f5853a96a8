use std::time::Duration;

use bytes::Bytes;

use crate::config::UpstreamConfig;
use crate::error::BridgeError;
use crate::util::log_preview;

use super::prepared_upstream::PreparedUpstream;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
const ERROR_MESSAGE_MAX_CHARS: usize = 500;

fn build_reqwest_client(timeout: Duration) -> Result<reqwest::Client, BridgeError> {
    reqwest::Client::builder()
        .tcp_nodelay(true)
        .connect_timeout(CONNECT_TIMEOUT)
        .redirect(reqwest::redirect::Policy::none())
        .timeout(timeout)
        .build()
        .map_err(|err| BridgeError::Config(format!("Failed to build HTTP client: {err}")))
}

/// HTTP client for the chat upstream.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
    upstream: PreparedUpstream,
}

impl HttpTransport {
    /// # Errors
    ///
    /// Returns [`BridgeError::Config`] when the upstream URL or key is invalid
    /// or the client cannot be built.
    pub fn new(config: &UpstreamConfig) -> Result<Self, BridgeError> {
        Ok(Self {
            client: build_reqwest_client(Duration::from_secs(config.timeout_secs))?,
            upstream: PreparedUpstream::new(config)?,
        })
    }

    /// POST a chat completion request. The returned response has a 2xx
    /// status; its body is left unread so callers can stream it.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::UpstreamUnreachable`] when the request cannot be
    /// delivered, or [`BridgeError::Upstream`] for a non-success status.
    pub async fn send_chat(
        &self,
        inbound: &http::HeaderMap,
        body: Bytes,
    ) -> Result<reqwest::Response, BridgeError> {
        let response = self
            .client
            .post(self.upstream.chat_url().clone())
            .headers(self.upstream.request_headers(inbound, true))
            .body(body)
            .send()
            .await
            .map_err(|err| BridgeError::UpstreamUnreachable(err.to_string()))?;
        ensure_success(response).await
    }

    /// GET the upstream model list.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::UpstreamUnreachable`] when the request or body
    /// read fails, or [`BridgeError::Upstream`] for a non-success status.
    pub async fn fetch_models(&self, inbound: &http::HeaderMap) -> Result<Bytes, BridgeError> {
        let response = self
            .client
            .get(self.upstream.models_url().clone())
            .headers(self.upstream.request_headers(inbound, false))
            .send()
            .await
            .map_err(|err| BridgeError::UpstreamUnreachable(err.to_string()))?;
        ensure_success(response)
            .await?
            .bytes()
            .await
            .map_err(|err| BridgeError::UpstreamUnreachable(err.to_string()))
    }
}

async fn ensure_success(response: reqwest::Response) -> Result<reqwest::Response, BridgeError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.bytes().await.unwrap_or_default();
    let message = upstream_error_message(&body);
    tracing::warn!(status = status.as_u16(), "upstream rejected request: {message}");
    Err(BridgeError::Upstream {
        status: status.as_u16(),
        message,
    })
}

/// Best-effort human-readable message from an upstream error body.
pub(crate) fn upstream_error_message(body: &[u8]) -> String {
    if let Ok(value) = serde_json::from_slice::<serde_json::Value>(body) {
        let message = value
            .pointer("/error/message")
            .or_else(|| value.get("message"))
            .or_else(|| value.get("error"))
            .and_then(serde_json::Value::as_str);
        if let Some(message) = message {
            return log_preview(message, ERROR_MESSAGE_MAX_CHARS).to_string();
        }
    }
    let text = String::from_utf8_lossy(body);
    let text = text.trim();
    if text.is_empty() {
        "upstream returned an empty error body".to_string()
    } else {
        log_preview(text, ERROR_MESSAGE_MAX_CHARS).to_string()
    }
}
