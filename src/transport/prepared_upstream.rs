use crate::config::UpstreamConfig;
use crate::error::BridgeError;

/// Inbound headers relayed to the upstream as-is.
const FORWARDED_CREDENTIAL_HEADERS: [http::HeaderName; 2] = [
    http::header::AUTHORIZATION,
    http::HeaderName::from_static("x-api-key"),
];

/// Endpoint URLs and static headers resolved once at startup.
#[derive(Debug, Clone)]
pub struct PreparedUpstream {
    chat_url: url::Url,
    models_url: url::Url,
    fallback_authorization: Option<http::HeaderValue>,
}

impl PreparedUpstream {
    /// # Errors
    ///
    /// Returns [`BridgeError::Config`] when the resolved base URL cannot be
    /// parsed or the configured API key is not a valid header value.
    pub fn new(config: &UpstreamConfig) -> Result<Self, BridgeError> {
        let base_url = config.resolved_base_url();
        let chat_url = parse_endpoint(&base_url, "chat/completions")?;
        let models_url = parse_endpoint(&base_url, "models")?;
        let fallback_authorization = match config.api_key.as_deref().map(str::trim) {
            Some(key) if !key.is_empty() => Some(
                http::HeaderValue::from_str(&format!("Bearer {key}")).map_err(|_| {
                    BridgeError::Config("upstream.api_key is not a valid header value".into())
                })?,
            ),
            _ => None,
        };
        Ok(Self {
            chat_url,
            models_url,
            fallback_authorization,
        })
    }

    #[must_use]
    pub fn chat_url(&self) -> &url::Url {
        &self.chat_url
    }

    #[must_use]
    pub fn models_url(&self) -> &url::Url {
        &self.models_url
    }

    /// Headers for an upstream call made on behalf of `inbound`.
    ///
    /// Caller credentials are forwarded verbatim. The configured key is only
    /// used when the caller sent neither `Authorization` nor `x-api-key`.
    #[must_use]
    pub fn request_headers(&self, inbound: &http::HeaderMap, json_body: bool) -> http::HeaderMap {
        let mut headers = http::HeaderMap::new();
        if json_body {
            headers.insert(
                http::header::CONTENT_TYPE,
                http::HeaderValue::from_static("application/json"),
            );
        }
        let mut forwarded = false;
        for name in &FORWARDED_CREDENTIAL_HEADERS {
            if let Some(value) = inbound.get(name) {
                headers.insert(name.clone(), value.clone());
                forwarded = true;
            }
        }
        if !forwarded {
            if let Some(value) = &self.fallback_authorization {
                headers.insert(http::header::AUTHORIZATION, value.clone());
            }
        }
        headers
    }
}

fn parse_endpoint(base_url: &str, path: &str) -> Result<url::Url, BridgeError> {
    let joined = format!("{}/{path}", base_url.trim_end_matches('/'));
    url::Url::parse(&joined)
        .map_err(|e| BridgeError::Config(format!("Invalid upstream URL '{joined}': {e}")))
}
