pub mod validation;

use serde::{Deserialize, Serialize};

pub use crate::fc::FcMode;

use self::validation::validate_config;

/// Config file consulted when `TURNBRIDGE_CONFIG` is unset. Optional.
pub const DEFAULT_CONFIG_PATH: &str = "config.yaml";
pub const CONFIG_PATH_ENV: &str = "TURNBRIDGE_CONFIG";

/// Error type for configuration loading and validation.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to parse YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("Config validation error: {0}")]
    Validation(String),
}

/// Inbound listener configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Prefix stripped from every inbound path, e.g. `/bridge`.
    #[serde(default)]
    pub base_path: String,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}
fn default_port() -> u16 {
    4000
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            base_path: String::new(),
        }
    }
}

/// The chat-protocol upstream.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpstreamConfig {
    /// Full base URL including the API prefix, e.g. `http://host:3456/v1`.
    /// When unset it is derived from `host` and `port`.
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default = "default_upstream_host")]
    pub host: String,
    #[serde(default = "default_upstream_port")]
    pub port: u16,
    /// Bearer token used when the caller sends no credentials of its own.
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub fc_mode: FcMode,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Always request a streamed completion, even for buffered callers.
    #[serde(default)]
    pub force_stream: bool,
    #[serde(default = "default_model")]
    pub default_model: String,
}

fn default_upstream_host() -> String {
    "localhost".to_string()
}
fn default_upstream_port() -> u16 {
    3456
}
fn default_timeout_secs() -> u64 {
    600
}
fn default_model() -> String {
    "claude-sonnet-4".to_string()
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            base_url: None,
            host: default_upstream_host(),
            port: default_upstream_port(),
            api_key: None,
            fc_mode: FcMode::default(),
            timeout_secs: default_timeout_secs(),
            force_stream: false,
            default_model: default_model(),
        }
    }
}

impl UpstreamConfig {
    /// Base URL without a trailing slash.
    #[must_use]
    pub fn resolved_base_url(&self) -> String {
        match self.base_url.as_deref().map(str::trim).filter(|u| !u.is_empty()) {
            Some(url) => url.trim_end_matches('/').to_string(),
            None => format!("http://{}:{}/v1", self.host, self.port),
        }
    }
}

/// Feature flags and settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeaturesConfig {
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default = "default_true")]
    pub convert_developer_to_system: bool,
    /// Replaces the built-in tool-use prompt in inject mode.
    #[serde(default)]
    pub prompt_template: Option<String>,
    #[serde(default = "default_placeholder_user_message")]
    pub placeholder_user_message: String,
}

fn default_true() -> bool {
    true
}
fn default_log_level() -> String {
    "INFO".to_string()
}
fn default_placeholder_user_message() -> String {
    crate::translate::request::DEFAULT_PLACEHOLDER_USER_MESSAGE.to_string()
}

impl Default for FeaturesConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            convert_developer_to_system: true,
            prompt_template: None,
            placeholder_user_message: default_placeholder_user_message(),
        }
    }
}

/// Top-level application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub upstream: UpstreamConfig,
    #[serde(default)]
    pub features: FeaturesConfig,
}

/// Load configuration from a YAML file and validate it.
///
/// # Errors
///
/// Returns [`ConfigError::Io`] when reading the file fails, [`ConfigError::Yaml`]
/// when parsing fails, or [`ConfigError::Validation`] when semantic validation fails.
pub fn load_config(path: &str) -> Result<AppConfig, ConfigError> {
    let contents = std::fs::read_to_string(path)?;
    let config: AppConfig = serde_yaml::from_str(&contents)?;
    validate_config(&config)?;
    Ok(config)
}

/// Resolve the process configuration: the YAML file named by
/// `TURNBRIDGE_CONFIG` (or `config.yaml` when present), then environment
/// overrides, then validation.
///
/// # Errors
///
/// Returns [`ConfigError`] when an explicitly named file cannot be read or
/// parsed, when an override is malformed, or when validation fails.
pub fn load_config_from_env() -> Result<AppConfig, ConfigError> {
    let mut config = match std::env::var(CONFIG_PATH_ENV) {
        Ok(path) => {
            let contents = std::fs::read_to_string(&path)?;
            serde_yaml::from_str(&contents)?
        }
        Err(_) => match std::fs::read_to_string(DEFAULT_CONFIG_PATH) {
            Ok(contents) => serde_yaml::from_str(&contents)?,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => AppConfig::default(),
            Err(err) => return Err(err.into()),
        },
    };
    apply_env_overrides(&mut config, |key| std::env::var(key).ok())?;
    validate_config(&config)?;
    Ok(config)
}

/// Apply environment overrides through `lookup`.
///
/// # Errors
///
/// Returns [`ConfigError::Validation`] when a numeric or enum override cannot
/// be parsed.
pub fn apply_env_overrides<F>(config: &mut AppConfig, lookup: F) -> Result<(), ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

    if let Some(port) = get("ADAPTER_PORT") {
        config.server.port = parse_port("ADAPTER_PORT", &port)?;
    }
    if let Some(host) = get("ADAPTER_HOST") {
        config.server.host = host;
    }
    if let Some(host) = get("UPSTREAM_HOST") {
        config.upstream.host = host;
    }
    if let Some(port) = get("UPSTREAM_PORT") {
        config.upstream.port = parse_port("UPSTREAM_PORT", &port)?;
    }
    if let Some(url) = get("UPSTREAM_BASE_URL") {
        config.upstream.base_url = Some(url);
    }
    if let Some(key) = get("UPSTREAM_API_KEY") {
        config.upstream.api_key = Some(key);
    }
    if let Some(mode) = get("UPSTREAM_FC_MODE") {
        config.upstream.fc_mode = FcMode::parse(&mode).ok_or_else(|| {
            ConfigError::Validation(format!(
                "UPSTREAM_FC_MODE must be 'native' or 'inject', got '{mode}'"
            ))
        })?;
    }
    if let Some(level) = get("LOG_LEVEL") {
        config.features.log_level = level;
    }
    Ok(())
}

fn parse_port(key: &str, value: &str) -> Result<u16, ConfigError> {
    value
        .trim()
        .parse::<u16>()
        .map_err(|e| ConfigError::Validation(format!("{key} must be a port number: {e}")))
}
