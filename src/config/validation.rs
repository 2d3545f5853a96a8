use super::{AppConfig, ConfigError};

/// Validate the full application config, returning an error if any rule is violated.
///
/// # Errors
///
/// Returns [`ConfigError::Validation`] when any configuration invariant is violated.
pub fn validate_config(config: &AppConfig) -> Result<(), ConfigError> {
    validate_server_config(config)?;
    validate_upstream(config)?;
    validate_log_level(config)?;
    validate_prompt_template(config)?;
    Ok(())
}

fn validation_err(msg: impl Into<String>) -> ConfigError {
    ConfigError::Validation(msg.into())
}

fn validate_server_config(config: &AppConfig) -> Result<(), ConfigError> {
    let server = &config.server;
    if server.host.trim().is_empty() {
        return Err(validation_err("server.host cannot be empty"));
    }
    let base_path = server.base_path.trim();
    if !base_path.is_empty() && !base_path.starts_with('/') {
        return Err(validation_err("server.base_path must start with '/'"));
    }
    Ok(())
}

fn validate_upstream(config: &AppConfig) -> Result<(), ConfigError> {
    let upstream = &config.upstream;
    if upstream.base_url.is_none() && upstream.host.trim().is_empty() {
        return Err(validation_err(
            "upstream.host cannot be empty when upstream.base_url is unset",
        ));
    }
    let base_url = upstream.resolved_base_url();
    let parsed = url::Url::parse(&base_url).map_err(|err| {
        validation_err(format!("upstream base URL '{base_url}' is not valid: {err}"))
    })?;
    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(validation_err(
            "upstream base URL must start with http:// or https://",
        ));
    }
    if upstream.timeout_secs == 0 {
        return Err(validation_err("upstream.timeout_secs must be greater than 0"));
    }
    if upstream.default_model.trim().is_empty() {
        return Err(validation_err("upstream.default_model cannot be empty"));
    }
    if let Some(key) = upstream.api_key.as_deref() {
        if key.trim().is_empty() {
            return Err(validation_err("upstream.api_key cannot be empty when set"));
        }
    }
    Ok(())
}

fn validate_log_level(config: &AppConfig) -> Result<(), ConfigError> {
    let valid_levels = [
        "TRACE", "DEBUG", "INFO", "WARNING", "WARN", "ERROR", "CRITICAL", "DISABLED",
    ];
    if !valid_levels.contains(&config.features.log_level.to_uppercase().as_str()) {
        return Err(validation_err(format!(
            "log_level must be one of {valid_levels:?}"
        )));
    }
    Ok(())
}

fn validate_prompt_template(config: &AppConfig) -> Result<(), ConfigError> {
    if let Some(ref tmpl) = config.features.prompt_template {
        if !tmpl.contains("{tools_list}") {
            return Err(validation_err(
                "prompt_template must contain the {tools_list} placeholder",
            ));
        }
    }
    Ok(())
}
