use crate::config::AppConfig;
use crate::error::BridgeError;
use crate::translate::TranslateOptions;
use crate::transport::HttpTransport;

/// Shared application state accessible to all handlers.
pub struct AppState {
    pub config: AppConfig,
    pub transport: HttpTransport,
}

impl AppState {
    #[must_use]
    pub fn new(config: AppConfig, transport: HttpTransport) -> Self {
        Self { config, transport }
    }

    /// Build the state and its upstream client from configuration.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::Config`] when the upstream client cannot be built.
    pub fn from_config(config: AppConfig) -> Result<Self, BridgeError> {
        let transport = HttpTransport::new(&config.upstream)?;
        Ok(Self::new(config, transport))
    }

    /// Request-translation settings derived from configuration.
    #[must_use]
    pub fn translate_options(&self) -> TranslateOptions<'_> {
        TranslateOptions {
            native_tools: self.config.upstream.fc_mode.is_native(),
            convert_developer_to_system: self.config.features.convert_developer_to_system,
            prompt_template: self.config.features.prompt_template.as_deref(),
            placeholder_user_message: &self.config.features.placeholder_user_message,
        }
    }
}
