//! Configuration module for the gateway.
//!
//! Loads configuration from YAML files and environment variables.

use config::{Config as ConfigLoader, ConfigError, Environment, File};
use serde::Deserialize;

use crate::auth::{
    ApiKeyHandler, ConfiguredApiKey, ContextMatch, CredentialLocation, IntrospectionConfig,
    KeyConfig, ValidationConfig,
};
use crate::logging::LoggingConfig;

/// Root configuration structure.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    #[serde(default)]
    pub auth: AuthConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Server configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

/// Authentication configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct AuthConfig {
    /// Whether protected routes require authentication.
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// Verification keys shared by every token handler.
    #[serde(default)]
    pub keys: Vec<KeyConfig>,
    /// Handlers in evaluation order.
    #[serde(default)]
    pub handlers: Vec<HandlerConfig>,
}

fn default_enabled() -> bool {
    true
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            keys: Vec::new(),
            handlers: Vec::new(),
        }
    }
}

/// One entry of the handler chain.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum HandlerConfig {
    Token(TokenHandlerConfig),
    ApiKey(ApiKeyHandlerConfig),
}

/// Bearer token handler: JWTs are verified locally, opaque tokens go to
/// introspection when an endpoint is configured.
#[derive(Debug, Clone, Deserialize)]
pub struct TokenHandlerConfig {
    pub name: String,
    #[serde(default)]
    pub credential: CredentialLocation,
    #[serde(default)]
    pub context_match: Option<ContextMatch>,
    #[serde(default)]
    pub validation: ValidationConfig,
    #[serde(default)]
    pub introspection: Option<IntrospectionConfig>,
}

/// Static API key handler.
#[derive(Debug, Clone, Deserialize)]
pub struct ApiKeyHandlerConfig {
    pub name: String,
    #[serde(default = "ApiKeyHandler::default_location")]
    pub credential: CredentialLocation,
    #[serde(default)]
    pub keys: Vec<ConfiguredApiKey>,
}

impl Config {
    /// Load configuration from files and environment.
    ///
    /// Priority (highest to lowest):
    /// 1. Environment variables (GATEWAY_*)
    /// 2. config/local.yaml (if exists)
    /// 3. config/default.yaml
    pub fn load() -> Result<Self, ConfigError> {
        let config = ConfigLoader::builder()
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name("config/local").required(false))
            .add_source(
                Environment::with_prefix("GATEWAY")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        config.try_deserialize()
    }

    #[cfg(test)]
    pub(crate) fn from_yaml(yaml: &str) -> Result<Self, ConfigError> {
        ConfigLoader::builder()
            .add_source(File::from_str(yaml, config::FileFormat::Yaml))
            .build()?
            .try_deserialize()
    }
}
