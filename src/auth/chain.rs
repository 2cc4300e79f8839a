//! Ordered handler chain.
//!
//! Handlers are tried in declared order until one succeeds or fails.
//! `Continue` moves on to the next handler; running out of handlers means
//! the request carried no credential any handler accepts.

use std::collections::HashSet;
use std::sync::Arc;

use axum::{body::Body, extract::Request};

use crate::auth::api_key::{ApiKeyHandler, ApiKeyValidator};
use crate::auth::claims::ValidationPolicy;
use crate::auth::error::AuthError;
use crate::auth::extractor::CredentialExtractor;
use crate::auth::handler::{AuthResult, AuthenticationHandler, TokenHandler};
use crate::auth::introspection::IntrospectionClient;
use crate::auth::jwt::JwtVerifier;
use crate::auth::keys::{KeyResolver, StaticKeySet};
use crate::config::{AuthConfig, HandlerConfig};
use crate::error::{GatewayError, GatewayResult};

/// Handlers in evaluation order.
#[derive(Debug, Clone, Default)]
pub struct HandlerChain {
    handlers: Vec<AuthenticationHandler>,
}

impl HandlerChain {
    pub fn new(handlers: Vec<AuthenticationHandler>) -> Self {
        Self { handlers }
    }

    /// Build every configured handler. The key table is built once and
    /// shared by all token handlers.
    ///
    /// # Errors
    ///
    /// Returns `GatewayError` for invalid keys, duplicate handler names or
    /// invalid introspection settings.
    pub fn from_config(config: &AuthConfig) -> GatewayResult<Self> {
        let keys: Arc<dyn KeyResolver> = Arc::new(StaticKeySet::from_config(&config.keys)?);
        let mut names = HashSet::new();
        let mut handlers = Vec::with_capacity(config.handlers.len());

        for handler_config in &config.handlers {
            let handler = match handler_config {
                HandlerConfig::Token(token) => {
                    let introspection = token
                        .introspection
                        .as_ref()
                        .map(IntrospectionClient::new)
                        .transpose()?;
                    AuthenticationHandler::Token(TokenHandler::new(
                        token.name.clone(),
                        CredentialExtractor::new(
                            token.credential.clone(),
                            token.context_match.clone(),
                        ),
                        JwtVerifier::new(
                            Arc::clone(&keys),
                            ValidationPolicy::from(&token.validation),
                        ),
                        introspection,
                    ))
                }
                HandlerConfig::ApiKey(api_key) => {
                    let validator = ApiKeyValidator::new(api_key.keys.clone());
                    if validator.is_empty() {
                        tracing::warn!(
                            handler = %api_key.name,
                            "API key handler has no keys and will reject every key presented"
                        );
                    }
                    AuthenticationHandler::ApiKey(ApiKeyHandler::new(
                        api_key.name.clone(),
                        CredentialExtractor::new(api_key.credential.clone(), None),
                        validator,
                    ))
                }
            };

            if !names.insert(handler.name().to_string()) {
                return Err(GatewayError::Config(format!(
                    "duplicate handler name '{}'",
                    handler.name()
                )));
            }
            tracing::info!(handler = %handler.name(), "Authentication handler configured");
            handlers.push(handler);
        }

        Ok(Self { handlers })
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    pub fn handler_names(&self) -> impl Iterator<Item = &str> {
        self.handlers.iter().map(AuthenticationHandler::name)
    }

    /// Run the chain. Returns the name of the handler that authenticated
    /// the request.
    pub async fn authenticate(&self, request: &mut Request<Body>) -> Result<String, AuthError> {
        for handler in &self.handlers {
            let outcome = handler.serve_authn(request).await;
            match outcome.result {
                AuthResult::Succeeded => return Ok(handler.name().to_string()),
                AuthResult::Failed => {
                    return Err(outcome.error.unwrap_or(AuthError::CredentialsRequired))
                }
                AuthResult::Continue => continue,
            }
        }

        tracing::debug!("No authentication handler applied");
        Err(AuthError::CredentialsRequired)
    }
}
