//! Authentication handlers and their tri-state outcome.
//!
//! A handler inspects one request and reports whether it authenticated the
//! caller, rejected them, or does not apply. Handlers never write a
//! response; the chain driver decides what happens next.

use axum::{body::Body, extract::Request};
use serde::Serialize;

use crate::auth::api_key::{ApiKeyHandler, ApiKeyInfo};
use crate::auth::claims::JwtClaims;
use crate::auth::error::{AuthError, IntrospectionError};
use crate::auth::extractor::{fingerprint, Credential, CredentialExtractor};
use crate::auth::introspection::{IntrospectionClient, IntrospectionResponse};
use crate::auth::jwt::JwtVerifier;

/// Outcome of one handler for one request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthResult {
    Succeeded,
    Failed,
    /// The handler does not apply; try the next one.
    Continue,
}

/// Result of [`AuthenticationHandler::serve_authn`].
#[derive(Debug)]
pub struct AuthOutcome {
    pub result: AuthResult,
    /// The chain must stop and an error responder must run.
    pub should_return: bool,
    pub error: Option<AuthError>,
}

impl AuthOutcome {
    pub fn succeeded() -> Self {
        Self {
            result: AuthResult::Succeeded,
            should_return: false,
            error: None,
        }
    }

    pub fn failed(error: AuthError) -> Self {
        Self {
            result: AuthResult::Failed,
            should_return: true,
            error: Some(error),
        }
    }

    /// `Continue`: this handler does not apply.
    pub fn proceed() -> Self {
        Self {
            result: AuthResult::Continue,
            should_return: false,
            error: None,
        }
    }
}

/// Verified identity, by credential type.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", content = "details", rename_all = "snake_case")]
pub enum Identity {
    Jwt(JwtClaims),
    Introspected(IntrospectionResponse),
    ApiKey(ApiKeyInfo),
}

/// The authenticated caller, stored in the request extensions on success.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Principal {
    /// Name of the handler that authenticated the request.
    pub handler: String,
    pub identity: Identity,
}

impl Principal {
    pub fn subject(&self) -> Option<&str> {
        match &self.identity {
            Identity::Jwt(claims) => claims.subject(),
            Identity::Introspected(response) => response
                .sub
                .as_deref()
                .or(response.username.as_deref())
                .or(response.client_id.as_deref()),
            Identity::ApiKey(info) => Some(&info.client_id),
        }
    }
}

/// Bearer token handler: JWTs are verified locally, opaque tokens are
/// introspected.
#[derive(Debug, Clone)]
pub struct TokenHandler {
    name: String,
    extractor: CredentialExtractor,
    verifier: JwtVerifier,
    introspection: Option<IntrospectionClient>,
}

impl TokenHandler {
    pub fn new(
        name: impl Into<String>,
        extractor: CredentialExtractor,
        verifier: JwtVerifier,
        introspection: Option<IntrospectionClient>,
    ) -> Self {
        Self {
            name: name.into(),
            extractor,
            verifier,
            introspection,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    #[tracing::instrument(skip_all, fields(handler = %self.name))]
    pub async fn serve_authn(&self, request: &mut Request<Body>) -> AuthOutcome {
        let raw = match self.extractor.extract(request) {
            Ok(Some(raw)) => raw,
            Ok(None) => {
                tracing::trace!("No credential at configured location");
                return AuthOutcome::proceed();
            }
            Err(e) => {
                tracing::warn!(kind = e.kind(), error = %e, "Unreadable credential");
                return AuthOutcome::failed(e);
            }
        };
        let token_fingerprint = fingerprint(&raw);

        let identity = match Credential::classify(raw) {
            Ok(Credential::Jwt(jwt)) => self.verifier.verify(&jwt).map(Identity::Jwt),
            Ok(Credential::Opaque(token)) => self.introspect(&token).await,
            Err(e) => Err(e),
        };

        match identity {
            Ok(identity) => {
                tracing::debug!(token = %token_fingerprint, "Credential accepted");
                request.extensions_mut().insert(Principal {
                    handler: self.name.clone(),
                    identity,
                });
                AuthOutcome::succeeded()
            }
            Err(e) => {
                tracing::warn!(
                    kind = e.kind(),
                    error = %e,
                    token = %token_fingerprint,
                    "Authentication failed"
                );
                AuthOutcome::failed(e)
            }
        }
    }

    async fn introspect(&self, token: &str) -> Result<Identity, AuthError> {
        let Some(client) = &self.introspection else {
            return Err(AuthError::UnsupportedCredential(self.name.clone()));
        };

        // Dropping this future (client disconnect) cancels the call.
        let response = tokio::time::timeout(client.timeout(), client.introspect(token))
            .await
            .map_err(|_| IntrospectionError::Timeout)??;

        if response.active {
            Ok(Identity::Introspected(response))
        } else {
            Err(AuthError::TokenInactive)
        }
    }
}

/// The closed set of handler kinds a chain can hold.
#[derive(Debug, Clone)]
pub enum AuthenticationHandler {
    Token(TokenHandler),
    ApiKey(ApiKeyHandler),
}

impl AuthenticationHandler {
    pub fn name(&self) -> &str {
        match self {
            AuthenticationHandler::Token(handler) => handler.name(),
            AuthenticationHandler::ApiKey(handler) => handler.name(),
        }
    }

    /// Authenticate `request`; on success the [`Principal`] is in its
    /// extensions.
    pub async fn serve_authn(&self, request: &mut Request<Body>) -> AuthOutcome {
        match self {
            AuthenticationHandler::Token(handler) => handler.serve_authn(request).await,
            AuthenticationHandler::ApiKey(handler) => handler.serve_authn(request),
        }
    }
}
