//! Static API key authentication for agent and service clients.

use std::collections::HashMap;
use std::fmt;

use axum::{body::Body, extract::Request};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::auth::error::AuthError;
use crate::auth::extractor::{fingerprint, CredentialExtractor, CredentialLocation};
use crate::auth::handler::{AuthOutcome, Identity, Principal};

/// Header read by API key handlers unless configured otherwise.
pub const DEFAULT_API_KEY_HEADER: &str = "X-API-Key";

/// Represents an API key with its metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ApiKeyInfo {
    /// Unique identifier for this key.
    pub key_id: String,
    /// Human-readable name.
    pub name: String,
    /// Associated client/agent identifier.
    pub client_id: String,
}

/// API key configuration from config file.
#[derive(Clone, Deserialize)]
pub struct ConfiguredApiKey {
    /// Unique ID for the key.
    pub id: String,
    /// The actual API key value.
    pub key: String,
    /// Human-readable name.
    pub name: String,
    /// Associated client/agent ID.
    pub client_id: String,
}

impl fmt::Debug for ConfiguredApiKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConfiguredApiKey")
            .field("id", &self.id)
            .field("key", &"<redacted>")
            .field("name", &self.name)
            .field("client_id", &self.client_id)
            .finish()
    }
}

/// API key validator. Keys are stored hashed and never change after startup.
#[derive(Debug, Clone, Default)]
pub struct ApiKeyValidator {
    /// Map of hashed keys to their info.
    keys: HashMap<String, ApiKeyInfo>,
}

impl ApiKeyValidator {
    /// Create a new validator with keys from config.
    pub fn new(configured_keys: Vec<ConfiguredApiKey>) -> Self {
        let keys = configured_keys
            .into_iter()
            .map(|key| {
                (
                    Self::hash_key(&key.key),
                    ApiKeyInfo {
                        key_id: key.id,
                        name: key.name,
                        client_id: key.client_id,
                    },
                )
            })
            .collect();

        Self { keys }
    }

    /// Hash an API key for storage/comparison.
    pub fn hash_key(key: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(key.as_bytes());
        hex::encode(hasher.finalize())
    }

    /// Validate an API key and return its info if valid.
    pub fn validate(&self, key: &str) -> Option<&ApiKeyInfo> {
        self.keys.get(&Self::hash_key(key))
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

/// Handler that authenticates requests carrying a configured API key.
#[derive(Debug, Clone)]
pub struct ApiKeyHandler {
    name: String,
    extractor: CredentialExtractor,
    validator: ApiKeyValidator,
}

impl ApiKeyHandler {
    pub fn new(
        name: impl Into<String>,
        extractor: CredentialExtractor,
        validator: ApiKeyValidator,
    ) -> Self {
        Self {
            name: name.into(),
            extractor,
            validator,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Default location: the `X-API-Key` header.
    pub fn default_location() -> CredentialLocation {
        CredentialLocation::Header {
            name: DEFAULT_API_KEY_HEADER.to_string(),
        }
    }

    #[tracing::instrument(skip_all, fields(handler = %self.name))]
    pub fn serve_authn(&self, request: &mut Request<Body>) -> AuthOutcome {
        let api_key = match self.extractor.extract(request) {
            Ok(Some(api_key)) => api_key,
            Ok(None) => return AuthOutcome::proceed(),
            Err(e) => {
                tracing::warn!(kind = e.kind(), error = %e, "Unreadable API key");
                return AuthOutcome::failed(e);
            }
        };

        match self.validator.validate(&api_key) {
            Some(info) => {
                tracing::debug!(key_id = %info.key_id, "API key accepted");
                request.extensions_mut().insert(Principal {
                    handler: self.name.clone(),
                    identity: Identity::ApiKey(info.clone()),
                });
                AuthOutcome::succeeded()
            }
            None => {
                tracing::warn!(
                    key = %fingerprint(&api_key),
                    "Invalid API key attempted"
                );
                AuthOutcome::failed(AuthError::InvalidApiKey)
            }
        }
    }
}
