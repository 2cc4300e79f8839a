//! Credential extraction and classification.

use std::collections::HashMap;

use axum::{
    extract::Query,
    http::{header::AUTHORIZATION, HeaderValue, Request},
};
use serde::Deserialize;
use sha2::{Digest, Sha256};

use crate::auth::error::AuthError;
use crate::auth::jwt::EncodedJwt;

/// Upper bound on credential size, checked before any decoding.
pub const MAX_CREDENTIAL_BYTES: usize = 8192;

/// Where a handler looks for its credential.
#[derive(Debug, Clone, PartialEq, Eq, Default, Deserialize)]
#[serde(tag = "location", rename_all = "snake_case")]
pub enum CredentialLocation {
    /// `Authorization: Bearer <token>`.
    #[default]
    AuthorizationHeader,
    /// Raw value of a named header.
    Header { name: String },
    /// Raw value of a named query parameter.
    Query { name: String },
    /// A value stored in [`RequestValues`] by an earlier pipeline stage.
    Context { key: String },
}

/// Where the value compared by a [`ContextMatch`] comes from.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "location", rename_all = "snake_case")]
pub enum MatchSource {
    Header { name: String },
    Query { name: String },
}

/// Precondition restricting a handler to requests carrying a marker.
///
/// The request-scoped value under `context_key` must equal the value read
/// from `source`; otherwise the handler does not apply.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ContextMatch {
    pub context_key: String,
    pub source: MatchSource,
}

/// Request-scoped values set by earlier pipeline stages.
///
/// Stored in the request extensions.
#[derive(Debug, Clone, Default)]
pub struct RequestValues(HashMap<String, String>);

impl RequestValues {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.0.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }
}

/// Detected credential kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CredentialKind {
    Jwt,
    Opaque,
}

/// A credential pulled from a request, classified by shape.
#[derive(Debug, Clone)]
pub enum Credential {
    /// Three segments whose header and payload decode to JSON objects.
    Jwt(EncodedJwt),
    /// Anything else; only a remote authority can judge it.
    Opaque(String),
}

impl Credential {
    /// Classify a raw credential.
    ///
    /// A credential with exactly two `.` separators must decode as a JWT; if
    /// it does not, it is malformed rather than opaque.
    pub fn classify(raw: String) -> Result<Self, AuthError> {
        if raw.len() > MAX_CREDENTIAL_BYTES {
            return Err(AuthError::malformed(format!(
                "credential exceeds {MAX_CREDENTIAL_BYTES} bytes"
            )));
        }

        if raw.matches('.').count() == 2 {
            EncodedJwt::decode(raw).map(Credential::Jwt)
        } else {
            Ok(Credential::Opaque(raw))
        }
    }

    pub fn kind(&self) -> CredentialKind {
        match self {
            Credential::Jwt(_) => CredentialKind::Jwt,
            Credential::Opaque(_) => CredentialKind::Opaque,
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Credential::Jwt(jwt) => jwt.as_str(),
            Credential::Opaque(token) => token,
        }
    }
}

/// Short SHA-256 fingerprint of a credential for logs.
pub fn fingerprint(credential: &str) -> String {
    let digest = Sha256::digest(credential.as_bytes());
    hex::encode(&digest[..8])
}

/// Reads a credential from one configured location.
#[derive(Debug, Clone, Default)]
pub struct CredentialExtractor {
    location: CredentialLocation,
    context_match: Option<ContextMatch>,
}

impl CredentialExtractor {
    pub fn new(location: CredentialLocation, context_match: Option<ContextMatch>) -> Self {
        Self {
            location,
            context_match,
        }
    }

    /// Extract the raw credential.
    ///
    /// `Ok(None)` when this handler does not apply. A value that is present
    /// but unreadable (non-visible-ASCII header bytes, an undecodable query
    /// string) is a malformed credential.
    pub fn extract<B>(&self, request: &Request<B>) -> Result<Option<String>, AuthError> {
        if let Some(context_match) = &self.context_match {
            if !context_matches(context_match, request) {
                tracing::trace!(
                    context_key = %context_match.context_key,
                    "Context match failed, skipping handler"
                );
                return Ok(None);
            }
        }

        let value = match &self.location {
            CredentialLocation::AuthorizationHeader => request
                .headers()
                .get(AUTHORIZATION)
                .map(readable)
                .transpose()?
                .and_then(bearer_token)
                .map(str::to_string),
            CredentialLocation::Header { name } => request
                .headers()
                .get(name.as_str())
                .map(readable)
                .transpose()?
                .map(str::to_string),
            CredentialLocation::Query { name } => query_params(request)?.remove(name),
            CredentialLocation::Context { key } => context_value(request, key),
        };

        Ok(value.filter(|v| !v.is_empty()))
    }
}

fn readable(value: &HeaderValue) -> Result<&str, AuthError> {
    value
        .to_str()
        .map_err(|_| AuthError::malformed("credential header is not visible ASCII"))
}

/// Token from a `Bearer` authorization value; other schemes yield `None`.
pub fn bearer_token(value: &str) -> Option<&str> {
    let (scheme, token) = value.trim().split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return None;
    }
    let token = token.trim();
    (!token.is_empty()).then_some(token)
}

fn header_value<B>(request: &Request<B>, name: &str) -> Option<String> {
    request
        .headers()
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
}

fn query_params<B>(request: &Request<B>) -> Result<HashMap<String, String>, AuthError> {
    if request.uri().query().is_none() {
        return Ok(HashMap::new());
    }
    Query::<HashMap<String, String>>::try_from_uri(request.uri())
        .map(|Query(params)| params)
        .map_err(|e| AuthError::malformed(format!("query string cannot be decoded: {e}")))
}

fn context_value<B>(request: &Request<B>, key: &str) -> Option<String> {
    request
        .extensions()
        .get::<RequestValues>()
        .and_then(|values| values.get(key))
        .map(str::to_string)
}

fn context_matches<B>(context_match: &ContextMatch, request: &Request<B>) -> bool {
    let Some(expected) = context_value(request, &context_match.context_key) else {
        return false;
    };
    let actual = match &context_match.source {
        MatchSource::Header { name } => header_value(request, name),
        MatchSource::Query { name } => query_params(request)
            .ok()
            .and_then(|mut params| params.remove(name)),
    };
    actual.is_some_and(|actual| actual == expected)
}
