//! JWT verification.
//!
//! Verification runs as a fixed sequence of stages and stops at the first
//! failure:
//!
//! 1. header decode (`alg` present and not `none`)
//! 2. key resolution by `kid`
//! 3. algorithm family and exact algorithm match against the key's pin
//! 4. signature verification with the pinned algorithm
//! 5. claims decode
//! 6. claim validation against the handler's [`ValidationPolicy`]
//!
//! Stages 1-3 never look at the signature, so a token cannot choose which
//! algorithm verifies it.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use chrono::Utc;
use jsonwebtoken::{crypto, Algorithm};
use serde::Deserialize;
use serde_json::{Map, Value};

use crate::auth::claims::{validate_claims, JwtClaims, ValidationPolicy};
use crate::auth::error::AuthError;
use crate::auth::keys::{AlgorithmFamily, KeyEntry, KeyResolver};

/// A JWT-shaped credential whose header and payload decoded to JSON objects.
///
/// Nothing about it has been verified yet.
#[derive(Clone)]
pub struct EncodedJwt {
    token: String,
    header: Map<String, Value>,
    payload: Map<String, Value>,
    signature_start: usize,
}

impl EncodedJwt {
    /// Split and decode a `header.payload.signature` token.
    pub fn decode(token: String) -> Result<Self, AuthError> {
        let mut parts = token.split('.');
        let (Some(header), Some(payload), Some(_signature), None) =
            (parts.next(), parts.next(), parts.next(), parts.next())
        else {
            return Err(AuthError::malformed("JWT must have 3 parts separated by dots"));
        };

        let header = decode_segment(header, "header")?;
        let payload = decode_segment(payload, "payload")?;
        let signature_start = token.rfind('.').map_or(token.len(), |dot| dot + 1);

        Ok(Self {
            token,
            header,
            payload,
            signature_start,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.token
    }

    /// `base64url(header) + "." + base64url(payload)`.
    fn signing_input(&self) -> &str {
        &self.token[..self.signature_start.saturating_sub(1)]
    }

    fn signature(&self) -> &str {
        &self.token[self.signature_start..]
    }
}

impl fmt::Debug for EncodedJwt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EncodedJwt")
            .field("header", &self.header)
            .finish_non_exhaustive()
    }
}

fn decode_segment(segment: &str, name: &str) -> Result<Map<String, Value>, AuthError> {
    if segment.is_empty() {
        return Err(AuthError::malformed(format!("JWT {name} is empty")));
    }
    let bytes = URL_SAFE_NO_PAD
        .decode(segment.trim_end_matches('='))
        .map_err(|e| AuthError::malformed(format!("Failed to decode JWT {name}: {e}")))?;
    match serde_json::from_slice::<Value>(&bytes) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(_) => Err(AuthError::malformed(format!("JWT {name} is not a JSON object"))),
        Err(e) => Err(AuthError::malformed(format!("Failed to parse JWT {name}: {e}"))),
    }
}

/// Header fields this gateway consumes.
#[derive(Debug, Clone, Deserialize)]
pub struct JwtHeader {
    #[serde(default)]
    pub alg: Option<String>,
    #[serde(default)]
    pub typ: Option<String>,
    #[serde(default)]
    pub kid: Option<String>,
}

/// Verifies JWTs against a key table and a claim policy.
#[derive(Clone)]
pub struct JwtVerifier {
    keys: Arc<dyn KeyResolver>,
    policy: ValidationPolicy,
}

impl JwtVerifier {
    pub fn new(keys: Arc<dyn KeyResolver>, policy: ValidationPolicy) -> Self {
        Self { keys, policy }
    }

    /// Decode and verify a raw token at the current time.
    pub fn verify_token(&self, token: &str) -> Result<JwtClaims, AuthError> {
        let jwt = EncodedJwt::decode(token.to_string())?;
        self.verify(&jwt)
    }

    /// Verify at the current time.
    pub fn verify(&self, jwt: &EncodedJwt) -> Result<JwtClaims, AuthError> {
        self.verify_at(jwt, Utc::now().timestamp())
    }

    /// Verify at `now` (Unix seconds). Pure in its inputs.
    ///
    /// An `alg` name the gateway does not know fails in the header stage,
    /// before the `kid` is looked up.
    pub fn verify_at(&self, jwt: &EncodedJwt, now: i64) -> Result<JwtClaims, AuthError> {
        let (header, declared) = decode_header(jwt)?;
        let key = self.resolve_key(&header)?;
        check_algorithm(key, declared)?;
        verify_signature(jwt, key)?;
        let claims = decode_claims(jwt)?;
        validate_claims(&claims, &self.policy, now)?;

        tracing::debug!(kid = %key.kid(), alg = ?declared, "Token verified");
        Ok(claims)
    }

    fn resolve_key(&self, header: &JwtHeader) -> Result<&KeyEntry, AuthError> {
        let kid = header
            .kid
            .as_deref()
            .filter(|kid| !kid.is_empty())
            .ok_or(AuthError::MissingKeyId)?;
        self.keys
            .resolve(kid)
            .ok_or_else(|| AuthError::UnknownKeyId(kid.to_string()))
    }
}

impl fmt::Debug for JwtVerifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JwtVerifier")
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}

fn decode_header(jwt: &EncodedJwt) -> Result<(JwtHeader, Algorithm), AuthError> {
    let header: JwtHeader = serde_json::from_value(Value::Object(jwt.header.clone()))
        .map_err(|e| AuthError::malformed(format!("Invalid JWT header: {e}")))?;

    let alg = header.alg.as_deref().ok_or(AuthError::MissingAlgorithm)?;
    if alg.trim().eq_ignore_ascii_case("none") {
        return Err(AuthError::AlgorithmNone);
    }
    let algorithm =
        Algorithm::from_str(alg).map_err(|_| AuthError::UnsupportedAlgorithm(alg.to_string()))?;

    Ok((header, algorithm))
}

fn check_algorithm(key: &KeyEntry, declared: Algorithm) -> Result<(), AuthError> {
    let declared_family = AlgorithmFamily::of(declared)
        .ok_or_else(|| AuthError::UnsupportedAlgorithm(format!("{declared:?}")))?;

    if declared_family != key.family() {
        return Err(AuthError::AlgorithmFamilyMismatch {
            kid: key.kid().to_string(),
            declared: declared_family,
            bound: key.family(),
        });
    }
    if declared != key.algorithm() {
        return Err(AuthError::AlgorithmMismatch {
            kid: key.kid().to_string(),
            declared,
            pinned: key.algorithm(),
        });
    }
    Ok(())
}

fn verify_signature(jwt: &EncodedJwt, key: &KeyEntry) -> Result<(), AuthError> {
    let valid = crypto::verify(
        jwt.signature(),
        jwt.signing_input().as_bytes(),
        key.decoding_key(),
        key.algorithm(),
    )
    .unwrap_or_else(|e| {
        tracing::debug!(error = %e, kid = %key.kid(), "Signature could not be checked");
        false
    });

    if valid {
        Ok(())
    } else {
        Err(AuthError::InvalidSignature)
    }
}

fn decode_claims(jwt: &EncodedJwt) -> Result<JwtClaims, AuthError> {
    serde_json::from_value(Value::Object(jwt.payload.clone()))
        .map_err(|e| AuthError::MalformedClaims(e.to_string()))
}
