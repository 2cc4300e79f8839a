//! Authentication error taxonomy.
//!
//! Every hard failure carries enough detail for server-side diagnostics,
//! while [`AuthError::client_message`] collapses them into the generic text
//! that is safe to show to callers.

use jsonwebtoken::Algorithm;
use thiserror::Error;

use crate::auth::keys::AlgorithmFamily;

/// Generic message returned to clients for any token failure.
pub const INVALID_TOKEN_MESSAGE: &str = "The access token is invalid or expired";

/// Reasons a credential can fail authentication.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Malformed credential: {0}")]
    MalformedCredential(String),

    #[error("Token header does not name an algorithm")]
    MissingAlgorithm,

    #[error("Algorithm 'none' is never accepted")]
    AlgorithmNone,

    #[error("Unsupported algorithm: {0}")]
    UnsupportedAlgorithm(String),

    #[error("Token header has no key identifier")]
    MissingKeyId,

    #[error("Unknown key identifier: {0}")]
    UnknownKeyId(String),

    #[error("Key '{kid}' is bound to the {bound} family but the token declares {declared}")]
    AlgorithmFamilyMismatch {
        kid: String,
        declared: AlgorithmFamily,
        bound: AlgorithmFamily,
    },

    #[error("Key '{kid}' is pinned to {pinned:?} but the token declares {declared:?}")]
    AlgorithmMismatch {
        kid: String,
        declared: Algorithm,
        pinned: Algorithm,
    },

    #[error("Token signature is invalid")]
    InvalidSignature,

    #[error("Malformed claims: {0}")]
    MalformedClaims(String),

    #[error("Claim validation failed: {0}")]
    Claim(#[from] ClaimViolation),

    #[error("Token is not active")]
    TokenInactive,

    #[error("Token introspection failed: {0}")]
    Introspection(#[from] IntrospectionError),

    #[error("Opaque tokens are not accepted by handler '{0}'")]
    UnsupportedCredential(String),

    #[error("Invalid API key")]
    InvalidApiKey,

    #[error("No authentication handler accepted the request")]
    CredentialsRequired,
}

impl AuthError {
    pub(crate) fn malformed(detail: impl Into<String>) -> Self {
        AuthError::MalformedCredential(detail.into())
    }

    /// Stable label for audit logs.
    pub fn kind(&self) -> &'static str {
        match self {
            AuthError::MalformedCredential(_) => "malformed_credential",
            AuthError::MissingAlgorithm
            | AuthError::AlgorithmNone
            | AuthError::UnsupportedAlgorithm(_)
            | AuthError::AlgorithmFamilyMismatch { .. }
            | AuthError::AlgorithmMismatch { .. } => "algorithm_policy",
            AuthError::MissingKeyId | AuthError::UnknownKeyId(_) => "key_resolution",
            AuthError::InvalidSignature => "invalid_signature",
            AuthError::MalformedClaims(_) => "malformed_claims",
            AuthError::Claim(_) => "claim_violation",
            AuthError::TokenInactive => "token_inactive",
            AuthError::Introspection(_) => "introspection",
            AuthError::UnsupportedCredential(_) => "unsupported_credential",
            AuthError::InvalidApiKey => "invalid_api_key",
            AuthError::CredentialsRequired => "credentials_required",
        }
    }

    /// Machine-readable code for the rejection body.
    pub fn code(&self) -> &'static str {
        match self {
            AuthError::InvalidApiKey => "INVALID_API_KEY",
            AuthError::CredentialsRequired => "UNAUTHENTICATED",
            _ => "INVALID_TOKEN",
        }
    }

    /// Message that is safe to return to the caller.
    ///
    /// Claim, key and algorithm details stay in server-side logs.
    pub fn client_message(&self) -> &'static str {
        match self {
            AuthError::InvalidApiKey => "Invalid API key",
            AuthError::CredentialsRequired => "Authentication required",
            _ => INVALID_TOKEN_MESSAGE,
        }
    }
}

/// A registered claim that failed validation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ClaimViolation {
    #[error("token has no exp claim")]
    MissingExpiration,

    #[error("token expired at {exp} (now {now})")]
    Expired { exp: i64, now: i64 },

    #[error("token not valid before {nbf} (now {now})")]
    NotYetValid { nbf: i64, now: i64 },

    #[error("token issued in the future at {iat} (now {now})")]
    IssuedInFuture { iat: i64, now: i64 },

    #[error("token has no iss claim")]
    MissingIssuer,

    #[error("unexpected issuer '{found}'")]
    IssuerMismatch { found: String },

    #[error("token has no aud claim")]
    MissingAudience,

    #[error("required audience not present")]
    AudienceMismatch,
}

impl ClaimViolation {
    /// Name of the claim that failed.
    pub fn claim(&self) -> &'static str {
        match self {
            ClaimViolation::MissingExpiration | ClaimViolation::Expired { .. } => "exp",
            ClaimViolation::NotYetValid { .. } => "nbf",
            ClaimViolation::IssuedInFuture { .. } => "iat",
            ClaimViolation::MissingIssuer | ClaimViolation::IssuerMismatch { .. } => "iss",
            ClaimViolation::MissingAudience | ClaimViolation::AudienceMismatch => "aud",
        }
    }
}

/// Failure to obtain an answer from the introspection endpoint.
///
/// Distinct from an inactive token: the authority was never heard from.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IntrospectionError {
    #[error("introspection request timed out")]
    Timeout,

    #[error("introspection endpoint unreachable: {0}")]
    Transport(String),

    #[error("introspection response is not valid JSON: {0}")]
    InvalidResponse(String),
}

impl From<reqwest::Error> for IntrospectionError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            IntrospectionError::Timeout
        } else if err.is_decode() {
            IntrospectionError::InvalidResponse(err.to_string())
        } else {
            IntrospectionError::Transport(err.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_message_hides_claim_detail() {
        let err = AuthError::from(ClaimViolation::IssuerMismatch {
            found: "https://evil.example".to_string(),
        });
        assert_eq!(err.kind(), "claim_violation");
        assert_eq!(err.client_message(), INVALID_TOKEN_MESSAGE);
        assert!(!err.client_message().contains("evil"));
        assert!(err.to_string().contains("evil"));
    }

    #[test]
    fn test_algorithm_violations_share_kind_but_differ_from_signature() {
        let none = AuthError::AlgorithmNone;
        let family = AuthError::AlgorithmFamilyMismatch {
            kid: "k".to_string(),
            declared: AlgorithmFamily::Hmac,
            bound: AlgorithmFamily::Rsa,
        };
        assert_eq!(none.kind(), "algorithm_policy");
        assert_eq!(family.kind(), "algorithm_policy");
        assert_ne!(AuthError::InvalidSignature.kind(), family.kind());
    }

    #[test]
    fn test_introspection_error_distinct_from_inactive() {
        let transport = AuthError::from(IntrospectionError::Timeout);
        assert_eq!(transport.kind(), "introspection");
        assert_eq!(AuthError::TokenInactive.kind(), "token_inactive");
    }

    #[test]
    fn test_claim_names() {
        assert_eq!(ClaimViolation::MissingExpiration.claim(), "exp");
        assert_eq!(ClaimViolation::NotYetValid { nbf: 1, now: 0 }.claim(), "nbf");
        assert_eq!(ClaimViolation::IssuedInFuture { iat: 1, now: 0 }.claim(), "iat");
        assert_eq!(ClaimViolation::MissingIssuer.claim(), "iss");
        assert_eq!(ClaimViolation::AudienceMismatch.claim(), "aud");
    }
}
