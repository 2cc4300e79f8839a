//! Verification key table.
//!
//! Keys are loaded from configuration once at startup and never change while
//! serving. Each key is pinned to exactly one algorithm; the verifier compares
//! the token's declared algorithm against that pin before touching the
//! signature.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use base64::{engine::general_purpose::STANDARD, Engine};
use jsonwebtoken::{Algorithm, DecodingKey};
use serde::Deserialize;
use thiserror::Error;

/// Algorithm families a key can be bound to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AlgorithmFamily {
    /// HMAC with SHA-2 (`HS*`).
    Hmac,
    /// RSASSA-PKCS1-v1_5 (`RS*`).
    Rsa,
    /// RSASSA-PSS (`PS*`).
    RsaPss,
    /// ECDSA (`ES*`).
    Ecdsa,
}

impl AlgorithmFamily {
    /// Family of a concrete algorithm. `EdDSA` has no family here and is
    /// therefore unsupported.
    pub fn of(algorithm: Algorithm) -> Option<Self> {
        match algorithm {
            Algorithm::HS256 | Algorithm::HS384 | Algorithm::HS512 => Some(AlgorithmFamily::Hmac),
            Algorithm::RS256 | Algorithm::RS384 | Algorithm::RS512 => Some(AlgorithmFamily::Rsa),
            Algorithm::PS256 | Algorithm::PS384 | Algorithm::PS512 => {
                Some(AlgorithmFamily::RsaPss)
            }
            Algorithm::ES256 | Algorithm::ES384 => Some(AlgorithmFamily::Ecdsa),
            Algorithm::EdDSA => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            AlgorithmFamily::Hmac => "HS",
            AlgorithmFamily::Rsa => "RS",
            AlgorithmFamily::RsaPss => "PS",
            AlgorithmFamily::Ecdsa => "ES",
        }
    }
}

impl fmt::Display for AlgorithmFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors raised while building the key table from configuration.
#[derive(Debug, Error)]
pub enum KeyConfigError {
    #[error("duplicate key identifier '{0}'")]
    DuplicateKid(String),

    #[error("key '{kid}': unknown algorithm '{algorithm}'")]
    UnknownAlgorithm { kid: String, algorithm: String },

    #[error("key '{kid}': algorithm '{algorithm}' is not allowed")]
    AlgorithmNotAllowed { kid: String, algorithm: String },

    #[error("key '{0}': set exactly one source of key material")]
    AmbiguousMaterial(String),

    #[error("key '{kid}': {family} keys need {expected}")]
    WrongMaterial {
        kid: String,
        family: AlgorithmFamily,
        expected: &'static str,
    },

    #[error("key '{kid}': invalid key material: {reason}")]
    InvalidKey { kid: String, reason: String },

    #[error("key '{kid}': cannot read {path}: {source}")]
    Io {
        kid: String,
        path: String,
        #[source]
        source: std::io::Error,
    },
}

/// Key entry from the config file.
///
/// Exactly one source of key material must be set.
#[derive(Clone, Deserialize)]
pub struct KeyConfig {
    /// Key identifier matched against the token's `kid` header.
    pub kid: String,
    /// Exact algorithm the key is pinned to, e.g. `RS256`.
    pub algorithm: String,
    #[serde(default)]
    pub secret: Option<String>,
    #[serde(default)]
    pub secret_base64: Option<String>,
    #[serde(default)]
    pub public_key_pem: Option<String>,
    #[serde(default)]
    pub public_key_file: Option<String>,
}

impl fmt::Debug for KeyConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyConfig")
            .field("kid", &self.kid)
            .field("algorithm", &self.algorithm)
            .field("secret", &self.secret.as_ref().map(|_| "<redacted>"))
            .field(
                "secret_base64",
                &self.secret_base64.as_ref().map(|_| "<redacted>"),
            )
            .field("public_key_pem", &self.public_key_pem.is_some())
            .field("public_key_file", &self.public_key_file)
            .finish()
    }
}

/// A verification key pinned to one algorithm.
#[derive(Clone)]
pub struct KeyEntry {
    kid: String,
    algorithm: Algorithm,
    family: AlgorithmFamily,
    key: DecodingKey,
}

impl KeyEntry {
    /// HMAC key from raw secret bytes.
    pub fn hmac(
        kid: impl Into<String>,
        algorithm: Algorithm,
        secret: &[u8],
    ) -> Result<Self, KeyConfigError> {
        let kid = kid.into();
        let family = pinned_family(&kid, algorithm)?;
        if family != AlgorithmFamily::Hmac {
            return Err(KeyConfigError::WrongMaterial {
                kid,
                family,
                expected: "a PEM public key",
            });
        }
        if secret.is_empty() {
            return Err(KeyConfigError::InvalidKey {
                kid,
                reason: "secret is empty".to_string(),
            });
        }

        Ok(Self {
            kid,
            algorithm,
            family,
            key: DecodingKey::from_secret(secret),
        })
    }

    /// RSA or EC public key from PEM (SPKI or PKCS#1 for RSA).
    pub fn public_key_pem(
        kid: impl Into<String>,
        algorithm: Algorithm,
        pem: &[u8],
    ) -> Result<Self, KeyConfigError> {
        let kid = kid.into();
        let family = pinned_family(&kid, algorithm)?;
        let key = match family {
            AlgorithmFamily::Hmac => {
                return Err(KeyConfigError::WrongMaterial {
                    kid,
                    family,
                    expected: "a shared secret",
                })
            }
            AlgorithmFamily::Rsa | AlgorithmFamily::RsaPss => DecodingKey::from_rsa_pem(pem),
            AlgorithmFamily::Ecdsa => DecodingKey::from_ec_pem(pem),
        }
        .map_err(|e| KeyConfigError::InvalidKey {
            kid: kid.clone(),
            reason: e.to_string(),
        })?;

        Ok(Self {
            kid,
            algorithm,
            family,
            key,
        })
    }

    /// Build an entry from its config-file description.
    pub fn from_config(config: &KeyConfig) -> Result<Self, KeyConfigError> {
        let kid = config.kid.clone();
        let algorithm = parse_pinned_algorithm(&kid, &config.algorithm)?;

        let sources = [
            config.secret.is_some(),
            config.secret_base64.is_some(),
            config.public_key_pem.is_some(),
            config.public_key_file.is_some(),
        ];
        if sources.iter().filter(|set| **set).count() != 1 {
            return Err(KeyConfigError::AmbiguousMaterial(kid));
        }

        if let Some(secret) = &config.secret {
            return Self::hmac(kid, algorithm, secret.as_bytes());
        }
        if let Some(encoded) = &config.secret_base64 {
            let secret = STANDARD
                .decode(encoded.trim())
                .map_err(|e| KeyConfigError::InvalidKey {
                    kid: kid.clone(),
                    reason: format!("secret_base64 is not valid base64: {e}"),
                })?;
            return Self::hmac(kid, algorithm, &secret);
        }
        if let Some(pem) = &config.public_key_pem {
            return Self::public_key_pem(kid, algorithm, pem.as_bytes());
        }
        if let Some(path) = &config.public_key_file {
            let pem = std::fs::read(path).map_err(|source| KeyConfigError::Io {
                kid: kid.clone(),
                path: path.clone(),
                source,
            })?;
            return Self::public_key_pem(kid, algorithm, &pem);
        }

        Err(KeyConfigError::AmbiguousMaterial(kid))
    }

    pub fn kid(&self) -> &str {
        &self.kid
    }

    /// The exact algorithm this key verifies.
    pub fn algorithm(&self) -> Algorithm {
        self.algorithm
    }

    pub fn family(&self) -> AlgorithmFamily {
        self.family
    }

    pub(crate) fn decoding_key(&self) -> &DecodingKey {
        &self.key
    }
}

impl fmt::Debug for KeyEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyEntry")
            .field("kid", &self.kid)
            .field("algorithm", &self.algorithm)
            .field("family", &self.family)
            .finish_non_exhaustive()
    }
}

fn parse_pinned_algorithm(kid: &str, name: &str) -> Result<Algorithm, KeyConfigError> {
    if name.trim().eq_ignore_ascii_case("none") {
        return Err(KeyConfigError::AlgorithmNotAllowed {
            kid: kid.to_string(),
            algorithm: name.to_string(),
        });
    }
    Algorithm::from_str(name.trim()).map_err(|_| KeyConfigError::UnknownAlgorithm {
        kid: kid.to_string(),
        algorithm: name.to_string(),
    })
}

fn pinned_family(kid: &str, algorithm: Algorithm) -> Result<AlgorithmFamily, KeyConfigError> {
    AlgorithmFamily::of(algorithm).ok_or_else(|| KeyConfigError::AlgorithmNotAllowed {
        kid: kid.to_string(),
        algorithm: format!("{algorithm:?}"),
    })
}

/// Lookup of verification keys by key identifier.
///
/// Implementations must be safe for unbounded concurrent reads.
pub trait KeyResolver: Send + Sync {
    /// Find the key registered under `kid`.
    fn resolve(&self, kid: &str) -> Option<&KeyEntry>;
}

/// Immutable key table built from configuration.
#[derive(Debug, Clone, Default)]
pub struct StaticKeySet {
    keys: HashMap<String, KeyEntry>,
}

impl StaticKeySet {
    /// Build a key set, rejecting duplicate identifiers.
    pub fn new(entries: Vec<KeyEntry>) -> Result<Self, KeyConfigError> {
        let mut keys = HashMap::with_capacity(entries.len());
        for entry in entries {
            if keys.contains_key(entry.kid()) {
                return Err(KeyConfigError::DuplicateKid(entry.kid));
            }
            keys.insert(entry.kid.clone(), entry);
        }
        Ok(Self { keys })
    }

    pub fn from_config(configs: &[KeyConfig]) -> Result<Self, KeyConfigError> {
        let entries = configs
            .iter()
            .map(KeyEntry::from_config)
            .collect::<Result<Vec<_>, _>>()?;
        Self::new(entries)
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

impl KeyResolver for StaticKeySet {
    fn resolve(&self, kid: &str) -> Option<&KeyEntry> {
        self.keys.get(kid)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::testutil::{EC_PUBLIC_PEM, RSA_PUBLIC_PEM};

    fn key_config(kid: &str, algorithm: &str) -> KeyConfig {
        KeyConfig {
            kid: kid.to_string(),
            algorithm: algorithm.to_string(),
            secret: None,
            secret_base64: None,
            public_key_pem: None,
            public_key_file: None,
        }
    }

    #[test]
    fn test_family_mapping() {
        assert_eq!(AlgorithmFamily::of(Algorithm::HS384), Some(AlgorithmFamily::Hmac));
        assert_eq!(AlgorithmFamily::of(Algorithm::RS512), Some(AlgorithmFamily::Rsa));
        assert_eq!(AlgorithmFamily::of(Algorithm::PS256), Some(AlgorithmFamily::RsaPss));
        assert_eq!(AlgorithmFamily::of(Algorithm::ES384), Some(AlgorithmFamily::Ecdsa));
        assert_eq!(AlgorithmFamily::of(Algorithm::EdDSA), None);
        assert_eq!(AlgorithmFamily::RsaPss.to_string(), "PS");
    }

    #[test]
    fn test_resolve_by_kid() {
        let keys = StaticKeySet::new(vec![
            KeyEntry::hmac("shared", Algorithm::HS256, b"secret").unwrap(),
            KeyEntry::public_key_pem("rsa", Algorithm::RS256, RSA_PUBLIC_PEM.as_bytes()).unwrap(),
            KeyEntry::public_key_pem("ec", Algorithm::ES256, EC_PUBLIC_PEM.as_bytes()).unwrap(),
        ])
        .unwrap();

        assert_eq!(keys.len(), 3);
        let rsa = keys.resolve("rsa").unwrap();
        assert_eq!(rsa.family(), AlgorithmFamily::Rsa);
        assert_eq!(rsa.algorithm(), Algorithm::RS256);
        assert_eq!(keys.resolve("ec").unwrap().family(), AlgorithmFamily::Ecdsa);
        assert!(keys.resolve("missing").is_none());
    }

    #[test]
    fn test_duplicate_kid_rejected() {
        let result = StaticKeySet::new(vec![
            KeyEntry::hmac("k", Algorithm::HS256, b"one").unwrap(),
            KeyEntry::hmac("k", Algorithm::HS512, b"two").unwrap(),
        ]);
        assert!(matches!(result, Err(KeyConfigError::DuplicateKid(kid)) if kid == "k"));
    }

    #[test]
    fn test_material_must_match_family() {
        let result = KeyEntry::hmac("k", Algorithm::RS256, b"secret");
        assert!(matches!(result, Err(KeyConfigError::WrongMaterial { .. })));

        let result = KeyEntry::public_key_pem("k", Algorithm::HS256, RSA_PUBLIC_PEM.as_bytes());
        assert!(matches!(result, Err(KeyConfigError::WrongMaterial { .. })));

        let result = KeyEntry::public_key_pem("k", Algorithm::RS256, b"not a pem");
        assert!(matches!(result, Err(KeyConfigError::InvalidKey { .. })));
    }

    #[test]
    fn test_from_config_sources() {
        let mut config = key_config("plain", "HS256");
        config.secret = Some("s3cr3t".to_string());
        assert_eq!(KeyEntry::from_config(&config).unwrap().kid(), "plain");

        let mut config = key_config("encoded", "HS512");
        config.secret_base64 = Some(STANDARD.encode(b"binary-secret"));
        assert_eq!(
            KeyEntry::from_config(&config).unwrap().algorithm(),
            Algorithm::HS512
        );

        let mut config = key_config("pem", "PS384");
        config.public_key_pem = Some(RSA_PUBLIC_PEM.to_string());
        assert_eq!(
            KeyEntry::from_config(&config).unwrap().family(),
            AlgorithmFamily::RsaPss
        );

        let mut config = key_config("file", "RS256");
        config.public_key_file =
            Some(concat!(env!("CARGO_MANIFEST_DIR"), "/tests/fixtures/rsa_public.pem").to_string());
        assert!(KeyEntry::from_config(&config).is_ok());
    }

    #[test]
    fn test_from_config_rejections() {
        let config = key_config("none-key", "none");
        assert!(matches!(
            KeyEntry::from_config(&config),
            Err(KeyConfigError::AlgorithmNotAllowed { .. })
        ));

        let mut config = key_config("ed", "EdDSA");
        config.public_key_pem = Some(RSA_PUBLIC_PEM.to_string());
        assert!(matches!(
            KeyEntry::from_config(&config),
            Err(KeyConfigError::AlgorithmNotAllowed { .. })
        ));

        let mut config = key_config("bogus", "XY999");
        config.secret = Some("s".to_string());
        assert!(matches!(
            KeyEntry::from_config(&config),
            Err(KeyConfigError::UnknownAlgorithm { .. })
        ));

        let config = key_config("empty", "HS256");
        assert!(matches!(
            KeyEntry::from_config(&config),
            Err(KeyConfigError::AmbiguousMaterial(_))
        ));

        let mut config = key_config("both", "HS256");
        config.secret = Some("a".to_string());
        config.secret_base64 = Some("Yg==".to_string());
        assert!(matches!(
            KeyEntry::from_config(&config),
            Err(KeyConfigError::AmbiguousMaterial(_))
        ));

        let mut config = key_config("missing-file", "RS256");
        config.public_key_file = Some("/nonexistent/key.pem".to_string());
        assert!(matches!(
            KeyEntry::from_config(&config),
            Err(KeyConfigError::Io { .. })
        ));
    }

    #[test]
    fn test_debug_redacts_secrets() {
        let mut config = key_config("k", "HS256");
        config.secret = Some("super-secret-value".to_string());
        let rendered = format!("{config:?}");
        assert!(!rendered.contains("super-secret-value"));
        assert!(rendered.contains("<redacted>"));
    }
}
