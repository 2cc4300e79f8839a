//! JWT claims and the claim validation policy.

use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

use crate::auth::error::ClaimViolation;

/// The `aud` claim: a single string or a list of strings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Audience {
    Single(String),
    Many(Vec<String>),
}

impl Audience {
    /// Read an `aud` value; non-string array members are skipped and any
    /// other JSON type yields `None`.
    pub fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::String(single) => Some(Audience::Single(single.clone())),
            Value::Array(values) => Some(Audience::Many(
                values
                    .iter()
                    .filter_map(Value::as_str)
                    .map(str::to_string)
                    .collect(),
            )),
            _ => None,
        }
    }

    pub fn contains(&self, audience: &str) -> bool {
        match self {
            Audience::Single(value) => value == audience,
            Audience::Many(values) => values.iter().any(|value| value == audience),
        }
    }
}

/// Decoded JWT payload.
///
/// Registered time claims are integer Unix seconds. `iss` and `aud` stay as
/// raw JSON and are only interpreted when a policy requires them. Claims this
/// gateway does not interpret are kept in `extra` for downstream consumers.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct JwtClaims {
    /// Expiration time.
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "deserialize_numeric_date"
    )]
    pub exp: Option<i64>,
    /// Not before.
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "deserialize_numeric_date"
    )]
    pub nbf: Option<i64>,
    /// Issued at.
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "deserialize_numeric_date"
    )]
    pub iat: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iss: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aud: Option<Value>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl JwtClaims {
    /// The `sub` claim, when it is a string.
    pub fn subject(&self) -> Option<&str> {
        self.extra.get("sub").and_then(Value::as_str)
    }

    /// The `iss` claim, when it is a string.
    pub fn issuer(&self) -> Option<&str> {
        self.iss.as_ref().and_then(Value::as_str)
    }

    pub fn audience(&self) -> Option<Audience> {
        self.aud.as_ref().and_then(Audience::from_value)
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum NumericDate {
    Integer(i64),
    Float(f64),
}

/// NumericDate as integer seconds; fractional values are truncated.
fn deserialize_numeric_date<'de, D>(deserializer: D) -> Result<Option<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<NumericDate>::deserialize(deserializer)? {
        None => Ok(None),
        Some(NumericDate::Integer(seconds)) => Ok(Some(seconds)),
        Some(NumericDate::Float(seconds)) if seconds.is_finite() => {
            Ok(Some(seconds.trunc() as i64))
        }
        Some(NumericDate::Float(_)) => Err(D::Error::custom("numeric date is not finite")),
    }
}

/// Whether a string claim must carry a specific value.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ClaimRequirement {
    /// Skip the check entirely; absence and mismatch both pass.
    #[default]
    Ignore,
    /// The claim must be present and carry this value.
    Require(String),
}

impl From<Option<String>> for ClaimRequirement {
    fn from(value: Option<String>) -> Self {
        match value {
            Some(value) if !value.is_empty() => ClaimRequirement::Require(value),
            _ => ClaimRequirement::Ignore,
        }
    }
}

/// Claim validation rules for one handler. Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationPolicy {
    pub issuer: ClaimRequirement,
    pub audience: ClaimRequirement,
    /// Reject tokens without an `exp` claim.
    pub require_exp: bool,
    /// Tolerance applied to `exp`, `nbf` and `iat`, in seconds.
    pub clock_skew_secs: i64,
}

impl Default for ValidationPolicy {
    fn default() -> Self {
        Self {
            issuer: ClaimRequirement::Ignore,
            audience: ClaimRequirement::Ignore,
            require_exp: true,
            clock_skew_secs: 0,
        }
    }
}

/// Claim validation settings from the config file.
#[derive(Debug, Clone, Deserialize)]
pub struct ValidationConfig {
    /// Required `iss`; unset means ignore.
    #[serde(default)]
    pub issuer: Option<String>,
    /// Required `aud` member; unset means ignore.
    #[serde(default)]
    pub audience: Option<String>,
    #[serde(default = "default_require_exp")]
    pub require_exp: bool,
    #[serde(default)]
    pub clock_skew_secs: u32,
}

fn default_require_exp() -> bool {
    true
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            issuer: None,
            audience: None,
            require_exp: true,
            clock_skew_secs: 0,
        }
    }
}

impl From<&ValidationConfig> for ValidationPolicy {
    fn from(config: &ValidationConfig) -> Self {
        Self {
            issuer: config.issuer.clone().into(),
            audience: config.audience.clone().into(),
            require_exp: config.require_exp,
            clock_skew_secs: i64::from(config.clock_skew_secs),
        }
    }
}

/// Check registered claims against `policy` at time `now` (Unix seconds).
///
/// Order: `exp`, `nbf`, `iat`, `iss`, `aud`; the first violation is returned.
pub fn validate_claims(
    claims: &JwtClaims,
    policy: &ValidationPolicy,
    now: i64,
) -> Result<(), ClaimViolation> {
    let skew = policy.clock_skew_secs.max(0);

    match claims.exp {
        Some(exp) if exp < now.saturating_sub(skew) => {
            return Err(ClaimViolation::Expired { exp, now });
        }
        None if policy.require_exp => return Err(ClaimViolation::MissingExpiration),
        _ => {}
    }

    if let Some(nbf) = claims.nbf {
        if nbf > now.saturating_add(skew) {
            return Err(ClaimViolation::NotYetValid { nbf, now });
        }
    }

    if let Some(iat) = claims.iat {
        if iat > now.saturating_add(skew) {
            return Err(ClaimViolation::IssuedInFuture { iat, now });
        }
    }

    if let ClaimRequirement::Require(expected) = &policy.issuer {
        match &claims.iss {
            None => return Err(ClaimViolation::MissingIssuer),
            Some(Value::String(found)) if found == expected => {}
            Some(Value::String(found)) => {
                return Err(ClaimViolation::IssuerMismatch {
                    found: found.clone(),
                });
            }
            Some(other) => {
                return Err(ClaimViolation::IssuerMismatch {
                    found: other.to_string(),
                });
            }
        }
    }

    if let ClaimRequirement::Require(expected) = &policy.audience {
        let Some(aud) = &claims.aud else {
            return Err(ClaimViolation::MissingAudience);
        };
        if !Audience::from_value(aud).is_some_and(|aud| aud.contains(expected)) {
            return Err(ClaimViolation::AudienceMismatch);
        }
    }

    Ok(())
}
