//! Remote token introspection (RFC 7662) for opaque tokens.
//!
//! The remote authority owns the lifetime of opaque tokens, so results are
//! never cached here and failed calls are never retried.

use std::fmt;
use std::time::Duration;

use reqwest::{header::ACCEPT, Client, Url};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::auth::error::IntrospectionError;
use crate::error::{GatewayError, GatewayResult};

const DEFAULT_TIMEOUT_MS: u64 = 5_000;

/// Introspection endpoint settings from the config file.
#[derive(Clone, Deserialize)]
pub struct IntrospectionConfig {
    /// Absolute URL of the introspection endpoint.
    pub endpoint: String,
    /// Client credentials sent with HTTP Basic authentication.
    #[serde(default)]
    pub client_id: Option<String>,
    #[serde(default)]
    pub client_secret: Option<String>,
    /// Optional `token_type_hint` form field.
    #[serde(default)]
    pub token_type_hint: Option<String>,
    /// Deadline for one introspection call, in milliseconds.
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
}

fn default_timeout_ms() -> u64 {
    DEFAULT_TIMEOUT_MS
}

impl fmt::Debug for IntrospectionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IntrospectionConfig")
            .field("endpoint", &self.endpoint)
            .field("client_id", &self.client_id)
            .field(
                "client_secret",
                &self.client_secret.as_ref().map(|_| "<redacted>"),
            )
            .field("token_type_hint", &self.token_type_hint)
            .field("timeout_ms", &self.timeout_ms)
            .finish()
    }
}

/// Introspection answer.
///
/// Only a literal `"active": true` counts as active. Members of an
/// unexpected type are dropped rather than failing the whole answer.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct IntrospectionResponse {
    pub active: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sub: Option<String>,
    /// Space-separated; an array of strings is joined.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exp: Option<i64>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl IntrospectionResponse {
    pub fn inactive() -> Self {
        Self::default()
    }
}

impl From<Map<String, Value>> for IntrospectionResponse {
    fn from(mut fields: Map<String, Value>) -> Self {
        let mut string = |name: &str| match fields.remove(name) {
            Some(Value::String(value)) => Some(value),
            _ => None,
        };
        let sub = string("sub");
        let client_id = string("client_id");
        let username = string("username");

        Self {
            active: matches!(fields.remove("active"), Some(Value::Bool(true))),
            sub,
            scope: fields.remove("scope").and_then(scope),
            client_id,
            username,
            exp: fields.remove("exp").as_ref().and_then(numeric_date),
            extra: fields,
        }
    }
}

fn scope(value: Value) -> Option<String> {
    match value {
        Value::String(scope) => Some(scope),
        Value::Array(items) => {
            let scopes: Vec<&str> = items.iter().filter_map(Value::as_str).collect();
            (!scopes.is_empty()).then(|| scopes.join(" "))
        }
        _ => None,
    }
}

fn numeric_date(value: &Value) -> Option<i64> {
    value.as_i64().or_else(|| {
        value
            .as_f64()
            .filter(|seconds| seconds.is_finite())
            .map(|seconds| seconds.trunc() as i64)
    })
}

/// RFC 7662 error body on non-2xx responses.
#[derive(Debug, Deserialize)]
struct IntrospectionErrorBody {
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    error_description: Option<String>,
}

/// Client for one introspection endpoint.
#[derive(Clone)]
pub struct IntrospectionClient {
    client: Client,
    endpoint: Url,
    credentials: Option<(String, String)>,
    token_type_hint: Option<String>,
    timeout: Duration,
}

impl IntrospectionClient {
    /// Build a client from configuration.
    ///
    /// # Errors
    ///
    /// `GatewayError::Config` for an invalid endpoint or half-specified client
    /// credentials; `GatewayError::Internal` if the HTTP client cannot be built.
    pub fn new(config: &IntrospectionConfig) -> GatewayResult<Self> {
        let endpoint = Url::parse(&config.endpoint).map_err(|e| {
            GatewayError::Config(format!(
                "invalid introspection endpoint '{}': {e}",
                config.endpoint
            ))
        })?;
        if !matches!(endpoint.scheme(), "http" | "https") {
            return Err(GatewayError::Config(format!(
                "introspection endpoint must be http(s): {}",
                config.endpoint
            )));
        }

        let credentials = match (&config.client_id, &config.client_secret) {
            (Some(id), Some(secret)) => Some((id.clone(), secret.clone())),
            (None, None) => None,
            _ => {
                return Err(GatewayError::Config(
                    "introspection client_id and client_secret must be set together".to_string(),
                ))
            }
        };

        let timeout = Duration::from_millis(config.timeout_ms.max(1));
        let client = Client::builder()
            .timeout(timeout)
            .connect_timeout(timeout)
            .build()
            .map_err(|e| GatewayError::Internal(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self {
            client,
            endpoint,
            credentials,
            token_type_hint: config.token_type_hint.clone(),
            timeout,
        })
    }

    /// Deadline applied to a single call.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Ask the authority whether `token` is active.
    ///
    /// Non-2xx answers are inactive. Transport failures and timeouts are
    /// errors, as is a 2xx body that is not a JSON object.
    #[tracing::instrument(skip_all, fields(endpoint = %self.endpoint))]
    pub async fn introspect(
        &self,
        token: &str,
    ) -> Result<IntrospectionResponse, IntrospectionError> {
        let mut form = vec![("token", token)];
        if let Some(hint) = &self.token_type_hint {
            form.push(("token_type_hint", hint.as_str()));
        }

        let mut request = self
            .client
            .post(self.endpoint.clone())
            .header(ACCEPT, "application/json")
            .form(&form);
        if let Some((id, secret)) = &self.credentials {
            request = request.basic_auth(id, Some(secret));
        }

        let response = request.send().await.map_err(|e| {
            tracing::warn!(error = %e, "Introspection request failed");
            IntrospectionError::from(e)
        })?;

        let status = response.status();
        let body = response.bytes().await.map_err(IntrospectionError::from)?;

        if !status.is_success() {
            let detail = serde_json::from_slice::<IntrospectionErrorBody>(&body).ok();
            tracing::warn!(
                status = status.as_u16(),
                error = ?detail.as_ref().and_then(|d| d.error.as_deref()),
                description = ?detail.as_ref().and_then(|d| d.error_description.as_deref()),
                "Introspection endpoint rejected the request, treating token as inactive"
            );
            return Ok(IntrospectionResponse::inactive());
        }

        let value: Value = serde_json::from_slice(&body).map_err(|e| {
            tracing::warn!(error = %e, "Introspection response is not valid JSON");
            IntrospectionError::InvalidResponse(e.to_string())
        })?;
        let Value::Object(fields) = value else {
            tracing::warn!("Introspection response is not a JSON object");
            return Err(IntrospectionError::InvalidResponse(
                "expected a JSON object".to_string(),
            ));
        };
        let parsed = IntrospectionResponse::from(fields);

        tracing::debug!(active = parsed.active, "Introspection complete");
        Ok(parsed)
    }
}

impl fmt::Debug for IntrospectionClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IntrospectionClient")
            .field("endpoint", &self.endpoint.as_str())
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}
