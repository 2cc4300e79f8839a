//! API response types.

use serde::Serialize;
use utoipa::ToSchema;

/// Health check response.
#[derive(Debug, Serialize, ToSchema)]
pub struct HealthResponse {
    /// Service status.
    pub status: String,
    /// Service version.
    pub version: String,
    /// Current server time (RFC 3339).
    pub timestamp: String,
    /// Whether protected routes require authentication.
    pub auth_enabled: bool,
    /// Configured authentication handlers, in evaluation order.
    pub handlers: Vec<String>,
}

/// The caller as seen by the gateway after authentication.
#[derive(Debug, Serialize, ToSchema)]
pub struct IdentityResponse {
    /// Handler that accepted the credential.
    pub handler: String,
    /// Subject of the credential, if it names one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subject: Option<String>,
    /// Verified claims, introspection answer or API key details.
    #[schema(value_type = Object)]
    pub identity: serde_json::Value,
}
