//! HTTP request handlers.

use axum::{extract::State, Extension, Json};

use crate::api::types::{HealthResponse, IdentityResponse};
use crate::auth::Principal;
use crate::error::{GatewayError, GatewayResult};
use crate::AppState;

/// Health check endpoint.
///
/// GET /v1/health
#[utoipa::path(
    get,
    path = "/v1/health",
    responses(
        (status = 200, description = "Service is healthy", body = HealthResponse)
    ),
    tag = "health"
)]
pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        timestamp: chrono::Utc::now().to_rfc3339(),
        auth_enabled: state.auth_enabled,
        handlers: state.chain.handler_names().map(str::to_string).collect(),
    })
}

/// Describe the authenticated caller.
///
/// GET /v1/auth/identity
#[utoipa::path(
    get,
    path = "/v1/auth/identity",
    responses(
        (status = 200, description = "Authenticated caller", body = IdentityResponse),
        (status = 401, description = "Not authenticated")
    ),
    security(("bearer_auth" = []), ("api_key" = [])),
    tag = "auth"
)]
pub async fn identity(
    principal: Option<Extension<Principal>>,
) -> GatewayResult<Json<IdentityResponse>> {
    // Absent when authentication is disabled
    let Some(Extension(principal)) = principal else {
        return Err(GatewayError::Unauthorized(
            "No authenticated caller".to_string(),
        ));
    };

    let identity = serde_json::to_value(&principal.identity)
        .map_err(|e| GatewayError::Internal(format!("failed to serialize identity: {e}")))?;

    Ok(Json(IdentityResponse {
        subject: principal.subject().map(str::to_string),
        handler: principal.handler,
        identity,
    }))
}

/// Fallback for unknown routes.
pub async fn not_found() -> GatewayError {
    GatewayError::NotFound("No such route".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::{ApiKeyInfo, HandlerChain, Identity};

    #[tokio::test]
    async fn test_health_lists_handlers() {
        let state = AppState::new(HandlerChain::default(), false);
        let Json(health) = health_check(State(state)).await;
        assert_eq!(health.status, "healthy");
        assert!(!health.auth_enabled);
        assert!(health.handlers.is_empty());
    }

    #[tokio::test]
    async fn test_identity_without_principal() {
        let result = identity(None).await;
        assert!(matches!(result, Err(GatewayError::Unauthorized(_))));
    }

    #[tokio::test]
    async fn test_identity_for_api_key() {
        let principal = Principal {
            handler: "agents".to_string(),
            identity: Identity::ApiKey(ApiKeyInfo {
                key_id: "key-1".to_string(),
                name: "Agent".to_string(),
                client_id: "agent-1".to_string(),
            }),
        };

        let Json(response) = identity(Some(Extension(principal))).await.unwrap();
        assert_eq!(response.handler, "agents");
        assert_eq!(response.subject.as_deref(), Some("agent-1"));
        assert_eq!(response.identity["kind"], "api_key");
        assert_eq!(response.identity["details"]["key_id"], "key-1");
    }
}
