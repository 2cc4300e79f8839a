//! Route definitions for the API.

use axum::{middleware, routing::get, Router};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use utoipa::openapi::security::{
    ApiKey, ApiKeyValue, HttpAuthScheme, HttpBuilder, SecurityScheme,
};
use utoipa::{Modify, OpenApi};
use utoipa_swagger_ui::SwaggerUi;

use crate::api::handlers;
use crate::auth::{require_authentication, DEFAULT_API_KEY_HEADER};
use crate::AppState;

/// Security scheme modifier for OpenAPI.
struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer_auth",
                SecurityScheme::Http(
                    HttpBuilder::new()
                        .scheme(HttpAuthScheme::Bearer)
                        .bearer_format("JWT")
                        .build(),
                ),
            );
            components.add_security_scheme(
                "api_key",
                SecurityScheme::ApiKey(ApiKey::Header(ApiKeyValue::new(DEFAULT_API_KEY_HEADER))),
            );
        }
    }
}

/// OpenAPI documentation.
#[derive(OpenApi)]
#[openapi(
    paths(handlers::health_check, handlers::identity),
    components(schemas(
        crate::api::types::HealthResponse,
        crate::api::types::IdentityResponse,
    )),
    modifiers(&SecurityAddon),
    tags(
        (name = "auth", description = "Authenticated caller endpoints"),
        (name = "health", description = "Health and status endpoints")
    ),
    info(
        title = "Gateway Authentication API",
        version = "0.1.0",
        description = "Token authentication for API gateway requests",
        license(name = "MIT")
    )
)]
pub struct ApiDoc;

/// Build the API router.
///
/// When authentication is enabled the protected routes sit behind the
/// handler chain; otherwise they are served as-is.
pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let mut protected_routes = Router::new().route("/v1/auth/identity", get(handlers::identity));
    if state.auth_enabled {
        protected_routes = protected_routes.layer(middleware::from_fn_with_state(
            state.chain.clone(),
            require_authentication,
        ));
    }

    let public_routes = Router::new()
        .route("/v1/health", get(handlers::health_check))
        .with_state(state);

    Router::new()
        .merge(protected_routes)
        .merge(public_routes)
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .fallback(handlers::not_found)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::{
        ApiKeyHandler, ApiKeyValidator, AuthenticationHandler, ConfiguredApiKey,
        CredentialExtractor, HandlerChain,
    };
    use axum::body::{to_bytes, Body};
    use axum::http::{header::WWW_AUTHENTICATE, Request, StatusCode};
    use tower::ServiceExt;

    fn state(auth_enabled: bool) -> AppState {
        let handler = ApiKeyHandler::new(
            "agents",
            CredentialExtractor::new(ApiKeyHandler::default_location(), None),
            ApiKeyValidator::new(vec![ConfiguredApiKey {
                id: "key-1".to_string(),
                key: "sk-agent".to_string(),
                name: "Agent".to_string(),
                client_id: "agent-1".to_string(),
            }]),
        );
        AppState::new(
            HandlerChain::new(vec![AuthenticationHandler::ApiKey(handler)]),
            auth_enabled,
        )
    }

    async fn send(
        router: Router,
        uri: &str,
        api_key: Option<&str>,
    ) -> (StatusCode, serde_json::Value, Option<String>) {
        let mut request = Request::builder().uri(uri);
        if let Some(key) = api_key {
            request = request.header(DEFAULT_API_KEY_HEADER, key);
        }
        let response = router
            .oneshot(request.body(Body::empty()).unwrap())
            .await
            .unwrap();

        let status = response.status();
        let challenge = response
            .headers()
            .get(WWW_AUTHENTICATE)
            .map(|v| v.to_str().unwrap().to_string());
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body = serde_json::from_slice(&bytes).unwrap_or(serde_json::Value::Null);
        (status, body, challenge)
    }

    #[tokio::test]
    async fn test_health_is_public() {
        crate::logging::init_test();
        let (status, body, _) = send(build_router(state(true)), "/v1/health", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["handlers"][0], "agents");
    }

    #[tokio::test]
    async fn test_identity_requires_credentials() {
        let (status, body, challenge) =
            send(build_router(state(true)), "/v1/auth/identity", None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["code"], "UNAUTHENTICATED");
        assert_eq!(challenge.as_deref(), Some("Bearer"));
    }

    #[tokio::test]
    async fn test_identity_with_api_key() {
        let (status, body, _) =
            send(build_router(state(true)), "/v1/auth/identity", Some("sk-agent")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["handler"], "agents");
        assert_eq!(body["subject"], "agent-1");
    }

    #[tokio::test]
    async fn test_wrong_api_key_rejected() {
        let (status, body, _) =
            send(build_router(state(true)), "/v1/auth/identity", Some("sk-wrong")).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["code"], "INVALID_API_KEY");
    }

    #[tokio::test]
    async fn test_disabled_auth_skips_chain() {
        let (status, body, _) =
            send(build_router(state(false)), "/v1/auth/identity", None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["code"], "UNAUTHORIZED");
    }

    #[tokio::test]
    async fn test_unknown_route() {
        let (status, body, _) = send(build_router(state(true)), "/v1/nope", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["code"], "NOT_FOUND");
    }

    #[test]
    fn test_openapi_document() {
        let doc = ApiDoc::openapi();
        assert!(doc.paths.paths.contains_key("/v1/health"));
        assert!(doc.paths.paths.contains_key("/v1/auth/identity"));
    }
}
