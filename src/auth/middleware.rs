//! Authentication middleware for axum.

use std::sync::Arc;

use axum::{
    body::Body,
    extract::{Request, State},
    http::{header::WWW_AUTHENTICATE, HeaderValue, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use tracing::Instrument;

use crate::auth::chain::HandlerChain;
use crate::auth::error::AuthError;

/// Error response for authentication failures.
///
/// Carries only the generic client message; the specific failure stays in
/// server-side logs.
#[derive(Debug, Serialize)]
pub struct AuthRejection {
    pub error: String,
    pub code: String,
}

impl From<&AuthError> for AuthRejection {
    fn from(err: &AuthError) -> Self {
        Self {
            error: err.client_message().to_string(),
            code: err.code().to_string(),
        }
    }
}

impl IntoResponse for AuthRejection {
    fn into_response(self) -> Response {
        let mut response = (StatusCode::UNAUTHORIZED, Json(self)).into_response();
        response
            .headers_mut()
            .insert(WWW_AUTHENTICATE, HeaderValue::from_static("Bearer"));
        response
    }
}

/// Run the handler chain; reject with `401` unless a handler succeeds.
///
/// On success the [`crate::auth::Principal`] is in the request extensions
/// for downstream handlers.
pub async fn require_authentication(
    State(chain): State<Arc<HandlerChain>>,
    mut request: Request<Body>,
    next: Next,
) -> Result<Response, AuthRejection> {
    let attempt_id = uuid::Uuid::new_v4();
    let span = tracing::info_span!(
        "authenticate",
        %attempt_id,
        method = %request.method(),
        path = %request.uri().path()
    );

    match chain.authenticate(&mut request).instrument(span).await {
        Ok(handler) => {
            tracing::debug!(%attempt_id, handler = %handler, "Request authenticated");
            Ok(next.run(request).await)
        }
        Err(e) => {
            tracing::info!(%attempt_id, kind = e.kind(), "Request rejected");
            Err(AuthRejection::from(&e))
        }
    }
}
