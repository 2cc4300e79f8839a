//! Gateway token authentication.
//!
//! Authenticates inbound API requests with JWTs verified against a static
//! key table, opaque tokens checked by RFC 7662 introspection, and static
//! API keys, evaluated by an ordered handler chain.

use std::sync::Arc;

pub mod api;
pub mod auth;
pub mod config;
pub mod error;
pub mod logging;

use crate::auth::HandlerChain;

/// Application state shared across handlers.
#[derive(Debug, Clone)]
pub struct AppState {
    /// Configured authentication handlers.
    pub chain: Arc<HandlerChain>,
    /// Whether protected routes run the chain.
    pub auth_enabled: bool,
}

impl AppState {
    pub fn new(chain: HandlerChain, auth_enabled: bool) -> Self {
        Self {
            chain: Arc::new(chain),
            auth_enabled,
        }
    }
}
