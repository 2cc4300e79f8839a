//! HTTP API layer.
//!
//! Exposes a health endpoint and an identity endpoint guarded by the
//! authentication chain.

pub mod handlers;
mod routes;
mod types;

pub use routes::{build_router, ApiDoc};
pub use types::{HealthResponse, IdentityResponse};
