//! Token authentication core.
//!
//! Provides the pieces a gateway chains together to authenticate requests:
//! - Credential extraction and JWT/opaque classification
//! - A static key table with per-key algorithm pinning
//! - JWT verification with configurable claim validation
//! - RFC 7662 introspection for opaque tokens
//! - Token and API key handlers with a tri-state outcome, and the chain
//!   driver and axum middleware that walk them

mod api_key;
mod chain;
mod claims;
mod error;
mod extractor;
mod handler;
mod introspection;
mod jwt;
mod keys;
mod middleware;

#[cfg(test)]
pub(crate) mod testutil;

pub use api_key::*;
pub use chain::*;
pub use claims::*;
pub use error::*;
pub use extractor::*;
pub use handler::*;
pub use introspection::*;
pub use jwt::*;
pub use keys::*;
pub use middleware::*;
