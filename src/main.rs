//! Gateway authentication service.
//!
//! Serves a small API behind the token authentication chain.

use tokio::net::TcpListener;

use gateway_authn::api::build_router;
use gateway_authn::auth::HandlerChain;
use gateway_authn::config::Config;
use gateway_authn::{logging, AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // A missing .env is expected in production
    if let Err(e) = dotenvy::dotenv() {
        eprintln!("Note: No .env file loaded ({e})");
    }

    // Logging settings live in the config, so errors here go to stderr
    let config = Config::load().map_err(|e| {
        eprintln!("Failed to load configuration: {e}");
        anyhow::anyhow!("Configuration error: {}", e)
    })?;

    logging::init(&config.logging);

    tracing::info!("Starting gateway-authn v{}", env!("CARGO_PKG_VERSION"));
    tracing::info!(
        host = %config.server.host,
        port = %config.server.port,
        auth_enabled = %config.auth.enabled,
        keys = config.auth.keys.len(),
        handlers = config.auth.handlers.len(),
        "Configuration loaded"
    );

    let chain = HandlerChain::from_config(&config.auth).map_err(|e| {
        tracing::error!(error = %e, "Failed to build authentication handlers");
        anyhow::anyhow!("Authentication setup error: {}", e)
    })?;

    if !config.auth.enabled {
        tracing::warn!("Authentication is DISABLED - enable for production");
    } else if chain.is_empty() {
        tracing::warn!("No authentication handlers configured; protected routes reject everything");
    }

    let app = build_router(AppState::new(chain, config.auth.enabled));

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = TcpListener::bind(&addr).await?;

    tracing::info!(address = %addr, "Server listening");
    tracing::info!("Swagger UI available at http://{}/swagger-ui/", addr);

    axum::serve(listener, app).await?;

    Ok(())
}
