//! Tracing subscriber setup.
//!
//! The filter comes from `RUST_LOG` when set, then from the `logging.filter`
//! config key, then from [`DEFAULT_FILTER`]. Authentication failures are
//! logged at `warn` with a credential fingerprint, never the credential.

use serde::Deserialize;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

pub const DEFAULT_FILTER: &str = "gateway_authn=info,tower_http=info";

/// Output format of the process-wide subscriber.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// One JSON object per event, for log shippers.
    #[default]
    Json,
    /// Multi-line human-readable output for local runs.
    Pretty,
}

/// The `logging` config section.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct LoggingConfig {
    #[serde(default)]
    pub format: LogFormat,
    /// `EnvFilter` directives, e.g. `gateway_authn=debug`.
    #[serde(default)]
    pub filter: Option<String>,
}

fn filter_directives(env: Option<String>, configured: Option<&str>) -> String {
    env.filter(|d| !d.trim().is_empty())
        .or_else(|| {
            configured
                .filter(|d| !d.trim().is_empty())
                .map(str::to_string)
        })
        .unwrap_or_else(|| DEFAULT_FILTER.to_string())
}

/// Install the global subscriber. Call once, before anything logs.
pub fn init(config: &LoggingConfig) {
    let directives = filter_directives(std::env::var("RUST_LOG").ok(), config.filter.as_deref());
    let filter = EnvFilter::try_new(&directives).unwrap_or_else(|e| {
        // No subscriber exists yet to report this through
        eprintln!("Invalid log filter '{directives}' ({e}), using '{DEFAULT_FILTER}'");
        EnvFilter::new(DEFAULT_FILTER)
    });

    let json = (config.format == LogFormat::Json).then(|| {
        tracing_subscriber::fmt::layer()
            .json()
            .with_target(true)
            .with_current_span(true)
            .with_file(true)
            .with_line_number(true)
    });
    let pretty = (config.format == LogFormat::Pretty)
        .then(|| tracing_subscriber::fmt::layer().pretty().with_target(true));

    tracing_subscriber::registry()
        .with(filter)
        .with(json)
        .with(pretty)
        .init();
}

/// Human-readable output captured per test.
#[cfg(test)]
pub(crate) fn init_test() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_env_filter("gateway_authn=debug")
        .try_init();
}
