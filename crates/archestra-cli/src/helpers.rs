//! Shared helper functions used across CLI subcommands.

use tracing_subscriber::EnvFilter;

/// Initialize the tracing subscriber with the given default log level.
///
/// Honours `RUST_LOG` when set; falls back to JSON formatting when
/// `ARCHESTRA_LOG_FORMAT=json`, otherwise compact human-readable output.
pub fn init_tracing(default_level: &str) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    let json = std::env::var("ARCHESTRA_LOG_FORMAT")
        .map(|v| v == "json")
        .unwrap_or(false);

    if json {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .compact()
            .init();
    }
}
