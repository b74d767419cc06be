//! Logging initialization
//!
//! Structured logging via `tracing`. The configured level seeds the env
//! filter; `RUST_LOG` still wins when set so operators can raise
//! verbosity per module without touching the config file.

use tracing_subscriber::EnvFilter;

use crate::config::LoggingConfig;

pub fn init(config: &LoggingConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.level.to_lowercase()));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .init();
}
