//! Tracing subscriber setup.
//!
//! `RUST_LOG` overrides the default filter. Without it the filter is
//! `info`, or `warn` when the mailer runs silent.

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::{LogFormat, LoggingConfig};

/// Default filter directive when `RUST_LOG` is unset
pub fn default_directive(config: &LoggingConfig, silent: bool) -> String {
    match &config.level {
        Some(level) => level.clone(),
        None if silent => "warn".to_string(),
        None => "info".to_string(),
    }
}

/// Install the global subscriber.
///
/// Fails if a subscriber is already installed.
pub fn init_tracing(
    config: &LoggingConfig,
    silent: bool,
) -> Result<(), tracing_subscriber::util::TryInitError> {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directive(config, silent)));

    match config.format {
        LogFormat::Pretty => tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer())
            .try_init(),
        LogFormat::Json => tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().json())
            .try_init(),
    }
}
