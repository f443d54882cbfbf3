use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::LogMode;

/// Initialize tracing/logging for the application.
///
/// `development` keeps the human-readable fmt output; `production` switches
/// to JSON lines. The filter honors `RUST_LOG` and defaults to `info`.
pub fn init_telemetry(mode: LogMode) {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let registry = tracing_subscriber::registry().with(env_filter);

    let result = match mode {
        LogMode::Production => registry
            .with(tracing_subscriber::fmt::layer().json().with_target(true))
            .try_init(),
        LogMode::Development => registry
            .with(
                tracing_subscriber::fmt::layer()
                    .with_target(true)
                    .with_level(true),
            )
            .try_init(),
    };

    // try_init fails only when a subscriber is already installed, which
    // happens in tests that initialize repeatedly.
    if let Err(e) = result {
        eprintln!("telemetry already initialized: {e}");
    }
}
