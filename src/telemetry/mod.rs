//! Tracing initialization.
//!
//! Log level is controlled with `RUST_LOG`; the output format (text or JSON)
//! comes from the `log` section of the settings.

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::LogConfig;

/// Initialize the global tracing subscriber.
///
/// Must be called once, before anything logs. Subsequent calls would panic,
/// which is why tests use their own subscriber instead of this.
pub fn init_tracing(config: &LogConfig) {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    if config.json {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }
}
