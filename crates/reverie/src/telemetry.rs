//! Logging initialization.

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::{fmt, EnvFilter, Registry};

use crate::config::{LogFormat, LoggingConfig};

/// Installs the global subscriber and routes `log` records into it.
///
/// `RUST_LOG` overrides the configured filter. Returns false if a subscriber
/// was already installed; calling it again is harmless.
pub fn init_logging(config: &LoggingConfig) -> bool {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.filter))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let (json_layer, text_layer) = match config.format {
        LogFormat::Json => (Some(fmt::layer().json().with_target(true)), None),
        LogFormat::Text => (None, Some(fmt::layer().with_target(true))),
    };

    let subscriber = Registry::default()
        .with(filter)
        .with(json_layer)
        .with(text_layer);

    let installed = tracing::subscriber::set_global_default(subscriber).is_ok();
    if installed {
        // The store and worker pool log through `log`.
        let _ = tracing_log::LogTracer::init();
    }
    installed
}
