//! Logging setup built on `tracing-subscriber`.

use tracing::Level;
use tracing_subscriber::{fmt, EnvFilter};

use crate::config::{LogFormat, LoggingConfig};

/// A stderr subscriber filtered by `RUST_LOG`, defaulting to "info".
///
/// Covers the window before the configuration is known; see
/// [`tracing::subscriber::with_default`].
pub fn bootstrap_subscriber() -> impl tracing::Subscriber + Send + Sync {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(Level::INFO.to_string()));

    fmt::Subscriber::builder()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .finish()
}

/// Installs [`bootstrap_subscriber`] globally. Used when the configuration
/// cannot be loaded, and from tests. An already-installed global subscriber
/// is left in place.
pub fn init_minimal_logging() {
    let _ = tracing::subscriber::set_global_default(bootstrap_subscriber());
}

/// Installs the global subscriber described by `config`.
///
/// `RUST_LOG` takes precedence over the configured level. Returns `false`
/// when a global subscriber was already set.
pub fn init_logging(config: &LoggingConfig) -> bool {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.level.to_lowercase()));

    let builder = fmt::Subscriber::builder()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(true);

    let result = match config.format {
        LogFormat::Json => builder.json().with_ansi(false).try_init(),
        LogFormat::Text => builder.try_init(),
    };
    result.is_ok()
}
