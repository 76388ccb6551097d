//! Structured logging via the tracing ecosystem.

use tracing::Level;
use tracing_subscriber::{
    fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter,
};

/// Logging configuration.
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    /// Log level applied to the gatepass crates when RUST_LOG is unset.
    pub level: Level,
    /// Emit JSON lines instead of human-readable output.
    pub json_format: bool,
    /// Include file/line info.
    pub include_location: bool,
    /// Include target (module path).
    pub include_target: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: Level::INFO,
            json_format: false,
            include_location: false,
            include_target: true,
        }
    }
}

impl LoggingConfig {
    /// Verbose development configuration.
    pub fn development() -> Self {
        Self {
            level: Level::DEBUG,
            json_format: false,
            include_location: true,
            include_target: true,
        }
    }

    /// JSON configuration for production log shipping.
    pub fn production() -> Self {
        Self {
            level: Level::INFO,
            json_format: true,
            include_location: false,
            include_target: true,
        }
    }
}

/// Initializes logging with the default configuration.
pub fn init_logging() {
    init_logging_with_config(LoggingConfig::default());
}

/// Initializes logging. `RUST_LOG` overrides the configured level.
pub fn init_logging_with_config(config: LoggingConfig) {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!(
            "gp_core={},gp_api={},gp_cli={},gp_observability={}",
            config.level, config.level, config.level, config.level
        ))
    });

    if config.json_format {
        let fmt_layer = fmt::layer()
            .json()
            .with_file(config.include_location)
            .with_line_number(config.include_location)
            .with_target(config.include_target);

        tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt_layer)
            .init();
    } else {
        let fmt_layer = fmt::layer()
            .with_file(config.include_location)
            .with_line_number(config.include_location)
            .with_target(config.include_target);

        tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt_layer)
            .init();
    }
}
