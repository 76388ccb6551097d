//! # gp-observability
//!
//! Logging and metrics bootstrap for Gatepass.

pub mod logging;
pub mod metrics;

pub use logging::{init_logging, init_logging_with_config, LoggingConfig};
pub use self::metrics::install_prometheus_recorder;
