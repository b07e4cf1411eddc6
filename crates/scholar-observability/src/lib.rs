//! # scholar-observability
//!
//! Logging and metrics set-up for Scholar.
//!
//! Binaries call [`init_logging_with_config`] once at start-up and, when the
//! `/metrics` endpoint is wanted, [`install_prometheus`] to get the handle the
//! API renders from.

pub mod logging;
pub mod metrics;

use thiserror::Error;

pub use logging::{init_logging, init_logging_with_config, LogFormat, LoggingConfig};
pub use metrics::{describe_metrics, install_prometheus, record_pool_stats};

/// Errors raised while setting up observability.
#[derive(Error, Debug)]
pub enum ObservabilityError {
    #[error("Unknown log level: {0}")]
    InvalidLevel(String),

    #[error("Unknown log format: {0}")]
    InvalidFormat(String),

    #[error("Failed to install log subscriber: {0}")]
    Subscriber(String),

    #[error("Failed to install metrics recorder: {0}")]
    Recorder(String),
}
