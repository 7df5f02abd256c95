//! Structured logging for the cache layer
//!
//! This module provides structured logging using the `tracing` crate,
//! initialized once from the logging section of the configuration.

use crate::config::{LogLevel, LoggingConfig};
use std::sync::Once;
use tracing::Level;
use tracing_subscriber::fmt::time::UtcTime;

static INIT: Once = Once::new();

/// Initialize the logging system based on configuration
pub fn init_logging(config: &LoggingConfig) {
    INIT.call_once(|| {
        init_logging_inner(config);
    });
}

fn init_logging_inner(config: &LoggingConfig) {
    let level = convert_log_level(config.level);

    let builder = tracing_subscriber::fmt()
        .with_target(true)
        .with_file(config.with_location)
        .with_line_number(config.with_location)
        .with_timer(UtcTime::rfc_3339())
        .with_max_level(level);

    if config.console {
        let _ = builder.try_init();
    } else {
        let _ = builder.with_writer(std::io::sink).try_init();
    }
}

fn convert_log_level(level: LogLevel) -> Level {
    match level {
        LogLevel::Error => Level::ERROR,
        LogLevel::Warn => Level::WARN,
        LogLevel::Info => Level::INFO,
        LogLevel::Debug => Level::DEBUG,
        LogLevel::Trace => Level::TRACE,
    }
}
