//! Integration tests for logging system

use bridge_traits::time::LogLevel;
use core_runtime::logging::{init_logging, LogFormat, LoggingConfig};
use core_runtime::Error;

#[test]
fn test_logging_config_from_builder() {
    let config = LoggingConfig::default()
        .with_format(LogFormat::Json)
        .with_level(LogLevel::Debug)
        .with_spans(true);

    assert_eq!(config.format, LogFormat::Json);
    assert_eq!(config.level, LogLevel::Debug);
    assert!(config.enable_spans);
    assert!(config.logger_sink.is_none());
}

#[test]
fn test_debug_output_hides_sink() {
    let config = LoggingConfig::default();
    let rendered = format!("{:?}", config);
    assert!(rendered.contains("logger_sink: false"));
}

#[test]
fn test_init_logging_only_once() {
    // The global subscriber can only be installed once per process.
    let first = init_logging(LoggingConfig::default().with_format(LogFormat::Compact));
    assert!(first.is_ok());

    tracing::info!(folder_id = "root", "logging initialized");

    let second = init_logging(LoggingConfig::default());
    assert!(matches!(second, Err(Error::Config(_))));
}

#[test]
fn test_invalid_filter_fails_before_install() {
    let result = init_logging(LoggingConfig::default().with_filter("core_sync=loud"));
    assert!(matches!(result, Err(Error::Config(msg)) if msg.contains("Invalid log filter")));
}
