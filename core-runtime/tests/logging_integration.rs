//! Integration tests for logging system

use async_trait::async_trait;
use bridge_traits::error::Result as BridgeResult;
use bridge_traits::time::{LogEntry, LogLevel, LoggerSink};
use core_runtime::logging::{init_logging, redact_if_sensitive, LogFormat, LoggingConfig};
use std::sync::Arc;

/// Sink that only accepts errors and discards them.
struct ErrorsOnly;

#[async_trait]
impl LoggerSink for ErrorsOnly {
    async fn log(&self, _entry: LogEntry) -> BridgeResult<()> {
        Ok(())
    }

    fn min_level(&self) -> LogLevel {
        LogLevel::Error
    }
}

#[test]
fn test_init_logging_once_per_process() {
    let config = LoggingConfig::default()
        .with_format(LogFormat::Compact)
        .with_level(LogLevel::Warn)
        .with_logger_sink(Arc::new(ErrorsOnly));

    assert!(init_logging(config.clone()).is_ok());
    // The global subscriber is already installed.
    assert!(init_logging(config).is_err());

    tracing::warn!(target: "core_sync", "Base asset fetch failed");
}

#[test]
fn test_credential_fields_are_redacted() {
    assert_eq!(redact_if_sensitive("api_key", "sk-live-123"), "[REDACTED]");
    assert_eq!(redact_if_sensitive("bearer_token", "abc"), "[REDACTED]");
    assert_eq!(redact_if_sensitive("target_dir", "Snipd"), "Snipd");
}

#[test]
fn test_default_format_follows_build_profile() {
    #[cfg(debug_assertions)]
    assert_eq!(LoggingConfig::default().format, LogFormat::Pretty);

    #[cfg(not(debug_assertions))]
    assert_eq!(LoggingConfig::default().format, LogFormat::Json);
}
