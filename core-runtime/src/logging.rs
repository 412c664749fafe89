//! # Logging
//!
//! Installs the process-wide `tracing` subscriber for the sync engine:
//! an `EnvFilter`, one fmt layer in the chosen [`LogFormat`] and, when the
//! host supplies one, a layer mirroring every event into its [`LoggerSink`].
//!
//! ```ignore
//! use core_runtime::logging::{init_logging, LoggingConfig};
//!
//! // SNIP_SYNC_LOG=core_sync=trace SNIP_SYNC_LOG_FORMAT=json
//! init_logging(LoggingConfig::from_env().with_logger_sink(host_console))?;
//! tracing::info!(batch_index = 0, "Processing batch");
//! ```
//!
//! Fields whose name looks like a credential are redacted before they reach
//! the sink; see [`redact_if_sensitive`].

use crate::error::{Error, Result};

use bridge_traits::time::{LogEntry, LogLevel, LoggerSink};
use core_async::runtime;

use std::collections::HashMap;
use std::fmt;
use std::io;
use std::str::FromStr;
use std::sync::Arc;

use tracing::field::{Field, Visit};
use tracing::{Event, Subscriber};
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::layer::{Context, SubscriberExt};
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

/// Environment variable holding a full filter directive.
pub const LOG_FILTER_ENV: &str = "SNIP_SYNC_LOG";
/// Environment variable selecting `pretty`, `json` or `compact`.
pub const LOG_FORMAT_ENV: &str = "SNIP_SYNC_LOG_FORMAT";

const ENGINE_TARGETS: &[&str] = &[
    "snip_sync_workspace",
    "core_runtime",
    "core_sync",
    "core_service",
    "bridge_desktop",
];

const NOISY_DEPENDENCIES: &[&str] = &["h2", "hyper", "hyper_util", "reqwest", "rustls", "sqlx"];

const REDACTED: &str = "[REDACTED]";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    /// Multi-line, colored. Default in debug builds.
    Pretty,
    /// One JSON object per event. Default in release builds.
    Json,
    Compact,
}

impl Default for LogFormat {
    fn default() -> Self {
        if cfg!(debug_assertions) {
            Self::Pretty
        } else {
            Self::Json
        }
    }
}

impl FromStr for LogFormat {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pretty" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            "compact" => Ok(Self::Compact),
            other => Err(Error::Config(format!("Unknown log format '{}'", other))),
        }
    }
}

#[derive(Clone)]
pub struct LoggingConfig {
    pub format: LogFormat,
    /// Level applied to the engine crates; dependencies stay at `warn`.
    pub level: LogLevel,
    /// Replaces the generated directive entirely when set.
    pub filter: Option<String>,
    pub logger_sink: Option<Arc<dyn LoggerSink>>,
    /// Log span open/close (pretty/compact) or attach span context (json).
    pub enable_spans: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            format: LogFormat::default(),
            level: LogLevel::Info,
            filter: None,
            logger_sink: None,
            enable_spans: false,
        }
    }
}

impl fmt::Debug for LoggingConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoggingConfig")
            .field("format", &self.format)
            .field("level", &self.level)
            .field("filter", &self.filter)
            .field("has_logger_sink", &self.logger_sink.is_some())
            .field("enable_spans", &self.enable_spans)
            .finish()
    }
}

impl LoggingConfig {
    /// Defaults overridden by [`LOG_FILTER_ENV`] and [`LOG_FORMAT_ENV`].
    /// An unparseable format is ignored with a note on stderr.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Ok(filter) = std::env::var(LOG_FILTER_ENV) {
            if !filter.trim().is_empty() {
                config.filter = Some(filter);
            }
        }
        if let Ok(format) = std::env::var(LOG_FORMAT_ENV) {
            match format.parse() {
                Ok(format) => config.format = format,
                Err(e) => eprintln!("{}: {}", LOG_FORMAT_ENV, e),
            }
        }
        config
    }

    pub fn with_format(mut self, format: LogFormat) -> Self {
        self.format = format;
        self
    }

    pub fn with_level(mut self, level: LogLevel) -> Self {
        self.level = level;
        self
    }

    pub fn with_filter(mut self, filter: impl Into<String>) -> Self {
        self.filter = Some(filter.into());
        self
    }

    pub fn with_logger_sink(mut self, sink: Arc<dyn LoggerSink>) -> Self {
        self.logger_sink = Some(sink);
        self
    }

    pub fn with_spans(mut self, enable: bool) -> Self {
        self.enable_spans = enable;
        self
    }

    fn directive(&self) -> String {
        if let Some(custom) = &self.filter {
            return custom.clone();
        }
        let level = level_name(self.level);
        let engine = ENGINE_TARGETS.iter().map(|t| format!("{t}={level}"));
        let quiet = NOISY_DEPENDENCIES.iter().map(|t| format!("{t}=warn"));
        std::iter::once("warn".to_string())
            .chain(engine)
            .chain(quiet)
            .collect::<Vec<_>>()
            .join(",")
    }
}

/// Installs the global subscriber. A second call fails with [`Error::Config`].
pub fn init_logging(config: LoggingConfig) -> Result<()> {
    let filter = build_filter(&config)?;

    tracing_subscriber::registry()
        .with(filter)
        .with(LoggerSinkLayer::new(config.logger_sink.clone()))
        .with(fmt_layer(&config))
        .try_init()
        .map_err(|e| Error::Config(format!("Failed to initialize logging: {}", e)))
}

fn build_filter(config: &LoggingConfig) -> Result<EnvFilter> {
    EnvFilter::try_new(config.directive())
        .map_err(|e| Error::Config(format!("Invalid log filter: {}", e)))
}

fn fmt_layer<S>(config: &LoggingConfig) -> Box<dyn Layer<S> + Send + Sync>
where
    S: Subscriber + for<'a> LookupSpan<'a>,
{
    let span_events = if config.enable_spans {
        FmtSpan::NEW | FmtSpan::CLOSE
    } else {
        FmtSpan::NONE
    };

    match config.format {
        LogFormat::Pretty => tracing_subscriber::fmt::layer()
            .pretty()
            .with_span_events(span_events)
            .with_writer(io::stdout)
            .boxed(),
        LogFormat::Json => tracing_subscriber::fmt::layer()
            .json()
            .flatten_event(true)
            .with_current_span(config.enable_spans)
            .with_span_list(false)
            .with_writer(io::stdout)
            .boxed(),
        LogFormat::Compact => tracing_subscriber::fmt::layer()
            .compact()
            .with_span_events(span_events)
            .with_writer(io::stdout)
            .boxed(),
    }
}

fn level_name(level: LogLevel) -> &'static str {
    match level {
        LogLevel::Trace => "trace",
        LogLevel::Debug => "debug",
        LogLevel::Info => "info",
        LogLevel::Warn => "warn",
        LogLevel::Error => "error",
    }
}

fn log_level(level: &tracing::Level) -> LogLevel {
    match *level {
        tracing::Level::TRACE => LogLevel::Trace,
        tracing::Level::DEBUG => LogLevel::Debug,
        tracing::Level::INFO => LogLevel::Info,
        tracing::Level::WARN => LogLevel::Warn,
        tracing::Level::ERROR => LogLevel::Error,
    }
}

// ============================================================================
// Host sink forwarding
// ============================================================================

struct LoggerSinkLayer {
    sink: Option<Arc<dyn LoggerSink>>,
}

impl LoggerSinkLayer {
    fn new(sink: Option<Arc<dyn LoggerSink>>) -> Self {
        Self { sink }
    }

    fn deliver(sink: Arc<dyn LoggerSink>, entry: LogEntry) {
        if let Ok(handle) = runtime::Handle::try_current() {
            handle.spawn(async move {
                if let Err(e) = sink.log(entry).await {
                    eprintln!("LoggerSink error: {}", e);
                }
            });
            return;
        }

        match runtime::block_on(async move { sink.log(entry).await }) {
            Ok(Ok(())) => {}
            Ok(Err(e)) => eprintln!("LoggerSink error: {}", e),
            Err(e) => eprintln!("LoggerSink unavailable outside a runtime: {}", e),
        }
    }
}

impl<S> Layer<S> for LoggerSinkLayer
where
    S: Subscriber + for<'a> LookupSpan<'a>,
{
    fn on_event(&self, event: &Event<'_>, ctx: Context<'_, S>) {
        let Some(sink) = self.sink.as_ref() else {
            return;
        };

        let metadata = event.metadata();
        let level = log_level(metadata.level());
        if level < sink.min_level() {
            return;
        }

        let mut fields = FieldCollector::default();
        event.record(&mut fields);

        let message = fields
            .message
            .take()
            .unwrap_or_else(|| metadata.name().to_string());
        let mut entry = LogEntry::new(level, metadata.target(), message);
        entry.fields = fields.redacted();
        if let Some(span) = ctx.lookup_current() {
            entry = entry.in_span(span.name());
        }

        Self::deliver(Arc::clone(sink), entry);
    }
}

/// Flattens an event's fields into strings, pulling out `message`.
#[derive(Default)]
struct FieldCollector {
    message: Option<String>,
    fields: HashMap<String, String>,
}

impl FieldCollector {
    fn put(&mut self, field: &Field, value: String) {
        match field.name() {
            "message" => self.message = Some(value),
            name => {
                self.fields.insert(name.to_string(), value);
            }
        }
    }

    fn redacted(self) -> HashMap<String, String> {
        self.fields
            .into_iter()
            .map(|(key, value)| {
                let value = redact_if_sensitive(&key, &value);
                (key, value)
            })
            .collect()
    }
}

impl Visit for FieldCollector {
    fn record_str(&mut self, field: &Field, value: &str) {
        self.put(field, value.to_string());
    }

    fn record_i64(&mut self, field: &Field, value: i64) {
        self.put(field, value.to_string());
    }

    fn record_u64(&mut self, field: &Field, value: u64) {
        self.put(field, value.to_string());
    }

    fn record_bool(&mut self, field: &Field, value: bool) {
        self.put(field, value.to_string());
    }

    fn record_error(&mut self, field: &Field, value: &(dyn std::error::Error + 'static)) {
        self.put(field, value.to_string());
    }

    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        self.put(field, format!("{:?}", value));
    }
}

/// Returns `[REDACTED]` when `field_name` names a credential, else `value`.
///
/// ```ignore
/// tracing::info!(api_key = %redact_if_sensitive("api_key", &key), "API key updated");
/// ```
pub fn redact_if_sensitive(field_name: &str, value: &str) -> String {
    const CREDENTIAL_MARKERS: &[&str] = &[
        "api_key",
        "apikey",
        "token",
        "authorization",
        "bearer",
        "secret",
        "password",
        "credential",
    ];

    let name = field_name.to_ascii_lowercase();
    // Cursor values such as `export_cursor_token` are timestamps, not secrets.
    if name.contains("cursor") {
        return value.to_string();
    }
    if CREDENTIAL_MARKERS.iter().any(|marker| name.contains(marker)) {
        REDACTED.to_string()
    } else {
        value.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use bridge_traits::error::Result as SinkResult;
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingSink {
        entries: Mutex<Vec<LogEntry>>,
    }

    #[async_trait]
    impl LoggerSink for RecordingSink {
        async fn log(&self, entry: LogEntry) -> SinkResult<()> {
            self.entries.lock().unwrap().push(entry);
            Ok(())
        }

        fn min_level(&self) -> LogLevel {
            LogLevel::Debug
        }
    }

    #[test]
    fn test_generated_directive_covers_engine_crates() {
        let directive = LoggingConfig::default().with_level(LogLevel::Debug).directive();

        assert!(directive.starts_with("warn,"));
        assert!(directive.contains("core_sync=debug"));
        assert!(directive.contains("bridge_desktop=debug"));
        assert!(directive.contains("reqwest=warn"));
        assert!(build_filter(&LoggingConfig::default()).is_ok());
    }

    #[test]
    fn test_custom_filter_replaces_directive() {
        let config = LoggingConfig::default().with_filter("core_sync=trace");
        assert_eq!(config.directive(), "core_sync=trace");

        let config = LoggingConfig::default().with_filter("core_sync=notalevel");
        assert!(matches!(build_filter(&config), Err(Error::Config(_))));
    }

    #[test]
    fn test_log_format_parsing() {
        assert_eq!("JSON".parse::<LogFormat>().unwrap(), LogFormat::Json);
        assert_eq!(" compact ".parse::<LogFormat>().unwrap(), LogFormat::Compact);
        assert!("xml".parse::<LogFormat>().is_err());
    }

    #[test]
    fn test_redaction_of_credentials() {
        assert_eq!(redact_if_sensitive("api_key", "sk-123"), REDACTED);
        assert_eq!(redact_if_sensitive("encrypted_api_key", "blob"), REDACTED);
        assert_eq!(redact_if_sensitive("Authorization", "Bearer x"), REDACTED);
        assert_eq!(redact_if_sensitive("episode_id", "ep-1"), "ep-1");
        assert_eq!(
            redact_if_sensitive("export_cursor_token", "2024-01-01T00:00:00Z"),
            "2024-01-01T00:00:00Z"
        );
    }

    #[test]
    fn test_sink_layer_forwards_redacted_entries() {
        let sink = Arc::new(RecordingSink::default());
        let subscriber =
            tracing_subscriber::registry().with(LoggerSinkLayer::new(Some(sink.clone() as Arc<dyn LoggerSink>)));
        let _guard = tracing::subscriber::set_default(subscriber);

        tracing::trace!(target: "core_sync::reconciler", "Below sink level");
        tracing::info!(
            target: "core_sync::coordinator",
            batch_index = 2u64,
            api_key = "sk-live",
            "Batch committed"
        );

        let entries = sink.entries.lock().unwrap();
        assert_eq!(entries.len(), 1);
        let entry = &entries[0];
        assert_eq!(entry.target, "core_sync::coordinator");
        assert_eq!(entry.message, "Batch committed");
        assert_eq!(entry.fields.get("batch_index").map(String::as_str), Some("2"));
        assert_eq!(entry.fields.get("api_key").map(String::as_str), Some(REDACTED));
    }
}
