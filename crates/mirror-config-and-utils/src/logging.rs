//! Logging initialization.
//!
//! Thin wrapper over the observability crate: structured JSONL goes to
//! `<base>/logs/chain-mirror.jsonl`, with a compact copy on stderr.

use crate::Paths;
use observability::LogConfig;

/// Initialize the logging system.
///
/// `level` is the default filter; `RUST_LOG` takes precedence when set.
///
/// ```ignore
/// init_logging(&paths, "info");
/// tracing::info!("mirror started");
/// ```
pub fn init_logging(paths: &Paths, level: &str) {
    observability::init_with_config(LogConfig {
        service_name: "chain-mirror".into(),
        default_level: level.into(),
        log_path: Some(paths.log_file()),
        also_stderr: true,
    });
}

/// Parse a log level string into a tracing Level.
pub fn parse_level(level: &str) -> tracing::Level {
    match level.to_lowercase().as_str() {
        "trace" => tracing::Level::TRACE,
        "debug" => tracing::Level::DEBUG,
        "info" => tracing::Level::INFO,
        "warn" | "warning" => tracing::Level::WARN,
        "error" => tracing::Level::ERROR,
        _ => tracing::Level::INFO,
    }
}
