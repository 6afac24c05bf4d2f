//! # Observability
//!
//! Logging setup shared by every chain-mirror binary.
//!
//! Services call [`init_with_config`] once at startup and then use the plain
//! `tracing` macros. When a log file is configured, every event is written as
//! one JSON object per line so the mirror's progress can be followed with
//! `tail -f <base>/logs/chain-mirror.jsonl | jq`. Without a log file the
//! subscriber falls back to compact human-readable output on stderr.
//!
//! ```rust,ignore
//! observability::init_with_config(observability::LogConfig {
//!     service_name: "chain-mirror".into(),
//!     default_level: "debug".into(),
//!     log_path: Some(paths.log_file()),
//!     also_stderr: true,
//! });
//! tracing::info!(height = 100, "block committed");
//! ```

mod json_layer;
mod sink;

use std::path::PathBuf;

pub use json_layer::{JsonLayer, LogEntry};
pub use sink::LogFileWriter;

/// Configuration for the logging system.
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Name of the service (e.g., "chain-mirror", "migrate").
    /// Included in every JSON log line for filtering.
    pub service_name: String,

    /// Default log level filter (e.g., "debug", "info", "warn").
    /// Can be overridden by `RUST_LOG` environment variable.
    pub default_level: String,

    /// JSONL log file. `None` logs to stderr only.
    pub log_path: Option<PathBuf>,

    /// Also emit logs to stderr when a log file is configured.
    pub also_stderr: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            service_name: "unknown".into(),
            default_level: "info".into(),
            log_path: None,
            also_stderr: false,
        }
    }
}

/// Initialize the global subscriber from `config`.
///
/// Calling this more than once is harmless: later calls leave the first
/// subscriber in place.
pub fn init_with_config(config: LogConfig) {
    match &config.log_path {
        Some(path) => {
            if let Err(e) = sink::init_file_subscriber(&config, path) {
                // Fall back to stderr so a bad log path never stops the service.
                init_stderr_subscriber(&config.default_level);
                tracing::warn!(
                    log_path = %path.display(),
                    error = %e,
                    "failed to open log file, logging to stderr"
                );
            }
        }
        None => init_stderr_subscriber(&config.default_level),
    }
}

fn init_stderr_subscriber(default_level: &str) {
    use tracing_subscriber::util::SubscriberInitExt;
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .with_target(true)
        .compact()
        .finish()
        .try_init();
}

/// Re-export tracing macros for convenience.
pub use tracing::{debug, error, info, instrument, trace, warn};

/// Re-export Level for advanced filtering.
pub use tracing::Level;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = LogConfig::default();
        assert_eq!(config.service_name, "unknown");
        assert_eq!(config.default_level, "info");
        assert!(config.log_path.is_none());
        assert!(!config.also_stderr);
    }
}
