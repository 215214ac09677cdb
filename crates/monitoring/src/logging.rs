//! Logging configuration and initialization for shard services
//!
//! This module provides centralized logging functionality with:
//! - Daily rotating file logging or console logging
//! - Configurable log directories and file prefixes
//! - Environment variable overrides for containerised deployments

use anyhow::Result;
use serde::Deserialize;
use std::env;
use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Where log lines are written
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogDestination {
    #[default]
    Console,
    File,
}

/// Logging section of the service configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Default filter when RUST_LOG is not set (e.g. "info", "shard=debug")
    #[serde(default = "default_level")]
    pub level: String,

    #[serde(default)]
    pub destination: LogDestination,

    /// Directory for log files, only used with the file destination
    #[serde(default = "default_dir")]
    pub dir: String,

    /// Prefix for daily log file names
    #[serde(default = "default_file_prefix")]
    pub file_prefix: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_level(),
            destination: LogDestination::default(),
            dir: default_dir(),
            file_prefix: default_file_prefix(),
        }
    }
}

fn default_level() -> String {
    "info".to_string()
}

fn default_dir() -> String {
    "./logs".to_string()
}

fn default_file_prefix() -> String {
    "shard".to_string()
}

impl LoggingConfig {
    /// Apply `LOG_DESTINATION`, `LOG_DIR` and `LOG_FILE_PREFIX` overrides
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(destination) = env::var("LOG_DESTINATION") {
            self.destination = parse_destination(&destination).unwrap_or(self.destination);
        }
        if let Ok(dir) = env::var("LOG_DIR") {
            self.dir = dir;
        }
        if let Ok(prefix) = env::var("LOG_FILE_PREFIX") {
            self.file_prefix = prefix;
        }
        self
    }
}

fn parse_destination(value: &str) -> Option<LogDestination> {
    match value.trim().to_lowercase().as_str() {
        "console" | "stdout" => Some(LogDestination::Console),
        "file" => Some(LogDestination::File),
        _ => None,
    }
}

/// Initialize tracing with the configured output destination
///
/// `RUST_LOG` takes precedence over `config.level`. For the file destination
/// the returned guard must be held for the lifetime of the process, otherwise
/// buffered lines are lost on exit.
///
/// ## Example
///
/// ```no_run
/// use monitoring::{init_logging, LoggingConfig};
///
/// let _guard = init_logging(&LoggingConfig::default()).expect("logging");
/// ```
pub fn init_logging(config: &LoggingConfig) -> Result<Option<WorkerGuard>> {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.level));

    match config.destination {
        LogDestination::Console => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(
                    tracing_subscriber::fmt::layer()
                        .with_writer(std::io::stdout)
                        .with_ansi(true)
                        .with_target(true),
                )
                .try_init()
                .map_err(|e| {
                    anyhow::anyhow!("Failed to initialize console tracing subscriber: {}", e)
                })?;

            info!("Logging to console (stdout)");
            Ok(None)
        }
        LogDestination::File => {
            std::fs::create_dir_all(&config.dir).map_err(|e| {
                anyhow::anyhow!("Failed to create log directory '{}': {}", config.dir, e)
            })?;

            let file_appender = rolling::daily(&config.dir, &config.file_prefix);
            let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

            tracing_subscriber::registry()
                .with(env_filter)
                .with(
                    tracing_subscriber::fmt::layer()
                        .with_writer(non_blocking)
                        .with_ansi(false)
                        .with_target(true),
                )
                .try_init()
                .map_err(|e| {
                    anyhow::anyhow!("Failed to initialize file tracing subscriber: {}", e)
                })?;

            info!("Logging to daily rotating files in: {}/", config.dir);
            info!(
                "Log file pattern: {}/{}.<YYYY-MM-DD>",
                config.dir, config.file_prefix
            );
            Ok(Some(guard))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_destination() {
        assert_eq!(parse_destination("console"), Some(LogDestination::Console));
        assert_eq!(parse_destination(" FILE "), Some(LogDestination::File));
        assert_eq!(parse_destination("stdout"), Some(LogDestination::Console));
        assert_eq!(parse_destination("syslog"), None);
    }

    #[test]
    fn test_logging_config_defaults_from_toml() {
        let config: LoggingConfig = toml::from_str("destination = \"file\"").unwrap();
        assert_eq!(config.destination, LogDestination::File);
        assert_eq!(config.level, "info");
        assert_eq!(config.dir, "./logs");
        assert_eq!(config.file_prefix, "shard");
    }
}
