//! # Shard Monitoring
//!
//! Logging setup shared by the shard binaries. Library code only emits
//! `tracing` events; binaries call [`init_logging`] once at startup.
//!
//! ## Environment Variables
//!
//! - `RUST_LOG` - filter directives, overrides the configured level
//! - `LOG_DESTINATION` - "console" or "file"
//! - `LOG_DIR` - directory for daily rotating log files
//! - `LOG_FILE_PREFIX` - prefix for log file names

pub mod logging;

pub use logging::{init_logging, LogDestination, LoggingConfig};
